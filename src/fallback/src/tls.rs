//! rustls client configuration from recorded trust decisions.
//!
//! Handshake failures surface as `rustls::Error` values, which
//! [`crate::ProblemDetector`] classifies by their typed reason.

use std::sync::Arc;

use regtrust_core::error::{Result, TrustError};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};

use crate::certificate::CertificateInfo;
use crate::trust::RegistryTrust;

/// Load the operating system's trust roots.
///
/// Fails if no root could be loaded at all.
pub fn load_system_roots() -> Result<Vec<CertificateDer<'static>>> {
    let loaded = rustls_native_certs::load_native_certs();
    for err in &loaded.errors {
        tracing::debug!(error = %err, "Skipped unreadable system certificate source");
    }
    if loaded.certs.is_empty() {
        let reason = loaded
            .errors
            .first()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no certificates found".to_string());
        return Err(TrustError::SystemRoots(reason));
    }
    Ok(loaded.certs)
}

/// Build a client configuration for a registry's trust entry.
///
/// Insecure entries accept any server certificate. Otherwise the roots are
/// the stored certificates plus the system roots when enabled, or the
/// system roots alone when nothing else is configured.
pub fn client_config(trust: &RegistryTrust) -> Result<ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| TrustError::Tls(format!("Failed to select protocol versions: {}", e)))?;

    if trust.insecure {
        tracing::warn!("Building TLS configuration with certificate verification disabled");
        return Ok(builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate::new(provider)))
            .with_no_client_auth());
    }

    let mut roots = RootCertStore::empty();
    for pem in &trust.certificates {
        for cert in CertificateInfo::parse_pem_bundle(pem.as_bytes())? {
            roots
                .add(CertificateDer::from(cert.der))
                .map_err(|e| TrustError::Tls(format!("Failed to add trusted certificate: {}", e)))?;
        }
    }

    if trust.use_system_certs || trust.certificates.is_empty() {
        let (added, ignored) = roots.add_parsable_certificates(load_system_roots()?);
        tracing::debug!(added, ignored, "Added system roots");
    }

    Ok(builder.with_root_certificates(roots).with_no_client_auth())
}

/// Verifier that accepts any server certificate while still checking
/// handshake signatures.
#[derive(Debug)]
struct AcceptAnyCertificate {
    provider: Arc<CryptoProvider>,
}

impl AcceptAnyCertificate {
    fn new(provider: Arc<CryptoProvider>) -> Self {
        Self { provider }
    }
}

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        tracing::debug!(server = ?server_name, "Accepted server certificate without verification");
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
