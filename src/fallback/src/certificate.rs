//! X.509 certificate metadata used for problem classification.
//!
//! Parses DER/PEM certificates with `x509-cert` and keeps only the fields
//! the detector and diagnostics need: names, SANs, validity window, key
//! usages and the CA flag.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use der::oid::{AssociatedOid, ObjectIdentifier};
use der::Decode;
use regtrust_core::error::{Result, TrustError};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::CertificateDer;
use sha2::{Digest, Sha256};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::{BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAltName};
use x509_cert::Certificate;

/// OID for the X.520 commonName attribute.
const COMMON_NAME_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");

const EXT_KEY_USAGES: &[(ObjectIdentifier, &str)] = &[
    (ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.1"), "TLS Server Authentication"),
    (ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.2"), "TLS Client Authentication"),
    (ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.3"), "Code Signing"),
    (ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.4"), "Email Protection"),
    (ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.8"), "Time Stamping"),
    (ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.9"), "OCSP Signing"),
];

/// Read-only view of a certificate involved in a validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    /// Subject distinguished name (RFC 4514).
    pub subject: String,
    /// Issuer distinguished name (RFC 4514).
    pub issuer: String,
    /// Subject common name, if present.
    pub common_name: Option<String>,
    /// DNS subject alternative names.
    pub dns_names: Vec<String>,
    /// IP subject alternative names.
    pub ip_addresses: Vec<IpAddr>,
    /// Serial number as lowercase hex.
    pub serial_number: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// Basic constraints CA flag.
    pub is_ca: bool,
    /// Key usage flags, human readable.
    pub key_usage: Vec<String>,
    /// Extended key usages, human readable. Unknown OIDs are kept dotted.
    pub ext_key_usage: Vec<String>,
    /// SHA-256 of the DER encoding, lowercase hex. Empty without DER.
    pub fingerprint: String,
    /// DER encoding. Empty for metadata-only certificates.
    pub der: Vec<u8>,
}

impl CertificateInfo {
    /// Create metadata-only certificate info (no DER backing).
    pub fn new(
        subject: impl Into<String>,
        issuer: impl Into<String>,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
    ) -> Self {
        Self {
            subject: subject.into(),
            issuer: issuer.into(),
            common_name: None,
            dns_names: Vec::new(),
            ip_addresses: Vec::new(),
            serial_number: String::new(),
            not_before,
            not_after,
            is_ca: false,
            key_usage: Vec::new(),
            ext_key_usage: Vec::new(),
            fingerprint: String::new(),
            der: Vec::new(),
        }
    }

    pub fn with_dns_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dns_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_common_name(mut self, cn: impl Into<String>) -> Self {
        self.common_name = Some(cn.into());
        self
    }

    /// Parse a DER-encoded certificate.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let cert = Certificate::from_der(der)
            .map_err(|e| TrustError::CertificateParse(format!("invalid DER: {}", e)))?;
        Self::from_parsed(&cert, der.to_vec())
    }

    /// Parse the first certificate of a PEM document.
    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        let first = CertificateDer::pem_slice_iter(pem).next().ok_or_else(|| {
            TrustError::CertificateParse(
                "failed to decode PEM block containing certificate".to_string(),
            )
        })?;
        let der = first.map_err(pem_error)?;
        Self::from_der(der.as_ref())
    }

    /// Parse every certificate of a PEM bundle, in order.
    ///
    /// Text outside `CERTIFICATE` sections (comments, keys) is skipped.
    pub fn parse_pem_bundle(pem: &[u8]) -> Result<Vec<Self>> {
        CertificateDer::pem_slice_iter(pem)
            .map(|item| {
                let der = item.map_err(pem_error)?;
                Self::from_der(der.as_ref())
            })
            .collect()
    }

    fn from_parsed(cert: &Certificate, der: Vec<u8>) -> Result<Self> {
        let tbs = &cert.tbs_certificate;

        let not_before = to_datetime(tbs.validity.not_before.to_unix_duration())?;
        let not_after = to_datetime(tbs.validity.not_after.to_unix_duration())?;

        let mut dns_names = Vec::new();
        let mut ip_addresses = Vec::new();
        let mut is_ca = false;
        let mut key_usage = Vec::new();
        let mut ext_key_usage = Vec::new();

        for ext in tbs.extensions.iter().flatten() {
            if ext.extn_id == SubjectAltName::OID {
                let san = SubjectAltName::from_der(ext.extn_value.as_bytes()).map_err(|e| {
                    TrustError::CertificateParse(format!("invalid subjectAltName: {}", e))
                })?;
                for name in san.0 {
                    match name {
                        GeneralName::DnsName(dns) => dns_names.push(dns.to_string()),
                        GeneralName::IpAddress(octets) => {
                            if let Some(ip) = ip_from_octets(octets.as_bytes()) {
                                ip_addresses.push(ip);
                            }
                        }
                        _ => {}
                    }
                }
            } else if ext.extn_id == BasicConstraints::OID {
                let bc = BasicConstraints::from_der(ext.extn_value.as_bytes()).map_err(|e| {
                    TrustError::CertificateParse(format!("invalid basicConstraints: {}", e))
                })?;
                is_ca = bc.ca;
            } else if ext.extn_id == KeyUsage::OID {
                let ku = KeyUsage::from_der(ext.extn_value.as_bytes()).map_err(|e| {
                    TrustError::CertificateParse(format!("invalid keyUsage: {}", e))
                })?;
                key_usage = key_usage_names(&ku);
            } else if ext.extn_id == ExtendedKeyUsage::OID {
                let eku = ExtendedKeyUsage::from_der(ext.extn_value.as_bytes()).map_err(|e| {
                    TrustError::CertificateParse(format!("invalid extKeyUsage: {}", e))
                })?;
                ext_key_usage = eku.0.iter().map(ext_key_usage_name).collect();
            }
        }

        let common_name = tbs
            .subject
            .0
            .iter()
            .flat_map(|rdn| rdn.0.iter())
            .find(|atv| atv.oid == COMMON_NAME_OID)
            .and_then(|atv| std::str::from_utf8(atv.value.value()).ok())
            .map(str::to_string);

        let fingerprint = hex::encode(Sha256::digest(&der));

        Ok(Self {
            subject: tbs.subject.to_string(),
            issuer: tbs.issuer.to_string(),
            common_name,
            dns_names,
            ip_addresses,
            serial_number: hex::encode(tbs.serial_number.as_bytes()),
            not_before,
            not_after,
            is_ca,
            key_usage,
            ext_key_usage,
            fingerprint,
            der,
        })
    }

    /// Subject and issuer are identical.
    pub fn is_self_signed(&self) -> bool {
        self.subject == self.issuer
    }

    pub fn is_expired_at(&self, at: DateTime<Utc>) -> bool {
        at > self.not_after
    }

    pub fn is_not_yet_valid_at(&self, at: DateTime<Utc>) -> bool {
        at < self.not_before
    }

    /// Whether the certificate expires before `now + window`.
    pub fn expires_within(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        self.not_after < now + window
    }

    /// Short display name: the common name, falling back to the subject.
    pub fn display_name(&self) -> &str {
        self.common_name.as_deref().unwrap_or(&self.subject)
    }
}

fn to_datetime(since_epoch: std::time::Duration) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(since_epoch.as_secs() as i64, since_epoch.subsec_nanos())
        .ok_or_else(|| TrustError::CertificateParse("validity time out of range".to_string()))
}

fn ip_from_octets(octets: &[u8]) -> Option<IpAddr> {
    match octets.len() {
        4 => {
            let arr: [u8; 4] = octets.try_into().ok()?;
            Some(IpAddr::from(arr))
        }
        16 => {
            let arr: [u8; 16] = octets.try_into().ok()?;
            Some(IpAddr::from(arr))
        }
        _ => None,
    }
}

fn key_usage_names(ku: &KeyUsage) -> Vec<String> {
    [
        (ku.digital_signature(), "Digital Signature"),
        (ku.non_repudiation(), "Content Commitment"),
        (ku.key_encipherment(), "Key Encipherment"),
        (ku.data_encipherment(), "Data Encipherment"),
        (ku.key_agreement(), "Key Agreement"),
        (ku.key_cert_sign(), "Certificate Signing"),
        (ku.crl_sign(), "CRL Signing"),
        (ku.encipher_only(), "Encipher Only"),
        (ku.decipher_only(), "Decipher Only"),
    ]
    .into_iter()
    .filter(|(set, _)| *set)
    .map(|(_, name)| name.to_string())
    .collect()
}

fn ext_key_usage_name(oid: &ObjectIdentifier) -> String {
    EXT_KEY_USAGES
        .iter()
        .find(|(known, _)| known == oid)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| format!("Unknown ({})", oid))
}

fn pem_error(e: rustls::pki_types::pem::Error) -> TrustError {
    TrustError::CertificateParse(format!("invalid PEM: {:?}", e))
}
