//! Shared unit test fixtures: `rcgen` certificates, a recording trust
//! store and a warning recorder.

use std::sync::Arc;

use parking_lot::Mutex;
use rcgen::{
    date_time_ymd, BasicConstraints, Certificate, CertificateParams, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose,
};

use regtrust_core::error::Result;

use crate::certificate::CertificateInfo;
use crate::strategies::WarningCallback;
use crate::trust::{CertificateCapability, SystemCertCapability, TrustStoreManager};

fn params(cn: &str, sans: &[&str]) -> CertificateParams {
    let sans: Vec<String> = sans.iter().map(|s| s.to_string()).collect();
    let mut params = CertificateParams::new(sans).unwrap();
    params.distinguished_name.push(DnType::CommonName, cn);
    params.not_before = date_time_ymd(2024, 1, 1);
    params.not_after = date_time_ymd(2099, 1, 1);
    params
}

pub fn self_signed(cn: &str, sans: &[&str]) -> (Certificate, KeyPair) {
    let key = KeyPair::generate().unwrap();
    let cert = params(cn, sans).self_signed(&key).unwrap();
    (cert, key)
}

pub fn ca(cn: &str) -> (Certificate, KeyPair) {
    let key = KeyPair::generate().unwrap();
    let mut p = params(cn, &[]);
    p.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    p.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
    let cert = p.self_signed(&key).unwrap();
    (cert, key)
}

/// Self-signed TLS server certificate with explicit key usages.
pub fn server_cert(cn: &str) -> (Certificate, KeyPair) {
    let key = KeyPair::generate().unwrap();
    let mut p = params(cn, &[cn]);
    p.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    p.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ServerAuth,
        ExtendedKeyUsagePurpose::ClientAuth,
    ];
    let cert = p.self_signed(&key).unwrap();
    (cert, key)
}

pub fn signed_by(
    cn: &str,
    sans: &[&str],
    issuer: &Certificate,
    issuer_key: &KeyPair,
) -> (Certificate, KeyPair) {
    let key = KeyPair::generate().unwrap();
    let cert = params(cn, sans).signed_by(&key, issuer, issuer_key).unwrap();
    (cert, key)
}

pub fn expired(cn: &str) -> (Certificate, KeyPair) {
    let key = KeyPair::generate().unwrap();
    let mut p = params(cn, &[cn]);
    p.not_before = date_time_ymd(2020, 1, 1);
    p.not_after = date_time_ymd(2021, 1, 1);
    let cert = p.self_signed(&key).unwrap();
    (cert, key)
}

pub fn not_yet_valid(cn: &str) -> (Certificate, KeyPair) {
    let key = KeyPair::generate().unwrap();
    let mut p = params(cn, &[cn]);
    p.not_before = date_time_ymd(2098, 1, 1);
    p.not_after = date_time_ymd(2099, 1, 1);
    let cert = p.self_signed(&key).unwrap();
    (cert, key)
}

/// Parsed self-signed certificate for `cn` with a matching DNS SAN.
pub fn self_signed_info(cn: &str) -> CertificateInfo {
    let (cert, _) = self_signed(cn, &[cn]);
    CertificateInfo::from_der(cert.der()).unwrap()
}

/// Parsed leaf certificate for `cn` issued by a throwaway CA.
pub fn ca_signed_info(cn: &str) -> CertificateInfo {
    let (ca_cert, ca_key) = ca("Test Root CA");
    let (cert, _) = signed_by(cn, &[cn], &ca_cert, &ca_key);
    CertificateInfo::from_der(cert.der()).unwrap()
}

/// Trust store that records every call as `kind:registry[:value]`.
#[derive(Default)]
pub struct RecordingStore {
    calls: Mutex<Vec<String>>,
}

impl RecordingStore {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl TrustStoreManager for RecordingStore {
    fn set_insecure(&self, registry: &str, insecure: bool) -> Result<()> {
        self.calls.lock().push(format!("insecure:{}:{}", registry, insecure));
        Ok(())
    }
}

impl SystemCertCapability for RecordingStore {
    fn set_use_system_certs(&self, registry: &str, use_system: bool) -> Result<()> {
        self.calls.lock().push(format!("system:{}:{}", registry, use_system));
        Ok(())
    }
}

impl CertificateCapability for RecordingStore {
    fn add_certificate(&self, registry: &str, _cert_data: &[u8]) -> Result<()> {
        self.calls.lock().push(format!("cert:{}", registry));
        Ok(())
    }
}

/// Warning callback that keeps every message.
pub fn recorder() -> (WarningCallback, Arc<Mutex<Vec<String>>>) {
    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = messages.clone();
    let callback: WarningCallback = Arc::new(move |m: &str| sink.lock().push(m.to_string()));
    (callback, messages)
}
