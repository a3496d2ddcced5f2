//! Certificate fixtures shared by the command tests.

use rcgen::{BasicConstraints, Certificate, CertificateParams, DnType, IsCa, KeyPair};
use regtrust_fallback::CertificateInfo;

fn params(cn: &str, sans: &[&str]) -> CertificateParams {
    let sans: Vec<String> = sans.iter().map(|s| s.to_string()).collect();
    let mut params = CertificateParams::new(sans).unwrap();
    params.distinguished_name.push(DnType::CommonName, cn);
    params
}

/// PEM of a self-signed certificate for `cn` with a matching DNS SAN.
pub fn self_signed_pem(cn: &str) -> String {
    let key = KeyPair::generate().unwrap();
    params(cn, &[cn]).self_signed(&key).unwrap().pem()
}

/// Parsed self-signed certificate for `cn`.
pub fn self_signed_info(cn: &str) -> CertificateInfo {
    CertificateInfo::from_pem(self_signed_pem(cn).as_bytes()).unwrap()
}

pub fn ca(cn: &str) -> (Certificate, KeyPair) {
    let key = KeyPair::generate().unwrap();
    let mut p = params(cn, &[]);
    p.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let cert = p.self_signed(&key).unwrap();
    (cert, key)
}

/// PEM of a leaf for `cn` issued by `issuer`.
pub fn signed_pem(cn: &str, issuer: &Certificate, issuer_key: &KeyPair) -> String {
    let key = KeyPair::generate().unwrap();
    params(cn, &[cn])
        .signed_by(&key, issuer, issuer_key)
        .unwrap()
        .pem()
}
