//! Minimal certificate validation and diagnostics.
//!
//! This is not a cryptographic chain verifier. It checks the validity window,
//! the issuer against a set of trusted issuer names and the requested
//! hostname, producing errors worded like upstream TLS libraries so the
//! detector can classify them.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::certificate::CertificateInfo;

/// Opaque upstream error.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Window in which an approaching expiry is reported as a warning.
const EXPIRY_WARNING_DAYS: i64 = 30;

/// Validates a single certificate of a chain.
pub trait ChainValidator: Send + Sync {
    fn validate_chain(&self, cert: &CertificateInfo) -> Result<(), BoxedError>;
}

/// Category of a diagnostic finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticKind {
    Chain,
    Expiry,
    Hostname,
    Other(String),
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Chain => "chain",
            Self::Expiry => "expiry",
            Self::Hostname => "hostname",
            Self::Other(s) => s,
        }
    }
}

/// One pre-classified validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticEntry {
    pub kind: DiagnosticKind,
    pub message: String,
    pub detail: String,
}

impl DiagnosticEntry {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: detail.into(),
        }
    }
}

/// Diagnostic report for one certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertDiagnostics {
    pub subject: String,
    pub issuer: String,
    pub serial_number: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
    pub validation_errors: Vec<DiagnosticEntry>,
    pub warnings: Vec<String>,
}

impl CertDiagnostics {
    /// Empty report carrying the certificate's identity.
    pub fn for_certificate(cert: &CertificateInfo) -> Self {
        Self {
            subject: cert.subject.clone(),
            issuer: cert.issuer.clone(),
            serial_number: cert.serial_number.clone(),
            not_before: cert.not_before,
            not_after: cert.not_after,
            dns_names: cert.dns_names.clone(),
            ip_addresses: cert.ip_addresses.clone(),
            validation_errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.validation_errors.is_empty()
    }
}

#[derive(Debug)]
struct ValidationFailure(String);

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ValidationFailure {}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Validity-window and issuer-name validator.
pub struct ValidityValidator {
    trusted_issuers: HashSet<String>,
    trust_self_signed: bool,
    clock: Clock,
}

impl Default for ValidityValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidityValidator {
    pub fn new() -> Self {
        Self {
            trusted_issuers: HashSet::new(),
            trust_self_signed: false,
            clock: Arc::new(Utc::now),
        }
    }

    /// Trust certificates issued by the given distinguished names.
    pub fn with_trusted_issuers<I, S>(mut self, issuers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trusted_issuers
            .extend(issuers.into_iter().map(Into::into));
        self
    }

    /// Trust the subjects of the given certificates as issuers.
    pub fn with_trusted_roots(self, roots: &[CertificateInfo]) -> Self {
        self.with_trusted_issuers(roots.iter().map(|r| r.subject.clone()))
    }

    /// Treat self-signed certificates as their own trust anchor.
    pub fn trust_self_signed(mut self, trust: bool) -> Self {
        self.trust_self_signed = trust;
        self
    }

    /// Override the clock used for validity checks.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn issuer_trusted(&self, cert: &CertificateInfo) -> bool {
        self.trusted_issuers.contains(&cert.issuer)
            || (self.trust_self_signed && cert.is_self_signed())
    }

    fn expiry_error(&self, cert: &CertificateInfo) -> Option<String> {
        let now = self.now();
        if cert.is_expired_at(now) {
            Some(format!(
                "certificate has expired: current time {} is after {}",
                now.to_rfc3339(),
                cert.not_after.to_rfc3339()
            ))
        } else if cert.is_not_yet_valid_at(now) {
            Some(format!(
                "certificate is not yet valid: current time {} is before {}",
                now.to_rfc3339(),
                cert.not_before.to_rfc3339()
            ))
        } else {
            None
        }
    }

    /// Build a diagnostic report, optionally checking `hostname`.
    pub fn generate_diagnostics(
        &self,
        cert: &CertificateInfo,
        hostname: Option<&str>,
    ) -> CertDiagnostics {
        let mut diag = CertDiagnostics::for_certificate(cert);

        if !self.issuer_trusted(cert) {
            let detail = if cert.is_self_signed() {
                format!("self-signed certificate: {}", cert.subject)
            } else {
                format!("unknown authority: {}", cert.issuer)
            };
            diag.validation_errors.push(DiagnosticEntry::new(
                DiagnosticKind::Chain,
                "certificate chain verification failed",
                detail,
            ));
        }

        if let Some(err) = self.expiry_error(cert) {
            diag.validation_errors.push(DiagnosticEntry::new(
                DiagnosticKind::Expiry,
                "certificate validity check failed",
                err,
            ));
        } else if cert.expires_within(self.now(), chrono::Duration::days(EXPIRY_WARNING_DAYS)) {
            diag.warnings.push(format!(
                "certificate expires within {} days ({})",
                EXPIRY_WARNING_DAYS,
                cert.not_after.to_rfc3339()
            ));
        }

        if let Some(host) = hostname {
            if !matches_hostname(cert, host) {
                diag.validation_errors.push(DiagnosticEntry::new(
                    DiagnosticKind::Hostname,
                    "hostname verification failed",
                    format!(
                        "certificate is valid for {}, not {}",
                        valid_names(cert).join(", "),
                        host
                    ),
                ));
            }
        }

        diag
    }
}

impl ChainValidator for ValidityValidator {
    fn validate_chain(&self, cert: &CertificateInfo) -> Result<(), BoxedError> {
        if let Some(err) = self.expiry_error(cert) {
            return Err(Box::new(ValidationFailure(format!("x509: {}", err))));
        }
        if !self.issuer_trusted(cert) {
            return Err(Box::new(ValidationFailure(
                "x509: certificate signed by unknown authority".to_string(),
            )));
        }
        Ok(())
    }
}

fn valid_names(cert: &CertificateInfo) -> Vec<String> {
    let mut names = cert.dns_names.clone();
    names.extend(cert.ip_addresses.iter().map(ToString::to_string));
    if names.is_empty() {
        if let Some(cn) = &cert.common_name {
            names.push(cn.clone());
        }
    }
    names
}

/// Match `host` against the certificate's SANs (or CN without SANs).
///
/// Supports a single leading `*.` wildcard label.
pub fn matches_hostname(cert: &CertificateInfo, host: &str) -> bool {
    let host = host.trim_end_matches('.').to_lowercase();

    if let Ok(ip) = host.parse::<IpAddr>() {
        return cert.ip_addresses.contains(&ip);
    }

    valid_names(cert)
        .iter()
        .any(|pattern| hostname_matches_pattern(&pattern.to_lowercase(), &host))
}

fn hostname_matches_pattern(pattern: &str, host: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(suffix) => match host.split_once('.') {
            Some((label, rest)) => !label.is_empty() && rest == suffix,
            None => false,
        },
        None => pattern == host,
    }
}
