//! Certificate problem taxonomy.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::certificate::CertificateInfo;

/// Detail keys recorded on a [`CertProblem`].
pub mod keys {
    pub const EXPIRED_ON: &str = "expired_on";
    pub const VALID_FROM: &str = "valid_from";
    pub const ISSUER: &str = "issuer";
    pub const CA_ISSUER: &str = "ca_issuer";
    pub const VALID_HOSTNAMES: &str = "valid_hostnames";
    pub const COMMON_NAME: &str = "common_name";
    pub const REQUESTED_HOSTNAME: &str = "requested_hostname";
    pub const ERROR_TYPE: &str = "error_type";
    pub const CHAIN_POSITION: &str = "chain_position";
    pub const TOTAL_CERTS: &str = "total_certs";
    pub const SUBJECT: &str = "subject";
    pub const DNS_NAMES: &str = "dns_names";
    pub const NOT_BEFORE: &str = "not_before";
    pub const NOT_AFTER: &str = "not_after";
}

/// Why certificate validation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProblemType {
    SelfSigned,
    Expired,
    NotYetValid,
    HostnameMismatch,
    UntrustedCa,
    UnknownAuthority,
    Unknown,
}

impl ProblemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SelfSigned => "self-signed",
            Self::Expired => "expired",
            Self::NotYetValid => "not-yet-valid",
            Self::HostnameMismatch => "hostname-mismatch",
            Self::UntrustedCa => "untrusted-ca",
            Self::UnknownAuthority => "unknown-authority",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ProblemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single diagnostic value attached to a problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DetailValue {
    Text(String),
    List(Vec<String>),
    Time(DateTime<Utc>),
    Count(usize),
}

impl DetailValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_count(&self) -> Option<usize> {
        match self {
            Self::Count(n) => Some(*n),
            _ => None,
        }
    }
}

impl std::fmt::Display for DetailValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::List(v) => f.write_str(&v.join(", ")),
            Self::Time(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S UTC")),
            Self::Count(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for DetailValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for DetailValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Vec<String>> for DetailValue {
    fn from(v: Vec<String>) -> Self {
        Self::List(v)
    }
}

impl From<DateTime<Utc>> for DetailValue {
    fn from(t: DateTime<Utc>) -> Self {
        Self::Time(t)
    }
}

impl From<usize> for DetailValue {
    fn from(n: usize) -> Self {
        Self::Count(n)
    }
}

/// A classified certificate validation failure.
///
/// Only exists when there was an original error; `problem_type` is always set.
#[derive(Debug, Clone, Serialize)]
pub struct CertProblem {
    #[serde(rename = "type")]
    pub problem_type: ProblemType,
    /// The certificate that failed, when the caller had one.
    #[serde(skip)]
    pub certificate: Option<Arc<CertificateInfo>>,
    /// Text of the original validation error.
    pub error: String,
    pub details: BTreeMap<String, DetailValue>,
    /// Short remediation hints, most useful first.
    pub suggestions: Vec<String>,
}

impl CertProblem {
    pub(crate) fn new(
        problem_type: ProblemType,
        certificate: Option<Arc<CertificateInfo>>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            problem_type,
            certificate,
            error: error.into(),
            details: BTreeMap::new(),
            suggestions: Vec::new(),
        }
    }

    pub(crate) fn with_detail(mut self, key: &str, value: impl Into<DetailValue>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub(crate) fn with_suggestions(mut self, suggestions: &[&str]) -> Self {
        self.suggestions
            .extend(suggestions.iter().map(|s| s.to_string()));
        self
    }

    pub fn detail(&self, key: &str) -> Option<&DetailValue> {
        self.details.get(key)
    }

    /// One-line summary keyed off the problem type.
    pub fn summary(&self) -> &'static str {
        match self.problem_type {
            ProblemType::SelfSigned => "Certificate is self-signed and not trusted by system",
            ProblemType::Expired => "Certificate has expired",
            ProblemType::NotYetValid => "Certificate is not yet valid",
            ProblemType::HostnameMismatch => {
                "Certificate hostname does not match requested hostname"
            }
            ProblemType::UntrustedCa => {
                "Certificate was issued by an untrusted Certificate Authority"
            }
            ProblemType::UnknownAuthority => "Certificate authority is not recognized",
            ProblemType::Unknown => "Unknown certificate validation problem",
        }
    }

    /// Summary enriched with whatever details the problem carries.
    pub fn detailed_description(&self) -> String {
        let summary = self.summary();

        match self.problem_type {
            ProblemType::SelfSigned => {
                if let Some(issuer) = self.detail(keys::ISSUER).and_then(DetailValue::as_text) {
                    return format!(
                        "{}. Issuer: {}. This is common in development environments and local Kind clusters.",
                        summary, issuer
                    );
                }
            }
            ProblemType::Expired => {
                if let Some(expired_on) = self.detail(keys::EXPIRED_ON) {
                    return format!(
                        "{} on {}. The certificate needs to be renewed.",
                        summary, expired_on
                    );
                }
            }
            ProblemType::NotYetValid => {
                if let Some(valid_from) = self.detail(keys::VALID_FROM) {
                    return format!(
                        "{}. It becomes valid on {}; check the system clock.",
                        summary, valid_from
                    );
                }
            }
            ProblemType::HostnameMismatch => {
                if let Some(hosts) = self
                    .detail(keys::VALID_HOSTNAMES)
                    .and_then(DetailValue::as_list)
                    .filter(|h| !h.is_empty())
                {
                    return format!("{}. Certificate is valid for: {}", summary, hosts.join(", "));
                }
                if let Some(cn) = self
                    .detail(keys::COMMON_NAME)
                    .and_then(DetailValue::as_text)
                    .filter(|cn| !cn.is_empty())
                {
                    return format!("{}. Certificate Common Name: {}", summary, cn);
                }
            }
            ProblemType::UntrustedCa => {
                if let Some(ca) = self.detail(keys::CA_ISSUER).and_then(DetailValue::as_text) {
                    return format!("{}. Issuer: {}", summary, ca);
                }
            }
            ProblemType::UnknownAuthority | ProblemType::Unknown => {}
        }

        summary.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn problem(t: ProblemType) -> CertProblem {
        CertProblem::new(t, None, "boom")
    }

    #[test]
    fn test_problem_type_strings() {
        assert_eq!(ProblemType::SelfSigned.to_string(), "self-signed");
        assert_eq!(ProblemType::UntrustedCa.as_str(), "untrusted-ca");
        assert_eq!(
            serde_json::to_string(&ProblemType::HostnameMismatch).unwrap(),
            "\"hostname-mismatch\""
        );
    }

    #[test]
    fn test_summary_per_type() {
        assert_eq!(problem(ProblemType::Expired).summary(), "Certificate has expired");
        assert_eq!(
            problem(ProblemType::Unknown).summary(),
            "Unknown certificate validation problem"
        );
    }

    #[test]
    fn test_description_falls_back_to_summary() {
        let p = problem(ProblemType::SelfSigned);
        assert_eq!(p.detailed_description(), p.summary());
    }

    #[test]
    fn test_description_self_signed_issuer() {
        let p = problem(ProblemType::SelfSigned).with_detail(keys::ISSUER, "CN=kind");
        let desc = p.detailed_description();
        assert!(desc.contains("Issuer: CN=kind"));
        assert!(desc.contains("Kind clusters"));
    }

    #[test]
    fn test_description_expired_date() {
        let t = DateTime::parse_from_rfc3339("2021-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let p = problem(ProblemType::Expired).with_detail(keys::EXPIRED_ON, t);
        assert_eq!(
            p.detailed_description(),
            "Certificate has expired on 2021-01-01 00:00:00 UTC. The certificate needs to be renewed."
        );
    }

    #[test]
    fn test_description_hostname_prefers_sans() {
        let p = problem(ProblemType::HostnameMismatch)
            .with_detail(keys::VALID_HOSTNAMES, vec!["a.local".to_string(), "b.local".to_string()])
            .with_detail(keys::COMMON_NAME, "cn.local");
        assert!(p.detailed_description().ends_with("valid for: a.local, b.local"));
    }

    #[test]
    fn test_description_hostname_common_name() {
        let p = problem(ProblemType::HostnameMismatch)
            .with_detail(keys::VALID_HOSTNAMES, Vec::<String>::new())
            .with_detail(keys::COMMON_NAME, "cn.local");
        assert!(p.detailed_description().ends_with("Common Name: cn.local"));
    }

    #[test]
    fn test_description_is_deterministic() {
        let p = problem(ProblemType::UntrustedCa).with_detail(keys::CA_ISSUER, "CN=Corp CA");
        assert_eq!(p.detailed_description(), p.detailed_description());
    }

    #[test]
    fn test_detail_value_accessors() {
        assert_eq!(DetailValue::from("x").as_text(), Some("x"));
        assert_eq!(DetailValue::from(3usize).as_count(), Some(3));
        assert!(DetailValue::from("x").as_list().is_none());
        assert_eq!(DetailValue::from(vec!["a".to_string()]).to_string(), "a");
    }

    #[test]
    fn test_problem_serializes() {
        let p = problem(ProblemType::Expired).with_suggestions(&["Renew the certificate"]);
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["type"], "expired");
        assert_eq!(json["suggestions"][0], "Renew the certificate");
    }
}
