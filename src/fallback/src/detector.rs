//! Classification of certificate validation failures.
//!
//! Errors arrive from whatever TLS stack performed verification. When the
//! error is a `rustls` certificate error its typed reason is used; anything
//! else is classified by case-insensitive substring matching on the text.

use std::error::Error as StdError;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use regtrust_core::error::{Result, TrustError};

use crate::certificate::CertificateInfo;
use crate::problem::{keys, CertProblem, ProblemType};
use crate::validator::{CertDiagnostics, ChainValidator, DiagnosticKind};

/// Coarse failure reason before the certificate is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reason {
    Expired,
    NotYetValid,
    UnknownAuthority,
    HostnameMismatch,
    Unrecognized,
}

/// Classifies validation errors into [`CertProblem`]s.
pub struct ProblemDetector {
    validator: Arc<dyn ChainValidator>,
}

impl ProblemDetector {
    pub fn new(validator: Arc<dyn ChainValidator>) -> Self {
        Self { validator }
    }

    /// Classify a validation error against the certificate that failed.
    ///
    /// No error means no problem. An error without a certificate cannot be
    /// classified and is rejected.
    pub fn detect_problem(
        &self,
        validation_err: Option<&(dyn StdError + 'static)>,
        cert: Option<&Arc<CertificateInfo>>,
    ) -> Result<Option<CertProblem>> {
        let Some(err) = validation_err else {
            return Ok(None);
        };
        let Some(cert) = cert else {
            return Err(TrustError::Detection(
                "a certificate is required to classify an error".to_string(),
            ));
        };

        let text = error_text(err);
        let reason = structured_reason(err).unwrap_or_else(|| reason_from_text(&text));
        let problem = classify(reason, &text, err, cert);

        tracing::debug!(
            problem = %problem.problem_type,
            subject = %cert.subject,
            "Classified certificate validation failure"
        );
        Ok(Some(problem))
    }

    /// Validate every certificate of a chain and classify each failure.
    pub fn analyze_cert_chain(&self, certs: &[Arc<CertificateInfo>]) -> Result<Vec<CertProblem>> {
        if certs.is_empty() {
            return Err(TrustError::Detection(
                "certificate chain cannot be empty".to_string(),
            ));
        }

        let mut problems = Vec::new();
        for (position, cert) in certs.iter().enumerate() {
            let Err(err) = self.validator.validate_chain(cert) else {
                continue;
            };
            let err: &(dyn StdError + 'static) = err.as_ref();
            let detected = self.detect_problem(Some(err), Some(cert)).map_err(|e| {
                TrustError::Detection(format!(
                    "failed to detect problem for cert {}: {}",
                    position, e
                ))
            })?;
            if let Some(problem) = detected {
                problems.push(
                    problem
                        .with_detail(keys::CHAIN_POSITION, position)
                        .with_detail(keys::TOTAL_CERTS, certs.len()),
                );
            }
        }

        tracing::debug!(
            total = certs.len(),
            problems = problems.len(),
            "Analyzed certificate chain"
        );
        Ok(problems)
    }

    /// Map pre-classified diagnostics onto the problem taxonomy.
    pub fn detect_from_diagnostics(
        &self,
        diag: Option<&CertDiagnostics>,
    ) -> Result<Vec<CertProblem>> {
        let Some(diag) = diag else {
            return Err(TrustError::Detection("diagnostics are required".to_string()));
        };

        let problems = diag
            .validation_errors
            .iter()
            .map(|entry| {
                let detail = entry.detail.to_lowercase();
                let problem_type = match entry.kind {
                    DiagnosticKind::Chain if detail.contains("self-signed") => {
                        ProblemType::SelfSigned
                    }
                    DiagnosticKind::Chain if detail.contains("unknown authority") => {
                        ProblemType::UntrustedCa
                    }
                    DiagnosticKind::Chain => ProblemType::UnknownAuthority,
                    DiagnosticKind::Expiry if detail.contains("expired") => ProblemType::Expired,
                    DiagnosticKind::Expiry => ProblemType::NotYetValid,
                    DiagnosticKind::Hostname => ProblemType::HostnameMismatch,
                    DiagnosticKind::Other(_) => ProblemType::Unknown,
                };

                let mut problem = CertProblem::new(
                    problem_type,
                    None,
                    format!("{}: {}", entry.message, entry.detail),
                )
                .with_detail(keys::SUBJECT, diag.subject.as_str())
                .with_detail(keys::ISSUER, diag.issuer.as_str())
                .with_detail(keys::DNS_NAMES, diag.dns_names.clone())
                .with_detail(keys::NOT_BEFORE, diag.not_before)
                .with_detail(keys::NOT_AFTER, diag.not_after)
                .with_suggestions(suggestions(problem_type));

                match problem_type {
                    ProblemType::Expired => {
                        problem = problem.with_detail(keys::EXPIRED_ON, diag.not_after);
                    }
                    ProblemType::NotYetValid => {
                        problem = problem.with_detail(keys::VALID_FROM, diag.not_before);
                    }
                    ProblemType::HostnameMismatch => {
                        problem = problem.with_detail(keys::VALID_HOSTNAMES, diag.dns_names.clone());
                    }
                    ProblemType::UntrustedCa => {
                        problem = problem.with_detail(keys::CA_ISSUER, diag.issuer.as_str());
                    }
                    _ => {}
                }
                problem
            })
            .collect();

        Ok(problems)
    }
}

fn classify(
    reason: Reason,
    text: &str,
    err: &(dyn StdError + 'static),
    cert: &Arc<CertificateInfo>,
) -> CertProblem {
    let base = |t: ProblemType| {
        CertProblem::new(t, Some(Arc::clone(cert)), text).with_suggestions(suggestions(t))
    };

    match reason {
        Reason::Expired => base(ProblemType::Expired).with_detail(keys::EXPIRED_ON, cert.not_after),
        Reason::NotYetValid => {
            base(ProblemType::NotYetValid).with_detail(keys::VALID_FROM, cert.not_before)
        }
        Reason::UnknownAuthority if cert.is_self_signed() => {
            base(ProblemType::SelfSigned).with_detail(keys::ISSUER, cert.issuer.as_str())
        }
        Reason::UnknownAuthority => {
            base(ProblemType::UntrustedCa).with_detail(keys::CA_ISSUER, cert.issuer.as_str())
        }
        Reason::HostnameMismatch => {
            let mut problem = base(ProblemType::HostnameMismatch)
                .with_detail(keys::VALID_HOSTNAMES, cert.dns_names.clone())
                .with_detail(
                    keys::COMMON_NAME,
                    cert.common_name.clone().unwrap_or_default(),
                );
            if let Some(host) = requested_hostname(text) {
                problem = problem.with_detail(keys::REQUESTED_HOSTNAME, host);
            }
            problem
        }
        Reason::Unrecognized => {
            base(ProblemType::Unknown).with_detail(keys::ERROR_TYPE, error_category(err))
        }
    }
}

fn suggestions(problem_type: ProblemType) -> &'static [&'static str] {
    match problem_type {
        ProblemType::Expired => &["Renew the certificate", "Use --insecure flag for testing"],
        ProblemType::NotYetValid => &["Check system clock synchronization"],
        ProblemType::SelfSigned => &[
            "Add certificate to trust store",
            "Use --insecure flag for development",
            "Import the CA certificate",
        ],
        ProblemType::UntrustedCa | ProblemType::UnknownAuthority => &[
            "Import the root CA certificate",
            "Add intermediate CA certificates",
            "Use --insecure flag for testing",
        ],
        ProblemType::HostnameMismatch => &[
            "Use the correct hostname from certificate",
            "Update certificate with correct Subject Alternative Names",
            "Add hostname to /etc/hosts for testing",
        ],
        ProblemType::Unknown => &[
            "Check certificate validity manually",
            "Enable debug logging for more details",
        ],
    }
}

/// Typed reason from a `rustls` certificate error anywhere in the chain.
fn structured_reason(err: &(dyn StdError + 'static)) -> Option<Reason> {
    use rustls::CertificateError;

    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(rustls::Error::InvalidCertificate(reason)) = e.downcast_ref::<rustls::Error>() {
            return match reason {
                CertificateError::Expired => Some(Reason::Expired),
                CertificateError::NotValidYet => Some(Reason::NotYetValid),
                CertificateError::UnknownIssuer => Some(Reason::UnknownAuthority),
                CertificateError::NotValidForName => Some(Reason::HostnameMismatch),
                _ => None,
            };
        }
        current = e.source();
    }
    None
}

fn reason_from_text(text: &str) -> Reason {
    let lower = text.to_lowercase();

    if lower.contains("expired") {
        Reason::Expired
    } else if lower.contains("not valid until") || lower.contains("not yet valid") {
        Reason::NotYetValid
    } else if lower.contains("unknown authority") {
        Reason::UnknownAuthority
    } else if lower.contains("hostname")
        && (lower.contains("doesn't match") || lower.contains("does not match"))
    {
        Reason::HostnameMismatch
    } else {
        Reason::Unrecognized
    }
}

/// Full error text including sources not already part of the message.
fn error_text(err: &(dyn StdError + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(s) = source {
        let msg = s.to_string();
        if !text.contains(&msg) {
            text.push_str(": ");
            text.push_str(&msg);
        }
        source = s.source();
    }
    text
}

/// Error category independent of the concrete library.
fn error_category(err: &(dyn StdError + 'static)) -> String {
    if err.downcast_ref::<rustls::Error>().is_some() {
        "tls".to_string()
    } else if let Some(io) = err.downcast_ref::<std::io::Error>() {
        format!("io:{:?}", io.kind())
    } else if err.downcast_ref::<TrustError>().is_some() {
        "trust".to_string()
    } else {
        "opaque".to_string()
    }
}

/// Host named after the word `hostname`. Stops at quotes, whitespace and commas.
fn requested_hostname(text: &str) -> Option<String> {
    static HOSTNAME: OnceLock<Option<Regex>> = OnceLock::new();
    let re = HOSTNAME
        .get_or_init(|| Regex::new(r#"hostname\s+['"]?([^'"\s,]+)['"]?"#).ok())
        .as_ref()?;
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::DetailValue;
    use crate::testutil;
    use crate::validator::{DiagnosticEntry, ValidityValidator};

    #[derive(Debug)]
    struct TextError(&'static str);

    impl std::fmt::Display for TextError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.0)
        }
    }

    impl StdError for TextError {}

    fn detector() -> ProblemDetector {
        ProblemDetector::new(Arc::new(ValidityValidator::new()))
    }

    fn detect(text: &'static str, cert: &Arc<CertificateInfo>) -> CertProblem {
        let err = TextError(text);
        detector()
            .detect_problem(Some(&err), Some(cert))
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_no_error_no_problem() {
        let cert = Arc::new(testutil::self_signed_info("r.local"));
        assert!(detector().detect_problem(None, Some(&cert)).unwrap().is_none());
        assert!(detector().detect_problem(None, None).unwrap().is_none());
    }

    #[test]
    fn test_error_without_certificate() {
        let err = TextError("certificate has expired");
        let result = detector().detect_problem(Some(&err), None);
        assert!(matches!(result, Err(TrustError::Detection(_))));
    }

    #[test]
    fn test_self_signed_unknown_authority() {
        let cert = Arc::new(testutil::self_signed_info("kind.local"));
        let p = detect("x509: certificate signed by unknown authority", &cert);
        assert_eq!(p.problem_type, ProblemType::SelfSigned);
        assert_eq!(
            p.detail(keys::ISSUER).and_then(DetailValue::as_text),
            Some(cert.issuer.as_str())
        );
        assert_eq!(p.suggestions.len(), 3);
        assert!(p.certificate.is_some());
    }

    #[test]
    fn test_untrusted_ca_unknown_authority() {
        let cert = Arc::new(testutil::ca_signed_info("gitea.local"));
        let p = detect("certificate signed by unknown authority", &cert);
        assert_eq!(p.problem_type, ProblemType::UntrustedCa);
        assert!(p
            .detail(keys::CA_ISSUER)
            .and_then(DetailValue::as_text)
            .unwrap()
            .contains("Test Root CA"));
    }

    #[test]
    fn test_expired_records_not_after() {
        let cert = Arc::new(testutil::self_signed_info("r.local"));
        let p = detect("x509: certificate has expired or is not yet valid", &cert);
        assert_eq!(p.problem_type, ProblemType::Expired);
        assert_eq!(
            p.detail(keys::EXPIRED_ON).and_then(DetailValue::as_time),
            Some(cert.not_after)
        );
    }

    #[test]
    fn test_not_yet_valid() {
        let cert = Arc::new(testutil::self_signed_info("r.local"));
        let p = detect("x509: certificate is not valid until 2099-01-01", &cert);
        assert_eq!(p.problem_type, ProblemType::NotYetValid);
        assert_eq!(
            p.detail(keys::VALID_FROM).and_then(DetailValue::as_time),
            Some(cert.not_before)
        );
    }

    #[test]
    fn test_case_insensitive() {
        let cert = Arc::new(testutil::self_signed_info("r.local"));
        let p = detect("CERTIFICATE SIGNED BY UNKNOWN AUTHORITY", &cert);
        assert_eq!(p.problem_type, ProblemType::SelfSigned);
    }

    #[test]
    fn test_hostname_mismatch_extracts_requested() {
        let cert = Arc::new(testutil::self_signed_info("registry.local"));
        let p = detect("hostname 'gitea.example' doesn't match certificate", &cert);
        assert_eq!(p.problem_type, ProblemType::HostnameMismatch);
        assert_eq!(
            p.detail(keys::REQUESTED_HOSTNAME).and_then(DetailValue::as_text),
            Some("gitea.example")
        );
        assert_eq!(
            p.detail(keys::VALID_HOSTNAMES).and_then(DetailValue::as_list),
            Some(&["registry.local".to_string()][..])
        );
        assert_eq!(
            p.detail(keys::COMMON_NAME).and_then(DetailValue::as_text),
            Some("registry.local")
        );
    }

    #[test]
    fn test_hostname_without_mismatch_wording_is_unknown() {
        let cert = Arc::new(testutil::self_signed_info("registry.local"));
        let p = detect("hostname lookup failed", &cert);
        assert_eq!(p.problem_type, ProblemType::Unknown);
    }

    #[test]
    fn test_unknown_records_category() {
        let cert = Arc::new(testutil::self_signed_info("r.local"));
        let p = detect("connection reset by peer", &cert);
        assert_eq!(p.problem_type, ProblemType::Unknown);
        assert_eq!(
            p.detail(keys::ERROR_TYPE).and_then(DetailValue::as_text),
            Some("opaque")
        );
        assert_eq!(p.suggestions.len(), 2);
    }

    #[test]
    fn test_unknown_io_category() {
        let cert = Arc::new(testutil::self_signed_info("r.local"));
        let err = std::io::Error::from(std::io::ErrorKind::ConnectionReset);
        let p = detector()
            .detect_problem(Some(&err), Some(&cert))
            .unwrap()
            .unwrap();
        assert_eq!(
            p.detail(keys::ERROR_TYPE).and_then(DetailValue::as_text),
            Some("io:ConnectionReset")
        );
    }

    #[test]
    fn test_rustls_structured_reasons() {
        let self_signed = Arc::new(testutil::self_signed_info("r.local"));
        let ca_signed = Arc::new(testutil::ca_signed_info("r.local"));
        let cases = [
            (rustls::CertificateError::Expired, &self_signed, ProblemType::Expired),
            (rustls::CertificateError::NotValidYet, &self_signed, ProblemType::NotYetValid),
            (rustls::CertificateError::UnknownIssuer, &self_signed, ProblemType::SelfSigned),
            (rustls::CertificateError::UnknownIssuer, &ca_signed, ProblemType::UntrustedCa),
            (
                rustls::CertificateError::NotValidForName,
                &self_signed,
                ProblemType::HostnameMismatch,
            ),
        ];

        for (reason, cert, expected) in cases {
            let err = rustls::Error::InvalidCertificate(reason);
            let p = detector()
                .detect_problem(Some(&err), Some(cert))
                .unwrap()
                .unwrap();
            assert_eq!(p.problem_type, expected);
        }
    }

    #[test]
    fn test_rustls_other_reason_is_tls_unknown() {
        let cert = Arc::new(testutil::self_signed_info("r.local"));
        let err = rustls::Error::InvalidCertificate(rustls::CertificateError::BadSignature);
        let p = detector()
            .detect_problem(Some(&err), Some(&cert))
            .unwrap()
            .unwrap();
        assert_eq!(p.problem_type, ProblemType::Unknown);
        assert_eq!(
            p.detail(keys::ERROR_TYPE).and_then(DetailValue::as_text),
            Some("tls")
        );
    }

    #[test]
    fn test_analyze_empty_chain() {
        let result = detector().analyze_cert_chain(&[]);
        assert!(matches!(result, Err(TrustError::Detection(_))));
    }

    #[test]
    fn test_analyze_chain_accumulates_problems() {
        let (expired, _) = testutil::expired("old.local");
        let chain = vec![
            Arc::new(CertificateInfo::from_der(expired.der()).unwrap()),
            Arc::new(testutil::self_signed_info("root.local")),
            Arc::new(testutil::ca_signed_info("leaf.local")),
        ];

        let problems = detector().analyze_cert_chain(&chain).unwrap();
        assert_eq!(problems.len(), 3);
        assert_eq!(problems[0].problem_type, ProblemType::Expired);
        assert_eq!(problems[1].problem_type, ProblemType::SelfSigned);
        assert_eq!(problems[2].problem_type, ProblemType::UntrustedCa);
        for (i, p) in problems.iter().enumerate() {
            assert_eq!(p.detail(keys::CHAIN_POSITION).and_then(DetailValue::as_count), Some(i));
            assert_eq!(p.detail(keys::TOTAL_CERTS).and_then(DetailValue::as_count), Some(3));
        }
    }

    #[test]
    fn test_analyze_chain_not_yet_valid() {
        let (future, _) = testutil::not_yet_valid("future.local");
        let cert = Arc::new(CertificateInfo::from_der(future.der()).unwrap());
        let problems = detector().analyze_cert_chain(&[cert.clone()]).unwrap();
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].problem_type, ProblemType::NotYetValid);
        assert_eq!(
            problems[0].detail(keys::VALID_FROM).and_then(DetailValue::as_time),
            Some(cert.not_before)
        );
    }

    #[test]
    fn test_analyze_chain_skips_valid() {
        let info = testutil::self_signed_info("root.local");
        let validator = ValidityValidator::new().trust_self_signed(true);
        let detector = ProblemDetector::new(Arc::new(validator));
        let problems = detector.analyze_cert_chain(&[Arc::new(info)]).unwrap();
        assert!(problems.is_empty());
    }

    #[test]
    fn test_diagnostics_none() {
        let result = detector().detect_from_diagnostics(None);
        assert!(matches!(result, Err(TrustError::Detection(_))));
    }

    #[test]
    fn test_diagnostics_mapping() {
        let info = testutil::self_signed_info("registry.local");
        let mut diag = CertDiagnostics::for_certificate(&info);
        diag.validation_errors = vec![
            DiagnosticEntry::new(DiagnosticKind::Chain, "chain", "self-signed certificate"),
            DiagnosticEntry::new(DiagnosticKind::Chain, "chain", "signed by unknown authority"),
            DiagnosticEntry::new(DiagnosticKind::Chain, "chain", "path length exceeded"),
            DiagnosticEntry::new(DiagnosticKind::Expiry, "expiry", "certificate has expired"),
            DiagnosticEntry::new(DiagnosticKind::Expiry, "expiry", "valid from tomorrow"),
            DiagnosticEntry::new(DiagnosticKind::Hostname, "hostname", "wrong name"),
            DiagnosticEntry::new(DiagnosticKind::Other("policy".into()), "policy", "weak key"),
        ];

        let problems = detector().detect_from_diagnostics(Some(&diag)).unwrap();
        let types: Vec<ProblemType> = problems.iter().map(|p| p.problem_type).collect();
        assert_eq!(
            types,
            vec![
                ProblemType::SelfSigned,
                ProblemType::UntrustedCa,
                ProblemType::UnknownAuthority,
                ProblemType::Expired,
                ProblemType::NotYetValid,
                ProblemType::HostnameMismatch,
                ProblemType::Unknown,
            ]
        );
        let first = &problems[0];
        assert!(first.certificate.is_none());
        assert_eq!(first.error, "chain: self-signed certificate");
        assert_eq!(
            first.detail(keys::SUBJECT).and_then(DetailValue::as_text),
            Some(info.subject.as_str())
        );
        assert_eq!(
            problems[5].detail(keys::VALID_HOSTNAMES).and_then(DetailValue::as_list),
            Some(&["registry.local".to_string()][..])
        );
    }

    #[test]
    fn test_requested_hostname_quoted() {
        assert_eq!(
            requested_hostname(r#"hostname "reg.local" does not match certificate"#).as_deref(),
            Some("reg.local")
        );
        assert_eq!(
            requested_hostname("hostname 'kind.local:5000' doesn't match").as_deref(),
            Some("kind.local:5000")
        );
    }

    #[test]
    fn test_requested_hostname_unquoted_stops_at_separator() {
        assert_eq!(
            requested_hostname("tls: hostname gitea.local, does not match").as_deref(),
            Some("gitea.local")
        );
        assert_eq!(
            requested_hostname("hostname  10.0.0.5 doesn't match certificate").as_deref(),
            Some("10.0.0.5")
        );
    }

    #[test]
    fn test_requested_hostname_absent() {
        assert_eq!(requested_hostname("certificate is valid for a.local, not b.local"), None);
        assert_eq!(requested_hostname("hostname"), None);
        assert_eq!(requested_hostname(r#"hostname """#), None);
    }

    #[test]
    fn test_error_text_includes_sources() {
        let inner = std::io::Error::new(std::io::ErrorKind::Other, "certificate has expired");
        let outer = TrustError::Io(inner);
        let text = error_text(&outer);
        assert!(text.contains("certificate has expired"));
    }
}
