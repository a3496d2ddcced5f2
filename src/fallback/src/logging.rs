//! Structured debug logging of certificates, validation errors and problems.
//!
//! None of these fail; empty input logs nothing.

use crate::certificate::CertificateInfo;
use crate::problem::CertProblem;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Log every certificate of a chain at `debug`.
pub fn log_certificate_chain(certs: &[CertificateInfo]) {
    if certs.is_empty() {
        return;
    }

    tracing::debug!(total = certs.len(), "Certificate chain analysis");
    for (i, cert) in certs.iter().enumerate() {
        let ips: Vec<String> = cert.ip_addresses.iter().map(ToString::to_string).collect();
        tracing::debug!(
            position = i + 1,
            total = certs.len(),
            subject = %cert.subject,
            issuer = %cert.issuer,
            serial = %cert.serial_number,
            not_before = %cert.not_before.format(TIME_FORMAT),
            not_after = %cert.not_after.format(TIME_FORMAT),
            dns_names = %cert.dns_names.join(", "),
            ip_addresses = %ips.join(", "),
            is_ca = cert.is_ca,
            key_usage = %cert.key_usage.join(", "),
            ext_key_usage = %cert.ext_key_usage.join(", "),
            self_signed = cert.is_self_signed(),
            fingerprint = %cert.fingerprint,
            "Certificate"
        );
    }
}

/// Log a validation error together with the certificate it concerns.
pub fn log_validation_error(err: &dyn std::error::Error, cert: Option<&CertificateInfo>) {
    match cert {
        Some(cert) => tracing::debug!(
            error = %err,
            subject = %cert.subject,
            issuer = %cert.issuer,
            serial = %cert.serial_number,
            not_before = %cert.not_before.format(TIME_FORMAT),
            not_after = %cert.not_after.format(TIME_FORMAT),
            valid_hostnames = %cert.dns_names.join(", "),
            common_name = cert.common_name.as_deref().unwrap_or(""),
            "Certificate validation error"
        ),
        None => tracing::debug!(error = %err, "Certificate validation error"),
    }
}

/// Log a classified problem with its details and suggestions.
pub fn log_certificate_problem(problem: &CertProblem) {
    tracing::info!(
        problem = %problem.problem_type,
        summary = problem.summary(),
        description = %problem.detailed_description(),
        error = %problem.error,
        "Certificate problem detected"
    );
    for (key, value) in &problem.details {
        tracing::debug!(key = %key, value = %value, "Problem detail");
    }
    for (i, suggestion) in problem.suggestions.iter().enumerate() {
        tracing::debug!(index = i + 1, suggestion = %suggestion, "Suggestion");
    }
}

/// Log the outcome of a registry connection attempt.
pub fn log_registry_connection(
    registry: &str,
    insecure: bool,
    success: bool,
    err: Option<&dyn std::error::Error>,
) {
    let status = if success { "SUCCESS" } else { "FAILED" };
    let mode = if insecure { "INSECURE" } else { "SECURE" };

    match err {
        Some(err) => tracing::warn!(registry, status, mode, error = %err, "Registry connection"),
        None if insecure => {
            tracing::warn!(registry, status, mode, "Registry connection with TLS verification disabled")
        }
        None => tracing::info!(registry, status, mode, "Registry connection"),
    }
}
