//! `regtrust chain` command.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use regtrust_fallback::logging::log_certificate_chain;
use regtrust_fallback::problem::keys;
use regtrust_fallback::{CertDiagnostics, CertificateInfo, ProblemDetector, ValidityValidator};

use crate::output::bullets;

#[derive(Args)]
pub struct ChainArgs {
    /// PEM bundle with the chain, leaf first
    #[arg(long)]
    pub cert: PathBuf,

    /// Hostname the chain must be valid for
    #[arg(long)]
    pub hostname: Option<String>,

    /// PEM bundle of trusted root certificates
    #[arg(long)]
    pub ca: Option<PathBuf>,

    /// Accept self-signed certificates as their own trust anchor
    #[arg(long)]
    pub trust_self_signed: bool,
}

pub async fn execute(args: ChainArgs) -> Result<(), Box<dyn std::error::Error>> {
    let certs = CertificateInfo::parse_pem_bundle(&std::fs::read(&args.cert)?)?;
    log_certificate_chain(&certs);

    let mut validator = ValidityValidator::new().trust_self_signed(args.trust_self_signed);
    if let Some(ca) = &args.ca {
        let roots = CertificateInfo::parse_pem_bundle(&std::fs::read(ca)?)?;
        validator = validator.with_trusted_roots(&roots);
    }
    let validator = Arc::new(validator);

    print!(
        "{}",
        render_chain(&certs, &validator, args.hostname.as_deref())?
    );
    Ok(())
}

fn render_chain(
    certs: &[CertificateInfo],
    validator: &Arc<ValidityValidator>,
    hostname: Option<&str>,
) -> Result<String, Box<dyn std::error::Error>> {
    let detector = ProblemDetector::new(validator.clone());
    let chain: Vec<Arc<CertificateInfo>> = certs.iter().cloned().map(Arc::new).collect();
    let problems = detector.analyze_cert_chain(&chain)?;

    let mut out = String::new();
    for (i, cert) in certs.iter().enumerate() {
        // Hostname checks only make sense for the leaf.
        let host = if i == 0 { hostname } else { None };
        let diag = validator.generate_diagnostics(cert, host);
        out.push_str(&format!("Certificate {}/{}\n", i + 1, certs.len()));
        out.push_str(&render_diagnostics(&diag, cert));
        out.push('\n');
    }

    if problems.is_empty() {
        out.push_str("Chain OK: no problems detected\n");
        return Ok(out);
    }

    out.push_str(&format!("Problems ({}):\n", problems.len()));
    for problem in &problems {
        let position = problem
            .detail(keys::CHAIN_POSITION)
            .and_then(|v| v.as_count())
            .map(|p| p + 1)
            .unwrap_or(0);
        out.push_str(&format!(
            "  [{}] {}: {}\n",
            position,
            problem.problem_type,
            problem.detailed_description()
        ));
        out.push_str(&bullets(&problem.suggestions, 6));
    }
    Ok(out)
}

fn render_diagnostics(diag: &CertDiagnostics, cert: &CertificateInfo) -> String {
    let mut out = format!("  Subject:     {}\n", diag.subject);
    out.push_str(&format!("  Issuer:      {}\n", diag.issuer));
    out.push_str(&format!("  Serial:      {}\n", diag.serial_number));
    out.push_str(&format!("  Valid from:  {}\n", diag.not_before.to_rfc3339()));
    out.push_str(&format!("  Valid until: {}\n", diag.not_after.to_rfc3339()));
    if !diag.dns_names.is_empty() {
        out.push_str(&format!("  DNS names:   {}\n", diag.dns_names.join(", ")));
    }
    if !diag.ip_addresses.is_empty() {
        let ips: Vec<String> = diag.ip_addresses.iter().map(ToString::to_string).collect();
        out.push_str(&format!("  IPs:         {}\n", ips.join(", ")));
    }
    out.push_str(&format!("  Fingerprint: {}\n", cert.fingerprint));

    if diag.is_valid() {
        out.push_str("  Status:      valid\n");
    } else {
        out.push_str("  Status:      invalid\n");
        for entry in &diag.validation_errors {
            out.push_str(&format!(
                "    [{}] {}: {}\n",
                entry.kind.as_str(),
                entry.message,
                entry.detail
            ));
        }
    }
    for warning in &diag.warnings {
        out.push_str(&format!("    warning: {}\n", warning));
    }
    out
}
