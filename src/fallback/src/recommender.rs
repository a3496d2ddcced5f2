//! Remediation advice for classified certificate problems.

use regtrust_core::config::Environment;
use regtrust_core::error::{Result, TrustError};
use serde::Serialize;

use crate::problem::{keys, CertProblem, DetailValue, ProblemType};

const PLACEHOLDER_HOST: &str = "registry.example.com";
const NOT_FOR_PRODUCTION: &str = "NOT for production use";
const INFORMATIONAL: &str = "None - informational only";
const DIAGNOSTIC_ONLY: &str = "None - diagnostic command";

/// One remediation option. Priority 1 is the most suitable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    pub priority: u32,
    pub title: String,
    pub command: String,
    pub explanation: String,
    pub risks: Vec<String>,
}

impl Recommendation {
    fn new(priority: u32, title: &str, command: String, explanation: &str) -> Self {
        Self {
            priority,
            title: title.to_string(),
            command,
            explanation: explanation.to_string(),
            risks: Vec::new(),
        }
    }

    fn with_risks(mut self, risks: &[&str]) -> Self {
        self.risks.extend(risks.iter().map(|r| r.to_string()));
        self
    }

    fn uses_insecure_bypass(&self) -> bool {
        self.command.contains("--insecure")
    }
}

/// Produces prioritized advice for one registry.
#[derive(Debug, Clone)]
pub struct Recommender {
    registry_url: String,
    insecure_allowed: bool,
    environment: Environment,
}

impl Recommender {
    /// Recommender assuming a development environment.
    pub fn new(registry_url: impl Into<String>, insecure_allowed: bool) -> Self {
        Self {
            registry_url: registry_url.into(),
            insecure_allowed,
            environment: Environment::Development,
        }
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Ordered recommendations for a problem; index 0 is the quick fix.
    pub fn recommend(&self, problem: Option<&CertProblem>) -> Result<Vec<Recommendation>> {
        let problem = problem.ok_or_else(|| {
            TrustError::Recommendation("a problem is required".to_string())
        })?;
        let host = extract_host(&self.registry_url);

        let mut recs = match problem.problem_type {
            ProblemType::SelfSigned => self.self_signed(&host),
            ProblemType::Expired => self.expired(&host),
            ProblemType::NotYetValid => self.not_yet_valid(&host),
            ProblemType::HostnameMismatch => self.hostname_mismatch(&host, problem),
            ProblemType::UntrustedCa | ProblemType::UnknownAuthority => self.untrusted_ca(&host),
            ProblemType::Unknown => self.unknown(&host),
        };

        if self.environment != Environment::Development {
            for rec in recs.iter_mut().filter(|r| r.uses_insecure_bypass()) {
                if !rec.risks.iter().any(|r| r == NOT_FOR_PRODUCTION) {
                    rec.risks.push(NOT_FOR_PRODUCTION.to_string());
                }
            }
        }

        tracing::debug!(
            registry = %host,
            problem = %problem.problem_type,
            count = recs.len(),
            "Generated recommendations"
        );
        Ok(recs)
    }

    /// The highest-priority recommendation (first on ties).
    pub fn quick_fix(&self, problem: Option<&CertProblem>) -> Result<Recommendation> {
        let problem_type = problem.map(|p| p.problem_type);
        let recs = self.recommend(problem)?;

        let mut best: Option<Recommendation> = None;
        for rec in recs {
            if best.as_ref().map_or(true, |b| rec.priority < b.priority) {
                best = Some(rec);
            }
        }
        best.ok_or_else(|| {
            TrustError::Recommendation(format!(
                "no recommendations available for problem type: {}",
                problem_type.map(|t| t.as_str()).unwrap_or("unknown")
            ))
        })
    }

    fn insecure_permitted(&self) -> bool {
        self.insecure_allowed && self.environment != Environment::Production
    }

    fn self_signed(&self, host: &str) -> Vec<Recommendation> {
        let mut recs = Vec::new();

        if self.insecure_allowed
            && matches!(self.environment, Environment::Development | Environment::Testing)
        {
            recs.push(
                Recommendation::new(
                    1,
                    "Use --insecure flag for development",
                    format!("regtrust fallback {} --insecure", host),
                    "Skip certificate verification for this registry. Acceptable for local Kind clusters and throwaway environments.",
                )
                .with_risks(&[
                    "Not suitable for production",
                    "Vulnerable to man-in-the-middle attacks",
                ]),
            );
        }

        recs.push(
            Recommendation::new(
                2,
                "Add certificate to system trust store",
                format!(
                    "openssl s_client -connect {h}:443 -servername {h} < /dev/null 2>/dev/null | openssl x509 > registry.crt\n\
                     sudo cp registry.crt /usr/local/share/ca-certificates/{h}.crt\n\
                     sudo update-ca-certificates",
                    h = host
                ),
                "Fetch the registry's certificate and trust it system-wide so every client accepts it.",
            )
            .with_risks(&[
                "Requires system administrator privileges",
                "Must be done on each client system",
            ]),
        );

        recs.push(
            Recommendation::new(
                3,
                "Configure registry with proper TLS certificate",
                format!(
                    "# Issue a certificate for {} from a trusted CA (for example with cert-manager or Let's Encrypt)",
                    host
                ),
                "Replace the self-signed certificate with one issued by a trusted Certificate Authority.",
            )
            .with_risks(&[
                "Requires access to registry configuration",
                "May require DNS setup for public CA",
            ]),
        );

        recs
    }

    fn expired(&self, host: &str) -> Vec<Recommendation> {
        let mut recs = vec![Recommendation::new(
            1,
            "Renew the expired certificate",
            format!(
                "openssl s_client -connect {h}:443 -servername {h} < /dev/null 2>/dev/null | openssl x509 -noout -enddate",
                h = host
            ),
            "The registry certificate is past its expiry date. Ask the registry operator to renew it.",
        )
        .with_risks(&["Service may be unavailable until renewal"])];

        if self.insecure_permitted() {
            recs.push(
                Recommendation::new(
                    2,
                    "Temporary workaround with --insecure flag",
                    format!("regtrust fallback {} --insecure", host),
                    "Bypass verification until the certificate is renewed.",
                )
                .with_risks(&[
                    "NEVER use in production",
                    "Temporary solution only",
                    "Security vulnerability",
                ]),
            );
        }

        recs
    }

    fn not_yet_valid(&self, host: &str) -> Vec<Recommendation> {
        vec![
            Recommendation::new(
                1,
                "Check system clock synchronization",
                "date\nsudo ntpdate -s time.nist.gov || sudo sntp -sS time.apple.com".to_string(),
                "A certificate that is not yet valid usually means the local clock is behind.",
            )
            .with_risks(&["May require system administrator privileges"]),
            Recommendation::new(
                2,
                "Verify certificate validity period",
                format!(
                    "openssl s_client -connect {h}:443 -servername {h} < /dev/null 2>/dev/null | openssl x509 -noout -dates",
                    h = host
                ),
                "Compare the certificate's validity window with the current time.",
            )
            .with_risks(&[INFORMATIONAL]),
        ]
    }

    fn hostname_mismatch(&self, host: &str, problem: &CertProblem) -> Vec<Recommendation> {
        let valid_hosts: &[String] = problem
            .detail(keys::VALID_HOSTNAMES)
            .and_then(DetailValue::as_list)
            .unwrap_or(&[]);
        let mut recs = Vec::new();

        if let Some(first) = valid_hosts.first() {
            recs.push(
                Recommendation::new(
                    1,
                    "Use correct hostname from certificate",
                    format!(
                        "# Certificate is valid for: {}\nregtrust fallback {}",
                        valid_hosts.join(", "),
                        first
                    ),
                    "Connect using a hostname the certificate was issued for.",
                )
                .with_risks(&["May require DNS configuration or /etc/hosts changes"]),
            );

            if self.environment == Environment::Development {
                recs.push(
                    Recommendation::new(
                        2,
                        "Add hostname mapping for development",
                        format!("echo '127.0.0.1 {}' | sudo tee -a /etc/hosts", first),
                        "Map the certificate's hostname to the local registry address.",
                    )
                    .with_risks(&[
                        "Requires root/administrator privileges",
                        "Development only - not for production",
                    ]),
                );
            }
        }

        recs.push(
            Recommendation::new(
                3,
                "Update certificate with correct Subject Alternative Names",
                format!("# Reissue the certificate with a DNS SAN for {}", host),
                "Include every hostname clients use in the certificate's Subject Alternative Names.",
            )
            .with_risks(&[
                "Requires certificate authority interaction",
                "May involve cost for new certificate",
            ]),
        );

        recs
    }

    fn untrusted_ca(&self, host: &str) -> Vec<Recommendation> {
        let mut recs = vec![
            Recommendation::new(
                1,
                "Import root Certificate Authority certificate",
                "sudo cp root-ca.crt /usr/local/share/ca-certificates/\nsudo update-ca-certificates"
                    .to_string(),
                "Obtain the root CA certificate from your administrator and add it to the system trust store.",
            )
            .with_risks(&[
                "Requires system administrator privileges",
                "Ensure CA certificate is from trusted source",
            ]),
            Recommendation::new(
                2,
                "Verify complete certificate chain",
                format!(
                    "openssl s_client -connect {h}:443 -servername {h} -showcerts < /dev/null",
                    h = host
                ),
                "The registry may not be sending its intermediate certificates.",
            )
            .with_risks(&[DIAGNOSTIC_ONLY]),
        ];

        if self.insecure_permitted() {
            recs.push(
                Recommendation::new(
                    3,
                    "Development workaround with --insecure flag",
                    format!("regtrust fallback {} --insecure", host),
                    "Bypass verification while the CA is being set up.",
                )
                .with_risks(&[NOT_FOR_PRODUCTION, "Security vulnerability"]),
            );
        }

        recs
    }

    fn unknown(&self, host: &str) -> Vec<Recommendation> {
        vec![
            Recommendation::new(
                1,
                "Manual certificate inspection",
                format!(
                    "openssl s_client -connect {h}:443 -servername {h} < /dev/null 2>/dev/null | openssl x509 -text -noout",
                    h = host
                ),
                "Inspect the certificate by hand to find out why validation failed.",
            )
            .with_risks(&[DIAGNOSTIC_ONLY]),
            Recommendation::new(
                2,
                "Enable debug logging",
                format!("RUST_LOG=debug regtrust fallback {}", host),
                "Debug logs include the full validation error and certificate chain.",
            )
            .with_risks(&[INFORMATIONAL]),
        ]
    }
}

/// Render recommendations as a numbered, human-readable block.
pub fn format_recommendations(recs: &[Recommendation]) -> String {
    if recs.is_empty() {
        return "No recommendations available.".to_string();
    }

    let mut out = String::from("Certificate Problem Solutions\n");
    out.push_str("============================\n\n");

    for (i, rec) in recs.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, rec.title));
        out.push_str(&format!("   {}\n", rec.explanation));

        if !rec.command.is_empty() {
            out.push_str("\n   Command:\n");
            for line in rec.command.lines().filter(|l| !l.trim().is_empty()) {
                out.push_str(&format!("   $ {}\n", line.trim()));
            }
        }

        if !rec.risks.is_empty() {
            out.push_str("\n   Security Considerations:\n");
            for risk in &rec.risks {
                out.push_str(&format!("   ⚠ {}\n", risk));
            }
        }

        if i + 1 < recs.len() {
            out.push_str("\n---\n\n");
        }
    }

    out
}

/// Bare hostname from a registry URL, without scheme, path or port.
pub fn extract_host(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() {
        return PLACEHOLDER_HOST.to_string();
    }

    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let authority = rest.split('/').next().unwrap_or(rest);

    // Bracketed IPv6 literal
    if let Some(inner) = authority.strip_prefix('[') {
        if let Some((host, _)) = inner.split_once(']') {
            return host.to_string();
        }
    }

    let host = match authority.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => authority,
    };
    if host.is_empty() {
        PLACEHOLDER_HOST.to_string()
    } else {
        host.to_string()
    }
}
