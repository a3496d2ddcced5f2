//! Insecure-mode bookkeeping.
//!
//! [`InsecureAudit`] keeps a timestamped trail of every time verification
//! was bypassed. [`InsecureHandler`] tracks which registries the bypass
//! applies to. Both report through a [`WarningCallback`].

use std::collections::{BTreeSet, HashSet};

use chrono::{SecondsFormat, Utc};
use regtrust_core::error::{Result, TrustError};

use crate::strategies::WarningCallback;

const PRODUCTION_INDICATORS: &[&str] = &[
    "prod",
    "production",
    "live",
    ".com",
    ".net",
    "docker.io",
    "gcr.io",
    "quay.io",
];

const GLOBAL_KEY: &str = "";

fn banner(registry: &str) -> String {
    let rule = "===============================================";
    if registry.is_empty() {
        format!(
            "{rule}\n🚨 WARNING: TLS VERIFICATION DISABLED 🚨\n{rule}\n\
             ⚠️  DANGEROUS in production environments\n\
             ⚠️  Only suitable for development/testing\n\
             ⚠️  Vulnerable to man-in-the-middle attacks\n\
             ⚠️  All TLS security guarantees are void\n\n\
             Use --insecure only for local Kind clusters!\n{rule}"
        )
    } else {
        format!(
            "{rule}\n🚨 WARNING: TLS VERIFICATION DISABLED 🚨\n{rule}\n\
             Registry: {registry}\n\
             This connection is NOT SECURE!\n\
             ⚠️  All data transmitted can be intercepted\n\
             ⚠️  Registry identity cannot be verified\n{rule}"
        )
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Whether a registry URL looks like a production registry.
pub fn looks_like_production(registry: &str) -> bool {
    let lower = registry.to_lowercase();
    PRODUCTION_INDICATORS.iter().any(|p| lower.contains(p))
}

/// Audit trail of insecure-mode use.
pub struct InsecureAudit {
    enabled: bool,
    warned: HashSet<String>,
    entries: Vec<String>,
    warn: WarningCallback,
}

impl InsecureAudit {
    pub fn new(warn: WarningCallback) -> Self {
        Self {
            enabled: false,
            warned: HashSet::new(),
            entries: Vec::new(),
            warn,
        }
    }

    /// Apply the `--insecure` flag for `registry` (empty for all registries).
    pub fn apply(&mut self, enabled: bool, registry: &str) {
        if enabled {
            self.enabled = true;
            if self.warned.insert(registry.to_string()) {
                (self.warn)(&banner(registry));
            }
            self.entries.push(format!(
                "Insecure mode enabled at {} for registry: {}",
                timestamp(),
                registry
            ));
            tracing::warn!(registry, "SECURITY WARNING: Insecure mode enabled");
        } else if self.enabled {
            self.enabled = false;
            self.entries
                .push(format!("Insecure mode disabled at {}", timestamp()));
            tracing::info!("Insecure mode disabled");
        }
    }

    /// Record that an unverified connection was made.
    pub fn log_insecure_connection(&mut self, registry: &str) {
        self.entries.push(format!(
            "Insecure connection established to {} at {}",
            registry,
            timestamp()
        ));
        tracing::warn!(registry, "INSECURE CONNECTION");
    }

    /// Check that insecure use is sensible for `registry`.
    ///
    /// Production-looking registries only produce a critical warning.
    pub fn validate_usage(&self, registry: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if registry.is_empty() {
            return Err(TrustError::InvalidConfiguration(
                "cannot validate insecure usage: registry URL is empty".to_string(),
            ));
        }
        if looks_like_production(registry) {
            tracing::warn!(registry, "Insecure mode with production-like registry");
            (self.warn)(&format!(
                "🚨 CRITICAL WARNING: Using --insecure with production-like registry: {}",
                registry
            ));
        }
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}

/// Tracks which registries skip verification.
///
/// Enabling with no registries applies to every registry.
pub struct InsecureHandler {
    enabled: bool,
    registries: BTreeSet<String>,
    warned: HashSet<String>,
    warn: WarningCallback,
}

impl InsecureHandler {
    pub fn new(warn: WarningCallback) -> Self {
        Self {
            enabled: false,
            registries: BTreeSet::new(),
            warned: HashSet::new(),
            warn,
        }
    }

    pub fn enable<I, S>(&mut self, registries: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enabled = true;
        let mut any = false;
        for registry in registries {
            let registry = registry.into();
            self.warn_registry(&registry);
            self.registries.insert(registry);
            any = true;
        }
        if !any {
            self.warn_global();
        }
    }

    /// Turn the bypass off. Warnings already shown are not repeated.
    pub fn disable(&mut self) {
        self.enabled = false;
        self.registries.clear();
    }

    pub fn is_insecure(&self, registry: &str) -> bool {
        self.enabled && (self.registries.is_empty() || self.registries.contains(registry))
    }

    pub fn is_global(&self) -> bool {
        self.enabled && self.registries.is_empty()
    }

    /// Insecure registries, `["*"]` in global mode, empty when disabled.
    pub fn insecure_registries(&self) -> Vec<String> {
        if !self.enabled {
            Vec::new()
        } else if self.registries.is_empty() {
            vec!["*".to_string()]
        } else {
            self.registries.iter().cloned().collect()
        }
    }

    fn warn_global(&mut self) {
        if self.warned.insert(GLOBAL_KEY.to_string()) {
            let rule = "⚠".repeat(10);
            (self.warn)(&format!(
                "{rule}\nWARNING: Running in INSECURE mode\n\
                 Certificate validation is DISABLED for ALL registries\n\
                 This should ONLY be used in development environments\n{rule}"
            ));
        }
    }

    fn warn_registry(&mut self, registry: &str) {
        if self.warned.insert(registry.to_string()) {
            (self.warn)(&format!(
                "⚠️  WARNING: Certificate validation disabled for {}",
                registry
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::recorder;

    #[test]
    fn test_audit_enable_warns_once() {
        let (warn, messages) = recorder();
        let mut audit = InsecureAudit::new(warn);

        audit.apply(true, "kind.local");
        audit.apply(true, "kind.local");

        assert!(audit.is_enabled());
        assert_eq!(messages.lock().len(), 1);
        assert!(messages.lock()[0].contains("Registry: kind.local"));
        assert_eq!(audit.entries().len(), 2);
        assert!(audit.entries()[0].starts_with("Insecure mode enabled at "));
        assert!(audit.entries()[0].ends_with("for registry: kind.local"));
    }

    #[test]
    fn test_audit_global_banner() {
        let (warn, messages) = recorder();
        let mut audit = InsecureAudit::new(warn);
        audit.apply(true, "");
        assert!(messages.lock()[0].contains("Use --insecure only for local Kind clusters!"));
    }

    #[test]
    fn test_audit_disable_only_when_enabled() {
        let (warn, _) = recorder();
        let mut audit = InsecureAudit::new(warn);

        audit.apply(false, "r");
        assert!(audit.entries().is_empty());

        audit.apply(true, "r");
        audit.apply(false, "r");
        assert!(!audit.is_enabled());
        assert_eq!(audit.entries().len(), 2);
        assert!(audit.entries()[1].starts_with("Insecure mode disabled at "));
    }

    #[test]
    fn test_audit_connection_entry() {
        let (warn, _) = recorder();
        let mut audit = InsecureAudit::new(warn);
        audit.log_insecure_connection("r.local");
        assert!(audit.entries()[0].starts_with("Insecure connection established to r.local at "));
    }

    #[test]
    fn test_validate_usage() {
        let (warn, messages) = recorder();
        let mut audit = InsecureAudit::new(warn);

        assert!(audit.validate_usage("").is_ok());

        audit.apply(true, "kind.local");
        assert!(audit.validate_usage("").is_err());
        assert!(audit.validate_usage("kind.local:5000").is_ok());
        assert_eq!(messages.lock().len(), 1);

        assert!(audit.validate_usage("registry.prod.example").is_ok());
        assert_eq!(messages.lock().len(), 2);
        assert!(messages.lock()[1].contains("CRITICAL WARNING"));
    }

    #[test]
    fn test_production_indicators() {
        assert!(looks_like_production("docker.io/library/nginx"));
        assert!(looks_like_production("LIVE-registry.internal"));
        assert!(looks_like_production("acme.com"));
        assert!(!looks_like_production("kind-registry:5000"));
    }

    #[test]
    fn test_handler_global() {
        let (warn, messages) = recorder();
        let mut handler = InsecureHandler::new(warn);
        assert!(!handler.is_insecure("any"));
        assert!(handler.insecure_registries().is_empty());

        handler.enable(Vec::<String>::new());
        assert!(handler.is_global());
        assert!(handler.is_insecure("any"));
        assert_eq!(handler.insecure_registries(), vec!["*"]);

        handler.disable();
        handler.enable(Vec::<String>::new());
        assert_eq!(messages.lock().len(), 1);
    }

    #[test]
    fn test_handler_per_registry() {
        let (warn, messages) = recorder();
        let mut handler = InsecureHandler::new(warn);

        handler.enable(["b.local", "a.local"]);
        assert!(!handler.is_global());
        assert!(handler.is_insecure("a.local"));
        assert!(!handler.is_insecure("c.local"));
        assert_eq!(handler.insecure_registries(), vec!["a.local", "b.local"]);
        assert_eq!(messages.lock().len(), 2);

        handler.enable(["a.local"]);
        assert_eq!(messages.lock().len(), 2);

        handler.disable();
        assert!(!handler.is_insecure("a.local"));
    }
}
