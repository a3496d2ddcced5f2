//! Fallback strategies tried when certificate validation fails.
//!
//! Each strategy attempts one remediation against the trust store. Lower
//! priority runs first.

use std::sync::Arc;

use async_trait::async_trait;
use regtrust_core::error::{Result, TrustError};
use tokio_util::sync::CancellationToken;

use crate::trust::{CertCache, TrustStore};

pub const SYSTEM_CERT_STRATEGY: &str = "system-cert-fallback";
pub const CACHED_CERT_STRATEGY: &str = "cached-cert-fallback";
pub const SELF_SIGNED_STRATEGY: &str = "self-signed-accept";

/// Sink for user-facing security warnings.
pub type WarningCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Warning sink that forwards to `tracing`.
pub fn log_warnings() -> WarningCallback {
    Arc::new(|message: &str| tracing::warn!("{}", message))
}

/// Loads the OS trust roots and returns how many were found.
pub type RootLoader = Arc<dyn Fn() -> Result<usize> + Send + Sync>;

/// One remediation tactic.
///
/// `execute` returns `Ok` only on confirmed success. Errors are handed to
/// `should_retry` by the manager; strategies never interpret them.
#[async_trait]
pub trait FallbackStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Lower values run first.
    fn priority(&self) -> i32;

    async fn execute(&self, cancel: &CancellationToken, registry: &str) -> Result<()>;

    fn should_retry(&self, err: &TrustError) -> bool;
}

/// Trust the OS certificate pool for the registry.
pub struct SystemCertStrategy {
    trust_store: TrustStore,
    load_roots: RootLoader,
}

impl SystemCertStrategy {
    pub fn new(trust_store: TrustStore) -> Self {
        Self {
            trust_store,
            load_roots: Arc::new(|| crate::tls::load_system_roots().map(|roots| roots.len())),
        }
    }

    /// Replace the system root loader.
    pub fn with_root_loader(mut self, loader: RootLoader) -> Self {
        self.load_roots = loader;
        self
    }
}

#[async_trait]
impl FallbackStrategy for SystemCertStrategy {
    fn name(&self) -> &str {
        SYSTEM_CERT_STRATEGY
    }

    fn priority(&self) -> i32 {
        1
    }

    async fn execute(&self, _cancel: &CancellationToken, registry: &str) -> Result<()> {
        let roots = (self.load_roots)()?;
        if roots == 0 {
            return Err(TrustError::SystemRoots("no certificates found".to_string()));
        }

        match self.trust_store.system_certs() {
            Some(capability) => {
                capability.set_use_system_certs(registry, true)?;
                tracing::info!(registry, roots, "Enabled system certificates for registry");
            }
            None => {
                tracing::debug!(registry, roots, "Trust store cannot record system certificate use");
            }
        }
        Ok(())
    }

    fn should_retry(&self, _err: &TrustError) -> bool {
        false
    }
}

/// Trust a certificate cached earlier for the registry.
pub struct CachedCertStrategy {
    trust_store: TrustStore,
    cache: CertCache,
}

impl CachedCertStrategy {
    pub fn new(trust_store: TrustStore, cache: CertCache) -> Self {
        Self { trust_store, cache }
    }

    pub fn cache(&self) -> &CertCache {
        &self.cache
    }
}

#[async_trait]
impl FallbackStrategy for CachedCertStrategy {
    fn name(&self) -> &str {
        CACHED_CERT_STRATEGY
    }

    fn priority(&self) -> i32 {
        2
    }

    async fn execute(&self, _cancel: &CancellationToken, registry: &str) -> Result<()> {
        self.cache.ensure_dir()?;
        let data = self.cache.load(registry)?;

        match self.trust_store.certificates() {
            Some(capability) => {
                capability.add_certificate(registry, &data)?;
                tracing::info!(registry, "Trusted cached certificate for registry");
            }
            None => {
                tracing::debug!(registry, "Trust store cannot import cached certificate");
            }
        }
        Ok(())
    }

    /// Only temporary OS conditions are retried.
    fn should_retry(&self, err: &TrustError) -> bool {
        err.is_transient()
    }
}

/// Last resort: mark the registry insecure after an explicit warning.
pub struct SelfSignedAcceptStrategy {
    trust_store: TrustStore,
    warn: WarningCallback,
}

impl SelfSignedAcceptStrategy {
    pub fn new(trust_store: TrustStore, warn: WarningCallback) -> Self {
        Self { trust_store, warn }
    }
}

#[async_trait]
impl FallbackStrategy for SelfSignedAcceptStrategy {
    fn name(&self) -> &str {
        SELF_SIGNED_STRATEGY
    }

    fn priority(&self) -> i32 {
        10
    }

    async fn execute(&self, _cancel: &CancellationToken, registry: &str) -> Result<()> {
        (self.warn)(&format!(
            "⚠️  WARNING: Accepting self-signed certificate for {}",
            registry
        ));
        (self.warn)("   This reduces security. Use --insecure flag to suppress this warning.");

        self.trust_store.set_insecure(registry, true)
    }

    fn should_retry(&self, _err: &TrustError) -> bool {
        false
    }
}
