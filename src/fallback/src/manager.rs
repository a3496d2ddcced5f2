//! Fallback orchestration.
//!
//! The manager owns the priority-ordered strategy list, the global insecure
//! switch and the retry policy. A validation failure is resolved either by
//! the insecure bypass or by the first strategy that succeeds.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use regtrust_core::config::FallbackConfig;
use regtrust_core::error::{Result, TrustError};
use tokio_util::sync::CancellationToken;

use crate::strategies::{
    log_warnings, CachedCertStrategy, FallbackStrategy, SelfSignedAcceptStrategy,
    SystemCertStrategy, WarningCallback,
};
use crate::trust::{CertCache, TrustStore};

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: i64 = 1000;

/// Builder for [`FallbackManager`].
pub struct FallbackManagerBuilder {
    trust_store: Option<TrustStore>,
    insecure: bool,
    max_retries: u32,
    retry_delay: chrono::Duration,
    cache_dir: Option<PathBuf>,
    warning_callback: Option<WarningCallback>,
    strategies: Option<Vec<Arc<dyn FallbackStrategy>>>,
}

impl Default for FallbackManagerBuilder {
    fn default() -> Self {
        Self {
            trust_store: None,
            insecure: false,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: chrono::Duration::milliseconds(DEFAULT_RETRY_DELAY_MS),
            cache_dir: None,
            warning_callback: None,
            strategies: None,
        }
    }
}

impl FallbackManagerBuilder {
    pub fn trust_store(mut self, trust_store: TrustStore) -> Self {
        self.trust_store = Some(trust_store);
        self
    }

    /// Apply insecure mode, retry policy and cache location from a config.
    pub fn config(mut self, config: &FallbackConfig) -> Self {
        self.insecure = config.insecure;
        self.max_retries = config.max_retries;
        self.retry_delay = chrono::Duration::milliseconds(config.retry_delay_ms);
        self.cache_dir = Some(config.resolved_cache_dir());
        self
    }

    pub fn insecure_mode(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Base delay before the second attempt. Negative values are kept so
    /// that [`FallbackManager::validate_configuration`] can reject them.
    pub fn retry_delay(mut self, delay: chrono::Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn warning_callback(mut self, callback: WarningCallback) -> Self {
        self.warning_callback = Some(callback);
        self
    }

    /// Use these strategies instead of the defaults.
    pub fn strategies(mut self, strategies: Vec<Arc<dyn FallbackStrategy>>) -> Self {
        self.strategies = Some(strategies);
        self
    }

    pub fn build(self) -> FallbackManager {
        let cache_dir = self
            .cache_dir
            .unwrap_or_else(|| FallbackConfig::default().resolved_cache_dir());

        let mut manager = FallbackManager {
            trust_store: self.trust_store,
            strategies: Vec::new(),
            insecure_mode: false,
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
            cache_dir,
            warn: self.warning_callback.unwrap_or_else(log_warnings),
        };
        match self.strategies {
            Some(strategies) => {
                for strategy in strategies {
                    manager.add_strategy(strategy);
                }
            }
            None => manager.reset_strategies(),
        }
        manager.set_insecure_mode(self.insecure);
        manager
    }
}

/// Orchestrates fallback strategies for certificate validation failures.
///
/// Strategy-list mutation takes `&mut self`; share the manager behind an
/// `Arc` only once it is configured. Concurrent `handle_validation_failure`
/// calls for different registries are fine.
pub struct FallbackManager {
    trust_store: Option<TrustStore>,
    /// Always sorted by ascending priority.
    strategies: Vec<Arc<dyn FallbackStrategy>>,
    insecure_mode: bool,
    max_retries: u32,
    retry_delay: chrono::Duration,
    cache_dir: PathBuf,
    warn: WarningCallback,
}

impl FallbackManager {
    pub fn builder() -> FallbackManagerBuilder {
        FallbackManagerBuilder::default()
    }

    /// Manager with default policy over `trust_store`.
    pub fn new(trust_store: TrustStore) -> Self {
        Self::builder().trust_store(trust_store).build()
    }

    /// Resolve a validation failure for `registry`.
    ///
    /// Returns [`TrustError::Cancelled`] if `cancel` fired before or during
    /// the attempt, and [`TrustError::StrategiesExhausted`] wrapping the last
    /// strategy error when nothing worked.
    pub async fn handle_validation_failure(
        &self,
        cancel: &CancellationToken,
        registry: &str,
        validation_err: &(dyn std::error::Error + Send + Sync),
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(TrustError::Cancelled);
        }

        tracing::debug!(
            registry,
            error = %validation_err,
            insecure = self.insecure_mode,
            "Handling certificate validation failure"
        );

        if self.insecure_mode {
            (self.warn)(&format!(
                "⚠️  INSECURE MODE: Bypassing certificate validation for {}",
                registry
            ));
            return self.require_trust_store()?.set_insecure(registry, true);
        }

        let mut last_err = None;
        for strategy in &self.strategies {
            if cancel.is_cancelled() {
                return Err(TrustError::Cancelled);
            }

            match self.execute_with_retry(cancel, strategy.as_ref(), registry).await {
                Ok(()) => {
                    (self.warn)(&format!(
                        "✅ Fallback strategy '{}' succeeded for {}",
                        strategy.name(),
                        registry
                    ));
                    tracing::info!(registry, strategy = strategy.name(), "Fallback strategy succeeded");
                    return Ok(());
                }
                Err(TrustError::Cancelled) => return Err(TrustError::Cancelled),
                Err(e) => {
                    tracing::debug!(registry, strategy = strategy.name(), error = %e, "Fallback strategy exhausted");
                    last_err = Some(e);
                }
            }
        }

        let source = last_err.unwrap_or_else(|| {
            TrustError::InvalidConfiguration(
                "at least one fallback strategy must be configured".to_string(),
            )
        });
        tracing::warn!(registry, error = %source, "All fallback strategies failed");
        Err(TrustError::StrategiesExhausted {
            registry: registry.to_string(),
            source: Box::new(source),
        })
    }

    /// Run one strategy up to `max_retries` times with exponential backoff.
    async fn execute_with_retry(
        &self,
        cancel: &CancellationToken,
        strategy: &dyn FallbackStrategy,
        registry: &str,
    ) -> Result<()> {
        let mut last_err = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let delay = self.backoff_delay(attempt);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(TrustError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            match strategy.execute(cancel, registry).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    if !strategy.should_retry(&e) {
                        return Err(e);
                    }
                    if attempt + 1 < self.max_retries {
                        (self.warn)(&format!(
                            "⚠️  Strategy '{}' attempt {} failed for {}: {}",
                            strategy.name(),
                            attempt + 1,
                            registry,
                            e
                        ));
                    }
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            TrustError::InvalidConfiguration("max retries must be at least 1".to_string())
        }))
    }

    /// `retry_delay * 2^(attempt - 1)`, saturating. Negative delays wait zero.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.retry_delay.to_std().unwrap_or(Duration::ZERO);
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        base.checked_mul(factor).unwrap_or(Duration::MAX)
    }

    /// Append a strategy, keeping the list ordered by priority.
    pub fn add_strategy(&mut self, strategy: Arc<dyn FallbackStrategy>) {
        self.strategies.push(strategy);
        self.strategies.sort_by_key(|s| s.priority());
    }

    /// Discard all strategies and install the defaults
    /// (system certs, cached cert, self-signed accept).
    ///
    /// Without a trust store no defaults can be built and the list stays empty.
    pub fn reset_strategies(&mut self) {
        self.strategies.clear();
        let Some(store) = self.trust_store.clone() else {
            return;
        };

        self.add_strategy(Arc::new(SystemCertStrategy::new(store.clone())));
        self.add_strategy(Arc::new(CachedCertStrategy::new(
            store.clone(),
            CertCache::new(self.cache_dir.clone()),
        )));
        self.add_strategy(Arc::new(SelfSignedAcceptStrategy::new(
            store,
            self.warn.clone(),
        )));
    }

    /// Strategies in execution order.
    pub fn strategies(&self) -> &[Arc<dyn FallbackStrategy>] {
        &self.strategies
    }

    pub fn validate_configuration(&self) -> Result<()> {
        if self.trust_store.is_none() {
            return Err(TrustError::InvalidConfiguration(
                "trust store manager is required".to_string(),
            ));
        }
        if self.strategies.is_empty() {
            return Err(TrustError::InvalidConfiguration(
                "at least one fallback strategy must be configured".to_string(),
            ));
        }
        if self.max_retries < 1 {
            return Err(TrustError::InvalidConfiguration(
                "max retries must be at least 1".to_string(),
            ));
        }
        if self.retry_delay < chrono::Duration::zero() {
            return Err(TrustError::InvalidConfiguration(
                "retry delay must be non-negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_insecure_mode(&self) -> bool {
        self.insecure_mode
    }

    /// Toggle the global bypass. Enabling warns once per transition.
    pub fn set_insecure_mode(&mut self, enabled: bool) {
        if enabled && !self.insecure_mode {
            (self.warn)("⚠️  GLOBAL INSECURE MODE ENABLED - Certificate validation disabled");
        }
        self.insecure_mode = enabled;
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_delay(&self) -> chrono::Duration {
        self.retry_delay
    }

    fn require_trust_store(&self) -> Result<&TrustStore> {
        self.trust_store.as_ref().ok_or_else(|| {
            TrustError::InvalidConfiguration("trust store manager is required".to_string())
        })
    }
}
