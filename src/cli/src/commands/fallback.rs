//! `regtrust fallback` command.

use std::path::Path;
use std::sync::Arc;

use clap::Args;
use regtrust_core::FallbackConfig;
use regtrust_fallback::logging::log_registry_connection;
use regtrust_fallback::tls::client_config;
use regtrust_fallback::{
    FallbackManager, FileTrustStore, InsecureAudit, RegistryTrust, TrustStore, WarningCallback,
};
use tokio_util::sync::CancellationToken;

use super::{load_config, ReportedError};

const DEFAULT_ERROR: &str = "x509: certificate signed by unknown authority";

#[derive(Args)]
pub struct FallbackArgs {
    /// Registry host, optionally with port (e.g. kind-registry:5000)
    pub registry: String,

    /// Skip certificate verification for this registry
    #[arg(long)]
    pub insecure: bool,

    /// Attempts per strategy
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Base retry delay in milliseconds, doubled on every attempt
    #[arg(long, allow_negative_numbers = true)]
    pub retry_delay_ms: Option<i64>,

    /// Validation error that triggered the fallback
    #[arg(long, default_value = DEFAULT_ERROR)]
    pub error: String,
}

pub async fn execute(
    args: FallbackArgs,
    config_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let store = Arc::new(FileTrustStore::new(config.resolved_trust_store_path()));
    tracing::debug!(path = %store.path().display(), "Using trust store");
    let warn: WarningCallback = Arc::new(|msg: &str| eprintln!("{msg}"));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let entry = run(&args, &config, store, warn, &cancel).await?;
    print!("{}", render_outcome(&args.registry, &entry));

    match client_config(&entry) {
        Ok(_) => log_registry_connection(&args.registry, entry.insecure, true, None),
        Err(e) => log_registry_connection(&args.registry, entry.insecure, false, Some(&e)),
    }
    Ok(())
}

/// Build the manager, run the strategies and return the resulting entry.
async fn run(
    args: &FallbackArgs,
    config: &FallbackConfig,
    store: Arc<FileTrustStore>,
    warn: WarningCallback,
    cancel: &CancellationToken,
) -> Result<RegistryTrust, Box<dyn std::error::Error>> {
    let insecure = args.insecure || config.insecure;
    if insecure {
        let mut audit = InsecureAudit::new(warn.clone());
        audit.apply(true, &args.registry);
        audit.validate_usage(&args.registry)?;
    }

    let mut builder = FallbackManager::builder()
        .trust_store(TrustStore::full(store.clone()))
        .config(config)
        .insecure_mode(insecure)
        .warning_callback(warn);
    if let Some(max_retries) = args.max_retries {
        builder = builder.max_retries(max_retries);
    }
    if let Some(delay_ms) = args.retry_delay_ms {
        builder = builder.retry_delay(chrono::Duration::milliseconds(delay_ms));
    }
    let manager = builder.build();
    manager.validate_configuration()?;

    let err = ReportedError(args.error.clone());
    manager
        .handle_validation_failure(cancel, &args.registry, &err)
        .await?;

    Ok(store.entry(&args.registry)?.unwrap_or_default())
}

fn render_outcome(registry: &str, entry: &RegistryTrust) -> String {
    let mode = if entry.insecure {
        "insecure (certificate verification disabled)"
    } else if !entry.certificates.is_empty() {
        "trusted certificates"
    } else if entry.use_system_certs {
        "system certificates"
    } else {
        "unchanged"
    };

    let mut out = format!("Registry:     {}\n", registry);
    out.push_str(&format!("Trust mode:   {}\n", mode));
    out.push_str(&format!("Certificates: {}\n", entry.certificates.len()));
    if let Some(updated) = entry.updated_at {
        out.push_str(&format!("Updated:      {}\n", updated.to_rfc3339()));
    }
    out
}
