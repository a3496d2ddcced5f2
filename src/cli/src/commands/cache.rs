//! `regtrust cache` command.

use std::path::{Path, PathBuf};

use clap::Args;
use regtrust_fallback::{CertCache, CertificateInfo};

use super::load_config;

#[derive(Args)]
pub struct CacheArgs {
    /// Registry host, optionally with port
    pub registry: String,

    /// PEM file to cache for the registry
    #[arg(long, required_unless_present = "remove", conflicts_with = "remove")]
    pub cert: Option<PathBuf>,

    /// Remove the cached certificate instead
    #[arg(long)]
    pub remove: bool,
}

pub async fn execute(
    args: CacheArgs,
    config_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let cache = CertCache::new(config.resolved_cache_dir());
    println!("{}", apply(&args, &cache)?);
    Ok(())
}

fn apply(args: &CacheArgs, cache: &CertCache) -> Result<String, Box<dyn std::error::Error>> {
    if args.remove {
        return Ok(if cache.remove(&args.registry)? {
            format!("Removed cached certificate for {}", args.registry)
        } else {
            format!("No cached certificate for {}", args.registry)
        });
    }

    let Some(cert) = &args.cert else {
        return Err("--cert is required".into());
    };
    let pem = std::fs::read(cert)?;
    let certs = CertificateInfo::parse_pem_bundle(&pem)?;
    let path = cache.store(&args.registry, &pem)?;

    let mut out = format!(
        "Cached {} certificate(s) for {} at {}",
        certs.len(),
        args.registry,
        path.display()
    );
    for cert in &certs {
        out.push_str(&format!(
            "\n  {} (expires {})",
            cert.display_name(),
            cert.not_after.to_rfc3339()
        ));
    }
    Ok(out)
}
