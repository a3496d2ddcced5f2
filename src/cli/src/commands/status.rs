//! `regtrust status` command.

use std::collections::BTreeMap;
use std::path::Path;

use clap::Args;
use regtrust_fallback::{CertificateInfo, FileTrustStore, RegistryTrust};

use super::load_config;
use crate::output::{format_ago, new_table, short_fingerprint};

#[derive(Args)]
pub struct StatusArgs {
    /// Only display registry names
    #[arg(short, long)]
    pub quiet: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(
    args: StatusArgs,
    config_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let store = FileTrustStore::new(config.resolved_trust_store_path());
    let entries = store.entries()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if args.quiet {
        for registry in entries.keys() {
            println!("{registry}");
        }
        return Ok(());
    }

    if entries.is_empty() {
        println!("No trust decisions recorded in {}", store.path().display());
        return Ok(());
    }
    println!("{}", render_table(&entries));
    Ok(())
}

fn mode(entry: &RegistryTrust) -> &'static str {
    if entry.insecure {
        "insecure"
    } else if !entry.certificates.is_empty() {
        "pinned"
    } else if entry.use_system_certs {
        "system"
    } else {
        "default"
    }
}

fn render_table(entries: &BTreeMap<String, RegistryTrust>) -> String {
    let mut table = new_table(&["REGISTRY", "MODE", "SYSTEM CERTS", "CERTIFICATES", "UPDATED"]);

    for (registry, entry) in entries {
        let fingerprints: Vec<String> = entry
            .certificates
            .iter()
            .filter_map(|pem| CertificateInfo::from_pem(pem.as_bytes()).ok())
            .map(|cert| short_fingerprint(&cert.fingerprint).to_string())
            .collect();
        let certificates = if fingerprints.is_empty() {
            "-".to_string()
        } else {
            fingerprints.join(", ")
        };
        let updated = entry
            .updated_at
            .as_ref()
            .map(format_ago)
            .unwrap_or_else(|| "-".to_string());

        table.add_row([
            registry.as_str(),
            mode(entry),
            if entry.use_system_certs { "yes" } else { "no" },
            certificates.as_str(),
            updated.as_str(),
        ]);
    }

    table.to_string()
}
