//! Persistent per-registry trust store.
//!
//! Stores trust decisions at `~/.regtrust/trust/registries.json`.
//! Uses atomic writes (write tmp, rename) for safety.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use regtrust_core::config::regtrust_home;
use regtrust_core::error::{Result, TrustError};
use serde::{Deserialize, Serialize};

use super::{CertificateCapability, SystemCertCapability, TrustStoreManager};
use crate::certificate::CertificateInfo;

/// Trust decisions recorded for one registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryTrust {
    /// Skip certificate verification entirely.
    #[serde(default)]
    pub insecure: bool,
    /// Include the OS trust roots.
    #[serde(default)]
    pub use_system_certs: bool,
    /// Additional trusted certificates, PEM encoded.
    #[serde(default)]
    pub certificates: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Persistent trust file format.
#[derive(Debug, Default, Serialize, Deserialize)]
struct TrustFile {
    registries: BTreeMap<String, RegistryTrust>,
}

/// File-backed [`TrustStoreManager`] with every optional capability.
///
/// Reads take a shared lock; writes hold an exclusive lock across the
/// read-modify-write cycle.
pub struct FileTrustStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl FileTrustStore {
    /// Trust store at `~/.regtrust/trust/registries.json`.
    pub fn default_path() -> Self {
        Self::new(regtrust_home().join("trust").join("registries.json"))
    }

    /// Create a trust store at a custom path.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether verification is disabled for a registry.
    pub fn is_insecure(&self, registry: &str) -> Result<bool> {
        Ok(self.entry(registry)?.map(|e| e.insecure).unwrap_or(false))
    }

    /// PEM certificates trusted for a registry.
    pub fn trusted_certificates(&self, registry: &str) -> Result<Vec<String>> {
        Ok(self
            .entry(registry)?
            .map(|e| e.certificates)
            .unwrap_or_default())
    }

    /// The full entry for a registry, if any decision was recorded.
    pub fn entry(&self, registry: &str) -> Result<Option<RegistryTrust>> {
        let _guard = self.lock.read();
        let file = self.load()?;
        Ok(file.registries.get(&normalize_registry(registry)).cloned())
    }

    /// All registries with recorded decisions, sorted.
    pub fn list_registries(&self) -> Result<Vec<String>> {
        let _guard = self.lock.read();
        let file = self.load()?;
        Ok(file.registries.keys().cloned().collect())
    }

    /// Every entry, keyed by normalized registry.
    pub fn entries(&self) -> Result<BTreeMap<String, RegistryTrust>> {
        let _guard = self.lock.read();
        Ok(self.load()?.registries)
    }

    /// Remove a registry. Returns true if an entry existed.
    pub fn remove(&self, registry: &str) -> Result<bool> {
        let _guard = self.lock.write();
        let mut file = self.load()?;
        let removed = file
            .registries
            .remove(&normalize_registry(registry))
            .is_some();
        if removed {
            self.save(&file)?;
        }
        Ok(removed)
    }

    fn update<F>(&self, registry: &str, apply: F) -> Result<()>
    where
        F: FnOnce(&mut RegistryTrust),
    {
        let _guard = self.lock.write();
        let mut file = self.load()?;
        let entry = file
            .registries
            .entry(normalize_registry(registry))
            .or_default();
        apply(entry);
        entry.updated_at = Some(Utc::now());
        self.save(&file)
    }

    /// Load the trust file from disk. Returns empty if not found.
    fn load(&self) -> Result<TrustFile> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(TrustFile::default())
            }
            Err(e) => return Err(store_io(&self.path, e)),
        };
        serde_json::from_str(&data).map_err(|e| {
            TrustError::Serialization(format!(
                "failed to parse trust store {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    /// Save the trust file to disk atomically (write tmp, rename).
    fn save(&self, file: &TrustFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| store_io(parent, e))?;
        }

        let tmp_path = self.path.with_extension("tmp");
        let data = serde_json::to_string_pretty(file)?;
        std::fs::write(&tmp_path, &data).map_err(|e| store_io(&tmp_path, e))?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| store_io(&self.path, e))?;
        Ok(())
    }
}

fn store_io(path: &Path, source: std::io::Error) -> TrustError {
    TrustError::TrustStoreIo {
        path: path.to_path_buf(),
        source,
    }
}

impl TrustStoreManager for FileTrustStore {
    fn set_insecure(&self, registry: &str, insecure: bool) -> Result<()> {
        self.update(registry, |e| e.insecure = insecure)?;
        tracing::info!(registry, insecure, "Updated registry insecure flag");
        Ok(())
    }
}

impl SystemCertCapability for FileTrustStore {
    fn set_use_system_certs(&self, registry: &str, use_system: bool) -> Result<()> {
        self.update(registry, |e| e.use_system_certs = use_system)?;
        tracing::info!(registry, use_system, "Updated registry system certificate use");
        Ok(())
    }
}

impl CertificateCapability for FileTrustStore {
    fn add_certificate(&self, registry: &str, cert_data: &[u8]) -> Result<()> {
        let certs = CertificateInfo::parse_pem_bundle(cert_data).map_err(|e| {
            TrustError::TrustStore {
                registry: registry.to_string(),
                message: e.to_string(),
            }
        })?;
        if certs.is_empty() {
            return Err(TrustError::TrustStore {
                registry: registry.to_string(),
                message: "no PEM certificate found in data".to_string(),
            });
        }

        let pem = String::from_utf8_lossy(cert_data).trim().to_string();
        let mut added = false;
        self.update(registry, |e| {
            if !e.certificates.contains(&pem) {
                e.certificates.push(pem);
                added = true;
            }
        })?;

        tracing::info!(
            registry,
            subject = %certs[0].subject,
            added,
            "Registered trusted certificate"
        );
        Ok(())
    }
}

/// Normalize registry names (e.g., "https://docker.io/" → "index.docker.io").
pub fn normalize_registry(registry: &str) -> String {
    let r = registry.trim().to_lowercase();
    let r = r
        .strip_prefix("https://")
        .or_else(|| r.strip_prefix("http://"))
        .unwrap_or(&r)
        .trim_end_matches('/');
    if r == "docker.io" || r == "registry-1.docker.io" {
        "index.docker.io".to_string()
    } else {
        r.to_string()
    }
}
