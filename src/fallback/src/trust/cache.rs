//! On-disk certificate cache.
//!
//! One PEM file per registry at `<dir>/<sanitized-registry>.pem`.

use std::path::{Path, PathBuf};

use regtrust_core::error::{Result, TrustError};

const PEM_BEGIN: &[u8] = b"-----BEGIN CERTIFICATE-----";
const PEM_END: &[u8] = b"-----END CERTIFICATE-----";

/// Cache of registry certificates fetched earlier.
#[derive(Debug, Clone)]
pub struct CertCache {
    dir: PathBuf,
}

impl CertCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache file location for a registry.
    pub fn path_for(&self, registry: &str) -> PathBuf {
        self.dir.join(format!("{}.pem", sanitize_registry(registry)))
    }

    /// Create the cache directory if missing.
    pub fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| TrustError::CacheIo {
            path: self.dir.clone(),
            source: e,
        })
    }

    /// Read the cached certificate for a registry.
    ///
    /// A missing file is a [`TrustError::CacheMiss`]; a file that does not
    /// start with a PEM certificate marker is rejected.
    pub fn load(&self, registry: &str) -> Result<Vec<u8>> {
        let path = self.path_for(registry);
        let data = std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => TrustError::CacheMiss {
                registry: registry.to_string(),
            },
            _ => TrustError::CacheIo {
                path: path.clone(),
                source: e,
            },
        })?;

        if !starts_with_pem_marker(&data) {
            return Err(TrustError::InvalidCertificate(
                "cached file does not contain valid certificate data".to_string(),
            ));
        }

        tracing::debug!(registry, path = %path.display(), "Loaded cached certificate");
        Ok(data)
    }

    /// Write a certificate for a registry. Returns the cache file path.
    pub fn store(&self, registry: &str, pem: &[u8]) -> Result<PathBuf> {
        validate_certificate_data(pem)?;
        self.ensure_dir()?;

        let path = self.path_for(registry);
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, pem).map_err(|e| TrustError::CacheIo {
            path: tmp_path.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp_path, &path).map_err(|e| TrustError::CacheIo {
            path: path.clone(),
            source: e,
        })?;

        tracing::info!(registry, path = %path.display(), "Cached registry certificate");
        Ok(path)
    }

    /// Delete the cached certificate. Returns true if one existed.
    pub fn remove(&self, registry: &str) -> Result<bool> {
        let path = self.path_for(registry);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(TrustError::CacheIo { path, source: e }),
        }
    }
}

/// Replace characters unsafe in file names with `_`.
pub fn sanitize_registry(registry: &str) -> String {
    registry
        .chars()
        .map(|c| match c {
            '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | ' ' => '_',
            other => other,
        })
        .collect()
}

fn starts_with_pem_marker(data: &[u8]) -> bool {
    data.trim_ascii_start().starts_with(PEM_BEGIN)
}

fn validate_certificate_data(data: &[u8]) -> Result<()> {
    if data.is_empty() {
        return Err(TrustError::InvalidCertificate(
            "certificate data is empty".to_string(),
        ));
    }
    let has_end = data.windows(PEM_END.len()).any(|w| w == PEM_END);
    if !starts_with_pem_marker(data) || !has_end {
        return Err(TrustError::InvalidCertificate(
            "data is not a PEM encoded certificate".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_registry() {
        assert_eq!(sanitize_registry("registry.local:5000"), "registry.local_5000");
        assert_eq!(
            sanitize_registry("a/b:c*d?e\"f<g>h|i j"),
            "a_b_c_d_e_f_g_h_i_j"
        );
        assert_eq!(sanitize_registry("plain.example"), "plain.example");
    }

    #[test]
    fn test_path_for() {
        let cache = CertCache::new("/tmp/certs");
        assert_eq!(
            cache.path_for("gitea.local:3000"),
            PathBuf::from("/tmp/certs/gitea.local_3000.pem")
        );
    }

    #[test]
    fn test_load_missing_is_cache_miss() {
        let tmp = TempDir::new().unwrap();
        let cache = CertCache::new(tmp.path());
        let err = cache.load("r.local").unwrap_err();
        assert!(matches!(err, TrustError::CacheMiss { .. }));
        assert!(err.to_string().contains("no cached certificate found"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_load_rejects_non_pem() {
        let tmp = TempDir::new().unwrap();
        let cache = CertCache::new(tmp.path());
        std::fs::write(cache.path_for("r.local"), "garbage").unwrap();
        let err = cache.load("r.local").unwrap_err();
        assert!(err
            .to_string()
            .contains("cached file does not contain valid certificate data"));
    }

    #[test]
    fn test_store_then_load() {
        let tmp = TempDir::new().unwrap();
        let cache = CertCache::new(tmp.path().join("nested"));
        let (cert, _) = testutil::self_signed("r.local", &["r.local"]);

        let path = cache.store("r.local:5000", cert.pem().as_bytes()).unwrap();
        assert!(path.ends_with("r.local_5000.pem"));
        assert_eq!(cache.load("r.local:5000").unwrap(), cert.pem().into_bytes());
    }

    #[test]
    fn test_store_validates() {
        let tmp = TempDir::new().unwrap();
        let cache = CertCache::new(tmp.path());
        assert!(cache.store("r", b"").is_err());
        assert!(cache.store("r", b"-----BEGIN CERTIFICATE-----\nabc").is_err());
        assert!(!cache.path_for("r").exists());
    }

    #[test]
    fn test_remove() {
        let tmp = TempDir::new().unwrap();
        let cache = CertCache::new(tmp.path());
        let (cert, _) = testutil::self_signed("r.local", &["r.local"]);
        cache.store("r.local", cert.pem().as_bytes()).unwrap();

        assert!(cache.remove("r.local").unwrap());
        assert!(!cache.remove("r.local").unwrap());
    }
}
