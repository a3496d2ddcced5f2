use std::path::PathBuf;

use thiserror::Error;

/// RegTrust error types
#[derive(Error, Debug)]
pub enum TrustError {
    /// The caller's cancellation token fired
    #[error("operation cancelled")]
    Cancelled,

    /// Every fallback strategy failed for a registry
    #[error("all fallback strategies failed for {registry}: {source}")]
    StrategiesExhausted {
        registry: String,
        #[source]
        source: Box<TrustError>,
    },

    /// Fallback manager is misconfigured
    #[error("{0}")]
    InvalidConfiguration(String),

    /// Problem detection could not run on the given input
    #[error("detection error: {0}")]
    Detection(String),

    /// No recommendation could be produced
    #[error("recommendation error: {0}")]
    Recommendation(String),

    /// No cached certificate exists for a registry
    #[error("no cached certificate found for {registry}")]
    CacheMiss { registry: String },

    /// Certificate cache I/O failed
    #[error("certificate cache error at {}: {source}", path.display())]
    CacheIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Trust store file I/O failed
    #[error("trust store error at {}: {source}", path.display())]
    TrustStoreIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Certificate bytes are not usable PEM certificate data
    #[error("invalid certificate data: {0}")]
    InvalidCertificate(String),

    /// Certificate could not be parsed
    #[error("certificate parse error: {0}")]
    CertificateParse(String),

    /// Operating system trust roots are unavailable
    #[error("system certificate pool unavailable: {0}")]
    SystemRoots(String),

    /// Trust store rejected an update
    #[error("trust store error: {registry} - {message}")]
    TrustStore { registry: String, message: String },

    /// A strategy failed for a reason of its own
    #[error("strategy {strategy} failed: {message}")]
    Strategy { strategy: String, message: String },

    /// TLS configuration error
    #[error("TLS error: {0}")]
    Tls(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl TrustError {
    /// Whether the error is a temporary OS condition worth retrying.
    ///
    /// Only I/O-backed errors qualify: would-block (EAGAIN), busy (EBUSY),
    /// timed out and interrupted. Not-found and permission errors never do.
    pub fn is_transient(&self) -> bool {
        match self {
            TrustError::Io(e)
            | TrustError::CacheIo { source: e, .. }
            | TrustError::TrustStoreIo { source: e, .. } => is_transient_io(e),
            _ => false,
        }
    }
}

fn is_transient_io(err: &std::io::Error) -> bool {
    use std::io::ErrorKind;

    if matches!(
        err.kind(),
        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
    ) {
        return true;
    }
    matches!(err.raw_os_error(), Some(code) if code == libc::EAGAIN || code == libc::EBUSY)
}

impl From<serde_json::Error> for TrustError {
    fn from(err: serde_json::Error) -> Self {
        TrustError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for TrustError {
    fn from(err: serde_yaml::Error) -> Self {
        TrustError::Serialization(err.to_string())
    }
}

/// Result type alias for RegTrust operations
pub type Result<T> = std::result::Result<T, TrustError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;

    #[test]
    fn test_cancelled_display() {
        assert_eq!(TrustError::Cancelled.to_string(), "operation cancelled");
    }

    #[test]
    fn test_strategies_exhausted_wraps_registry_and_source() {
        let error = TrustError::StrategiesExhausted {
            registry: "registry.local:5000".to_string(),
            source: Box::new(TrustError::CacheMiss {
                registry: "registry.local:5000".to_string(),
            }),
        };
        let msg = error.to_string();
        assert!(msg.contains("registry.local:5000"));
        assert!(msg.contains("no cached certificate found"));
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_invalid_configuration_is_bare_message() {
        let error = TrustError::InvalidConfiguration("max retries must be at least 1".to_string());
        assert_eq!(error.to_string(), "max retries must be at least 1");
    }

    #[test]
    fn test_cache_miss_display() {
        let error = TrustError::CacheMiss {
            registry: "gitea.cnoe.localtest.me".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "no cached certificate found for gitea.cnoe.localtest.me"
        );
    }

    #[test]
    fn test_trust_store_error_display() {
        let error = TrustError::TrustStore {
            registry: "ghcr.io".to_string(),
            message: "read-only".to_string(),
        };
        assert_eq!(error.to_string(), "trust store error: ghcr.io - read-only");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(ErrorKind::NotFound, "file not found");
        let error: TrustError = io_error.into();
        assert!(matches!(error, TrustError::Io(_)));
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_transient_would_block() {
        let error = TrustError::Io(std::io::Error::from(ErrorKind::WouldBlock));
        assert!(error.is_transient());
    }

    #[test]
    fn test_transient_busy_raw_os_error() {
        let error = TrustError::CacheIo {
            path: PathBuf::from("/tmp/cache/x.pem"),
            source: std::io::Error::from_raw_os_error(libc::EBUSY),
        };
        assert!(error.is_transient());
    }

    #[test]
    fn test_trust_store_io_keeps_source_and_transience() {
        let error = TrustError::TrustStoreIo {
            path: PathBuf::from("/tmp/trust/registries.json"),
            source: std::io::Error::from_raw_os_error(libc::EBUSY),
        };
        assert!(error.is_transient());
        assert!(error.to_string().contains("/tmp/trust/registries.json"));
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_not_found_is_not_transient() {
        let error = TrustError::CacheIo {
            path: PathBuf::from("/tmp/cache/x.pem"),
            source: std::io::Error::from(ErrorKind::NotFound),
        };
        assert!(!error.is_transient());
    }

    #[test]
    fn test_permission_denied_is_not_transient() {
        let error = TrustError::Io(std::io::Error::from(ErrorKind::PermissionDenied));
        assert!(!error.is_transient());
    }

    #[test]
    fn test_non_io_is_not_transient() {
        assert!(!TrustError::Cancelled.is_transient());
        assert!(!TrustError::CacheMiss {
            registry: "r".to_string()
        }
        .is_transient());
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let error: TrustError = result.unwrap_err().into();
        assert!(matches!(error, TrustError::Serialization(_)));
    }

    #[test]
    fn test_serde_yaml_error_conversion() {
        let result: std::result::Result<serde_yaml::Value, _> =
            serde_yaml::from_str("invalid: yaml: content:");
        let error: TrustError = result.unwrap_err().into();
        assert!(matches!(error, TrustError::Serialization(_)));
    }

    #[test]
    fn test_error_is_debug() {
        let debug_str = format!("{:?}", TrustError::Other("x".to_string()));
        assert!(debug_str.contains("Other"));
    }
}
