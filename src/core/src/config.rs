use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, TrustError};

/// Deployment environment the user is pushing from.
///
/// Drives how aggressively insecure workarounds are recommended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Testing,
    Staging,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Testing => write!(f, "testing"),
            Self::Staging => write!(f, "staging"),
            Self::Production => write!(f, "production"),
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "testing" | "test" => Ok(Self::Testing),
            "staging" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!(
                "unknown environment: '{}' (supported: development, testing, staging, production)",
                other
            )),
        }
    }
}

/// Certificate fallback configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Bypass certificate verification for every registry
    pub insecure: bool,

    /// Attempts per strategy (must be at least 1)
    pub max_retries: u32,

    /// Base backoff delay in milliseconds (must be non-negative)
    pub retry_delay_ms: i64,

    /// Directory holding `<registry>.pem` cached certificates
    pub cache_dir: Option<PathBuf>,

    /// Location of the persistent trust store file
    pub trust_store_path: Option<PathBuf>,

    /// Environment assumed when recommending fixes
    pub environment: Environment,

    /// Whether recommending `--insecure` is permitted at all
    pub allow_insecure: bool,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            insecure: false,
            max_retries: 3,
            retry_delay_ms: 1000,
            cache_dir: None,
            trust_store_path: None,
            environment: Environment::Development,
            allow_insecure: true,
        }
    }
}

impl FallbackConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            TrustError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: FallbackConfig = serde_yaml::from_str(&data)?;
        tracing::debug!(path = %path.display(), "Loaded fallback configuration");
        Ok(config)
    }

    /// Load from `path` if given and present, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) if p.exists() => Self::load(p),
            _ => Ok(Self::default()),
        }
    }

    /// Overlay `REGTRUST_*` environment variables onto this configuration.
    pub fn apply_env(mut self) -> Result<Self> {
        if let Ok(v) = std::env::var("REGTRUST_INSECURE") {
            self.insecure = parse_bool(&v)
                .ok_or_else(|| TrustError::Config(format!("REGTRUST_INSECURE: invalid bool '{}'", v)))?;
        }
        if let Ok(v) = std::env::var("REGTRUST_MAX_RETRIES") {
            self.max_retries = v
                .trim()
                .parse()
                .map_err(|e| TrustError::Config(format!("REGTRUST_MAX_RETRIES: {}", e)))?;
        }
        if let Ok(v) = std::env::var("REGTRUST_RETRY_DELAY_MS") {
            self.retry_delay_ms = v
                .trim()
                .parse()
                .map_err(|e| TrustError::Config(format!("REGTRUST_RETRY_DELAY_MS: {}", e)))?;
        }
        if let Ok(v) = std::env::var("REGTRUST_ENVIRONMENT") {
            self.environment = v.parse().map_err(TrustError::Config)?;
        }
        if let Ok(v) = std::env::var("REGTRUST_CACHE_DIR") {
            self.cache_dir = Some(PathBuf::from(v));
        }
        Ok(self)
    }

    /// Cache directory, defaulting to `~/.regtrust/cert-cache`.
    pub fn resolved_cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| regtrust_home().join("cert-cache"))
    }

    /// Trust store file, defaulting to `~/.regtrust/trust/registries.json`.
    pub fn resolved_trust_store_path(&self) -> PathBuf {
        self.trust_store_path
            .clone()
            .unwrap_or_else(|| regtrust_home().join("trust").join("registries.json"))
    }
}

/// Return the RegTrust home directory (`~/.regtrust`).
pub fn regtrust_home() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".regtrust"))
        .unwrap_or_else(|| PathBuf::from(".regtrust"))
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
