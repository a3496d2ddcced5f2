//! RegTrust Fallback - Certificate Trust Fallback and Diagnosis
//!
//! Classifies TLS/X.509 validation failures, works through an ordered set
//! of remediation strategies with retry and backoff, audits insecure
//! bypasses and turns problems into prioritized advice.

pub mod certificate;
pub mod detector;
pub mod insecure;
pub mod logging;
pub mod manager;
pub mod problem;
pub mod recommender;
pub mod strategies;
pub mod tls;
pub mod trust;
pub mod validator;

#[cfg(test)]
mod testutil;

// Re-export commonly used types
pub use certificate::CertificateInfo;
pub use detector::ProblemDetector;
pub use insecure::{InsecureAudit, InsecureHandler};
pub use manager::{FallbackManager, FallbackManagerBuilder};
pub use problem::{CertProblem, DetailValue, ProblemType};
pub use recommender::{extract_host, format_recommendations, Recommendation, Recommender};
pub use strategies::{
    CachedCertStrategy, FallbackStrategy, SelfSignedAcceptStrategy, SystemCertStrategy,
    WarningCallback,
};
pub use trust::{
    CertCache, CertificateCapability, FileTrustStore, RegistryTrust, SystemCertCapability,
    TrustStore, TrustStoreManager,
};
pub use validator::{CertDiagnostics, ChainValidator, DiagnosticEntry, DiagnosticKind, ValidityValidator};

/// RegTrust fallback version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
