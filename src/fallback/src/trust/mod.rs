//! Trust store contracts and implementations.
//!
//! The fallback strategies only require [`TrustStoreManager`]. The system
//! certificate and certificate-import capabilities are optional and are
//! resolved when the [`TrustStore`] handle is built.

mod cache;
mod file_store;

use std::sync::Arc;

use regtrust_core::error::Result;

pub use cache::{sanitize_registry, CertCache};
pub use file_store::{normalize_registry, FileTrustStore, RegistryTrust};

/// Required capability: persist the per-registry insecure flag.
///
/// Implementations must tolerate concurrent reads and serialize writes.
pub trait TrustStoreManager: Send + Sync {
    fn set_insecure(&self, registry: &str, insecure: bool) -> Result<()>;
}

/// Optional capability: opt a registry into the OS trust roots.
pub trait SystemCertCapability: Send + Sync {
    fn set_use_system_certs(&self, registry: &str, use_system: bool) -> Result<()>;
}

/// Optional capability: trust an additional PEM certificate for a registry.
pub trait CertificateCapability: Send + Sync {
    fn add_certificate(&self, registry: &str, cert_data: &[u8]) -> Result<()>;
}

/// Trust store handle with its optional capabilities resolved.
#[derive(Clone)]
pub struct TrustStore {
    store: Arc<dyn TrustStoreManager>,
    system_certs: Option<Arc<dyn SystemCertCapability>>,
    certificates: Option<Arc<dyn CertificateCapability>>,
}

impl TrustStore {
    /// Handle exposing only the required capability.
    pub fn basic(store: Arc<dyn TrustStoreManager>) -> Self {
        Self {
            store,
            system_certs: None,
            certificates: None,
        }
    }

    /// Handle wiring every capability from one implementation.
    pub fn full<T>(store: Arc<T>) -> Self
    where
        T: TrustStoreManager + SystemCertCapability + CertificateCapability + 'static,
    {
        Self {
            store: store.clone(),
            system_certs: Some(store.clone()),
            certificates: Some(store),
        }
    }

    pub fn with_system_certs(mut self, capability: Arc<dyn SystemCertCapability>) -> Self {
        self.system_certs = Some(capability);
        self
    }

    pub fn with_certificates(mut self, capability: Arc<dyn CertificateCapability>) -> Self {
        self.certificates = Some(capability);
        self
    }

    pub fn set_insecure(&self, registry: &str, insecure: bool) -> Result<()> {
        self.store.set_insecure(registry, insecure)
    }

    pub fn system_certs(&self) -> Option<&Arc<dyn SystemCertCapability>> {
        self.system_certs.as_ref()
    }

    pub fn certificates(&self) -> Option<&Arc<dyn CertificateCapability>> {
        self.certificates.as_ref()
    }
}

impl std::fmt::Debug for TrustStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustStore")
            .field("system_certs", &self.system_certs.is_some())
            .field("certificates", &self.certificates.is_some())
            .finish()
    }
}
