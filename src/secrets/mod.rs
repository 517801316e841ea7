//! Secret storage for TLS material.
//!
//! # Responsibilities
//! - Fetch certificate, private key and optional CA bundle by namespace + name
//! - Report missing secrets distinctly from backend failures
//!
//! # Design Decisions
//! - The store is a trait object supplied by the embedding code
//! - Errors are passed through the credential cache unchanged

mod fs;
mod memory;

use async_trait::async_trait;
use thiserror::Error;

pub use fs::DirSecretStore;
pub use memory::MemorySecretStore;

/// PEM material held by one TLS secret.
#[derive(Clone, PartialEq, Eq)]
pub struct TlsSecret {
    /// `tls.crt`: certificate chain, leaf first.
    pub certificate: Vec<u8>,
    /// `tls.key`: private key.
    pub private_key: Vec<u8>,
    /// `ca.crt`: CA bundle, when present.
    pub ca: Option<Vec<u8>>,
}

impl std::fmt::Debug for TlsSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsSecret")
            .field("certificate", &self.certificate.len())
            .field("private_key", &"<redacted>")
            .field("ca", &self.ca.as_ref().map(Vec::len))
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },

    #[error("secret {namespace}/{name} has no {key}")]
    MissingKey {
        namespace: String,
        name: String,
        key: &'static str,
    },

    #[error("reading secret: {0}")]
    Io(#[from] std::io::Error),

    #[error("secret backend: {0}")]
    Backend(String),
}

/// Key-value backend queried for certificate material.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<TlsSecret, SecretError>;
}
