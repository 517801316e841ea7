//! TLS credentials.
//!
//! # Data Flow
//! ```text
//! startup:   SecretStore → TlsSettings::load (client CA, verifier)
//! handshake: ClientHello → CredentialCache::get_certificate
//!                        → TlsSettings::server_config → rustls handshake
//! ```

pub mod credentials;
pub mod settings;

pub use credentials::{
    parse_certified_key, CredentialCache, CredentialError, CERTIFICATE_TTL, FETCH_TIMEOUT,
};
pub use settings::TlsSettings;

use std::sync::Arc;

use rustls::crypto::CryptoProvider;

/// The crypto provider used for all server TLS.
pub fn default_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}
