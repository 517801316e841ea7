//! Sources for environment-derived defaults.
//!
//! The server core never reads the process environment. Startup code passes
//! a [`ConfigSource`] to [`ServerConfig::resolve`](super::ServerConfig::resolve)
//! once, and tests pass a plain map.

use std::collections::HashMap;

/// Namespace the secrets live in.
pub const NAMESPACE_VAR: &str = "POD_NAMESPACE";

/// Name of the secret holding the server certificate.
pub const CERT_SECRET_VAR: &str = "GRPC_CERT_SECRET_NAME";

/// Namespace used when neither the config nor the source names one.
pub const DEFAULT_NAMESPACE: &str = "ndd-system";

/// Key/value lookup used to fill unset config fields.
pub trait ConfigSource {
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

impl ConfigSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl ConfigSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

impl ConfigSource for HashMap<&str, &str> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).map(|v| v.to_string())
    }
}
