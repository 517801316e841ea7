//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files. Every
//! field has a default, so an empty file is a valid config.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::source::{ConfigSource, CERT_SECRET_VAR, DEFAULT_NAMESPACE, NAMESPACE_VAR};

/// Default listen address.
pub const DEFAULT_ADDRESS: &str = "0.0.0.0:9999";

/// Default global in-flight request limit.
pub const DEFAULT_MAX_RPC: usize = 600;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub secrets: SecretStoreConfig,
    pub observability: ObservabilityConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address. A bare `:port` binds all interfaces.
    pub address: String,

    /// Serve plaintext HTTP/2 instead of TLS.
    pub insecure: bool,

    /// Secret holding `tls.crt` / `tls.key` (and optionally `ca.crt`).
    pub certificate_secret: String,

    /// Secret holding the client CA bundle. Falls back to the certificate
    /// secret's `ca.crt` when empty.
    pub ca_certificate_secret: String,

    /// Reject clients without a certificate signed by the CA bundle.
    pub require_client_cert: bool,

    /// Maximum concurrent in-flight calls across all services.
    pub max_rpc: usize,

    /// Serve the gNMI service.
    pub gnmi: bool,

    /// Serve the gRPC health service.
    pub health: bool,

    /// Namespace for secret lookups.
    pub namespace: String,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    /// Maximum concurrent transport connections (backpressure).
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            insecure: false,
            certificate_secret: String::new(),
            ca_certificate_secret: String::new(),
            require_client_cert: false,
            max_rpc: DEFAULT_MAX_RPC,
            gnmi: true,
            health: true,
            namespace: String::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_connections: 10_000,
        }
    }
}

impl ServerConfig {
    /// Fill unset secret fields from `source`, then apply defaults.
    ///
    /// Runs once at startup. The namespace comes from `POD_NAMESPACE`
    /// (falling back to `ndd-system`); both secret names come from
    /// `GRPC_CERT_SECRET_NAME`.
    pub fn resolve(mut self, source: &dyn ConfigSource) -> Self {
        if self.namespace.is_empty() {
            self.namespace = source
                .get(NAMESPACE_VAR)
                .filter(|ns| !ns.is_empty())
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        }
        if self.certificate_secret.is_empty() {
            if let Some(name) = source.get(CERT_SECRET_VAR) {
                self.certificate_secret = name;
            }
        }
        if self.ca_certificate_secret.is_empty() {
            if let Some(name) = source.get(CERT_SECRET_VAR) {
                self.ca_certificate_secret = name;
            }
        }
        self.apply_defaults();
        self
    }

    /// Replace empty or non-positive values with their defaults.
    pub fn apply_defaults(&mut self) {
        if self.address.is_empty() {
            self.address = DEFAULT_ADDRESS.to_string();
        }
        if self.max_rpc == 0 {
            self.max_rpc = DEFAULT_MAX_RPC;
        }
        if self.timeout_secs == 0 {
            self.timeout_secs = DEFAULT_TIMEOUT_SECS;
        }
        if self.namespace.is_empty() {
            self.namespace = DEFAULT_NAMESPACE.to_string();
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Admission capacity; zero means the default.
    pub fn max_rpc_capacity(&self) -> usize {
        if self.max_rpc == 0 {
            DEFAULT_MAX_RPC
        } else {
            self.max_rpc
        }
    }

    /// Parse the listen address. `":9999"` is accepted as shorthand for
    /// `0.0.0.0:9999`.
    pub fn listen_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        match self.address.strip_prefix(':') {
            Some(port) => format!("0.0.0.0:{}", port).parse(),
            None => self.address.parse(),
        }
    }

    /// Secret to read the CA bundle from.
    pub fn ca_secret(&self) -> &str {
        if self.ca_certificate_secret.is_empty() {
            &self.certificate_secret
        } else {
            &self.ca_certificate_secret
        }
    }
}

/// Directory-backed secret store settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecretStoreConfig {
    /// Root of the `<namespace>/<name>/{tls.crt,tls.key,ca.crt}` tree.
    pub directory: String,
}

impl Default for SecretStoreConfig {
    fn default() -> Self {
        Self {
            directory: "/var/run/secrets/gnmi".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_toml_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.address, DEFAULT_ADDRESS);
        assert_eq!(config.server.max_rpc, 600);
        assert_eq!(config.server.timeout(), Duration::from_secs(60));
        assert!(config.server.gnmi);
        assert!(config.server.health);
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
    }

    #[test]
    fn resolve_reads_source_for_unset_fields() {
        let source: HashMap<&str, &str> =
            HashMap::from([(NAMESPACE_VAR, "network"), (CERT_SECRET_VAR, "gnmi-tls")]);

        let config = ServerConfig::default().resolve(&source);
        assert_eq!(config.namespace, "network");
        assert_eq!(config.certificate_secret, "gnmi-tls");
        assert_eq!(config.ca_certificate_secret, "gnmi-tls");
    }

    #[test]
    fn resolve_keeps_explicit_values() {
        let source: HashMap<&str, &str> =
            HashMap::from([(NAMESPACE_VAR, "network"), (CERT_SECRET_VAR, "gnmi-tls")]);
        let config = ServerConfig {
            namespace: "custom".to_string(),
            certificate_secret: "mine".to_string(),
            ..Default::default()
        }
        .resolve(&source);

        assert_eq!(config.namespace, "custom");
        assert_eq!(config.certificate_secret, "mine");
        assert_eq!(config.ca_certificate_secret, "gnmi-tls");
    }

    #[test]
    fn namespace_falls_back_when_unset_or_empty() {
        let empty: HashMap<&str, &str> = HashMap::from([(NAMESPACE_VAR, "")]);
        assert_eq!(ServerConfig::default().resolve(&empty).namespace, DEFAULT_NAMESPACE);
        assert_eq!(
            ServerConfig::default().resolve(&HashMap::<&str, &str>::new()).namespace,
            DEFAULT_NAMESPACE
        );
    }

    #[test]
    fn zero_values_become_defaults() {
        let mut config = ServerConfig {
            address: String::new(),
            max_rpc: 0,
            timeout_secs: 0,
            ..Default::default()
        };
        config.apply_defaults();
        assert_eq!(config.address, DEFAULT_ADDRESS);
        assert_eq!(config.max_rpc, DEFAULT_MAX_RPC);
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn port_only_address_binds_all_interfaces() {
        let config = ServerConfig {
            address: ":9999".to_string(),
            ..Default::default()
        };
        assert_eq!(config.listen_addr().unwrap(), "0.0.0.0:9999".parse().unwrap());
    }
}
