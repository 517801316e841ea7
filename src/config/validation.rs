//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Pure function over a resolved config; serde handles syntax

use thiserror::Error;

use super::schema::AppConfig;

/// Longest accepted per-request timeout (one day).
pub const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// One semantic problem in a config.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid listen address {0:?}")]
    InvalidAddress(String),
    #[error("TLS is enabled but no certificate secret is configured")]
    MissingCertificateSecret,
    #[error("no service enabled")]
    NoServices,
    #[error("invalid metrics address {0:?}")]
    InvalidMetricsAddress(String),
    #[error("timeout_secs {0} exceeds the maximum of {max}", max = MAX_TIMEOUT_SECS)]
    TimeoutTooLarge(u64),
}

/// Check a resolved config.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let server = &config.server;

    if server.listen_addr().is_err() {
        errors.push(ValidationError::InvalidAddress(server.address.clone()));
    }
    if !server.insecure && server.certificate_secret.is_empty() {
        errors.push(ValidationError::MissingCertificateSecret);
    }
    if !server.gnmi && !server.health {
        errors.push(ValidationError::NoServices);
    }
    if server.timeout_secs > MAX_TIMEOUT_SECS {
        errors.push(ValidationError::TimeoutTooLarge(server.timeout_secs));
    }
    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insecure_default_config_is_valid() {
        let mut config = AppConfig::default();
        config.server.insecure = true;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn reports_every_error() {
        let mut config = AppConfig::default();
        config.server.address = "not-an-address".to_string();
        config.server.gnmi = false;
        config.server.health = false;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::InvalidAddress("not-an-address".to_string()),
                ValidationError::MissingCertificateSecret,
                ValidationError::NoServices,
            ]
        );
    }

    #[test]
    fn rejects_oversized_timeout() {
        let mut config = AppConfig::default();
        config.server.insecure = true;
        config.server.timeout_secs = i64::MAX as u64;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::TimeoutTooLarge(i64::MAX as u64)]);

        config.server.timeout_secs = MAX_TIMEOUT_SECS;
        assert!(validate_config(&config).is_ok());
    }
}
