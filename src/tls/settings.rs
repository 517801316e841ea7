//! Server-side rustls configuration.

use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::server::danger::ClientCertVerifier;
use rustls::server::{ClientHello, ResolvesServerCert, WebPkiClientVerifier};
use rustls::sign::CertifiedKey;
use rustls::RootCertStore;

use super::credentials::{fetch_secret, parse_certificates, CredentialError, FETCH_TIMEOUT};
use crate::config::ServerConfig;
use crate::secrets::SecretStore;

/// ALPN protocols offered to clients.
pub const ALPN_H2: &[u8] = b"h2";

/// Handshake-independent TLS settings built once at startup.
#[derive(Clone)]
pub struct TlsSettings {
    provider: Arc<CryptoProvider>,
    client_verifier: Option<Arc<dyn ClientCertVerifier>>,
}

impl TlsSettings {
    /// Settings without client certificate verification.
    pub fn new(provider: Arc<CryptoProvider>) -> Self {
        Self {
            provider,
            client_verifier: None,
        }
    }

    /// Read the CA secret and build the client verifier from its `ca.crt`.
    ///
    /// The CA comes from `ca_certificate_secret`, or from the certificate
    /// secret when that is empty. A secret without `ca.crt` leaves client
    /// certificates unverified; a secret that cannot be fetched is an error.
    pub async fn load(
        store: &dyn SecretStore,
        config: &ServerConfig,
        provider: Arc<CryptoProvider>,
    ) -> Result<Self, CredentialError> {
        let secret = fetch_secret(store, &config.namespace, config.ca_secret(), FETCH_TIMEOUT).await?;
        let mut settings = Self::new(provider);

        match secret.ca {
            Some(ca) if !ca.is_empty() => {
                settings = settings.with_client_ca(&ca, config.require_client_cert)?;
                tracing::info!(
                    namespace = %config.namespace,
                    secret = %config.ca_secret(),
                    require_client_cert = config.require_client_cert,
                    "Client CA loaded"
                );
            }
            _ => {
                tracing::debug!(
                    namespace = %config.namespace,
                    secret = %config.ca_secret(),
                    "No client CA in secret"
                );
            }
        }

        Ok(settings)
    }

    /// Verify client certificates against the PEM bundle `ca`. Clients
    /// without a certificate are still accepted unless `require` is set.
    pub fn with_client_ca(mut self, ca: &[u8], require: bool) -> Result<Self, CredentialError> {
        let mut roots = RootCertStore::empty();
        for cert in parse_certificates(ca)? {
            roots.add(cert)?;
        }

        let builder = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), Arc::clone(&self.provider));
        let builder = if require {
            builder
        } else {
            builder.allow_unauthenticated()
        };
        self.client_verifier = Some(builder.build()?);
        Ok(self)
    }

    pub fn provider(&self) -> &Arc<CryptoProvider> {
        &self.provider
    }

    pub fn verifies_clients(&self) -> bool {
        self.client_verifier.is_some()
    }

    /// Server config presenting `key`, with ALPN `h2`.
    pub fn server_config(&self, key: Arc<CertifiedKey>) -> Result<Arc<rustls::ServerConfig>, CredentialError> {
        let builder = rustls::ServerConfig::builder_with_provider(Arc::clone(&self.provider))
            .with_safe_default_protocol_versions()?;
        let builder = match &self.client_verifier {
            Some(verifier) => builder.with_client_cert_verifier(Arc::clone(verifier)),
            None => builder.with_no_client_auth(),
        };

        let mut config = builder.with_cert_resolver(Arc::new(FixedCertificate(key)));
        config.alpn_protocols = vec![ALPN_H2.to_vec()];
        Ok(Arc::new(config))
    }
}

impl std::fmt::Debug for TlsSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsSettings")
            .field("verifies_clients", &self.verifies_clients())
            .finish()
    }
}

/// Presents the certificate chosen for this handshake.
#[derive(Debug)]
struct FixedCertificate(Arc<CertifiedKey>);

impl ResolvesServerCert for FixedCertificate {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        Some(Arc::clone(&self.0))
    }
}
