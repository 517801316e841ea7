//! TTL-cached server certificate backed by a secret store.
//!
//! # Responsibilities
//! - Hand the current certificate to every TLS handshake
//! - Refresh from the secret store once the cached copy is older than the TTL
//! - Let exactly one caller refresh while concurrent handshakes wait
//!
//! # Design Decisions
//! - A single async mutex guards the entry; the fetch runs under it, so a
//!   burst of handshakes after expiry triggers one fetch
//! - The fetch has its own timeout, independent of any caller
//! - A failed refresh leaves the stale entry in place and fails the handshake

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rustls::crypto::CryptoProvider;
use rustls::pki_types::CertificateDer;
use rustls::sign::CertifiedKey;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::observability::metrics;
use crate::secrets::{SecretError, SecretStore, TlsSecret};

/// How long a fetched certificate is served before the next refresh.
pub const CERTIFICATE_TTL: Duration = Duration::from_secs(60);

/// Upper bound on a single secret-store fetch.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error("fetching secret {namespace}/{name} timed out after {timeout:?}")]
    FetchTimeout {
        namespace: String,
        name: String,
        timeout: Duration,
    },

    #[error("invalid PEM: {0}")]
    Pem(#[from] io::Error),

    #[error("no certificates in PEM data")]
    NoCertificates,

    #[error("no private key in PEM data")]
    MissingPrivateKey,

    #[error("TLS: {0}")]
    Rustls(#[from] rustls::Error),

    #[error("client certificate verifier: {0}")]
    Verifier(#[from] rustls::server::VerifierBuilderError),
}

/// Parse every certificate in a PEM bundle.
pub fn parse_certificates(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, CredentialError> {
    let certs = rustls_pemfile::certs(&mut &pem[..]).collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(CredentialError::NoCertificates);
    }
    Ok(certs)
}

/// Build a signing identity from PEM certificate chain and key.
pub fn parse_certified_key(secret: &TlsSecret, provider: &CryptoProvider) -> Result<CertifiedKey, CredentialError> {
    let certs = parse_certificates(&secret.certificate)?;
    let key = rustls_pemfile::private_key(&mut &secret.private_key[..])?
        .ok_or(CredentialError::MissingPrivateKey)?;
    let signing_key = provider.key_provider.load_private_key(key)?;
    Ok(CertifiedKey::new(certs, signing_key))
}

/// Fetch `namespace/name`, giving up after `timeout`.
pub(crate) async fn fetch_secret(
    store: &dyn SecretStore,
    namespace: &str,
    name: &str,
    timeout: Duration,
) -> Result<TlsSecret, CredentialError> {
    match tokio::time::timeout(timeout, store.get(namespace, name)).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(CredentialError::FetchTimeout {
            namespace: namespace.to_string(),
            name: name.to_string(),
            timeout,
        }),
    }
}

struct CachedCertificate {
    key: Arc<CertifiedKey>,
    fetched_at: Instant,
}

/// Certificate cache consulted on every handshake.
pub struct CredentialCache {
    store: Arc<dyn SecretStore>,
    namespace: String,
    name: String,
    provider: Arc<CryptoProvider>,
    ttl: Duration,
    fetch_timeout: Duration,
    entry: Mutex<Option<CachedCertificate>>,
    fetches: AtomicU64,
}

impl CredentialCache {
    pub fn new(
        store: Arc<dyn SecretStore>,
        namespace: impl Into<String>,
        name: impl Into<String>,
        provider: Arc<CryptoProvider>,
    ) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            name: name.into(),
            provider,
            ttl: CERTIFICATE_TTL,
            fetch_timeout: FETCH_TIMEOUT,
            entry: Mutex::new(None),
            fetches: AtomicU64::new(0),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Return the cached certificate, refreshing it first if it has expired.
    pub async fn get_certificate(&self) -> Result<Arc<CertifiedKey>, CredentialError> {
        let mut entry = self.entry.lock().await;

        if let Some(cached) = entry.as_ref() {
            if Instant::now() < cached.fetched_at + self.ttl {
                metrics::record_certificate_cache_hit();
                return Ok(Arc::clone(&cached.key));
            }
        }

        self.fetches.fetch_add(1, Ordering::Relaxed);
        match self.refresh().await {
            Ok(key) => {
                tracing::info!(
                    namespace = %self.namespace,
                    name = %self.name,
                    "Server certificate refreshed"
                );
                metrics::record_certificate_refresh("refreshed");
                *entry = Some(CachedCertificate {
                    key: Arc::clone(&key),
                    fetched_at: Instant::now(),
                });
                Ok(key)
            }
            Err(e) => {
                tracing::warn!(
                    namespace = %self.namespace,
                    name = %self.name,
                    error = %e,
                    "Server certificate refresh failed"
                );
                metrics::record_certificate_refresh("failed");
                Err(e)
            }
        }
    }

    async fn refresh(&self) -> Result<Arc<CertifiedKey>, CredentialError> {
        let secret = fetch_secret(self.store.as_ref(), &self.namespace, &self.name, self.fetch_timeout).await?;
        Ok(Arc::new(parse_certified_key(&secret, &self.provider)?))
    }

    /// The entry currently held, without refreshing.
    pub async fn cached(&self) -> Option<Arc<CertifiedKey>> {
        self.entry.lock().await.as_ref().map(|c| Arc::clone(&c.key))
    }

    /// Number of secret-store fetches attempted so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCache")
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .field("ttl", &self.ttl)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("fetches", &self.fetch_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::MemorySecretStore;
    use async_trait::async_trait;

    fn self_signed() -> TlsSecret {
        let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        TlsSecret {
            certificate: generated.cert.pem().into_bytes(),
            private_key: generated.key_pair.serialize_pem().into_bytes(),
            ca: None,
        }
    }

    fn provider() -> Arc<CryptoProvider> {
        Arc::new(rustls::crypto::ring::default_provider())
    }

    fn cache_with(store: Arc<MemorySecretStore>) -> CredentialCache {
        CredentialCache::new(store, "ns", "tls", provider())
    }

    #[tokio::test(start_paused = true)]
    async fn reuses_certificate_within_ttl() {
        let store = Arc::new(MemorySecretStore::new());
        store.insert("ns", "tls", self_signed());
        let cache = cache_with(store);

        let first = cache.get_certificate().await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        let second = cache.get_certificate().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.fetch_count(), 1);
    }

    #[test]
    fn cache_hits_are_not_counted_as_refreshes() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let store = Arc::new(MemorySecretStore::new());
        store.insert("ns", "tls", self_signed());
        let cache = cache_with(store);
        ::metrics::with_local_recorder(&recorder, || {
            rt.block_on(async {
                for _ in 0..3 {
                    cache.get_certificate().await.unwrap();
                }
            })
        });

        let rendered = handle.render();
        assert!(rendered.contains("gnmi_certificate_refresh_total{outcome=\"refreshed\"} 1"));
        assert!(rendered.contains("gnmi_certificate_cache_hits_total 2"));
        assert!(!rendered.contains("outcome=\"cached\""));
    }

    #[tokio::test(start_paused = true)]
    async fn refreshes_after_ttl() {
        let store = Arc::new(MemorySecretStore::new());
        store.insert("ns", "tls", self_signed());
        let cache = cache_with(Arc::clone(&store));

        let first = cache.get_certificate().await.unwrap();
        store.insert("ns", "tls", self_signed());
        tokio::time::advance(CERTIFICATE_TTL + Duration::from_secs(1)).await;

        let second = cache.get_certificate().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_ne!(first.cert[0], second.cert[0]);
        assert_eq!(cache.fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_refresh() {
        let store = Arc::new(MemorySecretStore::new());
        store.insert("ns", "tls", self_signed());
        let cache = Arc::new(cache_with(store));

        cache.get_certificate().await.unwrap();
        tokio::time::advance(CERTIFICATE_TTL + Duration::from_secs(1)).await;

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get_certificate().await.map(|_| ()) })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(cache.fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_keeps_stale_entry() {
        let store = Arc::new(MemorySecretStore::new());
        store.insert("ns", "tls", self_signed());
        let cache = cache_with(Arc::clone(&store));

        let first = cache.get_certificate().await.unwrap();
        store.remove("ns", "tls");
        tokio::time::advance(CERTIFICATE_TTL + Duration::from_secs(1)).await;

        let err = cache.get_certificate().await.unwrap_err();
        assert!(matches!(err, CredentialError::Secret(SecretError::NotFound { .. })));
        let stale = cache.cached().await.unwrap();
        assert!(Arc::ptr_eq(&first, &stale));

        // Still expired, so the next call tries again.
        store.insert("ns", "tls", self_signed());
        let recovered = cache.get_certificate().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &recovered));
        assert_eq!(cache.fetch_count(), 3);
    }

    struct StalledStore;

    #[async_trait]
    impl SecretStore for StalledStore {
        async fn get(&self, _namespace: &str, _name: &str) -> Result<TlsSecret, SecretError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_is_bounded_by_timeout() {
        let cache = CredentialCache::new(Arc::new(StalledStore), "ns", "tls", provider());

        let err = cache.get_certificate().await.unwrap_err();
        assert!(matches!(err, CredentialError::FetchTimeout { timeout, .. } if timeout == FETCH_TIMEOUT));
        assert!(cache.cached().await.is_none());
    }

    #[test]
    fn garbage_pem_is_rejected() {
        let secret = TlsSecret {
            certificate: b"not a certificate".to_vec(),
            private_key: Vec::new(),
            ca: None,
        };
        let err = parse_certified_key(&secret, &provider()).unwrap_err();
        assert!(matches!(err, CredentialError::NoCertificates));
    }
}
