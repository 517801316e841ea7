//! TLS handshake for accepted connections.
//!
//! The ClientHello is read first, then the certificate is taken from the
//! credential cache, so every handshake sees the currently cached (or just
//! refreshed) certificate.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::server::TlsStream;
use tokio_rustls::LazyConfigAcceptor;

use crate::observability::metrics;
use crate::tls::{CredentialCache, CredentialError, TlsSettings};

/// Default upper bound on a single handshake.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("TLS handshake: {0}")]
    Io(#[from] std::io::Error),
    #[error("server certificate unavailable: {0}")]
    Credentials(#[from] CredentialError),
    #[error("TLS handshake timed out after {0:?}")]
    Timeout(Duration),
}

/// Accepts TLS connections using certificates from a [`CredentialCache`].
#[derive(Debug, Clone)]
pub struct TlsAcceptor {
    cache: Arc<CredentialCache>,
    settings: TlsSettings,
    handshake_timeout: Duration,
}

impl TlsAcceptor {
    pub fn new(cache: Arc<CredentialCache>, settings: TlsSettings) -> Self {
        Self {
            cache,
            settings,
            handshake_timeout: HANDSHAKE_TIMEOUT,
        }
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn cache(&self) -> &Arc<CredentialCache> {
        &self.cache
    }

    /// Run the server side of the handshake on `stream`.
    pub async fn accept<IO>(&self, stream: IO) -> Result<TlsStream<IO>, HandshakeError>
    where
        IO: AsyncRead + AsyncWrite + Unpin,
    {
        let result = match tokio::time::timeout(self.handshake_timeout, self.handshake(stream)).await {
            Ok(result) => result,
            Err(_) => Err(HandshakeError::Timeout(self.handshake_timeout)),
        };
        metrics::record_handshake(if result.is_ok() { "ok" } else { "failed" });
        result
    }

    async fn handshake<IO>(&self, stream: IO) -> Result<TlsStream<IO>, HandshakeError>
    where
        IO: AsyncRead + AsyncWrite + Unpin,
    {
        let start = LazyConfigAcceptor::new(rustls::server::Acceptor::default(), stream).await?;
        tracing::trace!(
            server_name = start.client_hello().server_name().unwrap_or_default(),
            "ClientHello received"
        );

        let key = self.cache.get_certificate().await?;
        let config = self.settings.server_config(key)?;
        Ok(start.into_stream(config).await?)
    }
}
