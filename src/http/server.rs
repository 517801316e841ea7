//! gRPC server setup.
//!
//! # Responsibilities
//! - Build the axum Router for the enabled services
//! - Accept connections, run the TLS handshake unless insecure
//! - Serve HTTP/2 on each connection and drain them on shutdown
//! - Translate between gRPC frames and dispatcher calls

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, Uri};
use axum::response::Response;
use axum::routing::post;
use axum::Router;
use futures_util::{stream, Stream};
use http_body::Frame;
use hyper::server::conn::http2;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::service::TowerToHyperService;
use prost::Message;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::DropGuard;
use tonic::Status;
use tower_http::trace::TraceLayer;

use super::grpc::{
    decode_message, encode_message, parse_grpc_timeout, status_trailers, streaming_response,
    trailers_only, unary_response, GRPC_TIMEOUT,
};
use crate::config::ServerConfig;
use crate::context::RequestContext;
use crate::net::{ConnectionId, ConnectionTracker, Listener, ListenerError, TlsAcceptor};
use crate::proto::gnmi::{GetRequest, SetRequest};
use crate::proto::health::{HealthCheckRequest, HealthCheckResponse};
use crate::registry::{DeleteHandler, ReadHandler, ReplaceHandler, UpdateHandler};
use crate::secrets::SecretStore;
use crate::service::{CheckHandler, Dispatcher, WatchHandler};
use crate::tls::{self, CredentialCache, CredentialError, TlsSettings};

pub const GNMI_GET: &str = "/gnmi.gNMI/Get";
pub const GNMI_SET: &str = "/gnmi.gNMI/Set";
pub const HEALTH_CHECK: &str = "/grpc.health.v1.Health/Check";
pub const HEALTH_WATCH: &str = "/grpc.health.v1.Health/Watch";

/// Largest accepted request message.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// How long shutdown waits for open connections.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

const WATCH_BUFFER: usize = 16;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid listen address {address:?}: {source}")]
    Address {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] CredentialError),

    #[error("TLS is enabled but no secret store was supplied")]
    MissingSecretStore,
}

/// gNMI and health services over one HTTP/2 listener.
pub struct GrpcServer {
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
    secret_store: Option<Arc<dyn SecretStore>>,
    drain_timeout: Duration,
}

impl GrpcServer {
    pub fn new(mut config: ServerConfig) -> Self {
        config.apply_defaults();
        let dispatcher = Arc::new(Dispatcher::new(&config));
        Self {
            config,
            dispatcher,
            secret_store: None,
            drain_timeout: DRAIN_TIMEOUT,
        }
    }

    pub fn with_read_handler(self, origin: impl Into<String>, handler: ReadHandler) -> Self {
        self.dispatcher.register_read(origin, handler);
        self
    }

    pub fn with_update_handler(self, origin: impl Into<String>, handler: UpdateHandler) -> Self {
        self.dispatcher.register_update(origin, handler);
        self
    }

    pub fn with_replace_handler(self, origin: impl Into<String>, handler: ReplaceHandler) -> Self {
        self.dispatcher.register_replace(origin, handler);
        self
    }

    pub fn with_delete_handler(self, origin: impl Into<String>, handler: DeleteHandler) -> Self {
        self.dispatcher.register_delete(origin, handler);
        self
    }

    pub fn with_check_handler(self, handler: CheckHandler) -> Self {
        self.dispatcher.set_check_handler(handler);
        self
    }

    pub fn with_watch_handler(self, handler: WatchHandler) -> Self {
        self.dispatcher.set_watch_handler(handler);
        self
    }

    /// Secret store for server certificates. Required unless insecure.
    pub fn with_secret_store(mut self, store: Arc<dyn SecretStore>) -> Self {
        self.secret_store = Some(store);
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Shared dispatcher, for registering handlers after construction.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Routes for the enabled services. Anything else answers Unimplemented.
    pub fn router(&self) -> Router {
        let mut router: Router<Arc<Dispatcher>> = Router::new();
        if self.config.gnmi {
            router = router
                .route(GNMI_GET, post(gnmi_get))
                .route(GNMI_SET, post(gnmi_set));
        }
        if self.config.health {
            router = router
                .route(HEALTH_CHECK, post(health_check))
                .route(HEALTH_WATCH, post(health_watch));
        }

        router
            .fallback(unknown_method)
            .with_state(Arc::clone(&self.dispatcher))
            .layer(DefaultBodyLimit::max(MAX_MESSAGE_SIZE))
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and serve until `shutdown` fires.
    pub async fn start(self, shutdown: broadcast::Receiver<()>) -> Result<(), ServerError> {
        let addr = self.config.listen_addr().map_err(|source| ServerError::Address {
            address: self.config.address.clone(),
            source,
        })?;
        let listener = Listener::bind(addr, self.config.max_connections).await?;
        self.run(listener, shutdown).await
    }

    /// Serve on `listener` until `shutdown` fires (or its sender is dropped),
    /// then drain open connections and close admission.
    pub async fn run(self, listener: Listener, mut shutdown: broadcast::Receiver<()>) -> Result<(), ServerError> {
        let tls = self.tls_acceptor().await?;
        let router = self.router();
        let tracker = ConnectionTracker::new();
        let (drain_tx, _) = broadcast::channel::<()>(1);

        tracing::info!(
            address = %listener.local_addr()?,
            insecure = tls.is_none(),
            gnmi = self.config.gnmi,
            health = self.config.health,
            max_rpc = self.config.max_rpc,
            "gRPC server started"
        );

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer, permit) = match accepted {
                        Ok(conn) => conn,
                        Err(ListenerError::Closed) => break,
                        Err(e) => {
                            tracing::warn!(error = %e, "Accept failed");
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            continue;
                        }
                    };

                    let guard = tracker.track();
                    let router = router.clone();
                    let tls = tls.clone();
                    let drain = drain_tx.subscribe();
                    tokio::spawn(async move {
                        let _permit = permit;
                        let id = guard.id();
                        tracing::debug!(connection_id = %id, peer_addr = %peer, "Connection opened");
                        match tls {
                            Some(acceptor) => match acceptor.accept(stream).await {
                                Ok(stream) => serve_connection(stream, router, drain, id).await,
                                Err(e) => tracing::warn!(
                                    connection_id = %id,
                                    peer_addr = %peer,
                                    error = %e,
                                    "TLS handshake failed"
                                ),
                            },
                            None => serve_connection(stream, router, drain, id).await,
                        }
                        drop(guard);
                    });
                }
                _ = shutdown.recv() => {
                    tracing::info!(active_connections = tracker.active_count(), "Shutdown requested");
                    break;
                }
            }
        }

        drop(listener);
        let _ = drain_tx.send(());
        if !tracker.drain(self.drain_timeout).await {
            tracing::warn!(
                remaining = tracker.active_count(),
                "Connections still open after drain timeout"
            );
        }
        self.dispatcher.admission().close();

        tracing::info!("gRPC server stopped");
        Ok(())
    }

    async fn tls_acceptor(&self) -> Result<Option<TlsAcceptor>, ServerError> {
        if self.config.insecure {
            return Ok(None);
        }

        let store = self.secret_store.clone().ok_or(ServerError::MissingSecretStore)?;
        let provider = tls::default_provider();
        let settings = TlsSettings::load(store.as_ref(), &self.config, Arc::clone(&provider)).await?;
        let cache = CredentialCache::new(
            store,
            self.config.namespace.clone(),
            self.config.certificate_secret.clone(),
            provider,
        );
        Ok(Some(TlsAcceptor::new(Arc::new(cache), settings)))
    }
}

impl std::fmt::Debug for GrpcServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpcServer")
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher)
            .field("secret_store", &self.secret_store.is_some())
            .finish()
    }
}

async fn serve_connection<IO>(io: IO, router: Router, mut drain: broadcast::Receiver<()>, id: ConnectionId)
where
    IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let conn = http2::Builder::new(TokioExecutor::new())
        .serve_connection(TokioIo::new(io), TowerToHyperService::new(router));
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = drain.recv() => {
            conn.as_mut().graceful_shutdown();
            conn.as_mut().await
        }
    };

    if let Err(e) = result {
        tracing::debug!(connection_id = %id, error = %e, "Connection ended with error");
    }
}

/// Root context for an inbound call, honouring `grpc-timeout`.
fn request_context(headers: &HeaderMap) -> RequestContext {
    headers
        .get(GRPC_TIMEOUT)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_grpc_timeout)
        .map(RequestContext::with_timeout)
        .unwrap_or_else(RequestContext::background)
}

async fn unary<Req, Rsp, F, Fut>(headers: &HeaderMap, body: &[u8], call: F) -> Response
where
    Req: Message + Default,
    Rsp: Message,
    F: FnOnce(RequestContext, Req) -> Fut,
    Fut: Future<Output = Result<Rsp, Status>>,
{
    let result = match decode_message::<Req>(body) {
        Ok(req) => call(request_context(headers), req).await,
        Err(status) => Err(status),
    };
    unary_response(result)
}

async fn gnmi_get(State(dispatcher): State<Arc<Dispatcher>>, headers: HeaderMap, body: Bytes) -> Response {
    unary(&headers, &body, move |ctx, req: GetRequest| async move {
        dispatcher.get(&ctx, req).await
    })
    .await
}

async fn gnmi_set(State(dispatcher): State<Arc<Dispatcher>>, headers: HeaderMap, body: Bytes) -> Response {
    unary(&headers, &body, move |ctx, req: SetRequest| async move {
        dispatcher.set(&ctx, req).await
    })
    .await
}

async fn health_check(State(dispatcher): State<Arc<Dispatcher>>, headers: HeaderMap, body: Bytes) -> Response {
    unary(&headers, &body, move |ctx, req: HealthCheckRequest| async move {
        dispatcher.check(&ctx, req).await
    })
    .await
}

async fn health_watch(State(dispatcher): State<Arc<Dispatcher>>, headers: HeaderMap, body: Bytes) -> Response {
    let req = match decode_message::<HealthCheckRequest>(&body) {
        Ok(req) => req,
        Err(status) => return trailers_only(status),
    };

    let ctx = request_context(&headers);
    let cancel = ctx.cancel_on_drop();
    let (tx, rx) = mpsc::channel(WATCH_BUFFER);
    let task = tokio::spawn(async move { dispatcher.watch(&ctx, req, tx).await });

    streaming_response(watch_frames(WatchStream {
        rx,
        task,
        _cancel: cancel,
    }))
}

/// State of one Watch response body. Dropping it (client gone) cancels the
/// call's context, which ends the handler and frees its admission.
struct WatchStream {
    rx: mpsc::Receiver<HealthCheckResponse>,
    task: JoinHandle<Result<(), Status>>,
    _cancel: DropGuard,
}

fn watch_frames(state: WatchStream) -> impl Stream<Item = Result<Frame<Bytes>, Infallible>> + Send + 'static {
    stream::unfold(Some(state), |state| async move {
        let mut state = match state {
            Some(state) => state,
            None => return None,
        };
        match state.rx.recv().await {
            Some(rsp) => Some((Ok(Frame::data(encode_message(&rsp))), Some(state))),
            None => {
                let status = match (&mut state.task).await {
                    Ok(Ok(())) => Status::ok(""),
                    Ok(Err(status)) => status,
                    Err(e) => Status::internal(format!("watch handler failed: {}", e)),
                };
                Some((Ok(Frame::trailers(status_trailers(&status))), None))
            }
        }
    })
}

async fn unknown_method(uri: Uri) -> Response {
    trailers_only(Status::unimplemented(format!("unknown method {}", uri.path())))
}
