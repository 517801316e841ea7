//! Health Check and Watch dispatch.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tonic::Status;

use super::{finish, Dispatcher};
use crate::context::RequestContext;
use crate::proto::health::{HealthCheckRequest, HealthCheckResponse};
use crate::registry::HandlerFuture;

/// Answers a single health probe.
pub type CheckHandler =
    Arc<dyn Fn(RequestContext, HealthCheckRequest) -> HandlerFuture<HealthCheckResponse> + Send + Sync>;

/// Drives a health status stream. Returning ends the stream with that status.
pub type WatchHandler = Arc<dyn Fn(HealthCheckRequest, WatchSink) -> HandlerFuture<()> + Send + Sync>;

/// Wrap an async closure as a [`CheckHandler`].
pub fn check_handler<F, Fut>(f: F) -> CheckHandler
where
    F: Fn(RequestContext, HealthCheckRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HealthCheckResponse, Status>> + Send + 'static,
{
    Arc::new(move |ctx, req| Box::pin(f(ctx, req)))
}

/// Wrap an async closure as a [`WatchHandler`].
pub fn watch_handler<F, Fut>(f: F) -> WatchHandler
where
    F: Fn(HealthCheckRequest, WatchSink) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Status>> + Send + 'static,
{
    Arc::new(move |req, sink| Box::pin(f(req, sink)))
}

/// Outbound half of a Watch stream.
#[derive(Debug, Clone)]
pub struct WatchSink {
    ctx: RequestContext,
    tx: mpsc::Sender<HealthCheckResponse>,
}

impl WatchSink {
    pub fn new(ctx: RequestContext, tx: mpsc::Sender<HealthCheckResponse>) -> Self {
        Self { ctx, tx }
    }

    /// Context of the stream. Done once the client goes away.
    pub fn context(&self) -> &RequestContext {
        &self.ctx
    }

    /// Push one status update to the client.
    pub async fn send(&self, rsp: HealthCheckResponse) -> Result<(), Status> {
        self.tx
            .send(rsp)
            .await
            .map_err(|_| Status::cancelled("watch stream closed by client"))
    }
}

impl Dispatcher {
    /// Serve a Check. Without a handler the answer is the default (UNKNOWN)
    /// status, never an error.
    pub async fn check(&self, ctx: &RequestContext, req: HealthCheckRequest) -> Result<HealthCheckResponse, Status> {
        let started = Instant::now();
        let (ctx, _release) = ctx.bounded(self.timeout);
        let result: Result<HealthCheckResponse, Status> = async {
            let _permit = self.admission.acquire(&ctx).await?;
            match self.check.load_full() {
                Some(handler) => ctx.run(handler(ctx.clone(), req)).await?,
                None => Ok(HealthCheckResponse::default()),
            }
        }
        .await;
        finish("Check", started, &result);
        result
    }

    /// Serve a Watch. Admission is held until the handler returns; the
    /// stream is not bounded by the request timeout.
    pub async fn watch(
        &self,
        ctx: &RequestContext,
        req: HealthCheckRequest,
        tx: mpsc::Sender<HealthCheckResponse>,
    ) -> Result<(), Status> {
        let started = Instant::now();
        let result: Result<(), Status> = async {
            let _permit = self.admission.acquire(ctx).await?;
            let handler = self
                .watch
                .load_full()
                .ok_or_else(|| Status::unimplemented("health watch is not implemented"))?;
            let sink = WatchSink::new(ctx.clone(), tx);
            ctx.run(handler(req, sink)).await?
        }
        .await;
        finish("Watch", started, &result);
        result
    }
}
