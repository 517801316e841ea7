//! Global admission control for in-flight requests.
//!
//! # Responsibilities
//! - Bound the number of concurrently executing protocol calls
//! - Wait for capacity, but give up as soon as the request context is done
//! - Return capacity exactly once per admitted request
//!
//! # Design Decisions
//! - Backed by a tokio `Semaphore`, which queues waiters in FIFO order
//! - Capacity is returned by dropping [`AdmissionPermit`]; no manual release
//! - An already-expired context fails before entering the wait queue

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tonic::Status;

use crate::context::{ContextError, RequestContext};
use crate::observability::metrics;

/// Reasons admission can be refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// The request context finished while waiting.
    #[error(transparent)]
    Context(#[from] ContextError),
    /// The controller was closed for shutdown.
    #[error("server is shutting down")]
    Closed,
}

impl From<AdmissionError> for Status {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::Context(ctx) => ctx.into(),
            AdmissionError::Closed => Status::unavailable(err.to_string()),
        }
    }
}

/// Weighted gate bounding total in-flight requests.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl AdmissionController {
    /// Create a controller admitting at most `capacity` concurrent requests.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for one unit of capacity.
    ///
    /// Fails immediately if `ctx` is already done; otherwise waits until a
    /// unit frees up or `ctx` finishes. A failed wait consumes nothing.
    pub async fn acquire(&self, ctx: &RequestContext) -> Result<AdmissionPermit, AdmissionError> {
        if let Some(err) = ctx.error() {
            return Err(err.into());
        }

        let started = Instant::now();
        let permit = tokio::select! {
            permit = Arc::clone(&self.permits).acquire_owned() => {
                permit.map_err(|_| AdmissionError::Closed)?
            }
            err = ctx.done() => {
                tracing::debug!(request_id = %ctx.id(), error = %err, "Admission wait abandoned");
                return Err(err.into());
            }
        };

        metrics::record_admission_wait(started);
        metrics::inflight_inc();
        Ok(AdmissionPermit { _permit: permit })
    }

    /// Stop admitting. Waiters and later callers fail with [`AdmissionError::Closed`].
    pub fn close(&self) {
        self.permits.close();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Units not currently held by any request.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn in_flight(&self) -> usize {
        self.capacity - self.available().min(self.capacity)
    }
}

/// One admitted request. Dropping it returns the capacity.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        metrics::inflight_dec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn extra_acquire_waits_for_release() {
        let admission = AdmissionController::new(2);
        let ctx = RequestContext::background();

        let first = admission.acquire(&ctx).await.unwrap();
        let _second = admission.acquire(&ctx).await.unwrap();
        assert_eq!(admission.available(), 0);
        assert_eq!(admission.in_flight(), 2);

        let waiter = {
            let admission = admission.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { admission.acquire(&ctx).await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(first);
        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should be admitted after release")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn cancelled_waiter_consumes_nothing() {
        let admission = AdmissionController::new(1);
        let holder = admission.acquire(&RequestContext::background()).await.unwrap();

        let ctx = RequestContext::background();
        let waiter = {
            let admission = admission.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { admission.acquire(&ctx).await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.cancel();

        let result = waiter.await.unwrap();
        assert_eq!(result, Err(AdmissionError::Context(ContextError::Cancelled)));

        drop(holder);
        assert_eq!(admission.available(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_context_fails_fast() {
        let admission = AdmissionController::new(4);
        let ctx = RequestContext::with_timeout(Duration::from_millis(10));
        tokio::time::advance(Duration::from_millis(20)).await;

        let result = admission.acquire(&ctx).await.map(|_| ());
        assert_eq!(result, Err(AdmissionError::Context(ContextError::DeadlineExceeded)));
        assert_eq!(admission.available(), 4);
    }

    #[tokio::test]
    async fn closed_controller_refuses() {
        let admission = AdmissionController::new(1);
        admission.close();
        let result = admission.acquire(&RequestContext::background()).await.map(|_| ());
        assert_eq!(result, Err(AdmissionError::Closed));

        let status: Status = AdmissionError::Closed.into();
        assert_eq!(status.code(), tonic::Code::Unavailable);
    }
}
