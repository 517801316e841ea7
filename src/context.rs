//! Request-scoped cancellation and deadlines.
//!
//! A [`RequestContext`] travels with every call through the dispatcher and
//! into handlers. It carries a cancellation token, an optional deadline and a
//! request id for log correlation.
//!
//! # Design Decisions
//! - Bounded child contexts are released through a drop guard, so every exit
//!   path of the method that created them cancels the child
//! - Time is `tokio::time::Instant` so paused-clock tests drive deadlines

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};
use tonic::Status;
use uuid::Uuid;

/// Why a context is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("context cancelled")]
    Cancelled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

impl From<ContextError> for Status {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::Cancelled => Status::cancelled(err.to_string()),
            ContextError::DeadlineExceeded => Status::deadline_exceeded(err.to_string()),
        }
    }
}

/// Cancellation, deadline and correlation id for a single request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    id: Uuid,
    deadline: Option<Instant>,
    token: CancellationToken,
}

impl RequestContext {
    /// A context with no deadline that is only done once cancelled.
    pub fn background() -> Self {
        Self {
            id: Uuid::new_v4(),
            deadline: None,
            token: CancellationToken::new(),
        }
    }

    /// A root context that expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            ..Self::background()
        }
    }

    /// A root context that expires `timeout` from now. A timeout too large
    /// to represent leaves the context without a deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
            ..Self::background()
        }
    }

    /// Derive a child bounded to `timeout` from now (or the parent's deadline
    /// if that is sooner). The child is cancelled when the returned guard drops.
    pub fn bounded(&self, timeout: Duration) -> (Self, DropGuard) {
        let limit = Instant::now().checked_add(timeout);
        let deadline = match (self.deadline, limit) {
            (Some(parent), Some(limit)) => Some(parent.min(limit)),
            (parent, limit) => parent.or(limit),
        };
        let token = self.token.child_token();
        let guard = token.clone().drop_guard();
        let child = Self {
            id: self.id,
            deadline,
            token,
        };
        (child, guard)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, if there is one.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// A guard that cancels this context when dropped.
    pub fn cancel_on_drop(&self) -> DropGuard {
        self.token.clone().drop_guard()
    }

    /// Cancel this context and every child derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns the reason this context is done, or `None` while it is live.
    pub fn error(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
            return Some(ContextError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> ContextError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.token.cancelled() => ContextError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => ContextError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                ContextError::Cancelled
            }
        }
    }

    /// Drive `fut` to completion unless the context finishes first.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, ContextError> {
        if let Some(err) = self.error() {
            return Err(err);
        }
        tokio::select! {
            output = fut => Ok(output),
            err = self.done() => Err(err),
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::background()
    }
}
