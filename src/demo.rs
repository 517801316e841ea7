//! Echo handlers used by the `gnmi-server` binary.
//!
//! Reads answer with one notification echoing the request prefix and first
//! path; Set operations report success for the path they were given.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::proto::gnmi::update_result::Operation;
use crate::proto::gnmi::{GetResponse, Notification, Path, SetResponse, Update, UpdateResult};
use crate::proto::health::{HealthCheckResponse, ServingStatus};
use crate::registry::{delete_handler, read_handler, update_handler, DeleteHandler, ReadHandler, UpdateHandler};
use crate::service::{check_handler, CheckHandler};

fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or_default()
}

pub fn echo_read() -> ReadHandler {
    read_handler(|ctx, req| async move {
        tracing::debug!(request_id = %ctx.id(), paths = req.path.len(), "Echo get");
        Ok(GetResponse {
            notification: vec![Notification {
                timestamp: now_nanos(),
                prefix: req.prefix.clone(),
                update: req
                    .path
                    .first()
                    .map(|path| Update {
                        path: Some(path.clone()),
                        ..Default::default()
                    })
                    .into_iter()
                    .collect(),
                ..Default::default()
            }],
        })
    })
}

fn result(path: Option<Path>, op: Operation) -> SetResponse {
    SetResponse {
        response: vec![UpdateResult { path, op: op as i32 }],
        ..Default::default()
    }
}

/// Echo for update or replace, reporting `op`.
pub fn echo_update(op: Operation) -> UpdateHandler {
    update_handler(move |_ctx, _prefix, update| async move { Ok(result(update.path, op)) })
}

pub fn echo_delete() -> DeleteHandler {
    delete_handler(|_ctx, _prefix, path| async move { Ok(result(Some(path), Operation::Delete)) })
}

/// Always reports SERVING.
pub fn serving_check() -> CheckHandler {
    check_handler(|_ctx, _req| async { Ok(HealthCheckResponse::with_status(ServingStatus::Serving)) })
}
