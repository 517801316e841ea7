//! gNMI Get and Set dispatch.

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tonic::Status;

use super::{finish, Dispatcher};
use crate::context::RequestContext;
use crate::proto::gnmi::{GetRequest, GetResponse, Path, SetRequest, SetResponse};
use crate::registry::{self, Role};

/// Origin used to look up the handler for `path`.
///
/// The path's own origin wins when it is set; otherwise the request prefix's
/// origin applies. Both empty means the default (empty) origin.
pub fn effective_origin<'a>(prefix: Option<&'a Path>, path: Option<&'a Path>) -> &'a str {
    match path {
        Some(p) if !p.origin.is_empty() => &p.origin,
        _ => prefix.map(|p| p.origin.as_str()).unwrap_or_default(),
    }
}

impl Dispatcher {
    /// Serve a Get. Every path is routed to the Read handler of its origin
    /// in request order; the first failure aborts the whole call.
    pub async fn get(&self, ctx: &RequestContext, req: GetRequest) -> Result<GetResponse, Status> {
        let started = Instant::now();
        let (ctx, _release) = ctx.bounded(self.timeout);
        let result: Result<GetResponse, Status> = async {
            let _permit = self.admission.acquire(&ctx).await?;
            ctx.run(self.dispatch_get(&ctx, req)).await?
        }
        .await;
        finish("Get", started, &result);
        result
    }

    async fn dispatch_get(&self, ctx: &RequestContext, req: GetRequest) -> Result<GetResponse, Status> {
        if req.path.is_empty() {
            return Err(Status::invalid_argument("missing path"));
        }

        let req = Arc::new(req);
        let mut notifications = Vec::with_capacity(req.path.len());
        for path in &req.path {
            let origin = effective_origin(req.prefix.as_ref(), Some(path));
            let handler = self.resolve::<registry::Read>(origin)?;
            tracing::debug!(request_id = %ctx.id(), origin, path = %path, "Dispatching get");
            let rsp = handler(ctx.clone(), Arc::clone(&req)).await?;
            notifications.extend(rsp.notification);
        }

        Ok(GetResponse {
            notification: notifications,
        })
    }

    /// Serve a Set. Operations run strictly as deletes, then replaces, then
    /// updates, each phase in request order. The timestamp is only attached
    /// once every phase has succeeded.
    pub async fn set(&self, ctx: &RequestContext, req: SetRequest) -> Result<SetResponse, Status> {
        let started = Instant::now();
        let (ctx, _release) = ctx.bounded(self.timeout);
        let result: Result<SetResponse, Status> = async {
            let _permit = self.admission.acquire(&ctx).await?;
            ctx.run(self.dispatch_set(&ctx, req)).await?
        }
        .await;
        finish("Set", started, &result);
        result
    }

    async fn dispatch_set(&self, ctx: &RequestContext, req: SetRequest) -> Result<SetResponse, Status> {
        let SetRequest {
            prefix,
            delete,
            replace,
            update,
        } = req;

        let total = delete.len() + replace.len() + update.len();
        if total == 0 {
            return Err(Status::invalid_argument("missing operations"));
        }

        let mut results = Vec::with_capacity(total);

        for path in delete {
            let origin = effective_origin(prefix.as_ref(), Some(&path));
            let handler = self.resolve::<registry::Delete>(origin)?;
            tracing::debug!(request_id = %ctx.id(), origin, path = %path, "Dispatching delete");
            let rsp = handler(ctx.clone(), prefix.clone(), path).await?;
            results.extend(rsp.response);
        }

        for upd in replace {
            let origin = effective_origin(prefix.as_ref(), upd.path.as_ref());
            let handler = self.resolve::<registry::Replace>(origin)?;
            tracing::debug!(request_id = %ctx.id(), origin, "Dispatching replace");
            let rsp = handler(ctx.clone(), prefix.clone(), upd).await?;
            results.extend(rsp.response);
        }

        for upd in update {
            let origin = effective_origin(prefix.as_ref(), upd.path.as_ref());
            let handler = self.resolve::<registry::Update>(origin)?;
            tracing::debug!(request_id = %ctx.id(), origin, "Dispatching update");
            let rsp = handler(ctx.clone(), prefix.clone(), upd).await?;
            results.extend(rsp.response);
        }

        Ok(SetResponse {
            prefix,
            response: results,
            timestamp: unix_nanos(),
        })
    }

    fn resolve<R: Role>(&self, origin: &str) -> Result<R::Handler, Status> {
        self.registry
            .resolve::<R>(origin)
            .map_err(|_| Status::invalid_argument(format!("unknown origin {:?}", origin)))
    }
}

fn unix_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(origin: &str) -> Path {
        Path {
            origin: origin.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn path_origin_wins_over_prefix() {
        let prefix = path("prefix");
        let p = path("openconfig");
        assert_eq!(effective_origin(Some(&prefix), Some(&p)), "openconfig");
    }

    #[test]
    fn prefix_origin_used_when_path_origin_empty() {
        let prefix = path("prefix");
        let p = path("");
        assert_eq!(effective_origin(Some(&prefix), Some(&p)), "prefix");
        assert_eq!(effective_origin(Some(&prefix), None), "prefix");
    }

    #[test]
    fn default_origin_when_both_empty() {
        assert_eq!(effective_origin(None, Some(&path(""))), "");
        assert_eq!(effective_origin(None, None), "");
    }
}
