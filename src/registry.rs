//! Origin-keyed handler registry.
//!
//! # Responsibilities
//! - Store one handler per (role, origin) pair; later registrations overwrite
//! - Resolve a handler for a role and origin, or report that none exists
//!
//! # Design Decisions
//! - One reader/writer lock covers all four role tables; it is held only for
//!   the map operation, never while a handler runs
//! - No implicit fallback to the empty origin; callers pick the lookup key
//! - Roles are marker types, so `resolve::<Read>` hands back a `ReadHandler`

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use thiserror::Error;
use tonic::Status;

use crate::context::RequestContext;
use crate::proto::gnmi::{self, GetRequest, GetResponse, Path, SetResponse};

/// Future returned by every handler.
pub type HandlerFuture<T> = BoxFuture<'static, Result<T, Status>>;

/// Serves Get paths for an origin. Receives the whole request.
pub type ReadHandler =
    Arc<dyn Fn(RequestContext, Arc<GetRequest>) -> HandlerFuture<GetResponse> + Send + Sync>;

/// Applies one update (or replace) under the request prefix.
pub type UpdateHandler =
    Arc<dyn Fn(RequestContext, Option<Path>, gnmi::Update) -> HandlerFuture<SetResponse> + Send + Sync>;

/// Replace shares the update signature but lives in its own table.
pub type ReplaceHandler = UpdateHandler;

/// Deletes one path under the request prefix.
pub type DeleteHandler =
    Arc<dyn Fn(RequestContext, Option<Path>, Path) -> HandlerFuture<SetResponse> + Send + Sync>;

/// Wrap an async closure as a [`ReadHandler`].
pub fn read_handler<F, Fut>(f: F) -> ReadHandler
where
    F: Fn(RequestContext, Arc<GetRequest>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<GetResponse, Status>> + Send + 'static,
{
    Arc::new(move |ctx, req| Box::pin(f(ctx, req)))
}

/// Wrap an async closure as an [`UpdateHandler`] (also usable for replace).
pub fn update_handler<F, Fut>(f: F) -> UpdateHandler
where
    F: Fn(RequestContext, Option<Path>, gnmi::Update) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<SetResponse, Status>> + Send + 'static,
{
    Arc::new(move |ctx, prefix, update| Box::pin(f(ctx, prefix, update)))
}

/// Wrap an async closure as a [`DeleteHandler`].
pub fn delete_handler<F, Fut>(f: F) -> DeleteHandler
where
    F: Fn(RequestContext, Option<Path>, Path) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<SetResponse, Status>> + Send + 'static,
{
    Arc::new(move |ctx, prefix, path| Box::pin(f(ctx, prefix, path)))
}

/// Runtime name of a handler role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleKind {
    Read,
    Update,
    Replace,
    Delete,
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RoleKind::Read => "read",
            RoleKind::Update => "update",
            RoleKind::Replace => "replace",
            RoleKind::Delete => "delete",
        })
    }
}

mod sealed {
    use super::*;

    #[derive(Default)]
    pub struct Tables {
        pub(super) read: HashMap<String, ReadHandler>,
        pub(super) update: HashMap<String, UpdateHandler>,
        pub(super) replace: HashMap<String, ReplaceHandler>,
        pub(super) delete: HashMap<String, DeleteHandler>,
    }

    pub trait Sealed {}
}

use sealed::Tables;

/// A handler role. Implemented only by [`Read`], [`Update`], [`Replace`] and [`Delete`].
pub trait Role: sealed::Sealed {
    const KIND: RoleKind;
    type Handler: Clone + Send + Sync + 'static;

    #[doc(hidden)]
    fn table(tables: &Tables) -> &HashMap<String, Self::Handler>;
    #[doc(hidden)]
    fn table_mut(tables: &mut Tables) -> &mut HashMap<String, Self::Handler>;
}

macro_rules! role {
    ($(#[$doc:meta])* $name:ident, $kind:ident, $handler:ty, $field:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy)]
        pub struct $name;

        impl sealed::Sealed for $name {}

        impl Role for $name {
            const KIND: RoleKind = RoleKind::$kind;
            type Handler = $handler;

            fn table(tables: &Tables) -> &HashMap<String, Self::Handler> {
                &tables.$field
            }

            fn table_mut(tables: &mut Tables) -> &mut HashMap<String, Self::Handler> {
                &mut tables.$field
            }
        }
    };
}

role!(
    /// Get handlers.
    Read, Read, ReadHandler, read
);
role!(
    /// Set update handlers.
    Update, Update, UpdateHandler, update
);
role!(
    /// Set replace handlers.
    Replace, Replace, ReplaceHandler, replace
);
role!(
    /// Set delete handlers.
    Delete, Delete, DeleteHandler, delete
);

/// No handler is registered for the role and origin.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no {role} handler registered for origin {origin:?}")]
pub struct NotRegistered {
    pub role: RoleKind,
    pub origin: String,
}

/// Thread-safe handler tables owned by one server instance.
#[derive(Default)]
pub struct HandlerRegistry {
    tables: RwLock<Tables>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `handler` for `origin`, returning the handler it replaced.
    pub fn register<R: Role>(&self, origin: impl Into<String>, handler: R::Handler) -> Option<R::Handler> {
        let origin = origin.into();
        tracing::debug!(role = %R::KIND, origin = %origin, "Registering handler");
        R::table_mut(&mut self.tables.write()).insert(origin, handler)
    }

    /// Look up the handler for `origin`. The empty origin is only used when
    /// asked for explicitly.
    pub fn resolve<R: Role>(&self, origin: &str) -> Result<R::Handler, NotRegistered> {
        R::table(&self.tables.read())
            .get(origin)
            .cloned()
            .ok_or_else(|| NotRegistered {
                role: R::KIND,
                origin: origin.to_string(),
            })
    }

    /// Remove the handler for `origin`, if any.
    pub fn unregister<R: Role>(&self, origin: &str) -> Option<R::Handler> {
        R::table_mut(&mut self.tables.write()).remove(origin)
    }

    /// Origins with a handler for role `R`, sorted.
    pub fn origins<R: Role>(&self) -> Vec<String> {
        let mut origins: Vec<String> = R::table(&self.tables.read()).keys().cloned().collect();
        origins.sort();
        origins
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("read", &self.origins::<Read>())
            .field("update", &self.origins::<Update>())
            .field("replace", &self.origins::<Replace>())
            .field("delete", &self.origins::<Delete>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_read() -> ReadHandler {
        read_handler(|_ctx, _req| async { Ok(GetResponse::default()) })
    }

    fn empty_update() -> UpdateHandler {
        update_handler(|_ctx, _prefix, _upd| async { Ok(SetResponse::default()) })
    }

    #[test]
    fn resolve_returns_registered_handler() {
        let registry = HandlerRegistry::new();
        let h = empty_read();
        assert!(registry.register::<Read>("openconfig", h.clone()).is_none());

        let resolved = registry.resolve::<Read>("openconfig").unwrap();
        assert!(Arc::ptr_eq(&resolved, &h));
    }

    #[test]
    fn later_registration_overwrites() {
        let registry = HandlerRegistry::new();
        let h1 = empty_read();
        let h2 = empty_read();
        registry.register::<Read>("openconfig", h1.clone());
        let previous = registry.register::<Read>("openconfig", h2.clone()).unwrap();

        assert!(Arc::ptr_eq(&previous, &h1));
        let resolved = registry.resolve::<Read>("openconfig").unwrap();
        assert!(Arc::ptr_eq(&resolved, &h2));
        assert_eq!(registry.origins::<Read>(), vec!["openconfig".to_string()]);
    }

    #[test]
    fn unknown_origin_has_no_default_fallback() {
        let registry = HandlerRegistry::new();
        registry.register::<Read>("", empty_read());

        let err = registry.resolve::<Read>("openconfig").err().unwrap();
        assert_eq!(err.role, RoleKind::Read);
        assert_eq!(err.origin, "openconfig");
        assert!(registry.resolve::<Read>("").is_ok());
    }

    #[test]
    fn roles_are_independent() {
        let registry = HandlerRegistry::new();
        let update = empty_update();
        registry.register::<Update>("a", update.clone());

        assert!(registry.resolve::<Update>("a").is_ok());
        assert!(registry.resolve::<Replace>("a").is_err());
        assert!(registry.resolve::<Delete>("a").is_err());

        let replace = empty_update();
        registry.register::<Replace>("a", replace.clone());
        assert!(Arc::ptr_eq(&registry.resolve::<Update>("a").unwrap(), &update));
        assert!(Arc::ptr_eq(&registry.resolve::<Replace>("a").unwrap(), &replace));

        assert!(registry.unregister::<Update>("a").is_some());
        assert!(registry.resolve::<Update>("a").is_err());
        assert!(registry.resolve::<Replace>("a").is_ok());
    }
}
