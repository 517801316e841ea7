//! gNMI server runtime.
//!
//! Exposes gNMI Get/Set and gRPC health Check/Watch over one HTTP/2 listener.
//! Business logic is supplied by the embedding code as per-origin handlers.
//!
//! # Architecture Overview
//!
//! ```text
//!   client ──▶ net::Listener ──▶ net::TlsAcceptor ──▶ http::server (HTTP/2)
//!                  (limit)        (CredentialCache)        │
//!                                                          ▼
//!                                                   http::grpc (frames)
//!                                                          │
//!                                                          ▼
//!                 service::Dispatcher ──▶ AdmissionController (max_rpc)
//!                          │
//!                          ▼
//!                 HandlerRegistry (role, origin) ──▶ caller's handler
//! ```

pub mod admission;
pub mod client;
pub mod config;
pub mod context;
pub mod demo;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod proto;
pub mod registry;
pub mod secrets;
pub mod service;
pub mod tls;

pub use admission::{AdmissionController, AdmissionError, AdmissionPermit};
pub use client::GnmiClient;
pub use config::{AppConfig, ServerConfig};
pub use context::{ContextError, RequestContext};
pub use http::{GrpcServer, ServerError};
pub use lifecycle::Shutdown;
pub use registry::{
    delete_handler, read_handler, update_handler, DeleteHandler, HandlerRegistry, ReadHandler,
    ReplaceHandler, UpdateHandler,
};
pub use secrets::{DirSecretStore, MemorySecretStore, SecretError, SecretStore, TlsSecret};
pub use service::{check_handler, watch_handler, CheckHandler, Dispatcher, WatchHandler, WatchSink};
pub use tonic::{Code, Status};
pub use tls::CredentialCache;
