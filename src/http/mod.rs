//! HTTP/2 transport subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (hyper HTTP/2 connection, axum Router per service)
//!     → grpc.rs (length-prefixed frames, status trailers, grpc-timeout)
//!     → service::Dispatcher
//!     → grpc.rs (encode response + trailers)
//!     → Send to client
//! ```

pub mod grpc;
pub mod server;

pub use server::{GrpcServer, ServerError};
