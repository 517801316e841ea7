//! Protocol message types.
//!
//! # Data Flow
//! ```text
//! HTTP/2 DATA frames
//!     → http::grpc (5-byte length prefix)
//!     → prost decode into gnmi.rs / health.rs types
//!     → service dispatcher
//! ```
//!
//! # Design Decisions
//! - Types are declared with prost derives instead of build-time codegen
//! - Field tags follow the published schemas; nothing here is invented
//! - serde derives exist for the CLI's JSON output

pub mod gnmi;
pub mod health;
