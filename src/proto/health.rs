//! gRPC health checking messages (`grpc.health.v1`).

use serde::{Deserialize, Serialize};

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct HealthCheckRequest {
    #[prost(string, tag = "1")]
    #[serde(default)]
    pub service: String,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    #[prost(enumeration = "health_check_response::ServingStatus", tag = "1")]
    #[serde(default)]
    pub status: i32,
}

pub mod health_check_response {
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[derive(Serialize, Deserialize)]
    #[repr(i32)]
    pub enum ServingStatus {
        Unknown = 0,
        Serving = 1,
        NotServing = 2,
        ServiceUnknown = 3,
    }
}

pub use health_check_response::ServingStatus;

impl HealthCheckResponse {
    /// Response carrying `status`.
    pub fn with_status(status: ServingStatus) -> Self {
        Self {
            status: status as i32,
        }
    }
}
