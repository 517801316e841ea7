//! gNMI and health client over plaintext HTTP/2.
//!
//! Used by the `gnmi-cli` binary and the integration tests.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE, TE};
use hyper::{Method, Request, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use prost::Message;
use tonic::{Code, Status};

use crate::http::grpc::{
    decode_message, encode_message, format_grpc_timeout, split_frame, status_from_headers,
    CONTENT_TYPE_GRPC, GRPC_TIMEOUT,
};
use crate::http::server::{GNMI_GET, GNMI_SET, HEALTH_CHECK, HEALTH_WATCH};
use crate::proto::gnmi::{GetRequest, GetResponse, SetRequest, SetResponse};
use crate::proto::health::{HealthCheckRequest, HealthCheckResponse};

/// Client for one server endpoint.
#[derive(Debug, Clone)]
pub struct GnmiClient {
    client: Client<HttpConnector, Full<Bytes>>,
    endpoint: Uri,
    timeout: Option<Duration>,
}

impl GnmiClient {
    /// Client for `endpoint`, given as `host:port` or `http://host:port`.
    pub fn new(endpoint: &str) -> Result<Self, Status> {
        let endpoint = if endpoint.contains("://") {
            endpoint.to_string()
        } else {
            format!("http://{}", endpoint)
        };
        let endpoint: Uri = endpoint
            .parse()
            .map_err(|e| Status::invalid_argument(format!("invalid endpoint {:?}: {}", endpoint, e)))?;

        let client = Client::builder(TokioExecutor::new())
            .http2_only(true)
            .build(HttpConnector::new());

        Ok(Self {
            client,
            endpoint,
            timeout: None,
        })
    }

    /// Send `grpc-timeout` with every call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub async fn get(&self, req: &GetRequest) -> Result<GetResponse, Status> {
        self.unary(GNMI_GET, req).await
    }

    pub async fn set(&self, req: &SetRequest) -> Result<SetResponse, Status> {
        self.unary(GNMI_SET, req).await
    }

    pub async fn check(&self, req: &HealthCheckRequest) -> Result<HealthCheckResponse, Status> {
        self.unary(HEALTH_CHECK, req).await
    }

    /// Open a health Watch stream.
    pub async fn watch(&self, req: &HealthCheckRequest) -> Result<WatchStream, Status> {
        let rsp = self.call(HEALTH_WATCH, req).await?;
        if let Some(status) = status_from_headers(rsp.headers()) {
            return Err(if status.code() == Code::Ok {
                Status::internal("stream ended before any message")
            } else {
                status
            });
        }
        Ok(WatchStream {
            body: rsp.into_body(),
            buf: BytesMut::new(),
            finished: false,
        })
    }

    /// Call an arbitrary unary method, e.g. `/gnmi.gNMI/Capabilities`.
    pub async fn unary<Req, Rsp>(&self, path: &str, req: &Req) -> Result<Rsp, Status>
    where
        Req: Message,
        Rsp: Message + Default,
    {
        let rsp = self.call(path, req).await?;

        // Trailers-only response: the call failed before producing a message.
        if let Some(status) = status_from_headers(rsp.headers()) {
            return Err(if status.code() == Code::Ok {
                Status::internal("response carried no message")
            } else {
                status
            });
        }

        let collected = rsp
            .into_body()
            .collect()
            .await
            .map_err(|e| Status::unavailable(format!("reading response: {}", e)))?;
        let status = collected
            .trailers()
            .and_then(status_from_headers)
            .unwrap_or_else(|| Status::internal("response missing grpc-status"));
        if status.code() != Code::Ok {
            return Err(status);
        }

        decode_message(&collected.to_bytes())
    }

    async fn call<Req: Message>(&self, path: &str, req: &Req) -> Result<hyper::Response<Incoming>, Status> {
        let uri = Uri::builder()
            .scheme(self.endpoint.scheme_str().unwrap_or("http"))
            .authority(
                self.endpoint
                    .authority()
                    .map(|a| a.as_str())
                    .unwrap_or_default(),
            )
            .path_and_query(path)
            .build()
            .map_err(|e| Status::invalid_argument(format!("invalid method path {:?}: {}", path, e)))?;

        let mut request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, CONTENT_TYPE_GRPC)
            .header(TE, "trailers");
        if let Some(timeout) = self.timeout {
            if let Ok(value) = HeaderValue::from_str(&format_grpc_timeout(timeout)) {
                request = request.header(GRPC_TIMEOUT, value);
            }
        }
        let request = request
            .body(Full::new(encode_message(req)))
            .map_err(|e| Status::internal(format!("building request: {}", e)))?;

        let rsp = self
            .client
            .request(request)
            .await
            .map_err(|e| Status::unavailable(format!("request failed: {}", e)))?;

        if !rsp.status().is_success() {
            return Err(Status::unknown(format!("unexpected HTTP status {}", rsp.status())));
        }
        Ok(rsp)
    }
}

/// Server-streamed health updates.
#[derive(Debug)]
pub struct WatchStream {
    body: Incoming,
    buf: BytesMut,
    finished: bool,
}

impl WatchStream {
    /// Next update, or `None` once the server ends the stream with OK.
    pub async fn message(&mut self) -> Result<Option<HealthCheckResponse>, Status> {
        loop {
            if let Some(frame) = split_frame(&mut self.buf) {
                return decode_message(&frame).map(Some);
            }
            if self.finished {
                return Ok(None);
            }

            match self.body.frame().await {
                Some(Ok(frame)) => match frame.into_data() {
                    Ok(data) => self.buf.extend_from_slice(&data),
                    Err(frame) => {
                        self.finished = true;
                        let status = frame
                            .trailers_ref()
                            .and_then(status_from_headers)
                            .unwrap_or_else(|| Status::internal("stream missing grpc-status"));
                        if status.code() != Code::Ok {
                            return Err(status);
                        }
                    }
                },
                Some(Err(e)) => {
                    self.finished = true;
                    return Err(Status::unavailable(format!("reading stream: {}", e)));
                }
                None => {
                    self.finished = true;
                    return Err(Status::internal("stream ended without grpc-status"));
                }
            }
        }
    }
}
