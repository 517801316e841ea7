//! gRPC framing over HTTP/2.
//!
//! Messages are carried in DATA frames behind a 5-byte prefix (compressed
//! flag, big-endian length). The call status travels in `grpc-status` /
//! `grpc-message`, either in trailers after the data or, for calls that fail
//! before producing a message, in the response headers (trailers-only).
//! Status encoding itself is `tonic::Status`.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use http_body::Frame;
use prost::Message;

use tonic::{Code, Status};

pub const CONTENT_TYPE_GRPC: &str = "application/grpc";
pub const GRPC_STATUS: &str = "grpc-status";
pub const GRPC_TIMEOUT: &str = "grpc-timeout";

const PREFIX_LEN: usize = 5;

/// Encode `msg` with the 5-byte length prefix.
pub fn encode_message<M: Message>(msg: &M) -> Bytes {
    let len = msg.encoded_len();
    let mut buf = BytesMut::with_capacity(PREFIX_LEN + len);
    buf.put_u8(0);
    buf.put_u32(len as u32);
    // BytesMut grows as needed, so encoding cannot run out of space.
    let _ = msg.encode(&mut buf);
    buf.freeze()
}

/// Decode a single length-prefixed message from a complete request body.
pub fn decode_message<M: Message + Default>(body: &[u8]) -> Result<M, Status> {
    if body.len() < PREFIX_LEN {
        return Err(Status::invalid_argument("gRPC message too short"));
    }
    if body[0] != 0 {
        return Err(Status::unimplemented("compressed gRPC messages are not supported"));
    }

    let len = u32::from_be_bytes([body[1], body[2], body[3], body[4]]) as usize;
    if body.len() < PREFIX_LEN + len {
        return Err(Status::invalid_argument(format!(
            "gRPC message truncated: expected {} bytes, got {}",
            len,
            body.len() - PREFIX_LEN
        )));
    }

    M::decode(&body[PREFIX_LEN..PREFIX_LEN + len])
        .map_err(|e| Status::invalid_argument(format!("decode error: {}", e)))
}

/// Split the next complete frame (prefix included) off `buf`, if there is one.
pub fn split_frame(buf: &mut BytesMut) -> Option<Bytes> {
    if buf.len() < PREFIX_LEN {
        return None;
    }
    let len = (&buf[1..PREFIX_LEN]).get_u32() as usize;
    if buf.len() < PREFIX_LEN + len {
        return None;
    }
    Some(buf.split_to(PREFIX_LEN + len).freeze())
}

/// Insert `grpc-status` and `grpc-message` for `status`.
pub fn insert_status(headers: &mut HeaderMap, status: &Status) {
    if let Err(e) = status.add_header(headers) {
        tracing::warn!(error = %e, "Failed to encode status headers");
        headers.insert(GRPC_STATUS, HeaderValue::from(Code::Internal as i32));
    }
}

/// Read a status from headers or trailers. `None` when `grpc-status` is absent.
pub fn status_from_headers(headers: &HeaderMap) -> Option<Status> {
    Status::from_header_map(headers)
}

/// Parse a `grpc-timeout` value: up to 8 digits followed by a unit
/// (`H`, `M`, `S`, `m`, `u`, `n`).
pub fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    if value.len() < 2 {
        return None;
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    if digits.len() > 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;
    match unit {
        "H" => Some(Duration::from_secs(amount * 3600)),
        "M" => Some(Duration::from_secs(amount * 60)),
        "S" => Some(Duration::from_secs(amount)),
        "m" => Some(Duration::from_millis(amount)),
        "u" => Some(Duration::from_micros(amount)),
        "n" => Some(Duration::from_nanos(amount)),
        _ => None,
    }
}

/// Render a timeout for the `grpc-timeout` header.
pub fn format_grpc_timeout(timeout: Duration) -> String {
    const MAX: u128 = 99_999_999;
    let millis = timeout.as_millis();
    if millis <= MAX {
        format!("{}m", millis.max(1))
    } else {
        format!("{}S", timeout.as_secs().min(MAX as u64))
    }
}

fn grpc_headers() -> axum::http::response::Builder {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, CONTENT_TYPE_GRPC)
}

/// Response carrying no message, with the status in the headers.
pub fn trailers_only(status: Status) -> Response {
    status.into_http().map(Body::new)
}

/// Response for a unary call.
pub fn unary_response<M: Message>(result: Result<M, Status>) -> Response {
    match result {
        Ok(msg) => {
            let body = UnaryBody {
                data: Some(encode_message(&msg)),
                trailers: Some(status_trailers(&Status::ok(""))),
            };
            grpc_headers()
                .body(Body::new(body))
                .unwrap_or_else(|_| trailers_only(Status::internal("failed to build response")))
        }
        Err(status) => trailers_only(status),
    }
}

/// Response for a server-streaming call; `frames` yields data frames and ends
/// with the trailers.
pub fn streaming_response<S>(frames: S) -> Response
where
    S: futures_util::Stream<Item = Result<Frame<Bytes>, Infallible>> + Send + 'static,
{
    grpc_headers()
        .body(Body::new(http_body_util::StreamBody::new(frames)))
        .unwrap_or_else(|_| trailers_only(Status::internal("failed to build response")))
}

/// Trailer map carrying `status`.
pub fn status_trailers(status: &Status) -> HeaderMap {
    let mut trailers = HeaderMap::new();
    insert_status(&mut trailers, status);
    trailers
}

/// One message followed by the status trailers.
struct UnaryBody {
    data: Option<Bytes>,
    trailers: Option<HeaderMap>,
}

impl http_body::Body for UnaryBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        if let Some(data) = self.data.take() {
            return Poll::Ready(Some(Ok(Frame::data(data))));
        }
        if let Some(trailers) = self.trailers.take() {
            return Poll::Ready(Some(Ok(Frame::trailers(trailers))));
        }
        Poll::Ready(None)
    }

    fn is_end_stream(&self) -> bool {
        self.data.is_none() && self.trailers.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::health::{HealthCheckRequest, HealthCheckResponse, ServingStatus};

    #[test]
    fn frame_layout() {
        let msg = HealthCheckRequest {
            service: "gnmi".to_string(),
        };
        let bytes = encode_message(&msg);
        assert_eq!(bytes[0], 0);
        assert_eq!(
            u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize,
            bytes.len() - 5
        );
        assert_eq!(decode_message::<HealthCheckRequest>(&bytes).unwrap(), msg);
    }

    #[test]
    fn truncated_and_compressed_frames_are_rejected() {
        let bytes = encode_message(&HealthCheckResponse::with_status(ServingStatus::Serving));
        let err = decode_message::<HealthCheckResponse>(&bytes[..bytes.len() - 1]).unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);

        let err = decode_message::<HealthCheckResponse>(&[0, 0]).unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);

        let mut compressed = bytes.to_vec();
        compressed[0] = 1;
        let err = decode_message::<HealthCheckResponse>(&compressed).unwrap_err();
        assert_eq!(err.code(), Code::Unimplemented);
    }

    #[test]
    fn split_frame_waits_for_complete_message() {
        let one = encode_message(&HealthCheckResponse::with_status(ServingStatus::Serving));
        let two = encode_message(&HealthCheckResponse::with_status(ServingStatus::NotServing));

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&one[..3]);
        assert!(split_frame(&mut buf).is_none());

        buf.extend_from_slice(&one[3..]);
        buf.extend_from_slice(&two);
        assert_eq!(split_frame(&mut buf).unwrap(), one);
        assert_eq!(split_frame(&mut buf).unwrap(), two);
        assert!(buf.is_empty());
    }

    #[test]
    fn status_headers_round_trip() {
        let status = Status::invalid_argument("unknown origin \"x\" 100% ✓");
        let headers = status_trailers(&status);
        assert_eq!(headers.get(GRPC_STATUS).unwrap(), "3");

        let decoded = status_from_headers(&headers).unwrap();
        assert_eq!(decoded.code(), Code::InvalidArgument);
        assert_eq!(decoded.message(), status.message());
        assert!(status_from_headers(&HeaderMap::new()).is_none());
    }

    #[tokio::test]
    async fn trailers_only_carries_status_in_headers() {
        let rsp = trailers_only(Status::unimplemented("unknown method /x"));
        assert_eq!(rsp.status(), StatusCode::OK);
        assert_eq!(rsp.headers().get(header::CONTENT_TYPE).unwrap(), CONTENT_TYPE_GRPC);

        let status = status_from_headers(rsp.headers()).unwrap();
        assert_eq!(status.code(), Code::Unimplemented);
        assert_eq!(status.message(), "unknown method /x");
    }

    #[test]
    fn grpc_timeout_units() {
        assert_eq!(parse_grpc_timeout("100m"), Some(Duration::from_millis(100)));
        assert_eq!(parse_grpc_timeout("2S"), Some(Duration::from_secs(2)));
        assert_eq!(parse_grpc_timeout("1H"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_grpc_timeout("5n"), Some(Duration::from_nanos(5)));
        assert_eq!(parse_grpc_timeout("123456789S"), None);
        assert_eq!(parse_grpc_timeout("10x"), None);
        assert_eq!(parse_grpc_timeout("m"), None);

        assert_eq!(format_grpc_timeout(Duration::from_secs(5)), "5000m");
        assert_eq!(parse_grpc_timeout(&format_grpc_timeout(Duration::from_secs(5))), Some(Duration::from_secs(5)));
    }
}
