//! Request ID middleware for correlating logs with requests.
//!
//! Every request on either listener gets a UUID v4 and a span carrying it.
//! The ID is echoed back in `x-request-id`.

use std::fmt;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Request ID, available to handlers through request extensions.
#[derive(Clone, Debug)]
pub struct RequestId(pub Uuid);

/// Which listener accepted the request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Listener {
    Tls,
    Redirect,
}

impl fmt::Display for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Listener::Tls => write!(f, "tls"),
            Listener::Redirect => write!(f, "redirect"),
        }
    }
}

/// Outermost layer: wraps the request in a span and logs completion.
pub async fn request_id_layer(
    State(listener): State<Listener>,
    mut request: Request,
    next: Next,
) -> Response {
    let request_id = Uuid::new_v4();

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        listener = %listener,
        method = %request.method(),
        path = %request.uri().path(),
        duration_ms = tracing::field::Empty,
    );

    let start = Instant::now();
    request.extensions_mut().insert(RequestId(request_id));

    async move {
        let mut response = next.run(request).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        tracing::Span::current().record("duration_ms", duration_ms);
        tracing::info!(
            status = response.status().as_u16(),
            duration_ms,
            "Request completed"
        );

        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        response
    }
    .instrument(span)
    .await
}
