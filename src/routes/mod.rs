//! Router for the TLS listener.
//!
//! The front-end does no application routing: it answers a liveness probe,
//! optionally serves a static document root, and returns 404 for everything
//! else. HSTS and request-id layers wrap every response, errors included.

pub mod health;

use axum::{middleware, routing::get, Router};
use tower_http::services::ServeDir;

use crate::config::AppConfig;
use crate::error::FrontendError;
use crate::http::hsts::hsts_layer;
use crate::middleware::{request_id_layer, Listener};

async fn not_found(uri: axum::http::Uri) -> FrontendError {
    FrontendError::NotFound(uri.path().to_string())
}

/// Creates the router served over TLS.
pub fn create_router(config: &AppConfig) -> Router {
    let mut router = Router::new().route("/health", get(health::health));

    router = match &config.listen.document_root {
        Some(root) => {
            tracing::info!(root = %root.display(), "Serving document root");
            router.fallback_service(ServeDir::new(root))
        }
        None => router.fallback(not_found),
    };

    // Added after routing so 404s and errors carry the header too
    if let Some(layer) = hsts_layer(&config.hsts) {
        router = router.layer(layer);
    }

    // Request ID middleware - creates root span with request_id for correlation
    router.layer(middleware::from_fn_with_state(Listener::Tls, request_id_layer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::header::STRICT_TRANSPORT_SECURITY;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::middleware::REQUEST_ID_HEADER;

    async fn get_path(router: Router, path: &str) -> axum::response::Response {
        router
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_carries_hsts() {
        let response = get_path(create_router(&AppConfig::default()), "/health").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[STRICT_TRANSPORT_SECURITY], "max-age=63072000");
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_not_found_carries_hsts() {
        let response = get_path(create_router(&AppConfig::default()), "/missing").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[STRICT_TRANSPORT_SECURITY], "max-age=63072000");
    }

    #[tokio::test]
    async fn test_hsts_disabled() {
        let mut config = AppConfig::default();
        config.hsts.enabled = false;
        let response = get_path(create_router(&config), "/health").await;
        assert!(!response.headers().contains_key(STRICT_TRANSPORT_SECURITY));
    }

    #[tokio::test]
    async fn test_document_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>hi</h1>").unwrap();

        let mut config = AppConfig::default();
        config.listen.document_root = Some(dir.path().to_path_buf());
        config.hsts.include_subdomains = true;

        let response = get_path(create_router(&config), "/index.html").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[STRICT_TRANSPORT_SECURITY],
            "max-age=63072000; includeSubDomains"
        );
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"<h1>hi</h1>");

        let response = get_path(create_router(&config), "/nope.html").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
