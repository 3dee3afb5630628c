use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Errors answered over the TLS listener.
#[derive(Debug, thiserror::Error)]
pub enum FrontendError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for FrontendError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            FrontendError::NotFound(_) => (StatusCode::NOT_FOUND, "not found".to_string()),
            FrontendError::BadRequest(reason) => (StatusCode::BAD_REQUEST, reason.clone()),
            FrontendError::Internal(_) => {
                tracing::error!("Internal error: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        (status, format!("{}\n", message)).into_response()
    }
}
