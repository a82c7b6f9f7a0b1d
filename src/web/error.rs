use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::search::SearchError;

/// Error returned by the JSON API as `{"error": "message"}`.
#[derive(Debug)]
pub enum ApiError {
    /// 503, the professor store could not be opened.
    Unavailable(String),
    /// 500, details are logged and not sent to the client.
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            Self::Unavailable(msg) => msg,
            Self::Internal(err) => {
                tracing::error!(error = ?err, "internal server error");
                "internal server error".to_owned()
            }
        };
        let body = serde_json::json!({ "error": message });
        (status, Json(body)).into_response()
    }
}

impl From<SearchError> for ApiError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::Unavailable => Self::Unavailable(err.to_string()),
            SearchError::Store(_) => Self::Internal(err.into()),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(err.into())
    }
}
