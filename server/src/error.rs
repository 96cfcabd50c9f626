use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use medsearch_core::SearchError;
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    Search(SearchError),
    BadRequest(String),
    Timeout,
    Internal(String),
}

impl From<SearchError> for ApiError {
    fn from(err: SearchError) -> Self {
        ApiError::Search(err)
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::Search(err) => {
                let status = match &err {
                    SearchError::Validation(_) | SearchError::QuerySyntax(_) => StatusCode::BAD_REQUEST,
                    SearchError::NotFound(_) => StatusCode::NOT_FOUND,
                    SearchError::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    SearchError::IndexCorruption(_) | SearchError::StorageIo(_) | SearchError::Encoding(_) => {
                        tracing::error!(%err, "request failed");
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, err.kind(), err.to_string())
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "validation", msg),
            ApiError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "timeout", "search timed out".to_string()),
            ApiError::Internal(msg) => {
                tracing::error!(%msg, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", msg)
            }
        };
        (status, Json(json!({ "error": kind, "message": message }))).into_response()
    }
}
