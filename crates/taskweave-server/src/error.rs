use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use taskweave_core::TaskweaveError;

/// Error body returned by every route.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub trace_id: Option<String>,
}

/// HTTP-facing wrapper around [`TaskweaveError`].
#[derive(Debug)]
pub struct ApiError(pub TaskweaveError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            TaskweaveError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            TaskweaveError::Planning { .. } => StatusCode::BAD_GATEWAY,
            TaskweaveError::Orchestration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<TaskweaveError> for ApiError {
    fn from(err: TaskweaveError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.0.kind(),
            message: self.0.to_string(),
            trace_id: self.0.trace_id().map(|t| t.to_string()),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskweave_core::TraceId;

    #[test]
    fn status_mapping() {
        assert_eq!(
            ApiError(TaskweaveError::validation("x")).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError(TaskweaveError::planning("x")).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError(TaskweaveError::orchestration("x")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn body_carries_kind_and_trace() {
        let err = TaskweaveError::planning("bad json").with_trace(&TraceId::from_raw("trace_1"));
        let resp = ApiError::from(err).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"], "planning_failure");
        assert_eq!(json["message"], "planning failed: bad json");
        assert_eq!(json["trace_id"], "trace_1");
    }
}
