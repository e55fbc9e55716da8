//! # Error translation
//!
//! Handlers never pick status codes for failures themselves. Anything that goes
//! wrong flows up as an [`AppError`] and is classified in exactly one place,
//! [`AppError::classify`], before being rendered as the JSON envelope.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::auth::jwt::TokenError;
use crate::db::StoreError;
use crate::AppState;

/// One rule violation on one field. `field` is a dotted path (`mood.value`,
/// `emotions.0.intensity`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

fn join_messages(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| v.message.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{}", join_messages(.0))]
    Validation(Vec<FieldViolation>),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A failure with a caller-chosen status and public message.
    #[error("{message}")]
    Server {
        status: StatusCode,
        message: String,
        #[source]
        source: StoreError,
    },

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldViolation::new(field, message)])
    }

    /// Map this error onto the status code and message the client sees.
    pub fn classify(&self) -> (StatusCode, String) {
        match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Validation(violations) => {
                (StatusCode::BAD_REQUEST, join_messages(violations))
            }
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::Token(TokenError::Invalid) => {
                (StatusCode::UNAUTHORIZED, "Invalid token".into())
            }
            AppError::Token(TokenError::Expired) => {
                (StatusCode::UNAUTHORIZED, "Token expired".into())
            }
            AppError::Token(TokenError::Signing(_)) => server_error(),
            AppError::Store(StoreError::InvalidId(_)) => {
                (StatusCode::NOT_FOUND, "Resource not found".into())
            }
            AppError::Store(StoreError::Duplicate { field }) => {
                (StatusCode::BAD_REQUEST, format!("{field} already exists"))
            }
            AppError::Store(_) => server_error(),
            AppError::Server {
                status, message, ..
            } => (*status, message.clone()),
            AppError::Internal(_) => server_error(),
        }
    }

    fn violations(&self) -> Option<&[FieldViolation]> {
        match self {
            AppError::Validation(v) => Some(v),
            _ => None,
        }
    }

    /// Debug rendering with the full source chain, exposed outside production.
    fn trace(&self) -> String {
        let mut trace = format!("{self:?}");
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            trace.push_str("\ncaused by: ");
            trace.push_str(&err.to_string());
            source = err.source();
        }
        trace
    }
}

fn server_error() -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, "Server Error".into())
}

/// Turn backend persistence failures into a 500 with a resource-specific
/// message. Identifier and uniqueness failures keep their own classification.
pub trait StoreResultExt<T> {
    fn or_server_error(self, message: &str) -> AppResult<T>;
}

impl<T> StoreResultExt<T> for Result<T, StoreError> {
    fn or_server_error(self, message: &str) -> AppResult<T> {
        self.map_err(|err| match err {
            StoreError::InvalidId(_) | StoreError::Duplicate { .. } => AppError::Store(err),
            source => AppError::Server {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: message.to_string(),
                source,
            },
        })
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<&'a [FieldViolation]>,
}

/// Debug trace riding along on error responses until [`expose_error_trace`]
/// decides whether the client may see it.
#[derive(Debug, Clone)]
pub struct ErrorTrace(pub String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.classify();

        if status.is_server_error() {
            tracing::error!(error = %self, detail = ?self, status = status.as_u16(), "Request failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let body = ErrorBody {
            success: false,
            message,
            errors: self.violations(),
        };
        let mut response = (status, Json(body)).into_response();
        response.extensions_mut().insert(ErrorTrace(self.trace()));
        response
    }
}

/// Adds a `stack` field to error bodies outside production.
pub async fn expose_error_trace(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let mut response = next.run(req).await;
    let Some(ErrorTrace(trace)) = response.extensions_mut().remove::<ErrorTrace>() else {
        return response;
    };
    if state.config.is_production() {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "Failed to buffer error body");
            return (parts.status, Json(serde_json::json!({
                "success": false,
                "message": "Server Error",
            })))
                .into_response();
        }
    };
    let mut body: serde_json::Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(_) => return Response::from_parts(parts, Body::from(bytes)),
    };
    if let Some(map) = body.as_object_mut() {
        map.insert("stack".into(), serde_json::Value::String(trace));
    }
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(body.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn test_classify_table() {
        let cases: Vec<(AppError, StatusCode, &str)> = vec![
            (
                AppError::Store(StoreError::InvalidId("xyz".into())),
                StatusCode::NOT_FOUND,
                "Resource not found",
            ),
            (
                AppError::Store(StoreError::Duplicate {
                    field: "email".into(),
                }),
                StatusCode::BAD_REQUEST,
                "email already exists",
            ),
            (
                AppError::Validation(vec![
                    FieldViolation::new("title", "Title is required"),
                    FieldViolation::new("duration", "Duration must be at least 1 minute"),
                ]),
                StatusCode::BAD_REQUEST,
                "Title is required, Duration must be at least 1 minute",
            ),
            (
                AppError::Token(TokenError::Invalid),
                StatusCode::UNAUTHORIZED,
                "Invalid token",
            ),
            (
                AppError::Token(TokenError::Expired),
                StatusCode::UNAUTHORIZED,
                "Token expired",
            ),
            (
                AppError::NotFound("Activity not found".into()),
                StatusCode::NOT_FOUND,
                "Activity not found",
            ),
            (
                AppError::Internal(anyhow::anyhow!("disk on fire")),
                StatusCode::INTERNAL_SERVER_ERROR,
                "Server Error",
            ),
            (
                AppError::Store(StoreError::NotAnObject),
                StatusCode::INTERNAL_SERVER_ERROR,
                "Server Error",
            ),
        ];

        for (err, status, message) in cases {
            assert_eq!(err.classify(), (status, message.to_string()), "{err:?}");
        }
    }

    #[test]
    fn test_or_server_error_keeps_id_and_duplicate_classes() {
        let invalid: Result<(), StoreError> = Err(StoreError::InvalidId("x".into()));
        let err = invalid.or_server_error("Error fetching posts").unwrap_err();
        assert_eq!(err.classify().0, StatusCode::NOT_FOUND);

        let backend: Result<(), StoreError> = Err(StoreError::NotAnObject);
        let err = backend.or_server_error("Error fetching posts").unwrap_err();
        assert_eq!(
            err.classify(),
            (StatusCode::INTERNAL_SERVER_ERROR, "Error fetching posts".into())
        );
    }

    #[tokio::test]
    async fn test_error_envelope_shape() {
        let response = AppError::validation("title", "Title is required").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.extensions().get::<ErrorTrace>().is_some());

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Title is required");
        assert_eq!(json["errors"][0]["field"], "title");
    }

    #[tokio::test]
    async fn test_non_validation_errors_have_no_field_list() {
        let response = AppError::NotFound("Survey not found".into()).into_response();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(json.get("errors").is_none());
    }
}
