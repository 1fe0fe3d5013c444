use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use kartiquo_core::domain::validation::ValidationError;

/// Error returned by every handler. Serialized as `{"error": message}`.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn unavailable(msg: &str) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: msg.to_string(),
            internal: None,
        }
    }

    /// The advice service failed or answered outside its contract.
    pub fn bad_gateway(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: "advice service unavailable".to_string(),
            internal: Some(err),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(err) = &self.internal {
            sentry_anyhow::capture_anyhow(err);
            tracing::error!(status = %self.status, error = %format!("{err:#}"), "request failed");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        if let Some(message) = rejection_message(&err) {
            return Self::bad_request(&message);
        }
        if let Some(validation) = err.downcast_ref::<ValidationError>() {
            return Self::bad_request(&validation.to_string());
        }
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "internal error".to_string(),
            internal: Some(err),
        }
    }
}

/// Extractor rejections are client mistakes: a missing field, a value of the
/// wrong type, an unparsable query or path segment.
fn rejection_message(err: &anyhow::Error) -> Option<String> {
    if let Some(r) = err.downcast_ref::<JsonRejection>() {
        return Some(r.body_text());
    }
    if let Some(r) = err.downcast_ref::<QueryRejection>() {
        return Some(r.body_text());
    }
    err.downcast_ref::<PathRejection>().map(|r| r.body_text())
}
