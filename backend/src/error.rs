use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt::Display;
use tracing::error;
use validator::ValidationErrors;

use crate::{
    attachments::AttachmentError, documents::RenderError, notifications::NotifyError,
    payments::PaymentError, submissions::StoreError,
};

pub type AppResult<T> = Result<T, AppError>;

pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    details: Option<Value>,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn validation(details: Value) -> Self {
        Self::bad_request("Validation failed").with_details(details)
    }

    pub fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN, "Unauthorized access")
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    /// Logs `cause` and answers with a generic 500 body.
    pub fn internal<E: Display>(cause: E) -> Self {
        Self::internal_with(INTERNAL_ERROR_MESSAGE, cause)
    }

    pub fn internal_with<E: Display>(public_message: &str, cause: E) -> Self {
        error!(error = %cause, "{public_message}");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, public_message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.message,
            details: self.details,
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl From<ValidationErrors> for AppError {
    fn from(value: ValidationErrors) -> Self {
        let details = serde_json::to_value(&value).unwrap_or_else(|_| json!(value.to_string()));
        AppError::validation(details)
    }
}

impl From<JsonRejection> for AppError {
    fn from(value: JsonRejection) -> Self {
        AppError::validation(json!({ "body": value.body_text() }))
    }
}

impl From<QueryRejection> for AppError {
    fn from(value: QueryRejection) -> Self {
        AppError::validation(json!({ "query": value.body_text() }))
    }
}

impl From<AttachmentError> for AppError {
    fn from(value: AttachmentError) -> Self {
        match value.reason() {
            Some(reason) => {
                AppError::bad_request(value.to_string()).with_details(json!({ "reason": reason }))
            }
            None => AppError::internal_with("Upload failed", value),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Validation(errors) => AppError::from(errors),
            other => AppError::internal(other),
        }
    }
}

impl From<RenderError> for AppError {
    fn from(value: RenderError) -> Self {
        AppError::internal_with("Failed to generate PDF", value)
    }
}

impl From<NotifyError> for AppError {
    fn from(value: NotifyError) -> Self {
        AppError::internal_with("Failed to send email", value)
    }
}

impl From<PaymentError> for AppError {
    fn from(value: PaymentError) -> Self {
        match value {
            PaymentError::NotFound => AppError::not_found(value.to_string()),
            PaymentError::InvalidDetails(_) => AppError::bad_request(value.to_string()),
            PaymentError::InvalidTransition { .. }
            | PaymentError::AttemptInFlight(_)
            | PaymentError::AlreadyPaid(_) => AppError::conflict(value.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError::internal(format!("{value:#}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        AppError::internal(value)
    }
}
