use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::store::StoreError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub code: String,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    Validation(Vec<FieldError>),
    BadRequest(&'static str, String),
    NotFound(&'static str, String),
    Conflict(&'static str, String),
    /// Logged server-side; the client only sees a generic message.
    Internal(String),
}

impl ApiError {
    pub fn invalid_field(field: &'static str, message: impl Into<String>) -> Self {
        ApiError::Validation(vec![FieldError {
            field,
            message: message.into(),
        }])
    }

    pub fn date_out_of_range(field: &'static str) -> Self {
        Self::invalid_field(field, format!("{field} is out of range"))
    }

    pub fn not_found(what: &str) -> Self {
        ApiError::NotFound("NOT_FOUND", format!("{what} not found"))
    }

    pub fn appointment_conflict() -> Self {
        ApiError::Conflict(
            "APPOINTMENT_CONFLICT",
            "The practitioner already has an appointment in this time slot".into(),
        )
    }

    pub fn concurrent_update(what: &str) -> Self {
        ApiError::Conflict(
            "CONCURRENT_UPDATE",
            format!("{what} was changed by someone else, please retry"),
        )
    }

    pub fn already_in_queue() -> Self {
        ApiError::Conflict("ALREADY_IN_QUEUE", "Patient is already in queue".into())
    }

    /// Used where a failed read must not leak store details to the caller.
    pub fn lookup_failed(e: StoreError) -> Self {
        ApiError::Internal(format!("lookup failed: {e}"))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(..) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(..) => StatusCode::NOT_FOUND,
            ApiError::Conflict(..) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn to_error_response(code: &str, message: &str, details: Option<Vec<FieldError>>) -> Json<ErrorResponse> {
        Json(ErrorResponse {
            success: false,
            code: code.to_string(),
            error: message.to_string(),
            details,
        })
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Validation(errors) => {
                let fields: Vec<&str> = errors.iter().map(|e| e.field).collect();
                write!(f, "validation failed: {}", fields.join(", "))
            }
            ApiError::BadRequest(code, msg)
            | ApiError::NotFound(code, msg)
            | ApiError::Conflict(code, msg) => write!(f, "{code}: {msg}"),
            ApiError::Internal(msg) => write!(f, "internal: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::AppointmentConflict => ApiError::appointment_conflict(),
            StoreError::AlreadyQueued => ApiError::already_in_queue(),
            StoreError::NotFound(what) => ApiError::not_found(what),
            StoreError::Stale(what) => ApiError::concurrent_update(what),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest("INVALID_BODY", rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest("INVALID_QUERY", rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            ApiError::Validation(details) => (
                status,
                ApiError::to_error_response("VALIDATION_ERROR", "Invalid input", Some(details)),
            )
                .into_response(),
            ApiError::BadRequest(code, msg)
            | ApiError::NotFound(code, msg)
            | ApiError::Conflict(code, msg) => {
                (status, ApiError::to_error_response(code, &msg, None)).into_response()
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                (
                    status,
                    ApiError::to_error_response("INTERNAL", "Internal server error", None),
                )
                    .into_response()
            }
        }
    }
}

/// Collects field-level problems so a request reports all of them at once.
#[derive(Debug, Default)]
pub struct FieldErrors {
    errors: Vec<FieldError>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, ok: bool, field: &'static str, message: &str) -> &mut Self {
        if !ok {
            self.errors.push(FieldError {
                field,
                message: message.to_string(),
            });
        }
        self
    }

    pub fn finish(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self.errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_errors_collects_every_failure() {
        let mut v = FieldErrors::new();
        v.check(false, "first_name", "required")
            .check(true, "email", "unused")
            .check(false, "last_name", "required");

        let Err(ApiError::Validation(details)) = v.finish() else {
            panic!("expected validation error");
        };
        let fields: Vec<_> = details.iter().map(|d| d.field).collect();
        assert_eq!(fields, vec!["first_name", "last_name"]);
    }

    #[test]
    fn store_errors_map_to_taxonomy() {
        assert_eq!(
            ApiError::from(StoreError::AppointmentConflict).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(StoreError::AlreadyQueued).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(StoreError::NotFound("patient")).status_code(),
            StatusCode::NOT_FOUND
        );
        assert!(matches!(
            ApiError::from(StoreError::Stale("appointment")),
            ApiError::Conflict("CONCURRENT_UPDATE", _)
        ));
    }
}
