//! services/api/src/web/api_error.rs
//!
//! The single error body returned by every endpoint, and the mapping from core
//! errors onto it. Internal failures are logged in full and answered with a
//! generic message.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pickup_core::admission::AdmissionError;
use pickup_core::catalog::CatalogError;
use pickup_core::ports::PortError;
use pickup_core::reports::ReportError;
use pickup_core::tracker::TrackerError;
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

const INTERNAL_MESSAGE: &str = "An internal error occurred. Please try again later.";

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Stable error category, e.g. `invalid-argument` or `resource-exhausted`.
    pub code: String,
    /// Stable reason within the category, e.g. `slot_full`.
    pub reason: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug)]
pub struct HttpError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

fn status_for(code: &str) -> StatusCode {
    match code {
        "invalid-argument" => StatusCode::BAD_REQUEST,
        "unauthenticated" => StatusCode::UNAUTHORIZED,
        "permission-denied" => StatusCode::FORBIDDEN,
        "not-found" => StatusCode::NOT_FOUND,
        "already-exists" | "resource-exhausted" => StatusCode::CONFLICT,
        "aborted" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl HttpError {
    pub fn new(code: &str, reason: &str, message: impl Into<String>) -> Self {
        Self {
            status: status_for(code),
            body: ErrorBody {
                code: code.to_string(),
                reason: reason.to_string(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.body.details = Some(details);
        self
    }

    pub fn invalid(reason: &str, message: impl Into<String>) -> Self {
        Self::new("invalid-argument", reason, message)
    }

    pub fn unauthenticated() -> Self {
        Self::new("unauthenticated", "no_session", "Sign in to continue.")
    }

    /// Logs `cause` and hides it from the client.
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        error!(error = %cause, "Request failed with an internal error");
        Self::new("internal", "internal", INTERNAL_MESSAGE)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<JsonRejection> for HttpError {
    fn from(rejection: JsonRejection) -> Self {
        HttpError::invalid("malformed_body", rejection.body_text())
    }
}

impl From<QueryRejection> for HttpError {
    fn from(rejection: QueryRejection) -> Self {
        HttpError::invalid("malformed_query", rejection.body_text())
    }
}

impl From<PathRejection> for HttpError {
    fn from(rejection: PathRejection) -> Self {
        HttpError::invalid("malformed_path", rejection.body_text())
    }
}

impl From<PortError> for HttpError {
    fn from(e: PortError) -> Self {
        match e {
            PortError::NotFound(what) => HttpError::new("not-found", "not_found", what),
            PortError::Conflict(what) => HttpError::new("already-exists", "conflict", what),
            PortError::Unauthorized => HttpError::unauthenticated(),
            PortError::SlotFull(full) => {
                HttpError::new("resource-exhausted", "slot_full", full.to_string())
            }
            PortError::Contention(_) => HttpError::new(
                "aborted",
                "contention",
                "The service is busy. Please try again.",
            ),
            PortError::Unexpected(_) => HttpError::internal(e),
        }
    }
}

impl From<AdmissionError> for HttpError {
    fn from(e: AdmissionError) -> Self {
        match &e {
            AdmissionError::Port(_) => HttpError::internal(&e),
            AdmissionError::IncompleteLine { issues, .. } => {
                let details = serde_json::json!({ "issues": issues });
                HttpError::new(e.code(), e.reason(), e.to_string()).with_details(details)
            }
            AdmissionError::SlotFull(full) => {
                let details = serde_json::json!({ "used": full.count, "limit": full.limit });
                HttpError::new(e.code(), e.reason(), "This pickup time is fully booked.")
                    .with_details(details)
            }
            _ => HttpError::new(e.code(), e.reason(), e.to_string()),
        }
    }
}

impl From<TrackerError> for HttpError {
    fn from(e: TrackerError) -> Self {
        match &e {
            TrackerError::Port(_) => HttpError::internal(&e),
            _ => HttpError::new(e.code(), e.reason(), e.to_string()),
        }
    }
}

impl From<CatalogError> for HttpError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::StaffOnly => HttpError::new("permission-denied", "staff_only", e.to_string()),
            CatalogError::AdminOnly => HttpError::new("permission-denied", "admin_only", e.to_string()),
            CatalogError::EmptyName => HttpError::invalid("empty_name", e.to_string()),
            CatalogError::InvalidPrice => HttpError::invalid("invalid_price", e.to_string()),
            CatalogError::Port(port) => port.into(),
        }
    }
}

impl From<ReportError> for HttpError {
    fn from(e: ReportError) -> Self {
        match e {
            ReportError::Forbidden => HttpError::new("permission-denied", "admin_only", e.to_string()),
            ReportError::InvertedRange { .. } => HttpError::invalid("inverted_range", e.to_string()),
            ReportError::Port(port) => port.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pickup_core::ledger::{SlotFull, SlotKey};

    #[test]
    fn slot_full_maps_to_conflict_with_counts() {
        let full = SlotFull {
            key: SlotKey::new(NaiveDate::from_ymd_opt(2024, 5, 17).unwrap(), 630),
            count: 5,
            limit: 5,
        };
        let err = HttpError::from(AdmissionError::SlotFull(full));
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.body.code, "resource-exhausted");
        assert_eq!(err.body.reason, "slot_full");
        assert_eq!(err.body.details, Some(serde_json::json!({ "used": 5, "limit": 5 })));
    }

    #[test]
    fn internal_errors_hide_their_cause() {
        let err = HttpError::from(AdmissionError::Port(PortError::Unexpected(
            "connection reset by peer".to_string(),
        )));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.body.message, INTERNAL_MESSAGE);
    }

    #[test]
    fn contention_is_transient() {
        let err = HttpError::from(AdmissionError::Contention { attempts: 3 });
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.body.code, "aborted");
    }
}
