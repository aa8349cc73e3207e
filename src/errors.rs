use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::models::{AlternativeSlot, BookingStatus};

/// Failures raised by the scheduling engine.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("service is not active: {0}")]
    ServiceInactive(String),

    #[error("booking not found: {0}")]
    BookingNotFound(String),

    #[error("invalid booking date: {0}")]
    PastOrOutOfWindowDate(String),

    #[error("requested time is outside service hours")]
    OutsideServiceHours,

    #[error("pet does not belong to the requesting user")]
    PetOwnershipMismatch,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no employee available at the requested time")]
    NoEmployeeAvailable,

    #[error("time slot is fully booked")]
    SlotFull,

    #[error("invalid status transition from {} to {}", .from.as_str(), .to.as_str())]
    InvalidStateTransition { from: BookingStatus, to: BookingStatus },

    #[error("persistence error: {0}")]
    Persistence(#[from] anyhow::Error),
}

impl BookingError {
    /// Capacity failures are the ones a caller can answer with alternatives.
    pub fn is_capacity(&self) -> bool {
        matches!(self, BookingError::NoEmployeeAvailable | BookingError::SlotFull)
    }

    pub fn reason_code(&self) -> &'static str {
        match self {
            BookingError::ServiceNotFound(_) => "service_not_found",
            BookingError::ServiceInactive(_) => "service_inactive",
            BookingError::BookingNotFound(_) => "booking_not_found",
            BookingError::PastOrOutOfWindowDate(_) => "past_or_out_of_window_date",
            BookingError::OutsideServiceHours => "outside_service_hours",
            BookingError::PetOwnershipMismatch => "pet_ownership_mismatch",
            BookingError::InvalidInput(_) => "invalid_input",
            BookingError::NoEmployeeAvailable => "no_employee_available",
            BookingError::SlotFull => "slot_full",
            BookingError::InvalidStateTransition { .. } => "invalid_state_transition",
            BookingError::Persistence(_) => "persistence_error",
        }
    }
}

impl From<rusqlite::Error> for BookingError {
    fn from(e: rusqlite::Error) -> Self {
        BookingError::Persistence(e.into())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Booking(#[from] BookingError),

    #[error("{reason}")]
    Unavailable {
        reason: BookingError,
        alternatives: Vec<AlternativeSlot>,
    },

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Booking(e) => match e {
                BookingError::ServiceNotFound(_) | BookingError::BookingNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                BookingError::ServiceInactive(_)
                | BookingError::PastOrOutOfWindowDate(_)
                | BookingError::OutsideServiceHours
                | BookingError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                BookingError::PetOwnershipMismatch => StatusCode::FORBIDDEN,
                BookingError::NoEmployeeAvailable
                | BookingError::SlotFull
                | BookingError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
                BookingError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Unavailable { .. } => StatusCode::CONFLICT,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };

        let body = match self {
            AppError::Unavailable {
                reason,
                alternatives,
            } => serde_json::json!({
                "error": reason.to_string(),
                "reason": reason.reason_code(),
                "alternatives": alternatives,
            }),
            AppError::Booking(BookingError::Persistence(e)) => {
                tracing::error!(error = %e, "persistence failure");
                serde_json::json!({ "error": "internal error" })
            }
            AppError::Booking(e) => serde_json::json!({
                "error": e.to_string(),
                "reason": e.reason_code(),
            }),
            other => serde_json::json!({ "error": other.to_string() }),
        };
        (status, axum::Json(body)).into_response()
    }
}
