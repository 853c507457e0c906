use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

/// Domain failures of the booking and scheduling core. Every gate maps to
/// its own variant so callers can branch on the kind rather than parse
/// messages.
#[derive(Debug, Error)]
pub enum BookingError {
    #[error("session {id} not found")]
    SessionNotFound { id: Uuid },
    #[error("invalid time range: {reason}")]
    InvalidTimeRange { reason: String },
    #[error("instructor {instructor_id} already teaches session {conflicting_session_id} from {starts_at} to {ends_at}")]
    InstructorConflict {
        instructor_id: Uuid,
        conflicting_session_id: Uuid,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    },
    #[error("cannot reduce capacity to {requested}: {confirmed} confirmed bookings exist")]
    CapacityBelowBookings { requested: u32, confirmed: u32 },
    #[error("session {id} has {confirmed} confirmed and {pending} pending bookings and cannot be deleted")]
    CannotDeleteWithBookings {
        id: Uuid,
        confirmed: u32,
        pending: u32,
    },
    #[error("session started at {starts_at} and can no longer be modified or booked")]
    PastSession { starts_at: DateTime<Utc> },
    #[error("session {id} is full")]
    SessionFull { id: Uuid },
    #[error("user {user_id} already has a booking for session {session_id}")]
    AlreadyBooked { user_id: Uuid, session_id: Uuid },
    #[error("booking {id} not found")]
    BookingNotFound { id: Uuid },
    #[error("booking belongs to another user")]
    Unauthorized,
    #[error("cannot cancel: {reason}")]
    CannotCancel { reason: String },
    #[error("user holds {count} active bookings, the maximum is {max}")]
    BookingLimitExceeded { count: u32, max: u32 },
    #[error("session falls outside business hours ({open} - {close})")]
    OutsideBusinessHours { open: String, close: String },
    #[error("cannot transition booking from {from:?} to {to:?}")]
    InvalidStatusTransition {
        from: crate::models::BookingStatus,
        to: crate::models::BookingStatus,
    },
    #[error("payment declined: {reason}")]
    PaymentDeclined { reason: String },
    #[error("storage failure: {0}")]
    Database(String),
}

impl BookingError {
    /// Stable machine-readable code included in every error response.
    pub fn code(&self) -> &'static str {
        match self {
            BookingError::SessionNotFound { .. } => "SESSION_NOT_FOUND",
            BookingError::InvalidTimeRange { .. } => "INVALID_TIME_RANGE",
            BookingError::InstructorConflict { .. } => "INSTRUCTOR_CONFLICT",
            BookingError::CapacityBelowBookings { .. } => "CAPACITY_BELOW_BOOKINGS",
            BookingError::CannotDeleteWithBookings { .. } => "CANNOT_DELETE_WITH_BOOKINGS",
            BookingError::PastSession { .. } => "PAST_SESSION",
            BookingError::SessionFull { .. } => "SESSION_FULL",
            BookingError::AlreadyBooked { .. } => "ALREADY_BOOKED",
            BookingError::BookingNotFound { .. } => "BOOKING_NOT_FOUND",
            BookingError::Unauthorized => "UNAUTHORIZED",
            BookingError::CannotCancel { .. } => "CANNOT_CANCEL",
            BookingError::BookingLimitExceeded { .. } => "BOOKING_LIMIT_EXCEEDED",
            BookingError::OutsideBusinessHours { .. } => "OUTSIDE_BUSINESS_HOURS",
            BookingError::InvalidStatusTransition { .. } => "INVALID_STATUS_TRANSITION",
            BookingError::PaymentDeclined { .. } => "PAYMENT_DECLINED",
            BookingError::Database(_) => "DATABASE_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            BookingError::SessionNotFound { .. } | BookingError::BookingNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            BookingError::Unauthorized => StatusCode::FORBIDDEN,
            BookingError::InstructorConflict { .. }
            | BookingError::CapacityBelowBookings { .. }
            | BookingError::CannotDeleteWithBookings { .. }
            | BookingError::SessionFull { .. }
            | BookingError::AlreadyBooked { .. } => StatusCode::CONFLICT,
            BookingError::InvalidTimeRange { .. }
            | BookingError::PastSession { .. }
            | BookingError::CannotCancel { .. }
            | BookingError::BookingLimitExceeded { .. }
            | BookingError::OutsideBusinessHours { .. }
            | BookingError::InvalidStatusTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            BookingError::PaymentDeclined { .. } => StatusCode::PAYMENT_REQUIRED,
            BookingError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Errors returned by the HTTP layer itself, outside the domain taxonomy.
#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),
    BadRequest(String),
    Domain(BookingError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg).into_response(),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            ApiError::Domain(err) => {
                // Storage internals stay out of the response body.
                let message = match &err {
                    BookingError::Database(cause) => {
                        error!("storage error: {cause}");
                        "internal storage failure".to_string()
                    }
                    other => other.to_string(),
                };
                let body = Json(serde_json::json!({
                    "error": err.code(),
                    "message": message,
                }));
                (err.status(), body).into_response()
            }
        }
    }
}

impl From<BookingError> for ApiError {
    fn from(value: BookingError) -> Self {
        ApiError::Domain(value)
    }
}
