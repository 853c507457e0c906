use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// A single scheduled occurrence of a class with a fixed capacity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ClassSession {
    pub id: Uuid,
    pub class_type: String,
    pub instructor_id: Uuid,
    #[schema(value_type = String, format = "date-time", example = "2026-09-07T06:00:00Z")]
    pub starts_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time", example = "2026-09-07T07:00:00Z")]
    pub ends_at: DateTime<Utc>,
    pub capacity: u32,
    pub location: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

impl ClassSession {
    pub fn duration_minutes(&self) -> i64 {
        (self.ends_at - self.starts_at).num_minutes()
    }

    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now
    }

    /// Half-open interval overlap: `[s1, e1)` and `[s2, e2)` conflict
    /// iff `s1 < e2 && s2 < e1`.
    pub fn overlaps(&self, starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> bool {
        self.starts_at < ends_at && starts_at < self.ends_at
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Waitlisted,
}

impl BookingStatus {
    /// Counts against the session's seat demand and blocks deletion.
    pub fn holds_seat(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn is_active(self) -> bool {
        self != BookingStatus::Cancelled
    }
}

/// A user's claim on a seat in a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub status: BookingStatus,
    pub payment_id: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Instructor {
    pub id: Uuid,
    pub name: String,
}

/// Live seat occupancy derived from booking rows, never cached.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct SessionOccupancy {
    pub confirmed: u32,
    pub waitlisted: u32,
    pub available_spots: u32,
}

/// Per-status booking counts for one session.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct BookingStats {
    pub pending: u32,
    pub confirmed: u32,
    pub cancelled: u32,
    pub waitlisted: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewSession {
    pub class_type: String,
    pub instructor_id: Uuid,
    #[schema(value_type = String, format = "date-time")]
    pub starts_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub ends_at: DateTime<Utc>,
    pub capacity: u32,
    pub location: Option<String>,
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct SessionPatch {
    pub class_type: Option<String>,
    pub instructor_id: Option<Uuid>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub starts_at: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub ends_at: Option<DateTime<Utc>>,
    pub capacity: Option<u32>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionFilters {
    pub instructor_id: Option<Uuid>,
    pub class_type: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub include_past: bool,
}

/// Session joined with its live occupancy, the shape the API returns.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: ClassSession,
    pub occupancy: SessionOccupancy,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, ToSchema)]
pub struct Availability {
    pub available: bool,
    pub spots_remaining: u32,
    pub waitlist_available: bool,
    pub session_full: bool,
}

/// Result of a cancellation, including the best-effort promotion outcome.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CancellationOutcome {
    pub booking: Booking,
    pub refund_eligible: bool,
    pub promoted_booking_id: Option<Uuid>,
}

/// Batch result of recurring-session creation; failures do not abort the batch.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RecurringOutcome {
    pub created: Vec<ClassSession>,
    pub failures: Vec<RecurringFailure>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RecurringFailure {
    #[schema(value_type = String, format = "date-time")]
    pub starts_at: DateTime<Utc>,
    pub error: String,
}
