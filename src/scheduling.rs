//! Session lifecycle: creation, updates, deletion and the convenience
//! builders on top of them. Instructor-conflict and capacity conditions are
//! re-verified by the store at commit time; the checks here fail fast with
//! the precise error kind.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::future::try_join_all;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::BookingError;
use crate::models::{
    ClassSession, NewSession, RecurringFailure, RecurringOutcome, SessionFilters, SessionPatch,
    SessionView,
};
use crate::settings::BusinessHours;
use crate::store::{BookingRepository, SessionRepository};
use crate::validation::{validate_business_hours, validate_session_capacity, validate_session_timing};

#[derive(Clone)]
pub struct SchedulingService {
    sessions: Arc<dyn SessionRepository>,
    bookings: Arc<dyn BookingRepository>,
    hours: BusinessHours,
}

impl SchedulingService {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        bookings: Arc<dyn BookingRepository>,
        hours: BusinessHours,
    ) -> Self {
        Self {
            sessions,
            bookings,
            hours,
        }
    }

    pub async fn create_session(&self, new: NewSession) -> Result<ClassSession, BookingError> {
        let now = Utc::now();
        validate_session_timing(new.starts_at, new.ends_at, now)?;
        validate_business_hours(new.starts_at, new.ends_at, &self.hours)?;
        // The store runs the overlap check and the insert atomically.
        self.sessions.insert_session(new).await
    }

    pub async fn update_session(
        &self,
        id: Uuid,
        patch: SessionPatch,
    ) -> Result<ClassSession, BookingError> {
        let now = Utc::now();
        let current = self
            .sessions
            .get_session(id)
            .await?
            .ok_or(BookingError::SessionNotFound { id })?;
        if current.has_started(now) {
            return Err(BookingError::PastSession {
                starts_at: current.starts_at,
            });
        }

        let merged = ClassSession {
            id: current.id,
            class_type: patch.class_type.unwrap_or(current.class_type),
            instructor_id: patch.instructor_id.unwrap_or(current.instructor_id),
            starts_at: patch.starts_at.unwrap_or(current.starts_at),
            ends_at: patch.ends_at.unwrap_or(current.ends_at),
            capacity: patch.capacity.unwrap_or(current.capacity),
            location: patch.location.or(current.location),
            created_at: current.created_at,
        };

        validate_session_timing(merged.starts_at, merged.ends_at, now)?;
        validate_business_hours(merged.starts_at, merged.ends_at, &self.hours)?;
        if merged.capacity < current.capacity {
            let occupancy = self.sessions.occupancy(id).await?;
            validate_session_capacity(merged.capacity, occupancy.confirmed)?;
        }

        self.sessions.apply_update(id, merged).await
    }

    pub async fn delete_session(&self, id: Uuid) -> Result<(), BookingError> {
        let stats = self.bookings.booking_stats(id).await?;
        if stats.confirmed + stats.pending > 0 {
            return Err(BookingError::CannotDeleteWithBookings {
                id,
                confirmed: stats.confirmed,
                pending: stats.pending,
            });
        }
        if stats.waitlisted > 0 {
            // Best effort; a failure here must not block the delete.
            match self.bookings.cancel_all_waitlisted(id).await {
                Ok(count) => info!(session_id = %id, count, "cancelled waitlisted bookings before delete"),
                Err(err) => warn!(session_id = %id, error = %err, "failed to cancel waitlisted bookings"),
            }
        }
        self.sessions.delete_session(id).await
    }

    /// Copies a session to a new start, preserving its duration.
    pub async fn duplicate_session(
        &self,
        id: Uuid,
        new_start: DateTime<Utc>,
    ) -> Result<ClassSession, BookingError> {
        let source = self
            .sessions
            .get_session(id)
            .await?
            .ok_or(BookingError::SessionNotFound { id })?;
        let duration = source.ends_at - source.starts_at;
        self.create_session(NewSession {
            class_type: source.class_type,
            instructor_id: source.instructor_id,
            starts_at: new_start,
            ends_at: new_start + duration,
            capacity: source.capacity,
            location: source.location,
        })
        .await
    }

    /// Creates `count` copies of `base` spaced `interval_days` apart. Each
    /// instance is validated independently; failures are collected and do
    /// not abort the batch.
    pub async fn create_recurring_sessions(
        &self,
        base: NewSession,
        count: u32,
        interval_days: u32,
    ) -> Result<RecurringOutcome, BookingError> {
        let mut outcome = RecurringOutcome {
            created: Vec::new(),
            failures: Vec::new(),
        };
        for i in 0..count {
            let offset = Duration::days(i64::from(i) * i64::from(interval_days));
            let instance = NewSession {
                starts_at: base.starts_at + offset,
                ends_at: base.ends_at + offset,
                ..base.clone()
            };
            let starts_at = instance.starts_at;
            match self.create_session(instance).await {
                Ok(session) => outcome.created.push(session),
                Err(err) => outcome.failures.push(RecurringFailure {
                    starts_at,
                    error: err.to_string(),
                }),
            }
        }
        Ok(outcome)
    }

    /// Sessions of `instructor_id` overlapping `[start, end)`, minus
    /// `exclude` (the session being edited, if any).
    pub async fn check_instructor_conflicts(
        &self,
        instructor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> Result<Vec<ClassSession>, BookingError> {
        let sessions = self.sessions.sessions_for_instructor(instructor_id).await?;
        Ok(sessions
            .into_iter()
            .filter(|s| Some(s.id) != exclude && s.overlaps(start, end))
            .collect())
    }

    pub async fn get_session(&self, id: Uuid) -> Result<SessionView, BookingError> {
        let session = self
            .sessions
            .get_session(id)
            .await?
            .ok_or(BookingError::SessionNotFound { id })?;
        let occupancy = self.sessions.occupancy(id).await?;
        Ok(SessionView { session, occupancy })
    }

    pub async fn list_sessions(
        &self,
        filters: SessionFilters,
    ) -> Result<Vec<SessionView>, BookingError> {
        let sessions = self.sessions.list_sessions(&filters, Utc::now()).await?;
        let views = sessions.into_iter().map(|session| async move {
            let occupancy = self.sessions.occupancy(session.id).await?;
            Ok::<_, BookingError>(SessionView { session, occupancy })
        });
        try_join_all(views).await
    }
}
