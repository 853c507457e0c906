//! Repository seams over the transactional store.
//!
//! The traits model what the core demands from persistence: plain reads plus
//! a small set of *conditional* writes. Capacity, (user, session) uniqueness
//! and instructor overlap are all check-then-act shapes, so the final
//! accept/reject decision belongs to the store, inside one critical section;
//! the services' own pre-checks are early exits only.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::BookingError;
use crate::models::{
    Booking, BookingStats, BookingStatus, ClassSession, NewSession, SessionFilters,
    SessionOccupancy,
};

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Inserts the session only if the instructor has no overlapping session.
    /// The overlap check and the insert run in one critical section.
    async fn insert_session(&self, new: NewSession) -> Result<ClassSession, BookingError>;

    /// Replaces the session with `merged`, re-checking the instructor
    /// conflict (excluding the session's own id) and that the new capacity
    /// still covers the confirmed bookings, all under one critical section.
    async fn apply_update(
        &self,
        id: Uuid,
        merged: ClassSession,
    ) -> Result<ClassSession, BookingError>;

    /// Deletes the session unless any CONFIRMED or PENDING booking exists.
    async fn delete_session(&self, id: Uuid) -> Result<(), BookingError>;

    async fn get_session(&self, id: Uuid) -> Result<Option<ClassSession>, BookingError>;

    async fn list_sessions(
        &self,
        filters: &SessionFilters,
        now: DateTime<Utc>,
    ) -> Result<Vec<ClassSession>, BookingError>;

    async fn sessions_for_instructor(
        &self,
        instructor_id: Uuid,
    ) -> Result<Vec<ClassSession>, BookingError>;

    /// Live confirmed/waitlisted counts for one session.
    async fn occupancy(&self, session_id: Uuid) -> Result<SessionOccupancy, BookingError>;
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// The arbitration commit: under one critical section, re-verifies that
    /// the user holds no active booking for the session and compares the
    /// confirmed count against capacity, then inserts the booking already
    /// carrying its final status. `payment_id` is attached only when the
    /// booking lands CONFIRMED.
    async fn create_booking_decided(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        waitlist_enabled: bool,
        payment_id: Option<String>,
    ) -> Result<Booking, BookingError>;

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, BookingError>;

    async fn bookings_for_user(&self, user_id: Uuid) -> Result<Vec<Booking>, BookingError>;

    async fn set_status(
        &self,
        booking_id: Uuid,
        status: BookingStatus,
    ) -> Result<Booking, BookingError>;

    /// Promotes the FIFO-earliest WAITLIST booking of the session to
    /// CONFIRMED, only if a seat is actually free at commit time.
    async fn promote_earliest_waitlisted(
        &self,
        session_id: Uuid,
    ) -> Result<Option<Booking>, BookingError>;

    /// Confirms the booking only if a seat is free at commit time, the same
    /// conditional shape as promotion but for one specific booking.
    async fn confirm_if_capacity(&self, booking_id: Uuid) -> Result<Booking, BookingError>;

    async fn booking_stats(&self, session_id: Uuid) -> Result<BookingStats, BookingError>;

    /// Number of CONFIRMED bookings the user currently holds.
    async fn active_confirmed_count(&self, user_id: Uuid) -> Result<u32, BookingError>;

    /// Cancels every WAITLIST booking of the session, returning how many.
    async fn cancel_all_waitlisted(&self, session_id: Uuid) -> Result<u32, BookingError>;
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<Uuid, ClassSession>,
    bookings: HashMap<Uuid, Booking>,
    last_created_at: Option<DateTime<Utc>>,
}

impl Inner {
    fn confirmed_count(&self, session_id: Uuid) -> u32 {
        self.bookings
            .values()
            .filter(|b| b.session_id == session_id && b.status == BookingStatus::Confirmed)
            .count() as u32
    }

    fn waitlisted_count(&self, session_id: Uuid) -> u32 {
        self.bookings
            .values()
            .filter(|b| b.session_id == session_id && b.status == BookingStatus::Waitlisted)
            .count() as u32
    }

    fn conflict_for(
        &self,
        instructor_id: Uuid,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> Option<&ClassSession> {
        self.sessions.values().find(|s| {
            s.instructor_id == instructor_id
                && Some(s.id) != exclude
                && s.overlaps(starts_at, ends_at)
        })
    }

    /// Booking timestamps double as the waitlist FIFO key, so they must be
    /// strictly increasing even when the clock ties.
    fn next_created_at(&mut self) -> DateTime<Utc> {
        let mut ts = Utc::now();
        if let Some(last) = self.last_created_at
            && ts <= last
        {
            ts = last + Duration::microseconds(1);
        }
        self.last_created_at = Some(ts);
        ts
    }
}

/// In-memory stand-in for the external transactional store. One mutex plays
/// the role of row locks and unique constraints: every conditional write is
/// a single lock acquisition.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepository for MemoryStore {
    async fn insert_session(&self, new: NewSession) -> Result<ClassSession, BookingError> {
        let mut inner = self.inner.lock().await;
        if let Some(existing) =
            inner.conflict_for(new.instructor_id, new.starts_at, new.ends_at, None)
        {
            return Err(BookingError::InstructorConflict {
                instructor_id: new.instructor_id,
                conflicting_session_id: existing.id,
                starts_at: existing.starts_at,
                ends_at: existing.ends_at,
            });
        }
        let session = ClassSession {
            id: Uuid::new_v4(),
            class_type: new.class_type,
            instructor_id: new.instructor_id,
            starts_at: new.starts_at,
            ends_at: new.ends_at,
            capacity: new.capacity,
            location: new.location,
            created_at: Utc::now(),
        };
        inner.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn apply_update(
        &self,
        id: Uuid,
        merged: ClassSession,
    ) -> Result<ClassSession, BookingError> {
        let mut inner = self.inner.lock().await;
        if !inner.sessions.contains_key(&id) {
            return Err(BookingError::SessionNotFound { id });
        }
        if let Some(existing) = inner.conflict_for(
            merged.instructor_id,
            merged.starts_at,
            merged.ends_at,
            Some(id),
        ) {
            return Err(BookingError::InstructorConflict {
                instructor_id: merged.instructor_id,
                conflicting_session_id: existing.id,
                starts_at: existing.starts_at,
                ends_at: existing.ends_at,
            });
        }
        let confirmed = inner.confirmed_count(id);
        if merged.capacity < confirmed {
            return Err(BookingError::CapacityBelowBookings {
                requested: merged.capacity,
                confirmed,
            });
        }
        inner.sessions.insert(id, merged.clone());
        Ok(merged)
    }

    async fn delete_session(&self, id: Uuid) -> Result<(), BookingError> {
        let mut inner = self.inner.lock().await;
        if !inner.sessions.contains_key(&id) {
            return Err(BookingError::SessionNotFound { id });
        }
        let (confirmed, pending) = inner
            .bookings
            .values()
            .filter(|b| b.session_id == id && b.status.holds_seat())
            .fold((0u32, 0u32), |(c, p), b| match b.status {
                BookingStatus::Confirmed => (c + 1, p),
                _ => (c, p + 1),
            });
        if confirmed + pending > 0 {
            return Err(BookingError::CannotDeleteWithBookings {
                id,
                confirmed,
                pending,
            });
        }
        inner.sessions.remove(&id);
        Ok(())
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<ClassSession>, BookingError> {
        let inner = self.inner.lock().await;
        Ok(inner.sessions.get(&id).cloned())
    }

    async fn list_sessions(
        &self,
        filters: &SessionFilters,
        now: DateTime<Utc>,
    ) -> Result<Vec<ClassSession>, BookingError> {
        let inner = self.inner.lock().await;
        let mut sessions: Vec<ClassSession> = inner
            .sessions
            .values()
            .filter(|s| {
                filters.instructor_id.is_none_or(|id| s.instructor_id == id)
                    && filters
                        .class_type
                        .as_deref()
                        .is_none_or(|ct| s.class_type.eq_ignore_ascii_case(ct))
                    && filters.from.is_none_or(|from| s.starts_at >= from)
                    && filters.until.is_none_or(|until| s.starts_at <= until)
                    && (filters.include_past || !s.has_started(now))
            })
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.starts_at.cmp(&b.starts_at).then(a.id.cmp(&b.id)));
        Ok(sessions)
    }

    async fn sessions_for_instructor(
        &self,
        instructor_id: Uuid,
    ) -> Result<Vec<ClassSession>, BookingError> {
        let inner = self.inner.lock().await;
        let mut sessions: Vec<ClassSession> = inner
            .sessions
            .values()
            .filter(|s| s.instructor_id == instructor_id)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.starts_at);
        Ok(sessions)
    }

    async fn occupancy(&self, session_id: Uuid) -> Result<SessionOccupancy, BookingError> {
        let inner = self.inner.lock().await;
        let capacity = inner
            .sessions
            .get(&session_id)
            .map(|s| s.capacity)
            .ok_or(BookingError::SessionNotFound { id: session_id })?;
        let confirmed = inner.confirmed_count(session_id);
        Ok(SessionOccupancy {
            confirmed,
            waitlisted: inner.waitlisted_count(session_id),
            available_spots: capacity.saturating_sub(confirmed),
        })
    }
}

#[async_trait]
impl BookingRepository for MemoryStore {
    async fn create_booking_decided(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        waitlist_enabled: bool,
        payment_id: Option<String>,
    ) -> Result<Booking, BookingError> {
        let mut inner = self.inner.lock().await;
        let capacity = inner
            .sessions
            .get(&session_id)
            .map(|s| s.capacity)
            .ok_or(BookingError::SessionNotFound { id: session_id })?;

        // Uniqueness constraint: one active booking per (user, session).
        let duplicate = inner
            .bookings
            .values()
            .any(|b| b.user_id == user_id && b.session_id == session_id && b.status.is_active());
        if duplicate {
            return Err(BookingError::AlreadyBooked {
                user_id,
                session_id,
            });
        }

        let confirmed = inner.confirmed_count(session_id);
        let status = if confirmed < capacity {
            BookingStatus::Confirmed
        } else if waitlist_enabled {
            BookingStatus::Waitlisted
        } else {
            return Err(BookingError::SessionFull { id: session_id });
        };

        let booking = Booking {
            id: Uuid::new_v4(),
            user_id,
            session_id,
            status,
            payment_id: (status == BookingStatus::Confirmed)
                .then_some(payment_id)
                .flatten(),
            created_at: inner.next_created_at(),
        };
        inner.bookings.insert(booking.id, booking.clone());
        Ok(booking)
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, BookingError> {
        let inner = self.inner.lock().await;
        Ok(inner.bookings.get(&id).cloned())
    }

    async fn bookings_for_user(&self, user_id: Uuid) -> Result<Vec<Booking>, BookingError> {
        let inner = self.inner.lock().await;
        let mut bookings: Vec<Booking> = inner
            .bookings
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        bookings.sort_by_key(|b| b.created_at);
        Ok(bookings)
    }

    async fn set_status(
        &self,
        booking_id: Uuid,
        status: BookingStatus,
    ) -> Result<Booking, BookingError> {
        let mut inner = self.inner.lock().await;
        let booking = inner
            .bookings
            .get_mut(&booking_id)
            .ok_or(BookingError::BookingNotFound { id: booking_id })?;
        booking.status = status;
        Ok(booking.clone())
    }

    async fn promote_earliest_waitlisted(
        &self,
        session_id: Uuid,
    ) -> Result<Option<Booking>, BookingError> {
        let mut inner = self.inner.lock().await;
        let capacity = inner
            .sessions
            .get(&session_id)
            .map(|s| s.capacity)
            .ok_or(BookingError::SessionNotFound { id: session_id })?;
        if inner.confirmed_count(session_id) >= capacity {
            return Ok(None);
        }
        let next_id = inner
            .bookings
            .values()
            .filter(|b| b.session_id == session_id && b.status == BookingStatus::Waitlisted)
            .min_by_key(|b| b.created_at)
            .map(|b| b.id);
        let Some(next_id) = next_id else {
            return Ok(None);
        };
        let booking = inner
            .bookings
            .get_mut(&next_id)
            .ok_or(BookingError::BookingNotFound { id: next_id })?;
        booking.status = BookingStatus::Confirmed;
        Ok(Some(booking.clone()))
    }

    async fn confirm_if_capacity(&self, booking_id: Uuid) -> Result<Booking, BookingError> {
        let mut inner = self.inner.lock().await;
        let (session_id, current) = inner
            .bookings
            .get(&booking_id)
            .map(|b| (b.session_id, b.status))
            .ok_or(BookingError::BookingNotFound { id: booking_id })?;
        if current == BookingStatus::Confirmed {
            return Ok(inner.bookings[&booking_id].clone());
        }
        let capacity = inner
            .sessions
            .get(&session_id)
            .map(|s| s.capacity)
            .ok_or(BookingError::SessionNotFound { id: session_id })?;
        if inner.confirmed_count(session_id) >= capacity {
            return Err(BookingError::SessionFull { id: session_id });
        }
        let booking = inner
            .bookings
            .get_mut(&booking_id)
            .ok_or(BookingError::BookingNotFound { id: booking_id })?;
        booking.status = BookingStatus::Confirmed;
        Ok(booking.clone())
    }

    async fn booking_stats(&self, session_id: Uuid) -> Result<BookingStats, BookingError> {
        let inner = self.inner.lock().await;
        let mut stats = BookingStats::default();
        for booking in inner.bookings.values().filter(|b| b.session_id == session_id) {
            match booking.status {
                BookingStatus::Pending => stats.pending += 1,
                BookingStatus::Confirmed => stats.confirmed += 1,
                BookingStatus::Cancelled => stats.cancelled += 1,
                BookingStatus::Waitlisted => stats.waitlisted += 1,
            }
        }
        Ok(stats)
    }

    async fn active_confirmed_count(&self, user_id: Uuid) -> Result<u32, BookingError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .bookings
            .values()
            .filter(|b| b.user_id == user_id && b.status == BookingStatus::Confirmed)
            .count() as u32)
    }

    async fn cancel_all_waitlisted(&self, session_id: Uuid) -> Result<u32, BookingError> {
        let mut inner = self.inner.lock().await;
        let mut cancelled = 0;
        for booking in inner.bookings.values_mut() {
            if booking.session_id == session_id && booking.status == BookingStatus::Waitlisted {
                booking.status = BookingStatus::Cancelled;
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }
}
