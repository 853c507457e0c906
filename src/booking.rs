//! Booking arbitration: the seat-allocation state machine. Every mutation
//! runs its gates in order, first failure wins, and the final accept/reject
//! lands in a single conditional write at the store.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::error::BookingError;
use crate::models::{Availability, Booking, BookingStatus, CancellationOutcome};
use crate::payment::PaymentGateway;
use crate::store::{BookingRepository, SessionRepository};
use crate::validation::{
    validate_booking_capacity, validate_booking_time, validate_cancellation_time,
    validate_user_booking_limits,
};

#[derive(Clone)]
pub struct ArbitrationService {
    sessions: Arc<dyn SessionRepository>,
    bookings: Arc<dyn BookingRepository>,
    payments: Option<Arc<dyn PaymentGateway>>,
    waitlist_enabled: bool,
    max_active_bookings: u32,
    class_price_cents: u32,
}

impl ArbitrationService {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        bookings: Arc<dyn BookingRepository>,
        payments: Option<Arc<dyn PaymentGateway>>,
        waitlist_enabled: bool,
        max_active_bookings: u32,
        class_price_cents: u32,
    ) -> Self {
        Self {
            sessions,
            bookings,
            payments,
            waitlist_enabled,
            max_active_bookings,
            class_price_cents,
        }
    }

    /// Ordered gates: session exists, booking window open, no duplicate,
    /// per-user cap, seat or waitlist slot available. The gates up to the
    /// final write are early exits; capacity and uniqueness are re-verified
    /// by `create_booking_decided` inside one critical section.
    pub async fn create_booking(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<Booking, BookingError> {
        let now = Utc::now();
        let session = self
            .sessions
            .get_session(session_id)
            .await?
            .ok_or(BookingError::SessionNotFound { id: session_id })?;

        validate_booking_time(session.starts_at, now)?;

        let existing = self.bookings.bookings_for_user(user_id).await?;
        if existing
            .iter()
            .any(|b| b.session_id == session_id && b.status.is_active())
        {
            return Err(BookingError::AlreadyBooked {
                user_id,
                session_id,
            });
        }

        let active = self.bookings.active_confirmed_count(user_id).await?;
        validate_user_booking_limits(active, self.max_active_bookings)?;

        let occupancy = self.sessions.occupancy(session_id).await?;
        let check = validate_booking_capacity(
            occupancy.confirmed,
            session.capacity,
            self.waitlist_enabled,
        );
        if !check.can_book && !check.can_join_waitlist {
            return Err(BookingError::SessionFull { id: session_id });
        }

        // A declined charge must never leave a CONFIRMED row, so the charge
        // is authorized before the row exists at all. Waitlist entries are
        // free until promoted.
        let payment_id = match (&self.payments, check.can_book) {
            (Some(gateway), true) => {
                Some(gateway.authorize(self.class_price_cents, user_id).await?)
            }
            _ => None,
        };

        self.bookings
            .create_booking_decided(user_id, session_id, self.waitlist_enabled, payment_id)
            .await
    }

    pub async fn cancel_booking(
        &self,
        booking_id: Uuid,
        user_id: Uuid,
    ) -> Result<CancellationOutcome, BookingError> {
        let now = Utc::now();
        let booking = self
            .bookings
            .get_booking(booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound { id: booking_id })?;
        if booking.user_id != user_id {
            return Err(BookingError::Unauthorized);
        }
        if booking.status == BookingStatus::Cancelled {
            return Err(BookingError::CannotCancel {
                reason: "booking is already cancelled".to_string(),
            });
        }

        let session = self
            .sessions
            .get_session(booking.session_id)
            .await?
            .ok_or(BookingError::SessionNotFound {
                id: booking.session_id,
            })?;
        let window = validate_cancellation_time(session.starts_at, now)?;

        let cancelled = self
            .bookings
            .set_status(booking_id, BookingStatus::Cancelled)
            .await?;

        // A freed confirmed seat goes to the head of the waitlist. Promotion
        // is best effort and must never fail the cancellation itself.
        let promoted_booking_id = if booking.status == BookingStatus::Confirmed {
            match self
                .bookings
                .promote_earliest_waitlisted(booking.session_id)
                .await
            {
                Ok(promoted) => promoted.map(|b| b.id),
                Err(err) => {
                    warn!(session_id = %booking.session_id, error = %err, "waitlist promotion failed");
                    None
                }
            }
        } else {
            None
        };

        Ok(CancellationOutcome {
            booking: cancelled,
            refund_eligible: window.refund_eligible,
            promoted_booking_id,
        })
    }

    /// Always recomputed from live booking counts; occupancy is never cached.
    pub async fn check_availability(&self, session_id: Uuid) -> Result<Availability, BookingError> {
        let session = self
            .sessions
            .get_session(session_id)
            .await?
            .ok_or(BookingError::SessionNotFound { id: session_id })?;
        let occupancy = self.sessions.occupancy(session_id).await?;
        let check = validate_booking_capacity(
            occupancy.confirmed,
            session.capacity,
            self.waitlist_enabled,
        );
        Ok(Availability {
            available: check.can_book,
            spots_remaining: check.spots_remaining,
            waitlist_available: check.can_join_waitlist,
            session_full: !check.can_book,
        })
    }

    pub async fn get_user_bookings(&self, user_id: Uuid) -> Result<Vec<Booking>, BookingError> {
        self.bookings.bookings_for_user(user_id).await
    }

    pub async fn get_booking(
        &self,
        booking_id: Uuid,
        user_id: Uuid,
    ) -> Result<Booking, BookingError> {
        let booking = self
            .bookings
            .get_booking(booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound { id: booking_id })?;
        if booking.user_id != user_id {
            return Err(BookingError::Unauthorized);
        }
        Ok(booking)
    }

    /// Owner-scoped status change. CANCELLED is terminal; confirming a
    /// PENDING or WAITLISTED booking is gated on live capacity; moving to
    /// CANCELLED goes through the full cancellation flow so the cutoff and
    /// promotion rules apply.
    pub async fn update_booking_status(
        &self,
        booking_id: Uuid,
        user_id: Uuid,
        status: BookingStatus,
    ) -> Result<Booking, BookingError> {
        let booking = self.get_booking(booking_id, user_id).await?;
        match (booking.status, status) {
            (BookingStatus::Cancelled, to) => Err(BookingError::InvalidStatusTransition {
                from: BookingStatus::Cancelled,
                to,
            }),
            (from, to) if from == to => Ok(booking),
            (_, BookingStatus::Cancelled) => self
                .cancel_booking(booking_id, user_id)
                .await
                .map(|outcome| outcome.booking),
            (BookingStatus::Pending | BookingStatus::Waitlisted, BookingStatus::Confirmed) => {
                self.bookings.confirm_if_capacity(booking_id).await
            }
            (from, to) => Err(BookingError::InvalidStatusTransition { from, to }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewSession;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::Duration;

    struct DecliningGateway;

    #[async_trait]
    impl PaymentGateway for DecliningGateway {
        async fn authorize(&self, _: u32, _: Uuid) -> Result<String, BookingError> {
            Err(BookingError::PaymentDeclined {
                reason: "card expired".to_string(),
            })
        }
    }

    struct ApprovingGateway;

    #[async_trait]
    impl PaymentGateway for ApprovingGateway {
        async fn authorize(&self, _: u32, _: Uuid) -> Result<String, BookingError> {
            Ok("pay_ok".to_string())
        }
    }

    fn service(store: &MemoryStore, payments: Option<Arc<dyn PaymentGateway>>) -> ArbitrationService {
        let store = Arc::new(store.clone());
        ArbitrationService::new(store.clone(), store, payments, true, 10, 1500)
    }

    fn service_no_waitlist(store: &MemoryStore) -> ArbitrationService {
        let store = Arc::new(store.clone());
        ArbitrationService::new(store.clone(), store, None, false, 10, 1500)
    }

    async fn seed_session(store: &MemoryStore, hours_ahead: i64, capacity: u32) -> Uuid {
        let starts_at = Utc::now() + Duration::hours(hours_ahead);
        store
            .insert_session(NewSession {
                class_type: "WOD".to_string(),
                instructor_id: Uuid::new_v4(),
                starts_at,
                ends_at: starts_at + Duration::hours(1),
                capacity,
                location: None,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_create_booking_confirms_when_seat_free() {
        let store = MemoryStore::new();
        let service = service(&store, None);
        let session_id = seed_session(&store, 48, 2).await;

        let booking = service
            .create_booking(Uuid::new_v4(), session_id)
            .await
            .unwrap();
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert!(booking.payment_id.is_none());
    }

    #[tokio::test]
    async fn test_create_booking_gates_fire_in_order() {
        let store = MemoryStore::new();
        let service = service(&store, None);
        let user = Uuid::new_v4();

        // Unknown session first.
        let err = service.create_booking(user, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, BookingError::SessionNotFound { .. }));

        // Session in the past.
        let past = seed_session(&store, -1, 5).await;
        let err = service.create_booking(user, past).await.unwrap_err();
        assert!(matches!(err, BookingError::PastSession { .. }));

        // Duplicate booking.
        let session_id = seed_session(&store, 48, 5).await;
        service.create_booking(user, session_id).await.unwrap();
        let err = service.create_booking(user, session_id).await.unwrap_err();
        assert!(matches!(err, BookingError::AlreadyBooked { .. }));
    }

    #[tokio::test]
    async fn test_create_booking_respects_user_limit() {
        let store = MemoryStore::new();
        let store_arc = Arc::new(store.clone());
        let service =
            ArbitrationService::new(store_arc.clone(), store_arc, None, true, 2, 1500);
        let user = Uuid::new_v4();

        for _ in 0..2 {
            let session_id = seed_session(&store, 48, 5).await;
            service.create_booking(user, session_id).await.unwrap();
        }
        let third = seed_session(&store, 48, 5).await;
        let err = service.create_booking(user, third).await.unwrap_err();
        assert!(matches!(
            err,
            BookingError::BookingLimitExceeded { count: 2, max: 2 }
        ));
    }

    #[tokio::test]
    async fn test_full_session_waitlists_or_rejects() {
        let store = MemoryStore::new();
        let session_id = seed_session(&store, 48, 1).await;

        let with_waitlist = service(&store, None);
        with_waitlist
            .create_booking(Uuid::new_v4(), session_id)
            .await
            .unwrap();
        let waitlisted = with_waitlist
            .create_booking(Uuid::new_v4(), session_id)
            .await
            .unwrap();
        assert_eq!(waitlisted.status, BookingStatus::Waitlisted);

        let without = service_no_waitlist(&store);
        let err = without
            .create_booking(Uuid::new_v4(), session_id)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::SessionFull { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_bookings_one_confirmed() {
        let store = MemoryStore::new();
        let service = service(&store, None);
        let session_id = seed_session(&store, 48, 1).await;

        let (a, b) = tokio::join!(
            service.create_booking(Uuid::new_v4(), session_id),
            service.create_booking(Uuid::new_v4(), session_id),
        );
        let statuses = [a.unwrap().status, b.unwrap().status];
        assert_eq!(
            statuses
                .iter()
                .filter(|s| **s == BookingStatus::Confirmed)
                .count(),
            1
        );
        assert_eq!(
            statuses
                .iter()
                .filter(|s| **s == BookingStatus::Waitlisted)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_payment_decline_leaves_no_booking() {
        let store = MemoryStore::new();
        let service = service(&store, Some(Arc::new(DecliningGateway)));
        let session_id = seed_session(&store, 48, 5).await;
        let user = Uuid::new_v4();

        let err = service.create_booking(user, session_id).await.unwrap_err();
        assert!(matches!(err, BookingError::PaymentDeclined { .. }));
        assert!(service.get_user_bookings(user).await.unwrap().is_empty());
        assert_eq!(store.occupancy(session_id).await.unwrap().confirmed, 0);
    }

    #[tokio::test]
    async fn test_payment_id_attached_on_confirmation_only() {
        let store = MemoryStore::new();
        let service = service(&store, Some(Arc::new(ApprovingGateway)));
        let session_id = seed_session(&store, 48, 1).await;

        let confirmed = service
            .create_booking(Uuid::new_v4(), session_id)
            .await
            .unwrap();
        assert_eq!(confirmed.payment_id.as_deref(), Some("pay_ok"));

        // Waitlist entries are not charged.
        let waitlisted = service
            .create_booking(Uuid::new_v4(), session_id)
            .await
            .unwrap();
        assert_eq!(waitlisted.status, BookingStatus::Waitlisted);
        assert!(waitlisted.payment_id.is_none());
    }

    #[tokio::test]
    async fn test_cancel_inside_cutoff_fails() {
        let store = MemoryStore::new();
        let service = service(&store, None);
        let session_id = seed_session(&store, 1, 5).await;
        let user = Uuid::new_v4();
        let booking = store
            .create_booking_decided(user, session_id, true, None)
            .await
            .unwrap();

        let err = service.cancel_booking(booking.id, user).await.unwrap_err();
        assert!(matches!(err, BookingError::CannotCancel { .. }));
        let unchanged = store.get_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_cancel_requires_ownership() {
        let store = MemoryStore::new();
        let service = service(&store, None);
        let session_id = seed_session(&store, 48, 5).await;
        let owner = Uuid::new_v4();
        let booking = service.create_booking(owner, session_id).await.unwrap();

        let err = service
            .cancel_booking(booking.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Unauthorized));
    }

    #[tokio::test]
    async fn test_cancel_promotes_earliest_waitlisted() {
        let store = MemoryStore::new();
        let service = service(&store, None);
        let session_id = seed_session(&store, 48, 1).await;
        let owner = Uuid::new_v4();

        let confirmed = service.create_booking(owner, session_id).await.unwrap();
        let first_waitlisted = service
            .create_booking(Uuid::new_v4(), session_id)
            .await
            .unwrap();
        let second_waitlisted = service
            .create_booking(Uuid::new_v4(), session_id)
            .await
            .unwrap();

        let outcome = service.cancel_booking(confirmed.id, owner).await.unwrap();
        assert!(outcome.refund_eligible);
        assert_eq!(outcome.promoted_booking_id, Some(first_waitlisted.id));

        let promoted = store.get_booking(first_waitlisted.id).await.unwrap().unwrap();
        assert_eq!(promoted.status, BookingStatus::Confirmed);
        let still_waiting = store
            .get_booking(second_waitlisted.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(still_waiting.status, BookingStatus::Waitlisted);
    }

    #[tokio::test]
    async fn test_cancel_waitlisted_does_not_promote() {
        let store = MemoryStore::new();
        let service = service(&store, None);
        let session_id = seed_session(&store, 48, 1).await;
        service
            .create_booking(Uuid::new_v4(), session_id)
            .await
            .unwrap();
        let user = Uuid::new_v4();
        let waitlisted = service.create_booking(user, session_id).await.unwrap();

        let outcome = service.cancel_booking(waitlisted.id, user).await.unwrap();
        assert_eq!(outcome.promoted_booking_id, None);
    }

    #[tokio::test]
    async fn test_check_availability_reflects_live_counts() {
        let store = MemoryStore::new();
        let service = service(&store, None);
        let session_id = seed_session(&store, 48, 2).await;

        let open = service.check_availability(session_id).await.unwrap();
        assert!(open.available);
        assert_eq!(open.spots_remaining, 2);
        assert!(!open.session_full);

        service
            .create_booking(Uuid::new_v4(), session_id)
            .await
            .unwrap();
        service
            .create_booking(Uuid::new_v4(), session_id)
            .await
            .unwrap();

        let full = service.check_availability(session_id).await.unwrap();
        assert!(!full.available);
        assert_eq!(full.spots_remaining, 0);
        assert!(full.session_full);
        assert!(full.waitlist_available);
    }

    #[tokio::test]
    async fn test_update_status_transitions() {
        let store = MemoryStore::new();
        let service = service(&store, None);
        let session_id = seed_session(&store, 48, 1).await;
        let user = Uuid::new_v4();

        service
            .create_booking(Uuid::new_v4(), session_id)
            .await
            .unwrap();
        let waitlisted = service.create_booking(user, session_id).await.unwrap();

        // No free seat: confirmation is refused.
        let err = service
            .update_booking_status(waitlisted.id, user, BookingStatus::Confirmed)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::SessionFull { .. }));

        // Cancelling through the status endpoint applies the cutoff rules.
        let cancelled = service
            .update_booking_status(waitlisted.id, user, BookingStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);

        // Cancelled is terminal.
        let err = service
            .update_booking_status(waitlisted.id, user, BookingStatus::Confirmed)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::InvalidStatusTransition { .. }));
    }
}
