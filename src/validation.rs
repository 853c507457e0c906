//! Pure, stateless business-rule checks. Every mutation in the scheduling
//! and arbitration services passes through these before touching the store;
//! the store re-verifies the racy ones under its own lock.

use chrono::{DateTime, Duration, Utc};

use crate::error::BookingError;
use crate::settings::BusinessHours;

pub const MIN_DURATION_MINUTES: i64 = 15;
pub const MAX_DURATION_MINUTES: i64 = 180;
/// Sessions may be scheduled at most this far ahead.
pub const SCHEDULING_HORIZON_DAYS: i64 = 180;
/// Bookings open this many days before a session, a tighter cap than the
/// scheduling horizon.
pub const BOOKING_WINDOW_DAYS: i64 = 30;
pub const CANCELLATION_CUTOFF_HOURS: i64 = 2;
pub const REFUND_WINDOW_HOURS: i64 = 24;

pub fn validate_session_timing(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), BookingError> {
    if start <= now {
        return Err(BookingError::InvalidTimeRange {
            reason: "session must start in the future".to_string(),
        });
    }
    if end <= start {
        return Err(BookingError::InvalidTimeRange {
            reason: "session must end after it starts".to_string(),
        });
    }
    let duration = (end - start).num_minutes();
    if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&duration) {
        return Err(BookingError::InvalidTimeRange {
            reason: format!(
                "duration must be between {MIN_DURATION_MINUTES} and {MAX_DURATION_MINUTES} minutes, got {duration}"
            ),
        });
    }
    if start > now + Duration::days(SCHEDULING_HORIZON_DAYS) {
        return Err(BookingError::InvalidTimeRange {
            reason: format!("session cannot start more than {SCHEDULING_HORIZON_DAYS} days ahead"),
        });
    }
    Ok(())
}

pub fn validate_business_hours(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    hours: &BusinessHours,
) -> Result<(), BookingError> {
    let outside = start.time() < hours.open
        || end.time() > hours.close
        || start.date_naive() != end.date_naive();
    if outside {
        return Err(BookingError::OutsideBusinessHours {
            open: hours.open.format("%H:%M").to_string(),
            close: hours.close.format("%H:%M").to_string(),
        });
    }
    Ok(())
}

pub fn validate_booking_time(
    session_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), BookingError> {
    if session_start <= now {
        return Err(BookingError::PastSession {
            starts_at: session_start,
        });
    }
    if session_start > now + Duration::days(BOOKING_WINDOW_DAYS) {
        return Err(BookingError::InvalidTimeRange {
            reason: format!("bookings open {BOOKING_WINDOW_DAYS} days before the session"),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancellationWindow {
    pub refund_eligible: bool,
}

pub fn validate_cancellation_time(
    session_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<CancellationWindow, BookingError> {
    if session_start <= now {
        return Err(BookingError::CannotCancel {
            reason: "session has already started".to_string(),
        });
    }
    let hours_until = (session_start - now).num_hours();
    if hours_until < CANCELLATION_CUTOFF_HOURS {
        return Err(BookingError::CannotCancel {
            reason: format!(
                "cancellations close {CANCELLATION_CUTOFF_HOURS} hours before the session"
            ),
        });
    }
    Ok(CancellationWindow {
        refund_eligible: hours_until >= REFUND_WINDOW_HOURS,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityCheck {
    pub can_book: bool,
    pub can_join_waitlist: bool,
    pub spots_remaining: u32,
}

pub fn validate_booking_capacity(
    confirmed: u32,
    capacity: u32,
    waitlist_enabled: bool,
) -> CapacityCheck {
    let can_book = confirmed < capacity;
    CapacityCheck {
        can_book,
        can_join_waitlist: !can_book && waitlist_enabled,
        spots_remaining: capacity.saturating_sub(confirmed),
    }
}

pub fn validate_user_booking_limits(active_count: u32, max: u32) -> Result<(), BookingError> {
    if active_count >= max {
        return Err(BookingError::BookingLimitExceeded {
            count: active_count,
            max,
        });
    }
    Ok(())
}

pub fn validate_session_capacity(new_capacity: u32, confirmed: u32) -> Result<(), BookingError> {
    if new_capacity < confirmed {
        return Err(BookingError::CapacityBelowBookings {
            requested: new_capacity,
            confirmed,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, 7, h, m, 0).unwrap()
    }

    #[test]
    fn test_session_timing_rejects_past_start() {
        let now = at(10, 0);
        let err = validate_session_timing(at(9, 0), at(10, 0), now).unwrap_err();
        assert!(matches!(err, BookingError::InvalidTimeRange { .. }));
    }

    #[test]
    fn test_session_timing_duration_bounds() {
        let now = at(6, 0);
        assert!(validate_session_timing(at(10, 0), at(10, 10), now).is_err());
        assert!(validate_session_timing(at(10, 0), at(13, 30), now).is_err());
        assert!(validate_session_timing(at(10, 0), at(11, 0), now).is_ok());
        assert!(validate_session_timing(at(10, 0), at(10, 15), now).is_ok());
        assert!(validate_session_timing(at(10, 0), at(13, 0), now).is_ok());
    }

    #[test]
    fn test_session_timing_horizon() {
        let now = at(6, 0);
        let far = now + Duration::days(SCHEDULING_HORIZON_DAYS + 1);
        let err = validate_session_timing(far, far + Duration::hours(1), now).unwrap_err();
        assert!(matches!(err, BookingError::InvalidTimeRange { .. }));
    }

    #[test]
    fn test_business_hours_window() {
        let hours = BusinessHours::default();
        assert!(validate_business_hours(at(6, 0), at(7, 0), &hours).is_ok());
        assert!(validate_business_hours(at(5, 30), at(6, 30), &hours).is_err());
        assert!(validate_business_hours(at(21, 30), at(22, 30), &hours).is_err());
    }

    #[test]
    fn test_booking_time_window() {
        let now = at(6, 0);
        assert!(validate_booking_time(at(10, 0), now).is_ok());
        assert!(matches!(
            validate_booking_time(at(5, 0), now),
            Err(BookingError::PastSession { .. })
        ));
        let far = now + Duration::days(BOOKING_WINDOW_DAYS + 1);
        assert!(matches!(
            validate_booking_time(far, now),
            Err(BookingError::InvalidTimeRange { .. })
        ));
    }

    #[test]
    fn test_cancellation_cutoff() {
        let now = at(9, 0);
        // One hour to go: inside the cutoff.
        let err = validate_cancellation_time(at(10, 0), now).unwrap_err();
        assert!(matches!(err, BookingError::CannotCancel { .. }));
        // Three hours to go: allowed, no refund.
        let window = validate_cancellation_time(at(12, 0), now).unwrap();
        assert!(!window.refund_eligible);
        // A day and more: refund eligible.
        let window =
            validate_cancellation_time(at(12, 0) + Duration::days(2), now).unwrap();
        assert!(window.refund_eligible);
    }

    #[test]
    fn test_booking_capacity() {
        let open = validate_booking_capacity(3, 5, true);
        assert!(open.can_book);
        assert!(!open.can_join_waitlist);
        assert_eq!(open.spots_remaining, 2);

        let full = validate_booking_capacity(5, 5, true);
        assert!(!full.can_book);
        assert!(full.can_join_waitlist);
        assert_eq!(full.spots_remaining, 0);

        let no_waitlist = validate_booking_capacity(5, 5, false);
        assert!(!no_waitlist.can_join_waitlist);
    }

    #[test]
    fn test_user_booking_limits() {
        assert!(validate_user_booking_limits(9, 10).is_ok());
        assert!(matches!(
            validate_user_booking_limits(10, 10),
            Err(BookingError::BookingLimitExceeded { count: 10, max: 10 })
        ));
    }

    #[test]
    fn test_session_capacity_shrink() {
        assert!(validate_session_capacity(5, 5).is_ok());
        assert!(matches!(
            validate_session_capacity(3, 5),
            Err(BookingError::CapacityBelowBookings {
                requested: 3,
                confirmed: 5
            })
        ));
    }
}
