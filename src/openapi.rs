use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::handlers::{
    CreateBookingRequest, DuplicateRequest, RecurringRequest, UpdateBookingStatusRequest,
};
use crate::models::{
    Availability, Booking, BookingStats, BookingStatus, CancellationOutcome, ClassSession,
    Instructor, NewSession, RecurringFailure, RecurringOutcome, SessionOccupancy, SessionPatch,
    SessionView,
};

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.as_mut().unwrap();
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz_live,
        crate::handlers::healthz_ready,
        crate::handlers::create_session,
        crate::handlers::update_session,
        crate::handlers::delete_session,
        crate::handlers::list_sessions,
        crate::handlers::get_session,
        crate::handlers::duplicate_session,
        crate::handlers::create_recurring_sessions,
        crate::handlers::check_instructor_conflicts,
        crate::handlers::check_availability,
        crate::handlers::create_booking,
        crate::handlers::cancel_booking,
        crate::handlers::get_user_bookings,
        crate::handlers::get_booking,
        crate::handlers::update_booking_status
    ),
    components(schemas(
        ClassSession,
        NewSession,
        SessionPatch,
        SessionView,
        SessionOccupancy,
        BookingStats,
        Booking,
        BookingStatus,
        Instructor,
        Availability,
        CancellationOutcome,
        RecurringOutcome,
        RecurringFailure,
        CreateBookingRequest,
        DuplicateRequest,
        RecurringRequest,
        UpdateBookingStatusRequest
    )),
    tags(
        (name = "sessions", description = "Class session scheduling"),
        (name = "bookings", description = "Seat booking and waitlists")
    ),
    modifiers(&SecurityAddon),
)]
pub struct ApiDoc;
