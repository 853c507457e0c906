use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use axum_extra::extract::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use chrono::{DateTime, Utc};
use http::HeaderMap;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{require_user_id, verify_admin_token};
use crate::error::ApiError;
use crate::models::{BookingStatus, NewSession, SessionFilters, SessionPatch};
use crate::AppState;

#[utoipa::path(get, path = "/", tag = "bookings")]
pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Studio Booking API",
        "endpoints": {
            "/sessions": "Browse and manage class sessions",
            "/bookings": "Reserve and manage class bookings"
        }
    }))
}

#[utoipa::path(get, path = "/healthz/live", tag = "bookings")]
pub async fn healthz_live() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

#[utoipa::path(get, path = "/healthz/ready", tag = "bookings")]
pub async fn healthz_ready() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

fn check_capacity_field(capacity: u32) -> Result<(), ApiError> {
    if capacity < 1 {
        return Err(ApiError::BadRequest("capacity must be at least 1".into()));
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/sessions",
    request_body = NewSession,
    responses(
        (status = 201, description = "Session created", body = crate::models::ClassSession),
        (status = 401, description = "Invalid authentication token"),
        (status = 409, description = "Instructor conflict"),
        (status = 422, description = "Timing or business-hours violation")
    ),
    security(("bearer_auth" = [])),
    tag = "sessions"
)]
pub async fn create_session(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    Json(body): Json<NewSession>,
) -> Result<impl IntoResponse, ApiError> {
    verify_admin_token(&state.settings, auth.map(|TypedHeader(a)| a))?;
    check_capacity_field(body.capacity)?;
    let session = state.scheduling.create_session(body).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

#[utoipa::path(
    patch,
    path = "/sessions/{id}",
    request_body = SessionPatch,
    responses(
        (status = 200, description = "Session updated", body = crate::models::ClassSession),
        (status = 404, description = "Session not found"),
        (status = 409, description = "Instructor conflict or capacity below bookings")
    ),
    security(("bearer_auth" = [])),
    tag = "sessions"
)]
pub async fn update_session(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    Path(id): Path<Uuid>,
    Json(body): Json<SessionPatch>,
) -> Result<impl IntoResponse, ApiError> {
    verify_admin_token(&state.settings, auth.map(|TypedHeader(a)| a))?;
    if let Some(capacity) = body.capacity {
        check_capacity_field(capacity)?;
    }
    let session = state.scheduling.update_session(id, body).await?;
    Ok(Json(session))
}

#[utoipa::path(
    delete,
    path = "/sessions/{id}",
    responses(
        (status = 204, description = "Session deleted"),
        (status = 404, description = "Session not found"),
        (status = 409, description = "Session still has confirmed or pending bookings")
    ),
    security(("bearer_auth" = [])),
    tag = "sessions"
)]
pub async fn delete_session(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    verify_admin_token(&state.settings, auth.map(|TypedHeader(a)| a))?;
    state.scheduling.delete_session(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/sessions",
    params(
        ("instructor_id" = Option<Uuid>, Query, description = "Filter by instructor"),
        ("class_type" = Option<String>, Query, description = "Filter by class type"),
        ("from" = Option<String>, Query, description = "Earliest start time (RFC 3339)"),
        ("until" = Option<String>, Query, description = "Latest start time (RFC 3339)"),
        ("include_past" = Option<bool>, Query, description = "Include sessions that already started")
    ),
    responses((status = 200, description = "Matching sessions", body = [crate::models::SessionView])),
    tag = "sessions"
)]
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(filters): Query<SessionFilters>,
) -> Result<impl IntoResponse, ApiError> {
    let sessions = state.scheduling.list_sessions(filters).await?;
    Ok(Json(sessions))
}

#[utoipa::path(
    get,
    path = "/sessions/{id}",
    responses(
        (status = 200, description = "Session with occupancy", body = crate::models::SessionView),
        (status = 404, description = "Session not found")
    ),
    tag = "sessions"
)]
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state.scheduling.get_session(id).await?;
    Ok(Json(view))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DuplicateRequest {
    #[schema(value_type = String, format = "date-time")]
    pub starts_at: DateTime<Utc>,
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/duplicate",
    request_body = DuplicateRequest,
    responses(
        (status = 201, description = "Session duplicated", body = crate::models::ClassSession),
        (status = 404, description = "Source session not found")
    ),
    security(("bearer_auth" = [])),
    tag = "sessions"
)]
pub async fn duplicate_session(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    Path(id): Path<Uuid>,
    Json(body): Json<DuplicateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    verify_admin_token(&state.settings, auth.map(|TypedHeader(a)| a))?;
    let session = state.scheduling.duplicate_session(id, body.starts_at).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RecurringRequest {
    pub session: NewSession,
    pub count: u32,
    pub interval_days: u32,
}

#[utoipa::path(
    post,
    path = "/sessions/recurring",
    request_body = RecurringRequest,
    responses(
        (status = 200, description = "Per-instance results", body = crate::models::RecurringOutcome)
    ),
    security(("bearer_auth" = [])),
    tag = "sessions"
)]
pub async fn create_recurring_sessions(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    Json(body): Json<RecurringRequest>,
) -> Result<impl IntoResponse, ApiError> {
    verify_admin_token(&state.settings, auth.map(|TypedHeader(a)| a))?;
    check_capacity_field(body.session.capacity)?;
    if body.count == 0 || body.count > 52 {
        return Err(ApiError::BadRequest("count must be between 1 and 52".into()));
    }
    let outcome = state
        .scheduling
        .create_recurring_sessions(body.session, body.count, body.interval_days)
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct ConflictQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub exclude: Option<Uuid>,
}

#[utoipa::path(
    get,
    path = "/instructors/{id}/conflicts",
    params(
        ("start" = String, Query, description = "Window start (RFC 3339)"),
        ("end" = String, Query, description = "Window end (RFC 3339)"),
        ("exclude" = Option<Uuid>, Query, description = "Session id to exclude")
    ),
    responses((status = 200, description = "Overlapping sessions", body = [crate::models::ClassSession])),
    tag = "sessions"
)]
pub async fn check_instructor_conflicts(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ConflictQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let conflicts = state
        .scheduling
        .check_instructor_conflicts(id, query.start, query.end, query.exclude)
        .await?;
    Ok(Json(conflicts))
}

#[utoipa::path(
    get,
    path = "/sessions/{id}/availability",
    responses(
        (status = 200, description = "Live availability", body = crate::models::Availability),
        (status = 404, description = "Session not found")
    ),
    tag = "bookings"
)]
pub async fn check_availability(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let availability = state.arbitration.check_availability(id).await?;
    Ok(Json(availability))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateBookingRequest {
    pub session_id: Uuid,
}

#[utoipa::path(
    post,
    path = "/bookings",
    request_body = CreateBookingRequest,
    responses(
        (status = 201, description = "Booking confirmed or waitlisted", body = crate::models::Booking),
        (status = 401, description = "Missing user identity"),
        (status = 409, description = "Already booked or session full"),
        (status = 422, description = "Booking window or limit violation")
    ),
    tag = "bookings"
)]
pub async fn create_booking(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateBookingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user_id(&headers)?;
    let booking = state
        .arbitration
        .create_booking(user_id, body.session_id)
        .await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

#[utoipa::path(
    delete,
    path = "/bookings/{id}",
    responses(
        (status = 200, description = "Cancellation outcome", body = crate::models::CancellationOutcome),
        (status = 403, description = "Booking belongs to another user"),
        (status = 404, description = "Booking not found"),
        (status = 422, description = "Inside the cancellation cutoff")
    ),
    tag = "bookings"
)]
pub async fn cancel_booking(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user_id(&headers)?;
    let outcome = state.arbitration.cancel_booking(id, user_id).await?;
    Ok(Json(outcome))
}

#[utoipa::path(
    get,
    path = "/bookings",
    responses((status = 200, description = "The caller's bookings", body = [crate::models::Booking])),
    tag = "bookings"
)]
pub async fn get_user_bookings(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user_id(&headers)?;
    let bookings = state.arbitration.get_user_bookings(user_id).await?;
    Ok(Json(bookings))
}

#[utoipa::path(
    get,
    path = "/bookings/{id}",
    responses(
        (status = 200, description = "The booking", body = crate::models::Booking),
        (status = 403, description = "Booking belongs to another user"),
        (status = 404, description = "Booking not found")
    ),
    tag = "bookings"
)]
pub async fn get_booking(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user_id(&headers)?;
    let booking = state.arbitration.get_booking(id, user_id).await?;
    Ok(Json(booking))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateBookingStatusRequest {
    pub status: BookingStatus,
}

#[utoipa::path(
    patch,
    path = "/bookings/{id}",
    request_body = UpdateBookingStatusRequest,
    responses(
        (status = 200, description = "Updated booking", body = crate::models::Booking),
        (status = 409, description = "No free seat for confirmation"),
        (status = 422, description = "Invalid status transition")
    ),
    tag = "bookings"
)]
pub async fn update_booking_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateBookingStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user_id(&headers)?;
    let booking = state
        .arbitration
        .update_booking_status(id, user_id, body.status)
        .await?;
    Ok(Json(booking))
}
