use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;
use http::HeaderMap;
use uuid::Uuid;

use crate::error::ApiError;
use crate::settings::Settings;

/// Session management is admin-only, guarded by a shared bearer token.
pub fn verify_admin_token(
    settings: &Settings,
    auth: Option<Authorization<Bearer>>,
) -> Result<(), ApiError> {
    match auth {
        Some(token) if token.token() == settings.admin_token => Ok(()),
        _ => Err(ApiError::Unauthorized(
            "Invalid authentication token".into(),
        )),
    }
}

/// The upstream identity layer places the verified caller id in `x-user-id`;
/// the core trusts it without re-verifying credentials.
pub fn require_user_id(headers: &HeaderMap) -> Result<Uuid, ApiError> {
    let value = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing x-user-id header".into()))?;
    Uuid::parse_str(value).map_err(|_| ApiError::BadRequest("Invalid x-user-id header".into()))
}
