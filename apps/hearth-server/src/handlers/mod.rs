//! HTTP handlers.
//!
//! - invites: create, list, validate, accept, revoke
//! - health: liveness, readiness, Prometheus scrape

pub mod health;
pub mod invites;

use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use hearth_invites::{InviteError, UserId};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Header carrying the caller id verified by the upstream gateway.
pub const USER_HEADER: &str = "x-hearth-user";

/// Caller identity as asserted by the gateway in [`USER_HEADER`].
#[derive(Clone, Debug)]
pub struct AuthenticatedUser(pub UserId);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthenticated)?;
        let id = Uuid::parse_str(raw.trim()).map_err(|_| ApiError::Unauthenticated)?;
        Ok(AuthenticatedUser(UserId(id)))
    }
}

/// Rate-limit bucket for an anonymous caller: first `x-forwarded-for` hop,
/// then `x-real-ip`.
pub fn client_scope(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    forwarded.or_else(real_ip).map(str::to_string)
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing or invalid caller identity")]
    Unauthenticated,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Invite(#[from] InviteError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Invite(e) => match e {
                InviteError::Unauthorized => StatusCode::FORBIDDEN,
                InviteError::PropertyNotFound | InviteError::NotFound => StatusCode::NOT_FOUND,
                InviteError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                InviteError::Throttled { .. } => StatusCode::TOO_MANY_REQUESTS,
                InviteError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Store details stay in the logs.
        let (error, detail) = match &self {
            ApiError::Unauthenticated => ("unauthenticated", None),
            ApiError::BadRequest(msg) => ("bad_request", Some(msg.clone())),
            ApiError::Invite(InviteError::Unauthorized) => ("forbidden", None),
            ApiError::Invite(InviteError::PropertyNotFound) => ("property_not_found", None),
            ApiError::Invite(InviteError::NotFound) => ("not_found", None),
            ApiError::Invite(InviteError::InvalidRequest(msg)) => ("bad_request", Some(msg.clone())),
            ApiError::Invite(InviteError::Throttled { .. }) => ("throttled", None),
            ApiError::Invite(InviteError::Unavailable(_)) => ("unavailable", None),
        };

        let mut response = (status, Json(ErrorBody { error, detail })).into_response();
        if let ApiError::Invite(InviteError::Throttled { retry_after }) = &self {
            let secs = retry_after.as_secs().max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
