//! Invite endpoints.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use hearth_invites::{
    AcceptResponse, AcceptStatus, CreateInviteRequest, DeliveryMethod, InviteId, InviteSummary,
    InviteToken, PropertyDescriptor, PropertyId, Validation,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{client_scope, ApiError, AuthenticatedUser};
use crate::metrics::OperationTimer;
use crate::server::HearthServer;

#[derive(Debug, Deserialize)]
pub struct CreateInviteBody {
    pub property_id: Uuid,
    pub delivery_method: String,
    #[serde(default)]
    pub intended_email: Option<String>,
    #[serde(default)]
    pub max_uses: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateInviteResponse {
    pub invite_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct TokenBody {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct PropertyBody {
    pub property_id: Uuid,
    pub name: String,
    pub address: String,
    pub owner_display_name: String,
}

impl From<PropertyDescriptor> for PropertyBody {
    fn from(p: PropertyDescriptor) -> Self {
        Self {
            property_id: p.property_id.0,
            name: p.name,
            address: p.address,
            owner_display_name: p.owner_display_name,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<PropertyBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intended_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_uses: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_count: Option<i32>,
}

impl From<Validation> for ValidateResponse {
    fn from(v: Validation) -> Self {
        match v {
            Validation::Valid(preview) => Self {
                valid: true,
                property: Some(preview.property.into()),
                intended_email: preview.intended_email,
                max_uses: Some(preview.max_uses),
                use_count: Some(preview.use_count),
            },
            Validation::Invalid => Self {
                valid: false,
                property: None,
                intended_email: None,
                max_uses: None,
                use_count: None,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AcceptResponseBody {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<PropertyBody>,
}

impl From<AcceptResponse> for AcceptResponseBody {
    fn from(r: AcceptResponse) -> Self {
        Self {
            status: r.status.as_str().to_string(),
            property: r.property.map(Into::into),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InviteSummaryBody {
    pub invite_id: Uuid,
    pub property_id: Uuid,
    pub delivery_method: String,
    pub intended_email: Option<String>,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub accepted_by: Option<Uuid>,
    pub max_uses: i32,
    pub use_count: i32,
}

impl From<InviteSummary> for InviteSummaryBody {
    fn from(s: InviteSummary) -> Self {
        Self {
            invite_id: s.invite_id.0,
            property_id: s.property_id.0,
            delivery_method: s.delivery_method.as_str().to_string(),
            intended_email: s.intended_email,
            state: s.state.as_str().to_string(),
            created_at: s.created_at,
            expires_at: s.expires_at,
            accepted_at: s.accepted_at,
            accepted_by: s.accepted_by.map(|u| u.0),
            max_uses: s.max_uses,
            use_count: s.use_count,
        }
    }
}

fn outcome<T>(result: &Result<T, ApiError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) if e.status_code().is_server_error() => "error",
        Err(_) => "rejected",
    }
}

/// POST /v1/invites
pub async fn create_invite(
    State(server): State<HearthServer>,
    AuthenticatedUser(owner): AuthenticatedUser,
    Json(body): Json<CreateInviteBody>,
) -> Result<(StatusCode, Json<CreateInviteResponse>), ApiError> {
    let timer = OperationTimer::new("create");
    let result: Result<_, ApiError> = async move {
        let delivery_method: DeliveryMethod =
            body.delivery_method.parse().map_err(ApiError::BadRequest)?;
        let created = server
            .invites
            .create_invite(
                &owner,
                CreateInviteRequest {
                    property_id: PropertyId(body.property_id),
                    delivery_method,
                    intended_email: body.intended_email,
                    max_uses: body.max_uses,
                },
            )
            .await?;
        Ok((
            StatusCode::CREATED,
            Json(CreateInviteResponse {
                invite_id: created.invite_id.0,
                token: created.token.expose().to_string(),
                expires_at: created.expires_at,
            }),
        ))
    }
    .await;
    timer.finish(outcome(&result));
    result
}

/// POST /v1/invites/validate
///
/// Anonymous. Always 200 for a well-formed request; an unusable token reads
/// `{"valid": false}` whatever the cause.
pub async fn validate_invite(
    State(server): State<HearthServer>,
    headers: HeaderMap,
    Json(body): Json<TokenBody>,
) -> Result<Json<ValidateResponse>, ApiError> {
    let timer = OperationTimer::new("validate");
    let token = InviteToken::parse(&body.token);
    let scope = client_scope(&headers);
    let result = server
        .invites
        .validate_invite(&token, scope.as_deref())
        .await
        .map(|v| Json(v.into()))
        .map_err(ApiError::from);
    timer.finish(outcome(&result));
    result
}

/// POST /v1/invites/accept
pub async fn accept_invite(
    State(server): State<HearthServer>,
    AuthenticatedUser(tenant): AuthenticatedUser,
    Json(body): Json<TokenBody>,
) -> Response {
    let timer = OperationTimer::new("accept");
    let token = InviteToken::parse(&body.token);
    let response = server.invites.accept_invite(&token, &tenant).await;
    timer.finish(response.status.as_str());

    let status = match response.status {
        AcceptStatus::Error => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (status, Json(AcceptResponseBody::from(response))).into_response()
}

/// DELETE /v1/invites/{id}
pub async fn revoke_invite(
    State(server): State<HearthServer>,
    AuthenticatedUser(owner): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let timer = OperationTimer::new("revoke");
    let result = server
        .invites
        .revoke_invite(&owner, &InviteId(id))
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(ApiError::from);
    timer.finish(outcome(&result));
    result
}

/// GET /v1/properties/{id}/invites
pub async fn list_invites(
    State(server): State<HearthServer>,
    AuthenticatedUser(owner): AuthenticatedUser,
    Path(property_id): Path<Uuid>,
) -> Result<Json<Vec<InviteSummaryBody>>, ApiError> {
    let timer = OperationTimer::new("list");
    let result = server
        .invites
        .list_invites(&owner, &PropertyId(property_id))
        .await
        .map(|invites| Json(invites.into_iter().map(Into::into).collect()))
        .map_err(ApiError::from);
    timer.finish(outcome(&result));
    result
}
