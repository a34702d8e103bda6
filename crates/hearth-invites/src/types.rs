//! Request and response types of the invite service.

use chrono::{DateTime, Utc};
use hearth_crypto::InviteToken;
use hearth_storage::{
    DeliveryMethod, Invite, InviteId, InviteState, Property, PropertyId, UserId,
};

/// What an owner asks for when issuing an invite.
#[derive(Clone, Debug)]
pub struct CreateInviteRequest {
    pub property_id: PropertyId,
    pub delivery_method: DeliveryMethod,
    pub intended_email: Option<String>,
    /// Defaults to a single use.
    pub max_uses: Option<i32>,
}

/// A freshly issued invite. `token` is the only copy of the plaintext secret.
#[derive(Debug)]
pub struct CreatedInvite {
    pub invite_id: InviteId,
    pub token: InviteToken,
    pub expires_at: DateTime<Utc>,
}

/// What a redeemer may learn about the property behind a token.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyDescriptor {
    pub property_id: PropertyId,
    pub name: String,
    pub address: String,
    pub owner_display_name: String,
}

impl From<&Property> for PropertyDescriptor {
    fn from(p: &Property) -> Self {
        Self {
            property_id: p.id.clone(),
            name: p.name.clone(),
            address: p.address.clone(),
            owner_display_name: p.owner_display_name.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct InvitePreview {
    pub property: PropertyDescriptor,
    pub intended_email: Option<String>,
    pub max_uses: i32,
    pub use_count: i32,
}

/// Result of validating a token. Every failure cause reads the same.
#[derive(Clone, Debug, PartialEq)]
pub enum Validation {
    Valid(InvitePreview),
    Invalid,
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Valid(_))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcceptStatus {
    Ok,
    AlreadyLinked,
    Invalid,
    /// Only reported when configured to; otherwise folded into `Invalid`.
    CapacityReached,
    /// Transient failure; safe to retry.
    Error,
}

impl AcceptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcceptStatus::Ok => "ok",
            AcceptStatus::AlreadyLinked => "already_linked",
            AcceptStatus::Invalid => "invalid",
            AcceptStatus::CapacityReached => "capacity_reached",
            AcceptStatus::Error => "error",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AcceptResponse {
    pub status: AcceptStatus,
    /// Present for `Ok` and `AlreadyLinked`.
    pub property: Option<PropertyDescriptor>,
}

impl AcceptResponse {
    pub(crate) fn bare(status: AcceptStatus) -> Self {
        Self {
            status,
            property: None,
        }
    }
}

/// Owner-facing view of an invite. Never carries the hash.
#[derive(Clone, Debug, PartialEq)]
pub struct InviteSummary {
    pub invite_id: InviteId,
    pub property_id: PropertyId,
    pub delivery_method: DeliveryMethod,
    pub intended_email: Option<String>,
    pub state: InviteState,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub accepted_by: Option<UserId>,
    pub max_uses: i32,
    pub use_count: i32,
}

impl InviteSummary {
    pub fn from_invite(invite: Invite, now: DateTime<Utc>) -> Self {
        Self {
            state: invite.state(now),
            invite_id: invite.id,
            property_id: invite.property_id,
            delivery_method: invite.delivery_method,
            intended_email: invite.intended_email,
            created_at: invite.created_at,
            expires_at: invite.expires_at,
            accepted_at: invite.accepted_at,
            accepted_by: invite.accepted_by,
            max_uses: invite.max_uses,
            use_count: invite.use_count,
        }
    }
}
