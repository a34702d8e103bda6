//! Types for the atomic acceptance transaction.

use chrono::{DateTime, Utc};

use super::{InvalidReason, Invite, TenantPropertyLink, UserId};

/// Parameters for accepting an invite
#[derive(Clone, Debug)]
pub struct AcceptInviteParams {
    pub token_hash: String,
    pub tenant_id: UserId,
    pub now: DateTime<Utc>,
}

/// Terminal result of one acceptance transaction.
///
/// Backends interpret unique-constraint violations on the link table as
/// `AlreadyLinked`; they never surface them as errors.
#[derive(Clone, Debug)]
pub enum AcceptOutcome {
    /// First acceptance by this tenant: link created, use count advanced.
    Linked {
        invite: Invite,
        link: TenantPropertyLink,
    },
    /// The tenant already holds a link to the invite's property. Nothing changed.
    AlreadyLinked {
        invite: Invite,
        link: TenantPropertyLink,
    },
    /// Use count exhausted by other redeemers.
    CapacityReached { invite: Invite },
    /// Not found, expired or revoked.
    Invalid(InvalidReason),
}

impl AcceptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcceptOutcome::Linked { .. } => "linked",
            AcceptOutcome::AlreadyLinked { .. } => "already_linked",
            AcceptOutcome::CapacityReached { .. } => "capacity_reached",
            AcceptOutcome::Invalid(_) => "invalid",
        }
    }
}
