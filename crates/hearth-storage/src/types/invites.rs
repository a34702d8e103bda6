//! Invite types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use super::{InviteId, PropertyId, UserId};

/// How the plaintext token reaches the redeemer. Delivery metadata only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeliveryMethod {
    Email,
    Code,
}

impl DeliveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMethod::Email => "email",
            DeliveryMethod::Code => "code",
        }
    }
}

impl fmt::Display for DeliveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "email" => Ok(DeliveryMethod::Email),
            "code" => Ok(DeliveryMethod::Code),
            other => Err(format!("unknown delivery method: {}", other)),
        }
    }
}

/// Invite record
#[derive(Clone, Debug)]
pub struct Invite {
    pub id: InviteId,
    pub property_id: PropertyId,
    pub created_by: UserId,
    pub token_hash: String, // keyed digest of the plaintext token (for lookup)
    pub intended_email: Option<String>,
    pub delivery_method: DeliveryMethod,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>, // set together with accepted_by
    pub accepted_by: Option<UserId>,
    /// Latest acceptance; on an exhausted invite, the one that used it up.
    pub last_accepted_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>, // soft revocation
    pub max_uses: i32,
    pub use_count: i32,
    pub validation_attempts: i32,
    pub last_validation_attempt: Option<DateTime<Utc>>,
}

/// Lifecycle state of an invite, derived from its fields at a point in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InviteState {
    Active,
    Accepted,
    Expired,
    Revoked,
    Exhausted,
}

impl InviteState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InviteState::Active => "active",
            InviteState::Accepted => "accepted",
            InviteState::Expired => "expired",
            InviteState::Revoked => "revoked",
            InviteState::Exhausted => "exhausted",
        }
    }
}

/// Why an invite cannot be used. Internal only: callers see one `Invalid` result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidReason {
    NotFound,
    Expired,
    Revoked,
    Exhausted,
}

impl InvalidReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidReason::NotFound => "not_found",
            InvalidReason::Expired => "expired",
            InvalidReason::Revoked => "revoked",
            InvalidReason::Exhausted => "exhausted",
        }
    }
}

impl Invite {
    /// Derive the lifecycle state. Revocation wins over exhaustion, which wins over expiry.
    pub fn state(&self, now: DateTime<Utc>) -> InviteState {
        if self.deleted_at.is_some() {
            InviteState::Revoked
        } else if self.use_count >= self.max_uses {
            InviteState::Exhausted
        } else if now >= self.expires_at {
            InviteState::Expired
        } else if self.accepted_at.is_some() {
            InviteState::Accepted
        } else {
            InviteState::Active
        }
    }

    /// `None` when the invite can still be redeemed at `now`.
    pub fn invalid_reason(&self, now: DateTime<Utc>) -> Option<InvalidReason> {
        match self.state(now) {
            InviteState::Active | InviteState::Accepted => None,
            InviteState::Expired => Some(InvalidReason::Expired),
            InviteState::Revoked => Some(InvalidReason::Revoked),
            InviteState::Exhausted => Some(InvalidReason::Exhausted),
        }
    }
}

/// Parameters for creating an invite
#[derive(Clone, Debug)]
pub struct CreateInviteParams {
    pub property_id: PropertyId,
    pub created_by: UserId,
    pub token_hash: String,
    pub intended_email: Option<String>,
    pub delivery_method: DeliveryMethod,
    pub expires_at: DateTime<Utc>,
    pub max_uses: i32,
}

/// Parameters for the maintenance sweep.
#[derive(Clone, Debug)]
pub struct CleanupParams {
    pub now: DateTime<Utc>,
    /// Invites that expired, or were used up, before this instant get soft-deleted.
    pub retain_after: DateTime<Utc>,
    /// Invites soft-deleted before this instant get removed.
    pub purge_before: DateTime<Utc>,
}

/// Result of one maintenance sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub revoked: u64,
    pub purged: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn invite(now: DateTime<Utc>) -> Invite {
        Invite {
            id: InviteId(Uuid::now_v7()),
            property_id: PropertyId(Uuid::now_v7()),
            created_by: UserId(Uuid::now_v7()),
            token_hash: "00".repeat(32),
            intended_email: None,
            delivery_method: DeliveryMethod::Code,
            created_at: now,
            expires_at: now + Duration::hours(48),
            accepted_at: None,
            accepted_by: None,
            last_accepted_at: None,
            deleted_at: None,
            max_uses: 1,
            use_count: 0,
            validation_attempts: 0,
            last_validation_attempt: None,
        }
    }

    #[test]
    fn fresh_invite_is_active() {
        let now = Utc::now();
        let inv = invite(now);
        assert_eq!(inv.state(now), InviteState::Active);
        assert_eq!(inv.invalid_reason(now), None);
    }

    #[test]
    fn expiry_is_exclusive() {
        let now = Utc::now();
        let inv = invite(now);
        assert_eq!(inv.state(inv.expires_at), InviteState::Expired);
        assert_eq!(
            inv.invalid_reason(inv.expires_at + Duration::seconds(1)),
            Some(InvalidReason::Expired)
        );
    }

    #[test]
    fn revoked_wins_over_everything() {
        let now = Utc::now();
        let mut inv = invite(now);
        inv.deleted_at = Some(now);
        inv.use_count = 1;
        assert_eq!(
            inv.state(now + Duration::days(10)),
            InviteState::Revoked
        );
    }

    #[test]
    fn multi_use_invite_stays_usable_after_first_acceptance() {
        let now = Utc::now();
        let mut inv = invite(now);
        inv.max_uses = 3;
        inv.use_count = 1;
        inv.accepted_at = Some(now);
        inv.accepted_by = Some(UserId(Uuid::now_v7()));
        assert_eq!(inv.state(now), InviteState::Accepted);
        assert_eq!(inv.invalid_reason(now), None);

        inv.use_count = 3;
        assert_eq!(inv.invalid_reason(now), Some(InvalidReason::Exhausted));
    }

    #[test]
    fn delivery_method_parses_case_insensitively() {
        assert_eq!("EMAIL".parse::<DeliveryMethod>(), Ok(DeliveryMethod::Email));
        assert_eq!("code".parse::<DeliveryMethod>(), Ok(DeliveryMethod::Code));
        assert!("sms".parse::<DeliveryMethod>().is_err());
    }
}
