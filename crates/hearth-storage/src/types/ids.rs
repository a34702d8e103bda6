//! Strongly-typed identifiers (avoid mixing strings/UUIDs arbitrarily).

use uuid::Uuid;

/// User identifier (owner or tenant, as supplied by the identity provider).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub Uuid);

/// Property identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PropertyId(pub Uuid);

/// Invite identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InviteId(pub Uuid);
