//! Tenant-property link types.

use chrono::{DateTime, Utc};

use super::{InviteId, PropertyId, UserId};

/// Join record granting a tenant ongoing access to a property.
///
/// Created only by invite acceptance; deactivation happens outside this crate.
#[derive(Clone, Debug, PartialEq)]
pub struct TenantPropertyLink {
    pub tenant_id: UserId,
    pub property_id: PropertyId,
    pub owner_id: UserId,           // copied from the property inside the accept transaction
    pub invite_id: Option<InviteId>, // may name an invite the sweep has since purged
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
