//! The Store trait that backends implement.

use chrono::{DateTime, Utc};

use crate::types::*;
use crate::StoreError;

/// The storage trait the invite engine depends on.
///
/// Invites and links are the only shared mutable state of the engine. Properties and
/// profiles are read (and, for profiles, filled in) but owned by the wider application.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // ───────────────────────────────────── Properties ─────────────────────────────────────

    /// Register a property (returns the stored record).
    async fn create_property(&self, params: &CreatePropertyParams) -> Result<Property, StoreError>;

    /// Get property by ID.
    async fn get_property(&self, property_id: &PropertyId) -> Result<Property, StoreError>;

    // ───────────────────────────────────── Profiles ───────────────────────────────────────

    /// Get a user's profile.
    async fn get_profile(&self, user_id: &UserId) -> Result<Profile, StoreError>;

    /// Set a user's role explicitly (overwrites).
    async fn set_profile_role(&self, user_id: &UserId, role: ProfileRole)
        -> Result<(), StoreError>;

    // ───────────────────────────────────── Invites ────────────────────────────────────────

    /// Create an invite. `AlreadyExists` if a live invite has the same token hash.
    async fn create_invite(&self, params: &CreateInviteParams) -> Result<Invite, StoreError>;

    /// Get invite by ID (including revoked invites).
    async fn get_invite(&self, invite_id: &InviteId) -> Result<Invite, StoreError>;

    /// Get invite by token hash. Prefers the live invite; falls back to the most
    /// recently revoked one so callers can tell why a token stopped working.
    async fn get_invite_by_hash(&self, token_hash: &str) -> Result<Invite, StoreError>;

    /// List all invites (live and revoked) issued for a property, newest first.
    async fn list_invites(&self, property_id: &PropertyId) -> Result<Vec<Invite>, StoreError>;

    /// Bump the validation attempt counters. Best effort; not part of any transaction.
    async fn record_validation_attempt(
        &self,
        invite_id: &InviteId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Accept an invite atomically: re-check usability, create the link, advance the
    /// use count and fill the tenant role, all in one transaction serialized on the
    /// invite row.
    async fn accept_invite(&self, params: &AcceptInviteParams)
        -> Result<AcceptOutcome, StoreError>;

    /// Soft-delete an invite. Returns false if it was already revoked.
    async fn revoke_invite(&self, invite_id: &InviteId, at: DateTime<Utc>)
        -> Result<bool, StoreError>;

    /// Soft-delete invites past retention and purge long-revoked ones.
    async fn cleanup_invites(&self, params: &CleanupParams) -> Result<CleanupReport, StoreError>;

    // ───────────────────────────────────── Links ──────────────────────────────────────────

    /// Get the link between a tenant and a property.
    async fn get_link(
        &self,
        tenant_id: &UserId,
        property_id: &PropertyId,
    ) -> Result<TenantPropertyLink, StoreError>;

    /// List all tenant links for a property.
    async fn list_links(
        &self,
        property_id: &PropertyId,
    ) -> Result<Vec<TenantPropertyLink>, StoreError>;
}
