use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hearth_storage::*;
use hearth_store_postgres::PostgresStore;
use hearth_store_sqlite::SqliteStore;

/// StoreBackend abstracts over SQLite and PostgreSQL implementations
#[derive(Clone)]
pub enum StoreBackend {
    Sqlite(Arc<SqliteStore>),
    Postgres(Arc<PostgresStore>),
}

impl StoreBackend {
    /// Open the backend named by the URL scheme (`postgres://…` or anything SQLite accepts).
    pub async fn open(url: &str, lock_timeout: Duration) -> Result<Self, StoreError> {
        if url.starts_with("postgres:") || url.starts_with("postgresql:") {
            let store = PostgresStore::open_with_timeout(url, lock_timeout).await?;
            Ok(StoreBackend::Postgres(Arc::new(store)))
        } else {
            let store = SqliteStore::open_with_timeout(url, lock_timeout).await?;
            Ok(StoreBackend::Sqlite(Arc::new(store)))
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StoreBackend::Sqlite(_) => "sqlite",
            StoreBackend::Postgres(_) => "postgres",
        }
    }
}

#[async_trait::async_trait]
impl Store for StoreBackend {
    async fn create_property(&self, params: &CreatePropertyParams) -> Result<Property, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.create_property(params).await,
            StoreBackend::Postgres(s) => s.create_property(params).await,
        }
    }

    async fn get_property(&self, property_id: &PropertyId) -> Result<Property, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.get_property(property_id).await,
            StoreBackend::Postgres(s) => s.get_property(property_id).await,
        }
    }

    async fn get_profile(&self, user_id: &UserId) -> Result<Profile, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.get_profile(user_id).await,
            StoreBackend::Postgres(s) => s.get_profile(user_id).await,
        }
    }

    async fn set_profile_role(&self, user_id: &UserId, role: ProfileRole) -> Result<(), StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.set_profile_role(user_id, role).await,
            StoreBackend::Postgres(s) => s.set_profile_role(user_id, role).await,
        }
    }

    async fn create_invite(&self, params: &CreateInviteParams) -> Result<Invite, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.create_invite(params).await,
            StoreBackend::Postgres(s) => s.create_invite(params).await,
        }
    }

    async fn get_invite(&self, invite_id: &InviteId) -> Result<Invite, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.get_invite(invite_id).await,
            StoreBackend::Postgres(s) => s.get_invite(invite_id).await,
        }
    }

    async fn get_invite_by_hash(&self, token_hash: &str) -> Result<Invite, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.get_invite_by_hash(token_hash).await,
            StoreBackend::Postgres(s) => s.get_invite_by_hash(token_hash).await,
        }
    }

    async fn list_invites(&self, property_id: &PropertyId) -> Result<Vec<Invite>, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.list_invites(property_id).await,
            StoreBackend::Postgres(s) => s.list_invites(property_id).await,
        }
    }

    async fn record_validation_attempt(
        &self,
        invite_id: &InviteId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.record_validation_attempt(invite_id, at).await,
            StoreBackend::Postgres(s) => s.record_validation_attempt(invite_id, at).await,
        }
    }

    async fn accept_invite(
        &self,
        params: &AcceptInviteParams,
    ) -> Result<AcceptOutcome, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.accept_invite(params).await,
            StoreBackend::Postgres(s) => s.accept_invite(params).await,
        }
    }

    async fn revoke_invite(&self, invite_id: &InviteId, at: DateTime<Utc>) -> Result<bool, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.revoke_invite(invite_id, at).await,
            StoreBackend::Postgres(s) => s.revoke_invite(invite_id, at).await,
        }
    }

    async fn cleanup_invites(&self, params: &CleanupParams) -> Result<CleanupReport, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.cleanup_invites(params).await,
            StoreBackend::Postgres(s) => s.cleanup_invites(params).await,
        }
    }

    async fn get_link(
        &self,
        tenant_id: &UserId,
        property_id: &PropertyId,
    ) -> Result<TenantPropertyLink, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.get_link(tenant_id, property_id).await,
            StoreBackend::Postgres(s) => s.get_link(tenant_id, property_id).await,
        }
    }

    async fn list_links(
        &self,
        property_id: &PropertyId,
    ) -> Result<Vec<TenantPropertyLink>, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.list_links(property_id).await,
            StoreBackend::Postgres(s) => s.list_links(property_id).await,
        }
    }
}
