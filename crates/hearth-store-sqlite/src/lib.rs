use std::time::Duration;

use chrono::{DateTime, Utc};
use hearth_storage::{
    AcceptInviteParams, AcceptOutcome, CleanupParams, CleanupReport, CreateInviteParams,
    CreatePropertyParams, InvalidReason, Invite, InviteId, Profile, ProfileRole, Property,
    PropertyId, Store, StoreError, TenantPropertyLink, UserId,
};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use uuid::Uuid;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// How long a caller waits for the single writer connection before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(3);

macro_rules! invite_columns {
    () => {
        "id, property_id, created_by, token_hash, intended_email, delivery_method, created_at, \
         expires_at, accepted_at, accepted_by, last_accepted_at, deleted_at, max_uses, use_count, \
         validation_attempts, last_validation_attempt"
    };
}

macro_rules! link_columns {
    () => {
        "tenant_id, property_id, owner_id, invite_id, is_active, created_at"
    };
}

/// SQLite-backed store.
///
/// The pool holds exactly one connection, so every transaction is serialized behind it.
/// That single writer is what makes acceptance race-free on this backend.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::open("sqlite::memory:").await
    }

    pub async fn open(url: &str) -> Result<Self, StoreError> {
        Self::open_with_timeout(url, DEFAULT_LOCK_TIMEOUT).await
    }

    pub async fn open_with_timeout(url: &str, lock_timeout: Duration) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(lock_timeout)
            // An in-memory database lives exactly as long as its connection.
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(url)
            .await
            .map_err(db_err)?;

        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self { pool })
    }
}

// ───────────────────────────── Row mapping ─────────────────────────────

#[derive(sqlx::FromRow)]
struct InviteRow {
    id: String,
    property_id: String,
    created_by: String,
    token_hash: String,
    intended_email: Option<String>,
    delivery_method: String,
    created_at: i64,
    expires_at: i64,
    accepted_at: Option<i64>,
    accepted_by: Option<String>,
    last_accepted_at: Option<i64>,
    deleted_at: Option<i64>,
    max_uses: i64,
    use_count: i64,
    validation_attempts: i64,
    last_validation_attempt: Option<i64>,
}

impl InviteRow {
    fn into_invite(self) -> Result<Invite, StoreError> {
        Ok(Invite {
            id: InviteId(parse_uuid(&self.id)?),
            property_id: PropertyId(parse_uuid(&self.property_id)?),
            created_by: UserId(parse_uuid(&self.created_by)?),
            token_hash: self.token_hash,
            intended_email: self.intended_email,
            delivery_method: self.delivery_method.parse().map_err(StoreError::Backend)?,
            created_at: from_millis(self.created_at)?,
            expires_at: from_millis(self.expires_at)?,
            accepted_at: self.accepted_at.map(from_millis).transpose()?,
            accepted_by: self
                .accepted_by
                .as_deref()
                .map(parse_uuid)
                .transpose()?
                .map(UserId),
            last_accepted_at: self.last_accepted_at.map(from_millis).transpose()?,
            deleted_at: self.deleted_at.map(from_millis).transpose()?,
            max_uses: self.max_uses as i32,
            use_count: self.use_count as i32,
            validation_attempts: self.validation_attempts as i32,
            last_validation_attempt: self.last_validation_attempt.map(from_millis).transpose()?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LinkRow {
    tenant_id: String,
    property_id: String,
    owner_id: String,
    invite_id: Option<String>,
    is_active: bool,
    created_at: i64,
}

impl LinkRow {
    fn into_link(self) -> Result<TenantPropertyLink, StoreError> {
        Ok(TenantPropertyLink {
            tenant_id: UserId(parse_uuid(&self.tenant_id)?),
            property_id: PropertyId(parse_uuid(&self.property_id)?),
            owner_id: UserId(parse_uuid(&self.owner_id)?),
            invite_id: self
                .invite_id
                .as_deref()
                .map(parse_uuid)
                .transpose()?
                .map(InviteId),
            is_active: self.is_active,
            created_at: from_millis(self.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PropertyRow {
    id: String,
    owner_id: String,
    name: String,
    address: String,
    owner_display_name: String,
    created_at: i64,
}

impl PropertyRow {
    fn into_property(self) -> Result<Property, StoreError> {
        Ok(Property {
            id: PropertyId(parse_uuid(&self.id)?),
            owner_id: UserId(parse_uuid(&self.owner_id)?),
            name: self.name,
            address: self.address,
            owner_display_name: self.owner_display_name,
            created_at: from_millis(self.created_at)?,
        })
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::try_parse(s).map_err(|e| StoreError::Backend(e.to_string()))
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Backend(format!("invalid timestamp: {}", ms)))
}

fn db_err(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::PoolTimedOut => StoreError::Timeout,
        sqlx::Error::Database(ref db) if db.is_unique_violation() => StoreError::AlreadyExists,
        sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => StoreError::NotFound,
        other => StoreError::Backend(other.to_string()),
    }
}

#[async_trait::async_trait]
impl Store for SqliteStore {
    // ───────────────────────────── Properties ─────────────────────────────

    async fn create_property(&self, params: &CreatePropertyParams) -> Result<Property, StoreError> {
        let id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO properties(id, owner_id, name, address, owner_display_name, created_at)
             VALUES(?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(params.owner_id.0.to_string())
        .bind(&params.name)
        .bind(&params.address)
        .bind(&params.owner_display_name)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        self.get_property(&PropertyId(id)).await
    }

    async fn get_property(&self, property_id: &PropertyId) -> Result<Property, StoreError> {
        let row = sqlx::query_as::<_, PropertyRow>(
            "SELECT id, owner_id, name, address, owner_display_name, created_at
             FROM properties WHERE id = ?",
        )
        .bind(property_id.0.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            None => Err(StoreError::NotFound),
            Some(row) => row.into_property(),
        }
    }

    // ───────────────────────────── Profiles ───────────────────────────────

    async fn get_profile(&self, user_id: &UserId) -> Result<Profile, StoreError> {
        let row = sqlx::query_as::<_, (Option<String>, i64)>(
            "SELECT role, updated_at FROM profiles WHERE user_id = ?",
        )
        .bind(user_id.0.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            None => Err(StoreError::NotFound),
            Some((role, updated_at)) => Ok(Profile {
                user_id: user_id.clone(),
                role: role
                    .as_deref()
                    .map(str::parse::<ProfileRole>)
                    .transpose()
                    .map_err(StoreError::Backend)?,
                updated_at: from_millis(updated_at)?,
            }),
        }
    }

    async fn set_profile_role(&self, user_id: &UserId, role: ProfileRole) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO profiles(user_id, role, updated_at) VALUES(?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET role = excluded.role, updated_at = excluded.updated_at",
        )
        .bind(user_id.0.to_string())
        .bind(role.as_str())
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    // ───────────────────────────── Invites ────────────────────────────────

    async fn create_invite(&self, params: &CreateInviteParams) -> Result<Invite, StoreError> {
        let id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO invites(id, property_id, created_by, token_hash, intended_email,
                                 delivery_method, created_at, expires_at, max_uses)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(params.property_id.0.to_string())
        .bind(params.created_by.0.to_string())
        .bind(&params.token_hash)
        .bind(&params.intended_email)
        .bind(params.delivery_method.as_str())
        .bind(Utc::now().timestamp_millis())
        .bind(params.expires_at.timestamp_millis())
        .bind(params.max_uses as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        self.get_invite(&InviteId(id)).await
    }

    async fn get_invite(&self, invite_id: &InviteId) -> Result<Invite, StoreError> {
        let row = sqlx::query_as::<_, InviteRow>(concat!(
            "SELECT ",
            invite_columns!(),
            " FROM invites WHERE id = ?"
        ))
        .bind(invite_id.0.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            None => Err(StoreError::NotFound),
            Some(row) => row.into_invite(),
        }
    }

    async fn get_invite_by_hash(&self, token_hash: &str) -> Result<Invite, StoreError> {
        let row = sqlx::query_as::<_, InviteRow>(concat!(
            "SELECT ",
            invite_columns!(),
            " FROM invites WHERE token_hash = ?
              ORDER BY deleted_at IS NULL DESC, created_at DESC LIMIT 1"
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            None => Err(StoreError::NotFound),
            Some(row) => row.into_invite(),
        }
    }

    async fn list_invites(&self, property_id: &PropertyId) -> Result<Vec<Invite>, StoreError> {
        let rows = sqlx::query_as::<_, InviteRow>(concat!(
            "SELECT ",
            invite_columns!(),
            " FROM invites WHERE property_id = ? ORDER BY created_at DESC, id DESC"
        ))
        .bind(property_id.0.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(InviteRow::into_invite).collect()
    }

    async fn record_validation_attempt(
        &self,
        invite_id: &InviteId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE invites
             SET validation_attempts = validation_attempts + 1, last_validation_attempt = ?
             WHERE id = ?",
        )
        .bind(at.timestamp_millis())
        .bind(invite_id.0.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn accept_invite(
        &self,
        params: &AcceptInviteParams,
    ) -> Result<AcceptOutcome, StoreError> {
        let now = params.now.timestamp_millis();
        let tenant = params.tenant_id.0.to_string();

        // Dropping `tx` without commit rolls back every effect below.
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let row = sqlx::query_as::<_, InviteRow>(concat!(
            "SELECT ",
            invite_columns!(),
            " FROM invites WHERE token_hash = ?
              ORDER BY deleted_at IS NULL DESC, created_at DESC LIMIT 1"
        ))
        .bind(&params.token_hash)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let invite = match row {
            None => return Ok(AcceptOutcome::Invalid(InvalidReason::NotFound)),
            Some(row) => row.into_invite()?,
        };
        if invite.deleted_at.is_some() {
            return Ok(AcceptOutcome::Invalid(InvalidReason::Revoked));
        }
        let property = invite.property_id.0.to_string();

        let existing = sqlx::query_as::<_, LinkRow>(concat!(
            "SELECT ",
            link_columns!(),
            " FROM tenant_property_links WHERE tenant_id = ? AND property_id = ?"
        ))
        .bind(&tenant)
        .bind(&property)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
        if let Some(link) = existing {
            let link = link.into_link()?;
            tx.commit().await.map_err(db_err)?;
            return Ok(AcceptOutcome::AlreadyLinked { invite, link });
        }

        if params.now >= invite.expires_at {
            return Ok(AcceptOutcome::Invalid(InvalidReason::Expired));
        }
        if invite.use_count >= invite.max_uses {
            return Ok(AcceptOutcome::CapacityReached { invite });
        }

        let owner = sqlx::query_as::<_, (String,)>("SELECT owner_id FROM properties WHERE id = ?")
            .bind(&property)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
        let Some((owner_id,)) = owner else {
            return Ok(AcceptOutcome::Invalid(InvalidReason::NotFound));
        };

        let inserted = sqlx::query(
            "INSERT INTO tenant_property_links(tenant_id, property_id, owner_id, invite_id, is_active, created_at)
             VALUES(?, ?, ?, ?, 1, ?)
             ON CONFLICT(tenant_id, property_id) DO NOTHING",
        )
        .bind(&tenant)
        .bind(&property)
        .bind(&owner_id)
        .bind(invite.id.0.to_string())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?
        .rows_affected();

        if inserted == 0 {
            let link = sqlx::query_as::<_, LinkRow>(concat!(
                "SELECT ",
                link_columns!(),
                " FROM tenant_property_links WHERE tenant_id = ? AND property_id = ?"
            ))
            .bind(&tenant)
            .bind(&property)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?
            .into_link()?;
            tx.commit().await.map_err(db_err)?;
            return Ok(AcceptOutcome::AlreadyLinked { invite, link });
        }

        let updated = sqlx::query_as::<_, InviteRow>(concat!(
            "UPDATE invites
             SET use_count = use_count + 1,
                 accepted_at = COALESCE(accepted_at, ?),
                 accepted_by = COALESCE(accepted_by, ?),
                 last_accepted_at = ?
             WHERE id = ? AND deleted_at IS NULL AND use_count < max_uses
             RETURNING ",
            invite_columns!()
        ))
        .bind(now)
        .bind(&tenant)
        .bind(now)
        .bind(invite.id.0.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let Some(updated) = updated else {
            tx.rollback().await.map_err(db_err)?;
            return Ok(AcceptOutcome::CapacityReached { invite });
        };
        let invite = updated.into_invite()?;

        sqlx::query(
            "INSERT INTO profiles(user_id, role, updated_at) VALUES(?, 'tenant', ?)
             ON CONFLICT(user_id) DO UPDATE SET role = excluded.role, updated_at = excluded.updated_at
             WHERE profiles.role IS NULL",
        )
        .bind(&tenant)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        let link = TenantPropertyLink {
            tenant_id: params.tenant_id.clone(),
            property_id: invite.property_id.clone(),
            owner_id: UserId(parse_uuid(&owner_id)?),
            invite_id: Some(invite.id.clone()),
            is_active: true,
            created_at: from_millis(now)?,
        };
        Ok(AcceptOutcome::Linked { invite, link })
    }

    async fn revoke_invite(&self, invite_id: &InviteId, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let revoked = sqlx::query("UPDATE invites SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")
            .bind(at.timestamp_millis())
            .bind(invite_id.0.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?
            .rows_affected();

        if revoked == 1 {
            return Ok(true);
        }
        // Distinguish "already revoked" from "never existed".
        self.get_invite(invite_id).await.map(|_| false)
    }

    async fn cleanup_invites(&self, params: &CleanupParams) -> Result<CleanupReport, StoreError> {
        let retain_after = params.retain_after.timestamp_millis();

        let revoked = sqlx::query(
            "UPDATE invites SET deleted_at = ?
             WHERE deleted_at IS NULL
               AND (expires_at <= ? OR (use_count >= max_uses AND last_accepted_at <= ?))",
        )
        .bind(params.now.timestamp_millis())
        .bind(retain_after)
        .bind(retain_after)
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .rows_affected();

        let purged = sqlx::query("DELETE FROM invites WHERE deleted_at IS NOT NULL AND deleted_at <= ?")
            .bind(params.purge_before.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(db_err)?
            .rows_affected();

        tracing::debug!(revoked, purged, "sqlite invite cleanup finished");
        Ok(CleanupReport { revoked, purged })
    }

    // ───────────────────────────── Links ──────────────────────────────────

    async fn get_link(
        &self,
        tenant_id: &UserId,
        property_id: &PropertyId,
    ) -> Result<TenantPropertyLink, StoreError> {
        let row = sqlx::query_as::<_, LinkRow>(concat!(
            "SELECT ",
            link_columns!(),
            " FROM tenant_property_links WHERE tenant_id = ? AND property_id = ?"
        ))
        .bind(tenant_id.0.to_string())
        .bind(property_id.0.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            None => Err(StoreError::NotFound),
            Some(row) => row.into_link(),
        }
    }

    async fn list_links(
        &self,
        property_id: &PropertyId,
    ) -> Result<Vec<TenantPropertyLink>, StoreError> {
        let rows = sqlx::query_as::<_, LinkRow>(concat!(
            "SELECT ",
            link_columns!(),
            " FROM tenant_property_links WHERE property_id = ? ORDER BY created_at, tenant_id"
        ))
        .bind(property_id.0.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(LinkRow::into_link).collect()
    }
}
