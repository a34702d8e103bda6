use std::time::Duration;

use chrono::{DateTime, Utc};
use hearth_storage::{
    AcceptInviteParams, AcceptOutcome, CleanupParams, CleanupReport, CreateInviteParams,
    CreatePropertyParams, InvalidReason, Invite, InviteId, Profile, ProfileRole, Property,
    PropertyId, Store, StoreError, TenantPropertyLink, UserId,
};
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

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

pub struct PostgresStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresStore {
    pub async fn open(url: &str) -> Result<Self, StoreError> {
        Self::open_with_timeout(url, DEFAULT_LOCK_TIMEOUT).await
    }

    /// `lock_timeout` bounds both pool checkout and row-lock waits inside transactions.
    pub async fn open_with_timeout(url: &str, lock_timeout: Duration) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(lock_timeout)
            .connect(url)
            .await
            .map_err(db_err)?;

        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self { pool, lock_timeout })
    }
}

#[derive(sqlx::FromRow)]
struct InviteRow {
    id: Uuid,
    property_id: Uuid,
    created_by: Uuid,
    token_hash: String,
    intended_email: Option<String>,
    delivery_method: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    accepted_at: Option<DateTime<Utc>>,
    accepted_by: Option<Uuid>,
    last_accepted_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
    max_uses: i32,
    use_count: i32,
    validation_attempts: i32,
    last_validation_attempt: Option<DateTime<Utc>>,
}

impl InviteRow {
    fn into_invite(self) -> Result<Invite, StoreError> {
        Ok(Invite {
            id: InviteId(self.id),
            property_id: PropertyId(self.property_id),
            created_by: UserId(self.created_by),
            token_hash: self.token_hash,
            intended_email: self.intended_email,
            delivery_method: self.delivery_method.parse().map_err(StoreError::Backend)?,
            created_at: self.created_at,
            expires_at: self.expires_at,
            accepted_at: self.accepted_at,
            accepted_by: self.accepted_by.map(UserId),
            last_accepted_at: self.last_accepted_at,
            deleted_at: self.deleted_at,
            max_uses: self.max_uses,
            use_count: self.use_count,
            validation_attempts: self.validation_attempts,
            last_validation_attempt: self.last_validation_attempt,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LinkRow {
    tenant_id: Uuid,
    property_id: Uuid,
    owner_id: Uuid,
    invite_id: Option<Uuid>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<LinkRow> for TenantPropertyLink {
    fn from(row: LinkRow) -> Self {
        TenantPropertyLink {
            tenant_id: UserId(row.tenant_id),
            property_id: PropertyId(row.property_id),
            owner_id: UserId(row.owner_id),
            invite_id: row.invite_id.map(InviteId),
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PropertyRow {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    address: String,
    owner_display_name: String,
    created_at: DateTime<Utc>,
}

impl From<PropertyRow> for Property {
    fn from(row: PropertyRow) -> Self {
        Property {
            id: PropertyId(row.id),
            owner_id: UserId(row.owner_id),
            name: row.name,
            address: row.address,
            owner_display_name: row.owner_display_name,
            created_at: row.created_at,
        }
    }
}

fn db_err(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::PoolTimedOut => StoreError::Timeout,
        sqlx::Error::Database(ref db) if db.is_unique_violation() => StoreError::AlreadyExists,
        sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => StoreError::NotFound,
        // lock_not_available, query_canceled
        sqlx::Error::Database(ref db)
            if matches!(db.code().as_deref(), Some("55P03") | Some("57014")) =>
        {
            StoreError::Timeout
        }
        other => StoreError::Backend(other.to_string()),
    }
}

#[async_trait::async_trait]
impl Store for PostgresStore {
    // ───────────────────────────── Properties ─────────────────────────────

    async fn create_property(&self, params: &CreatePropertyParams) -> Result<Property, StoreError> {
        let row = sqlx::query_as::<_, PropertyRow>(
            "INSERT INTO properties(id, owner_id, name, address, owner_display_name)
             VALUES($1, $2, $3, $4, $5)
             RETURNING id, owner_id, name, address, owner_display_name, created_at",
        )
        .bind(Uuid::now_v7())
        .bind(params.owner_id.0)
        .bind(&params.name)
        .bind(&params.address)
        .bind(&params.owner_display_name)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.into())
    }

    async fn get_property(&self, property_id: &PropertyId) -> Result<Property, StoreError> {
        let row = sqlx::query_as::<_, PropertyRow>(
            "SELECT id, owner_id, name, address, owner_display_name, created_at
             FROM properties WHERE id = $1",
        )
        .bind(property_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(Property::from).ok_or(StoreError::NotFound)
    }

    // ───────────────────────────── Profiles ───────────────────────────────

    async fn get_profile(&self, user_id: &UserId) -> Result<Profile, StoreError> {
        let row = sqlx::query_as::<_, (Option<String>, DateTime<Utc>)>(
            "SELECT role, updated_at FROM profiles WHERE user_id = $1",
        )
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let (role, updated_at) = row.ok_or(StoreError::NotFound)?;
        Ok(Profile {
            user_id: user_id.clone(),
            role: role
                .as_deref()
                .map(str::parse::<ProfileRole>)
                .transpose()
                .map_err(StoreError::Backend)?,
            updated_at,
        })
    }

    async fn set_profile_role(&self, user_id: &UserId, role: ProfileRole) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO profiles(user_id, role, updated_at) VALUES($1, $2, now())
             ON CONFLICT(user_id) DO UPDATE SET role = EXCLUDED.role, updated_at = EXCLUDED.updated_at",
        )
        .bind(user_id.0)
        .bind(role.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    // ───────────────────────────── Invites ────────────────────────────────

    async fn create_invite(&self, params: &CreateInviteParams) -> Result<Invite, StoreError> {
        let row = sqlx::query_as::<_, InviteRow>(concat!(
            "INSERT INTO invites(id, property_id, created_by, token_hash, intended_email,
                                 delivery_method, expires_at, max_uses)
             VALUES($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING ",
            invite_columns!()
        ))
        .bind(Uuid::now_v7())
        .bind(params.property_id.0)
        .bind(params.created_by.0)
        .bind(&params.token_hash)
        .bind(&params.intended_email)
        .bind(params.delivery_method.as_str())
        .bind(params.expires_at)
        .bind(params.max_uses)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        row.into_invite()
    }

    async fn get_invite(&self, invite_id: &InviteId) -> Result<Invite, StoreError> {
        let row = sqlx::query_as::<_, InviteRow>(concat!(
            "SELECT ",
            invite_columns!(),
            " FROM invites WHERE id = $1"
        ))
        .bind(invite_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.ok_or(StoreError::NotFound)?.into_invite()
    }

    async fn get_invite_by_hash(&self, token_hash: &str) -> Result<Invite, StoreError> {
        let row = sqlx::query_as::<_, InviteRow>(concat!(
            "SELECT ",
            invite_columns!(),
            " FROM invites WHERE token_hash = $1
              ORDER BY (deleted_at IS NULL) DESC, created_at DESC LIMIT 1"
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.ok_or(StoreError::NotFound)?.into_invite()
    }

    async fn list_invites(&self, property_id: &PropertyId) -> Result<Vec<Invite>, StoreError> {
        let rows = sqlx::query_as::<_, InviteRow>(concat!(
            "SELECT ",
            invite_columns!(),
            " FROM invites WHERE property_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(property_id.0)
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
             SET validation_attempts = validation_attempts + 1, last_validation_attempt = $1
             WHERE id = $2",
        )
        .bind(at)
        .bind(invite_id.0)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn accept_invite(
        &self,
        params: &AcceptInviteParams,
    ) -> Result<AcceptOutcome, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        // Every acceptance of the same invite queues on this row lock.
        let row = sqlx::query_as::<_, InviteRow>(concat!(
            "SELECT ",
            invite_columns!(),
            " FROM invites WHERE token_hash = $1
              ORDER BY (deleted_at IS NULL) DESC, created_at DESC LIMIT 1
              FOR UPDATE"
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

        let existing = sqlx::query_as::<_, LinkRow>(concat!(
            "SELECT ",
            link_columns!(),
            " FROM tenant_property_links WHERE tenant_id = $1 AND property_id = $2"
        ))
        .bind(params.tenant_id.0)
        .bind(invite.property_id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
        if let Some(link) = existing {
            tx.commit().await.map_err(db_err)?;
            return Ok(AcceptOutcome::AlreadyLinked {
                invite,
                link: link.into(),
            });
        }

        if params.now >= invite.expires_at {
            return Ok(AcceptOutcome::Invalid(InvalidReason::Expired));
        }
        if invite.use_count >= invite.max_uses {
            return Ok(AcceptOutcome::CapacityReached { invite });
        }

        let owner = sqlx::query_as::<_, (Uuid,)>("SELECT owner_id FROM properties WHERE id = $1")
            .bind(invite.property_id.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
        let Some((owner_id,)) = owner else {
            return Ok(AcceptOutcome::Invalid(InvalidReason::NotFound));
        };

        // A concurrent acceptance through a different invite for the same property
        // lands here as a no-op insert.
        let inserted = sqlx::query_as::<_, LinkRow>(concat!(
            "INSERT INTO tenant_property_links(tenant_id, property_id, owner_id, invite_id, is_active, created_at)
             VALUES($1, $2, $3, $4, TRUE, $5)
             ON CONFLICT(tenant_id, property_id) DO NOTHING
             RETURNING ",
            link_columns!()
        ))
        .bind(params.tenant_id.0)
        .bind(invite.property_id.0)
        .bind(owner_id)
        .bind(invite.id.0)
        .bind(params.now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let Some(link) = inserted else {
            let link = sqlx::query_as::<_, LinkRow>(concat!(
                "SELECT ",
                link_columns!(),
                " FROM tenant_property_links WHERE tenant_id = $1 AND property_id = $2"
            ))
            .bind(params.tenant_id.0)
            .bind(invite.property_id.0)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;
            tx.commit().await.map_err(db_err)?;
            return Ok(AcceptOutcome::AlreadyLinked {
                invite,
                link: link.into(),
            });
        };

        let updated = sqlx::query_as::<_, InviteRow>(concat!(
            "UPDATE invites
             SET use_count = use_count + 1,
                 accepted_at = COALESCE(accepted_at, $1),
                 accepted_by = COALESCE(accepted_by, $2),
                 last_accepted_at = $1
             WHERE id = $3 AND deleted_at IS NULL AND use_count < max_uses
             RETURNING ",
            invite_columns!()
        ))
        .bind(params.now)
        .bind(params.tenant_id.0)
        .bind(invite.id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let Some(updated) = updated else {
            tx.rollback().await.map_err(db_err)?;
            return Ok(AcceptOutcome::CapacityReached { invite });
        };

        sqlx::query(
            "INSERT INTO profiles(user_id, role, updated_at) VALUES($1, 'tenant', $2)
             ON CONFLICT(user_id) DO UPDATE SET role = EXCLUDED.role, updated_at = EXCLUDED.updated_at
             WHERE profiles.role IS NULL",
        )
        .bind(params.tenant_id.0)
        .bind(params.now)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        Ok(AcceptOutcome::Linked {
            invite: updated.into_invite()?,
            link: link.into(),
        })
    }

    async fn revoke_invite(&self, invite_id: &InviteId, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let revoked = sqlx::query(
            "UPDATE invites SET deleted_at = $1 WHERE id = $2 AND deleted_at IS NULL",
        )
        .bind(at)
        .bind(invite_id.0)
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .rows_affected();

        if revoked == 1 {
            return Ok(true);
        }
        self.get_invite(invite_id).await.map(|_| false)
    }

    async fn cleanup_invites(&self, params: &CleanupParams) -> Result<CleanupReport, StoreError> {
        let revoked = sqlx::query(
            "UPDATE invites SET deleted_at = $1
             WHERE deleted_at IS NULL
               AND (expires_at <= $2 OR (use_count >= max_uses AND last_accepted_at <= $2))",
        )
        .bind(params.now)
        .bind(params.retain_after)
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .rows_affected();

        let purged = sqlx::query("DELETE FROM invites WHERE deleted_at IS NOT NULL AND deleted_at <= $1")
            .bind(params.purge_before)
            .execute(&self.pool)
            .await
            .map_err(db_err)?
            .rows_affected();

        tracing::debug!(revoked, purged, "postgres invite cleanup finished");
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
            " FROM tenant_property_links WHERE tenant_id = $1 AND property_id = $2"
        ))
        .bind(tenant_id.0)
        .bind(property_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(TenantPropertyLink::from).ok_or(StoreError::NotFound)
    }

    async fn list_links(
        &self,
        property_id: &PropertyId,
    ) -> Result<Vec<TenantPropertyLink>, StoreError> {
        let rows = sqlx::query_as::<_, LinkRow>(concat!(
            "SELECT ",
            link_columns!(),
            " FROM tenant_property_links WHERE property_id = $1 ORDER BY created_at, tenant_id"
        ))
        .bind(property_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(TenantPropertyLink::from).collect())
    }
}
