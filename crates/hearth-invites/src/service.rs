use std::sync::Arc;

use chrono::{DateTime, Utc};
use hearth_crypto::{generate_invite_token, InviteToken, TokenHasher};
use hearth_limits::RateLimiter;
use hearth_storage::{
    CleanupParams, CleanupReport, CreateInviteParams, DeliveryMethod, InviteId, Property,
    PropertyId, Store, StoreError, UserId,
};

use crate::error::unavailable;
use crate::{
    AcceptResponse, Acceptor, CreateInviteRequest, CreatedInvite, InviteConfig, InviteError,
    InviteSummary, Validation, Validator,
};

/// A fresh token colliding with a live invite's hash is astronomically rare;
/// give up after this many draws.
const MAX_TOKEN_ATTEMPTS: usize = 3;

/// The invite lifecycle: issue, validate, accept, revoke, sweep.
pub struct InviteService {
    store: Arc<dyn Store>,
    hasher: TokenHasher,
    validator: Validator,
    acceptor: Acceptor,
    config: InviteConfig,
}

impl InviteService {
    pub fn new(
        store: Arc<dyn Store>,
        hasher: TokenHasher,
        limiter: Arc<dyn RateLimiter>,
        config: InviteConfig,
    ) -> Self {
        let validator = Validator::new(store.clone(), hasher.clone(), limiter);
        let acceptor = Acceptor::new(
            store.clone(),
            hasher.clone(),
            config.lock_timeout,
            config.retry,
            config.expose_capacity_reached,
        );
        Self {
            store,
            hasher,
            validator,
            acceptor,
            config,
        }
    }

    /// Issue a new invite for a property `owner` owns.
    ///
    /// The returned token is the only time the plaintext exists outside the
    /// caller; only its keyed hash is stored.
    pub async fn create_invite(
        &self,
        owner: &UserId,
        request: CreateInviteRequest,
    ) -> Result<CreatedInvite, InviteError> {
        let max_uses = request.max_uses.unwrap_or(1);
        if max_uses < 1 {
            return Err(InviteError::InvalidRequest(
                "max_uses must be at least 1".to_string(),
            ));
        }

        let intended_email = request
            .intended_email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());
        if let Some(email) = &intended_email {
            if !email.contains('@') {
                return Err(InviteError::InvalidRequest(
                    "intended_email is not an email address".to_string(),
                ));
            }
        }
        if request.delivery_method == DeliveryMethod::Email && intended_email.is_none() {
            return Err(InviteError::InvalidRequest(
                "email delivery requires intended_email".to_string(),
            ));
        }

        let expires_at = Utc::now()
            .checked_add_signed(self.config.ttl)
            .ok_or_else(|| InviteError::Unavailable("invite ttl is out of range".to_string()))?;
        let property = self.owned_property(owner, &request.property_id).await?;

        for attempt in 1..=MAX_TOKEN_ATTEMPTS {
            let token = generate_invite_token();
            let params = CreateInviteParams {
                property_id: property.id.clone(),
                created_by: owner.clone(),
                token_hash: self.hasher.hash(token.expose()).into_string(),
                intended_email: intended_email.clone(),
                delivery_method: request.delivery_method,
                expires_at,
                max_uses,
            };

            match self.store.create_invite(&params).await {
                Ok(invite) => {
                    tracing::info!(
                        invite_id = %invite.id.0,
                        property_id = %property.id.0,
                        delivery_method = %invite.delivery_method,
                        max_uses,
                        token = %token,
                        "invite created"
                    );
                    return Ok(CreatedInvite {
                        invite_id: invite.id,
                        token,
                        expires_at: invite.expires_at,
                    });
                }
                Err(StoreError::AlreadyExists) => {
                    tracing::warn!(attempt, "invite token hash collision, drawing a new token");
                }
                Err(StoreError::NotFound) => return Err(InviteError::PropertyNotFound),
                Err(e) => return Err(unavailable(e)),
            }
        }

        Err(InviteError::Unavailable(
            "could not allocate a unique invite token".to_string(),
        ))
    }

    /// See [`Validator::validate`].
    pub async fn validate_invite(
        &self,
        token: &InviteToken,
        scope: Option<&str>,
    ) -> Result<Validation, InviteError> {
        self.validator.validate(token, scope, Utc::now()).await
    }

    /// See [`Acceptor::accept`].
    pub async fn accept_invite(&self, token: &InviteToken, tenant: &UserId) -> AcceptResponse {
        self.acceptor.accept(token, tenant, Utc::now()).await
    }

    /// Soft-delete an invite. Returns `false` when it was already revoked.
    pub async fn revoke_invite(
        &self,
        owner: &UserId,
        invite_id: &InviteId,
    ) -> Result<bool, InviteError> {
        let invite = match self.store.get_invite(invite_id).await {
            Ok(invite) => invite,
            Err(StoreError::NotFound) => return Err(InviteError::NotFound),
            Err(e) => return Err(unavailable(e)),
        };
        match self.owned_property(owner, &invite.property_id).await {
            Ok(_) => {}
            Err(InviteError::PropertyNotFound) => return Err(InviteError::NotFound),
            Err(e) => return Err(e),
        }

        let revoked = match self.store.revoke_invite(invite_id, Utc::now()).await {
            Ok(revoked) => revoked,
            Err(StoreError::NotFound) => return Err(InviteError::NotFound),
            Err(e) => return Err(unavailable(e)),
        };
        if revoked {
            tracing::info!(invite_id = %invite_id.0, "invite revoked");
        } else {
            tracing::debug!(invite_id = %invite_id.0, "invite was already revoked");
        }
        Ok(revoked)
    }

    /// All invites of a property, newest first, as the owner sees them.
    pub async fn list_invites(
        &self,
        owner: &UserId,
        property_id: &PropertyId,
    ) -> Result<Vec<InviteSummary>, InviteError> {
        self.owned_property(owner, property_id).await?;
        let now = Utc::now();
        let invites = self
            .store
            .list_invites(property_id)
            .await
            .map_err(unavailable)?;
        Ok(invites
            .into_iter()
            .map(|i| InviteSummary::from_invite(i, now))
            .collect())
    }

    pub async fn cleanup_expired_invites(&self) -> Result<CleanupReport, InviteError> {
        self.cleanup_expired_invites_at(Utc::now()).await
    }

    /// Revoke invites past retention and purge long-revoked ones, as of `now`.
    pub async fn cleanup_expired_invites_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<CleanupReport, InviteError> {
        let out_of_range = || InviteError::Unavailable("cleanup window is out of range".to_string());
        let params = CleanupParams {
            now,
            retain_after: now
                .checked_sub_signed(self.config.retention)
                .ok_or_else(out_of_range)?,
            purge_before: now
                .checked_sub_signed(self.config.purge_after)
                .ok_or_else(out_of_range)?,
        };
        let report = self
            .store
            .cleanup_invites(&params)
            .await
            .map_err(unavailable)?;
        tracing::info!(
            revoked = report.revoked,
            purged = report.purged,
            "invite cleanup finished"
        );
        Ok(report)
    }

    async fn owned_property(
        &self,
        owner: &UserId,
        property_id: &PropertyId,
    ) -> Result<Property, InviteError> {
        let property = match self.store.get_property(property_id).await {
            Ok(p) => p,
            Err(StoreError::NotFound) => return Err(InviteError::PropertyNotFound),
            Err(e) => return Err(unavailable(e)),
        };
        if property.owner_id != *owner {
            tracing::warn!(
                property_id = %property_id.0,
                caller = %owner.0,
                "caller does not own property"
            );
            return Err(InviteError::Unauthorized);
        }
        Ok(property)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AcceptStatus;
    use hearth_crypto::InviteKey;
    use hearth_limits::{MemoryRateLimiter, RateLimitConfig};
    use hearth_storage::{
        AcceptOutcome, Invite, InvalidReason, MockStore, Property, TenantPropertyLink,
    };
    use std::time::Duration;
    use uuid::Uuid;

    fn hasher() -> TokenHasher {
        TokenHasher::new(&InviteKey::generate()).unwrap()
    }

    fn limiter() -> Arc<dyn RateLimiter> {
        Arc::new(MemoryRateLimiter::new(RateLimitConfig::default()))
    }

    fn fast_config() -> InviteConfig {
        InviteConfig {
            retry: crate::RetryPolicy {
                max_retries: 2,
                initial_backoff: Duration::from_millis(1),
            },
            lock_timeout: Duration::from_millis(200),
            ..InviteConfig::default()
        }
    }

    fn property(owner: &UserId) -> Property {
        Property {
            id: PropertyId(Uuid::now_v7()),
            owner_id: owner.clone(),
            name: "Maple Court".to_string(),
            address: "1 Maple Court".to_string(),
            owner_display_name: "Jo Landlord".to_string(),
            created_at: Utc::now(),
        }
    }

    fn invite_for(p: &Property) -> Invite {
        let now = Utc::now();
        Invite {
            id: InviteId(Uuid::now_v7()),
            property_id: p.id.clone(),
            created_by: p.owner_id.clone(),
            token_hash: "00".repeat(32),
            intended_email: None,
            delivery_method: DeliveryMethod::Code,
            created_at: now,
            expires_at: now + chrono::TimeDelta::hours(48),
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

    fn service(store: MockStore) -> InviteService {
        InviteService::new(Arc::new(store), hasher(), limiter(), fast_config())
    }

    #[tokio::test]
    async fn persistent_timeouts_surface_as_error_after_retries() {
        let mut store = MockStore::new();
        store
            .expect_accept_invite()
            .times(3)
            .returning(|_| Err(StoreError::Timeout));

        let svc = service(store);
        let resp = svc
            .accept_invite(&InviteToken::parse("Ab3dEf9hJk2M"), &UserId(Uuid::now_v7()))
            .await;
        assert_eq!(resp.status, AcceptStatus::Error);
        assert!(resp.property.is_none());
    }

    #[tokio::test]
    async fn invalid_outcome_is_not_retried() {
        let mut store = MockStore::new();
        store
            .expect_accept_invite()
            .times(1)
            .returning(|_| Ok(AcceptOutcome::Invalid(InvalidReason::Expired)));

        let resp = service(store)
            .accept_invite(&InviteToken::parse("Ab3dEf9hJk2M"), &UserId(Uuid::now_v7()))
            .await;
        assert_eq!(resp.status, AcceptStatus::Invalid);
    }

    #[tokio::test]
    async fn accept_hashes_token_with_the_service_key() {
        let owner = UserId(Uuid::now_v7());
        let p = property(&owner);
        let h = hasher();
        let expected = h.hash("Ab3dEf9hJk2M").into_string();

        let mut store = MockStore::new();
        let invite = invite_for(&p);
        let link = TenantPropertyLink {
            tenant_id: UserId(Uuid::now_v7()),
            property_id: p.id.clone(),
            owner_id: owner.clone(),
            invite_id: Some(invite.id.clone()),
            is_active: true,
            created_at: Utc::now(),
        };
        store
            .expect_accept_invite()
            .withf(move |params| params.token_hash == expected)
            .times(1)
            .returning(move |_| {
                Ok(AcceptOutcome::Linked {
                    invite: invite.clone(),
                    link: link.clone(),
                })
            });
        let returned = p.clone();
        store
            .expect_get_property()
            .returning(move |_| Ok(returned.clone()));

        let svc = InviteService::new(Arc::new(store), h, limiter(), fast_config());
        let resp = svc
            .accept_invite(&InviteToken::parse("Ab3dEf9hJk2M"), &UserId(Uuid::now_v7()))
            .await;
        assert_eq!(resp.status, AcceptStatus::Ok);
        assert_eq!(resp.property.unwrap().name, "Maple Court");
    }

    #[tokio::test]
    async fn capacity_reached_is_folded_unless_exposed() {
        let owner = UserId(Uuid::now_v7());
        let p = property(&owner);

        for (expose, expected) in [
            (false, AcceptStatus::Invalid),
            (true, AcceptStatus::CapacityReached),
        ] {
            let mut store = MockStore::new();
            let invite = invite_for(&p);
            store
                .expect_accept_invite()
                .returning(move |_| Ok(AcceptOutcome::CapacityReached { invite: invite.clone() }));
            let config = InviteConfig {
                expose_capacity_reached: expose,
                ..fast_config()
            };
            let svc = InviteService::new(Arc::new(store), hasher(), limiter(), config);
            let resp = svc
                .accept_invite(&InviteToken::parse("Ab3dEf9hJk2M"), &UserId(Uuid::now_v7()))
                .await;
            assert_eq!(resp.status, expected);
        }
    }

    #[tokio::test]
    async fn validate_lookup_failure_is_retryable() {
        let mut store = MockStore::new();
        store
            .expect_get_invite_by_hash()
            .returning(|_| Err(StoreError::Backend("connection reset".to_string())));

        let err = service(store)
            .validate_invite(&InviteToken::parse("Ab3dEf9hJk2M"), Some("10.0.0.1"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn validate_survives_bookkeeping_failure() {
        let owner = UserId(Uuid::now_v7());
        let p = property(&owner);
        let invite = invite_for(&p);

        let mut store = MockStore::new();
        store
            .expect_get_invite_by_hash()
            .returning(move |_| Ok(invite.clone()));
        store
            .expect_record_validation_attempt()
            .returning(|_, _| Err(StoreError::Timeout));
        let returned = p.clone();
        store
            .expect_get_property()
            .returning(move |_| Ok(returned.clone()));

        let validation = service(store)
            .validate_invite(&InviteToken::parse("Ab3dEf9hJk2M"), None)
            .await
            .unwrap();
        assert!(validation.is_valid());
    }

    #[tokio::test]
    async fn create_rejects_bad_requests_before_touching_the_store() {
        let svc = service(MockStore::new());
        let owner = UserId(Uuid::now_v7());
        let property_id = PropertyId(Uuid::now_v7());

        let err = svc
            .create_invite(
                &owner,
                CreateInviteRequest {
                    property_id: property_id.clone(),
                    delivery_method: DeliveryMethod::Code,
                    intended_email: None,
                    max_uses: Some(0),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, InviteError::InvalidRequest(_)));

        let err = svc
            .create_invite(
                &owner,
                CreateInviteRequest {
                    property_id,
                    delivery_method: DeliveryMethod::Email,
                    intended_email: Some("   ".to_string()),
                    max_uses: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, InviteError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn create_with_unrepresentable_ttl_fails_before_the_store() {
        let config = InviteConfig {
            ttl: chrono::TimeDelta::MAX,
            ..fast_config()
        };
        let svc = InviteService::new(Arc::new(MockStore::new()), hasher(), limiter(), config);
        let err = svc
            .create_invite(
                &UserId(Uuid::now_v7()),
                CreateInviteRequest {
                    property_id: PropertyId(Uuid::now_v7()),
                    delivery_method: DeliveryMethod::Code,
                    intended_email: None,
                    max_uses: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, InviteError::Unavailable(_)));
    }

    #[tokio::test]
    async fn cleanup_with_unrepresentable_window_fails_before_the_store() {
        for config in [
            InviteConfig {
                retention: chrono::TimeDelta::MAX,
                ..fast_config()
            },
            InviteConfig {
                purge_after: chrono::TimeDelta::MAX,
                ..fast_config()
            },
        ] {
            let svc = InviteService::new(Arc::new(MockStore::new()), hasher(), limiter(), config);
            let err = svc.cleanup_expired_invites_at(Utc::now()).await.unwrap_err();
            assert!(matches!(err, InviteError::Unavailable(_)));
        }
    }

    #[tokio::test]
    async fn create_retries_on_hash_collision() {
        let owner = UserId(Uuid::now_v7());
        let p = property(&owner);

        let mut store = MockStore::new();
        let returned = p.clone();
        store
            .expect_get_property()
            .returning(move |_| Ok(returned.clone()));
        let mut seq = mockall::Sequence::new();
        store
            .expect_create_invite()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(StoreError::AlreadyExists));
        let invite = invite_for(&p);
        store
            .expect_create_invite()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(invite.clone()));

        let created = service(store)
            .create_invite(
                &owner,
                CreateInviteRequest {
                    property_id: p.id.clone(),
                    delivery_method: DeliveryMethod::Code,
                    intended_email: None,
                    max_uses: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(created.token.expose().len(), hearth_crypto::TOKEN_LENGTH);
    }

    #[tokio::test]
    async fn create_gives_up_after_repeated_collisions() {
        let owner = UserId(Uuid::now_v7());
        let p = property(&owner);

        let mut store = MockStore::new();
        let returned = p.clone();
        store
            .expect_get_property()
            .returning(move |_| Ok(returned.clone()));
        store
            .expect_create_invite()
            .times(MAX_TOKEN_ATTEMPTS)
            .returning(|_| Err(StoreError::AlreadyExists));

        let err = service(store)
            .create_invite(
                &owner,
                CreateInviteRequest {
                    property_id: p.id.clone(),
                    delivery_method: DeliveryMethod::Code,
                    intended_email: None,
                    max_uses: None,
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn slow_store_is_cut_off_by_lock_timeout() {
        struct SlowStore;

        #[async_trait::async_trait]
        impl Store for SlowStore {
            async fn create_property(
                &self,
                _: &hearth_storage::CreatePropertyParams,
            ) -> Result<Property, StoreError> {
                Err(StoreError::Backend("read only".to_string()))
            }
            async fn get_property(&self, _: &PropertyId) -> Result<Property, StoreError> {
                Err(StoreError::NotFound)
            }
            async fn get_profile(
                &self,
                _: &UserId,
            ) -> Result<hearth_storage::Profile, StoreError> {
                Err(StoreError::NotFound)
            }
            async fn set_profile_role(
                &self,
                _: &UserId,
                _: hearth_storage::ProfileRole,
            ) -> Result<(), StoreError> {
                Ok(())
            }
            async fn create_invite(&self, _: &CreateInviteParams) -> Result<Invite, StoreError> {
                Err(StoreError::Backend("read only".to_string()))
            }
            async fn get_invite(&self, _: &InviteId) -> Result<Invite, StoreError> {
                Err(StoreError::NotFound)
            }
            async fn get_invite_by_hash(&self, _: &str) -> Result<Invite, StoreError> {
                Err(StoreError::NotFound)
            }
            async fn list_invites(&self, _: &PropertyId) -> Result<Vec<Invite>, StoreError> {
                Ok(vec![])
            }
            async fn record_validation_attempt(
                &self,
                _: &InviteId,
                _: DateTime<Utc>,
            ) -> Result<(), StoreError> {
                Ok(())
            }
            async fn accept_invite(
                &self,
                _: &hearth_storage::AcceptInviteParams,
            ) -> Result<AcceptOutcome, StoreError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(AcceptOutcome::Invalid(InvalidReason::NotFound))
            }
            async fn revoke_invite(&self, _: &InviteId, _: DateTime<Utc>) -> Result<bool, StoreError> {
                Err(StoreError::NotFound)
            }
            async fn cleanup_invites(
                &self,
                _: &CleanupParams,
            ) -> Result<CleanupReport, StoreError> {
                Ok(CleanupReport::default())
            }
            async fn get_link(
                &self,
                _: &UserId,
                _: &PropertyId,
            ) -> Result<TenantPropertyLink, StoreError> {
                Err(StoreError::NotFound)
            }
            async fn list_links(
                &self,
                _: &PropertyId,
            ) -> Result<Vec<TenantPropertyLink>, StoreError> {
                Ok(vec![])
            }
        }

        let config = InviteConfig {
            lock_timeout: Duration::from_millis(20),
            ..fast_config()
        };
        let svc = InviteService::new(Arc::new(SlowStore), hasher(), limiter(), config);
        let started = std::time::Instant::now();
        let resp = svc
            .accept_invite(&InviteToken::parse("Ab3dEf9hJk2M"), &UserId(Uuid::now_v7()))
            .await;
        assert_eq!(resp.status, AcceptStatus::Error);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
