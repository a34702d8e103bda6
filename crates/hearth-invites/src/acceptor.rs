use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hearth_crypto::{InviteToken, TokenHasher};
use hearth_storage::{AcceptInviteParams, AcceptOutcome, Invite, Store, StoreError, UserId};

use crate::{AcceptResponse, AcceptStatus, PropertyDescriptor, RetryPolicy};

/// Redeems tokens. All state changes happen inside one store transaction.
pub struct Acceptor {
    store: Arc<dyn Store>,
    hasher: TokenHasher,
    lock_timeout: Duration,
    retry: RetryPolicy,
    expose_capacity_reached: bool,
}

impl Acceptor {
    pub fn new(
        store: Arc<dyn Store>,
        hasher: TokenHasher,
        lock_timeout: Duration,
        retry: RetryPolicy,
        expose_capacity_reached: bool,
    ) -> Self {
        Self {
            store,
            hasher,
            lock_timeout,
            retry,
            expose_capacity_reached,
        }
    }

    /// Link `tenant` to the property behind `token`.
    ///
    /// Idempotent per tenant: a repeat call returns `AlreadyLinked` and changes
    /// nothing. Transient store failures are retried; if they persist the
    /// status is `Error`, never `Invalid`.
    pub async fn accept(
        &self,
        token: &InviteToken,
        tenant: &UserId,
        now: DateTime<Utc>,
    ) -> AcceptResponse {
        let params = AcceptInviteParams {
            token_hash: self.hasher.hash(token.expose()).into_string(),
            tenant_id: tenant.clone(),
            now,
        };

        let outcome = self
            .retry
            .run(|| self.attempt(&params), StoreError::is_transient)
            .await;

        match outcome {
            Ok(AcceptOutcome::Linked { invite, link }) => {
                tracing::info!(
                    token = %token,
                    invite_id = %invite.id.0,
                    property_id = %link.property_id.0,
                    tenant_id = %tenant.0,
                    use_count = invite.use_count,
                    "invite accepted"
                );
                self.respond(AcceptStatus::Ok, &invite).await
            }
            Ok(AcceptOutcome::AlreadyLinked { invite, .. }) => {
                tracing::info!(
                    token = %token,
                    invite_id = %invite.id.0,
                    tenant_id = %tenant.0,
                    "tenant already linked"
                );
                self.respond(AcceptStatus::AlreadyLinked, &invite).await
            }
            Ok(AcceptOutcome::CapacityReached { invite }) => {
                tracing::info!(
                    token = %token,
                    invite_id = %invite.id.0,
                    reason = "exhausted",
                    "invite rejected"
                );
                if self.expose_capacity_reached {
                    AcceptResponse::bare(AcceptStatus::CapacityReached)
                } else {
                    AcceptResponse::bare(AcceptStatus::Invalid)
                }
            }
            Ok(AcceptOutcome::Invalid(reason)) => {
                tracing::info!(token = %token, reason = reason.as_str(), "invite rejected");
                AcceptResponse::bare(AcceptStatus::Invalid)
            }
            Err(e) => {
                tracing::error!(token = %token, error = %e, "invite acceptance failed");
                AcceptResponse::bare(AcceptStatus::Error)
            }
        }
    }

    async fn attempt(&self, params: &AcceptInviteParams) -> Result<AcceptOutcome, StoreError> {
        // Dropping the store future rolls its transaction back.
        match tokio::time::timeout(self.lock_timeout, self.store.accept_invite(params)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout),
        }
    }

    /// The link is already committed at this point; a failed descriptor read
    /// only costs the caller the property details.
    async fn respond(&self, status: AcceptStatus, invite: &Invite) -> AcceptResponse {
        let property = match self.store.get_property(&invite.property_id).await {
            Ok(p) => Some(PropertyDescriptor::from(&p)),
            Err(e) => {
                tracing::warn!(
                    property_id = %invite.property_id.0,
                    error = %e,
                    "could not load property descriptor"
                );
                None
            }
        };
        AcceptResponse { status, property }
    }
}
