use std::sync::Arc;

use chrono::{DateTime, Utc};
use hearth_crypto::{InviteToken, TokenHasher};
use hearth_limits::{RateDecision, RateLimiter, GLOBAL_SCOPE};
use hearth_storage::{InvalidReason, Store, StoreError};

use crate::error::unavailable;
use crate::{InviteError, InvitePreview, PropertyDescriptor, Validation};

/// Read-only token check performed before a redeemer commits to accepting.
pub struct Validator {
    store: Arc<dyn Store>,
    hasher: TokenHasher,
    limiter: Arc<dyn RateLimiter>,
}

impl Validator {
    pub fn new(store: Arc<dyn Store>, hasher: TokenHasher, limiter: Arc<dyn RateLimiter>) -> Self {
        Self {
            store,
            hasher,
            limiter,
        }
    }

    /// Check `token` on behalf of the caller identified by `scope`.
    ///
    /// Unknown, revoked, expired and used-up tokens all come back as
    /// [`Validation::Invalid`]. The attempt is counted against `scope` (or the
    /// global bucket) before anything is looked up.
    pub async fn validate(
        &self,
        token: &InviteToken,
        scope: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Validation, InviteError> {
        let scope = scope.filter(|s| !s.is_empty()).unwrap_or(GLOBAL_SCOPE);
        if let RateDecision::Deny { retry_after } = self.limiter.check(scope).await {
            tracing::info!(scope, token = %token, "invite validation throttled");
            return Err(InviteError::Throttled { retry_after });
        }

        let hash = self.hasher.hash(token.expose());
        let invite = match self.store.get_invite_by_hash(hash.as_str()).await {
            Ok(invite) => invite,
            Err(StoreError::NotFound) => {
                tracing::info!(token = %token, reason = InvalidReason::NotFound.as_str(), "invite rejected");
                return Ok(Validation::Invalid);
            }
            Err(e) => {
                tracing::error!(token = %token, error = %e, "invite lookup failed");
                return Err(unavailable(e));
            }
        };

        if let Err(e) = self.store.record_validation_attempt(&invite.id, now).await {
            tracing::warn!(invite_id = %invite.id.0, error = %e, "failed to record validation attempt");
        }

        if let Some(reason) = invite.invalid_reason(now) {
            tracing::info!(
                token = %token,
                invite_id = %invite.id.0,
                reason = reason.as_str(),
                "invite rejected"
            );
            return Ok(Validation::Invalid);
        }

        let property = match self.store.get_property(&invite.property_id).await {
            Ok(property) => property,
            Err(StoreError::NotFound) => {
                tracing::warn!(invite_id = %invite.id.0, "invite points at a missing property");
                return Ok(Validation::Invalid);
            }
            Err(e) => return Err(unavailable(e)),
        };

        tracing::debug!(token = %token, invite_id = %invite.id.0, "invite valid");
        Ok(Validation::Valid(InvitePreview {
            property: PropertyDescriptor::from(&property),
            intended_email: invite.intended_email,
            max_uses: invite.max_uses,
            use_count: invite.use_count,
        }))
    }
}
