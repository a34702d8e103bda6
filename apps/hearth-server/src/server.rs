use std::sync::Arc;
use std::time::Duration;

use axum::routing::{delete, get, post};
use axum::Router;
use hearth_crypto::TokenHasher;
use hearth_invites::InviteService;
use hearth_limits::{MemoryRateLimiter, RateLimiter};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use crate::backend::StoreBackend;
use crate::config::ServerConfig;
use crate::handlers;
use crate::metrics;

/// Shared state behind every HTTP handler.
#[derive(Clone)]
pub struct HearthServer {
    #[cfg(test)]
    pub store: StoreBackend,
    pub invites: Arc<InviteService>,
}

impl HearthServer {
    pub fn new(store: StoreBackend, config: &ServerConfig) -> Result<Self, hearth_crypto::KeyError> {
        let hasher = TokenHasher::new(&config.invite_key)?;
        let limiter: Arc<dyn RateLimiter> = Arc::new(MemoryRateLimiter::new(config.rate_limit));
        let invites = InviteService::new(
            Arc::new(store.clone()),
            hasher,
            limiter,
            config.invite.clone(),
        );
        Ok(Self {
            #[cfg(test)]
            store,
            invites: Arc::new(invites),
        })
    }

    /// Public API routes.
    pub fn router(self) -> Router {
        Router::new()
            .route("/v1/invites", post(handlers::invites::create_invite))
            .route("/v1/invites/validate", post(handlers::invites::validate_invite))
            .route("/v1/invites/accept", post(handlers::invites::accept_invite))
            .route("/v1/invites/{id}", delete(handlers::invites::revoke_invite))
            .route(
                "/v1/properties/{id}/invites",
                get(handlers::invites::list_invites),
            )
            .with_state(self)
    }
}

/// Run the maintenance sweep every `every` until shutdown is signalled.
pub async fn run_cleanup_loop(
    invites: Arc<InviteService>,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let timer = metrics::OperationTimer::new("cleanup");
                match invites.cleanup_expired_invites().await {
                    Ok(report) => {
                        metrics::record_cleanup(report.revoked, report.purged);
                        timer.finish("ok");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "invite cleanup failed");
                        timer.finish("error");
                    }
                }
            }
            _ = shutdown.recv() => {
                tracing::debug!("cleanup loop stopping");
                break;
            }
        }
    }
}
