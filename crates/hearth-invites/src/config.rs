use std::time::Duration;

use chrono::TimeDelta;

use crate::RetryPolicy;

/// Tunables of the invite lifecycle.
#[derive(Clone, Debug)]
pub struct InviteConfig {
    /// Lifetime of a freshly created invite.
    pub ttl: TimeDelta,
    /// How long expired or used-up invites stay visible before the sweep revokes them.
    pub retention: TimeDelta,
    /// How long revoked invites are kept before the sweep deletes them.
    pub purge_after: TimeDelta,
    /// Upper bound on one acceptance attempt, lock wait included.
    pub lock_timeout: Duration,
    pub retry: RetryPolicy,
    /// Report `CapacityReached` to redeemers instead of folding it into `Invalid`.
    pub expose_capacity_reached: bool,
}

impl Default for InviteConfig {
    fn default() -> Self {
        Self {
            ttl: TimeDelta::hours(48),
            retention: TimeDelta::days(7),
            purge_after: TimeDelta::days(30),
            lock_timeout: Duration::from_secs(3),
            retry: RetryPolicy::default(),
            expose_capacity_reached: false,
        }
    }
}
