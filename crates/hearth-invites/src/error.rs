use std::time::Duration;

use hearth_storage::StoreError;
use thiserror::Error;

/// Errors surfaced to callers of [`crate::InviteService`].
///
/// Redeemer-facing failures (unknown, expired, revoked, used-up tokens) are not
/// errors: they are the `Invalid` result of validation and acceptance.
#[derive(Debug, Error)]
pub enum InviteError {
    #[error("caller does not own this property")]
    Unauthorized,
    #[error("property not found")]
    PropertyNotFound,
    #[error("invite not found")]
    NotFound,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("too many attempts, retry in {}s", .retry_after.as_secs().max(1))]
    Throttled { retry_after: Duration },
    #[error("invite store unavailable: {0}")]
    Unavailable(String),
}

impl InviteError {
    /// Only store trouble is worth retrying; everything else is a final answer.
    pub fn is_retryable(&self) -> bool {
        matches!(self, InviteError::Unavailable(_))
    }
}

pub(crate) fn unavailable(e: StoreError) -> InviteError {
    InviteError::Unavailable(e.to_string())
}
