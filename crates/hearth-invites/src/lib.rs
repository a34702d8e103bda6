//! Invite token lifecycle for hearth.
//!
//! A property owner issues a short secret token; the redeemer validates it
//! (read-only, rate limited) and then accepts it, which links them to the
//! property exactly once even when many redeemers race on the same token.
//!
//! [`InviteService`] is the entry point. [`Validator`] and [`Acceptor`] are
//! exposed for callers that only need one half of the flow.

mod acceptor;
mod config;
mod error;
mod retry;
mod service;
mod types;
mod validator;

pub use acceptor::Acceptor;
pub use config::InviteConfig;
pub use error::InviteError;
pub use retry::RetryPolicy;
pub use service::InviteService;
pub use types::*;
pub use validator::Validator;

pub use hearth_crypto::{InviteKey, InviteToken, TokenHasher};
pub use hearth_storage::{CleanupReport, DeliveryMethod, InviteId, InviteState, PropertyId, UserId};
