//! HTTP handler tests.

mod invites;
