//! Type definitions for hearth storage.

mod accept;
mod ids;
mod invites;
mod links;
mod properties;

// Re-export all types from submodules
pub use accept::*;
pub use ids::*;
pub use invites::*;
pub use links::*;
pub use properties::*;
