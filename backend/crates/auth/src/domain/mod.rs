//! Domain Layer
//!
//! Contains entities, value objects, the identity store trait and the
//! identity provider trait.

pub mod entity;
pub mod identity_provider;
pub mod repository;
pub mod value_object;

// Re-exports
pub use entity::{
    auth_event::{AuthEvent, AuthEventStats, AuthEventType},
    user::{NewUser, User, UserUpdate},
};
pub use identity_provider::{ExternalProfile, IdentityProvider};
pub use repository::IdentityStore;
