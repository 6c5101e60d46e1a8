//! Repository Traits
//!
//! The identity store: users and auth events. Implementations live in the
//! infrastructure layer (Postgres, in-memory); use cases never know which.
//!
//! Uniqueness of email and external id is enforced by the engine itself,
//! so concurrent creates cannot both succeed.

use crate::domain::entity::{
    auth_event::{AuthEvent, AuthEventStats},
    user::{NewUser, User, UserUpdate},
};
use crate::domain::value_object::{email::Email, external_id::ExternalId, user_id::UserId};
use crate::error::AuthResult;

/// Identity store trait
#[trait_variant::make(IdentityStore: Send)]
pub trait LocalIdentityStore {
    /// Create a user.
    ///
    /// Fails with `DuplicateEmail` / `DuplicateExternalId` on conflict.
    async fn create_user(&self, new_user: NewUser) -> AuthResult<User>;

    async fn get_user_by_email(&self, email: &Email) -> AuthResult<Option<User>>;

    async fn get_user_by_id(&self, user_id: UserId) -> AuthResult<Option<User>>;

    async fn get_user_by_external_id(&self, external_id: &ExternalId)
    -> AuthResult<Option<User>>;

    /// Apply an allow-listed update and return the stored record.
    ///
    /// `NotFound` if the user does not exist.
    async fn update_user(&self, user_id: UserId, update: UserUpdate) -> AuthResult<User>;

    /// Returns whether a user was removed.
    async fn delete_user(&self, user_id: UserId) -> AuthResult<bool>;

    /// Append an event; the raw `app_id` is fingerprinted, never stored.
    async fn record_auth_event(&self, app_id: &str, event_type: &str) -> AuthResult<AuthEvent>;

    /// Newest first, optionally restricted to one application.
    async fn list_auth_events(&self, app_id: Option<&str>, limit: u32)
    -> AuthResult<Vec<AuthEvent>>;

    async fn auth_event_stats(&self) -> AuthResult<AuthEventStats>;
}
