//! Auth (Authentication) Backend Module
//!
//! Clean Architecture structure:
//! - `domain/` - Entities, value objects, identity store and provider traits
//! - `application/` - Use cases and configuration
//! - `infra/` - Postgres and in-memory stores, OAuth2 HTTP client
//! - `presentation/` - HTTP handlers, DTOs, router, middleware
//!
//! ## Features
//! - Email + password registration and login
//! - HS256 bearer tokens keyed to the user id
//! - External login through an OAuth2 identity provider, reconciled with
//!   local accounts by provider id (and optionally by email)
//! - Anonymized auth event analytics with an admin read surface
//!
//! ## Security Model
//! - Passwords hashed with Argon2id; inputs over 72 bytes are pre-hashed so
//!   no suffix is ever ignored
//! - Login failures are indistinguishable to the caller
//! - OAuth `state` is HMAC-signed and expires
//! - Application ids are stored only as SHA-256 fingerprints

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;

#[cfg(test)]
mod tests;

// Re-exports for convenience
pub use application::config::{AuthConfig, ConfigError};
pub use error::{AuthError, AuthResult};
pub use infra::{InMemoryIdentityStore, OAuthIdentityProvider, PgIdentityStore};
pub use presentation::handlers::AuthAppState;
pub use presentation::router::{admin_router, auth_router, identity_router};

// Re-export kernel error types for unified error handling
pub use kernel::error::{
    app_error::{AppError, AppResult},
    kind::ErrorKind,
};
