//! Infrastructure Layer
//!
//! Identity store engines and the identity provider HTTP client.

pub mod memory;
pub mod oauth;
pub mod postgres;

pub use memory::InMemoryIdentityStore;
pub use oauth::OAuthIdentityProvider;
pub use postgres::PgIdentityStore;
