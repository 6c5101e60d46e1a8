//! Presentation Layer
//!
//! HTTP handlers, DTOs, router, and middleware.

pub mod admin;
pub mod dto;
pub mod handlers;
pub mod middleware;
pub mod router;

pub use handlers::AuthAppState;
pub use middleware::{AuthenticatedUser, require_bearer};
pub use router::{admin_router, auth_router, identity_router};
