//! Shared Kernel - Domain-crossing minimal core
//!
//! The smallest vocabulary shared by every crate in the workspace:
//! - Error classification, the unified error type and its HTTP rendering
//! - Storage error classification (feature `sqlx`)
//! - Typed integer identifiers
//!
//! Only things with one meaning across all domains belong here.

pub mod error {
    pub mod app_error;
    pub mod conversions;
    pub mod kind;
}
pub mod id;
