//! Value Object Module

pub mod app_fingerprint;
pub mod auth_provider;
pub mod email;
pub mod external_id;
pub mod user_id;
