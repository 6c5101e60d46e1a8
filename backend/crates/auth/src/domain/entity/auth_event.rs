//! Auth Event Entity
//!
//! Append-only record of an authentication attempt, keyed by application
//! fingerprint only.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::value_object::app_fingerprint::AppFingerprint;

#[derive(Debug, Clone, Serialize)]
pub struct AuthEvent {
    pub id: i64,
    pub app_fingerprint: AppFingerprint,
    pub event_type: String,
    pub created_at: DateTime<Utc>,
}

/// Labels recorded by the auth flows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEventType {
    RegisterSuccess,
    RegisterFailure,
    LoginSuccess,
    LoginFailure,
    ExternalLoginSuccess,
    ExternalLoginFailure,
}

impl AuthEventType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            AuthEventType::RegisterSuccess => "register_success",
            AuthEventType::RegisterFailure => "register_failure",
            AuthEventType::LoginSuccess => "login_success",
            AuthEventType::LoginFailure => "login_failure",
            AuthEventType::ExternalLoginSuccess => "external_login_success",
            AuthEventType::ExternalLoginFailure => "external_login_failure",
        }
    }
}

/// Aggregate counters for the admin surface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AuthEventStats {
    pub total_events: i64,
    pub unique_apps: i64,
    pub total_users: i64,
}
