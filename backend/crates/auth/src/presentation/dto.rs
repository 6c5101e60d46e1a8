//! API DTOs (Data Transfer Objects)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::application::login::IssuedToken;
use crate::domain::entity::user::User;
use crate::domain::value_object::auth_provider::AuthProvider;

// ============================================================================
// Users
// ============================================================================

/// Public view of a user; never carries the password digest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
    pub provider: AuthProvider,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.get(),
            email: user.email.as_str().to_string(),
            name: user.name.clone(),
            provider: user.provider,
            created_at: user.created_at,
        }
    }
}

// ============================================================================
// Register / Login
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    /// Always `bearer`
    pub token_type: String,
    /// Seconds until the token expires
    pub expires_in: i64,
    pub user: UserResponse,
}

impl From<IssuedToken> for LoginResponse {
    fn from(issued: IssuedToken) -> Self {
        Self {
            user: UserResponse::from(&issued.user),
            access_token: issued.access_token,
            token_type: "bearer".to_string(),
            expires_in: issued.expires_in,
        }
    }
}

// ============================================================================
// External Login
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ExternalStartQuery {
    pub redirect_uri: String,
}

/// Provider callback parameters; `error` is set when the user declined
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExternalCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

// ============================================================================
// Admin
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminStatsQuery {
    pub admin_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminEventsQuery {
    pub admin_key: Option<String>,
    pub app_id: Option<String>,
    pub limit: Option<u32>,
}
