//! Application Layer
//!
//! Use cases and application services.

pub mod analytics;
pub mod config;
pub mod current_user;
pub mod external_login;
pub mod login;
pub mod oauth_state;
pub mod register;

// Re-exports
pub use analytics::{AnalyticsSummary, AnalyticsUseCase};
pub use config::{AppEnv, AuthConfig, ConfigError, OAuthSettings};
pub use current_user::CurrentUserUseCase;
pub use external_login::{ExternalLoginStart, ExternalLoginUseCase};
pub use login::{IssuedToken, LoginInput, LoginUseCase};
pub use oauth_state::{OAuthState, SealedState, StateSealer};
pub use register::{RegisterInput, RegisterUseCase};
