//! Application Configuration
//!
//! Configuration for the Auth application layer, read from the environment.
//! Production requires every secret; development falls back to a random
//! token secret and disables the admin surface and external login.

use std::fmt;
use std::time::Duration;

use rand::RngCore;
use thiserror::Error;

/// Minimum token secret length in bytes
pub const MIN_TOKEN_SECRET_BYTES: usize = 32;

const DEFAULT_TOKEN_TTL_MINUTES: i64 = 30;
const DEFAULT_OAUTH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_APP_ID: &str = "authy";

const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Production,
    Development,
}

impl AppEnv {
    pub fn is_production(&self) -> bool {
        matches!(self, AppEnv::Production)
    }
}

/// OAuth2 client registration with the identity provider
#[derive(Clone)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub timeout: Duration,
}

impl fmt::Debug for OAuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .field("authorize_url", &self.authorize_url)
            .field("token_url", &self.token_url)
            .field("userinfo_url", &self.userinfo_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Auth application configuration
#[derive(Clone)]
pub struct AuthConfig {
    pub env: AppEnv,
    /// HS256 key for access tokens; also keys the OAuth state signature
    pub token_secret: Vec<u8>,
    pub token_ttl_minutes: i64,
    /// `None` disables the admin surface
    pub admin_key: Option<String>,
    /// `None` disables external login
    pub oauth: Option<OAuthSettings>,
    /// Origins allowed as post-login redirect targets; empty allows any
    pub allowed_redirect_origins: Vec<String>,
    /// Attach a provider identity to an existing local account with the same email
    pub link_external_by_email: bool,
    /// Application id used when a request carries no `X-App-Id`
    pub default_app_id: String,
    /// Maximum age of an OAuth state blob
    pub state_max_age: Duration,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("env", &self.env)
            .field("token_secret", &"[REDACTED]")
            .field("token_ttl_minutes", &self.token_ttl_minutes)
            .field("admin_key", &self.admin_key.as_ref().map(|_| "[REDACTED]"))
            .field("oauth", &self.oauth)
            .field("allowed_redirect_origins", &self.allowed_redirect_origins)
            .field("link_external_by_email", &self.link_external_by_email)
            .field("default_app_id", &self.default_app_id)
            .field("state_max_age", &self.state_max_age)
            .finish()
    }
}

impl AuthConfig {
    /// Read configuration from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let env = match get("APP_ENV").as_deref() {
            Some("production") | Some("prod") => AppEnv::Production,
            Some("development") | Some("dev") => AppEnv::Development,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "APP_ENV",
                    reason: format!("expected production or development, got {other}"),
                });
            }
            None if cfg!(debug_assertions) => AppEnv::Development,
            None => AppEnv::Production,
        };
        let production = env.is_production();

        let token_secret = match get("AUTH_TOKEN_SECRET") {
            Some(secret) if secret.len() < MIN_TOKEN_SECRET_BYTES => {
                return Err(ConfigError::Invalid {
                    var: "AUTH_TOKEN_SECRET",
                    reason: format!("must be at least {MIN_TOKEN_SECRET_BYTES} bytes"),
                });
            }
            Some(secret) => secret.into_bytes(),
            None if production => return Err(ConfigError::Missing("AUTH_TOKEN_SECRET")),
            None => {
                tracing::warn!(
                    "AUTH_TOKEN_SECRET not set; using a random per-process secret, tokens will not survive a restart"
                );
                random_secret()
            }
        };

        let token_ttl_minutes = match get("AUTH_TOKEN_TTL_MINUTES") {
            Some(raw) => parse_positive("AUTH_TOKEN_TTL_MINUTES", &raw)?,
            None => DEFAULT_TOKEN_TTL_MINUTES,
        };

        let admin_key = get("AUTH_ADMIN_KEY");
        if admin_key.is_none() {
            if production {
                return Err(ConfigError::Missing("AUTH_ADMIN_KEY"));
            }
            tracing::warn!("AUTH_ADMIN_KEY not set; admin endpoints are disabled");
        }

        let oauth = match (
            get("OAUTH_CLIENT_ID"),
            get("OAUTH_CLIENT_SECRET"),
            get("OAUTH_REDIRECT_URI"),
        ) {
            (Some(client_id), Some(client_secret), Some(redirect_uri)) => {
                let timeout_secs = match get("OAUTH_TIMEOUT_SECS") {
                    Some(raw) => parse_positive("OAUTH_TIMEOUT_SECS", &raw)?,
                    None => DEFAULT_OAUTH_TIMEOUT_SECS as i64,
                };
                Some(OAuthSettings {
                    client_id,
                    client_secret,
                    redirect_uri,
                    authorize_url: get("OAUTH_AUTHORIZE_URL")
                        .unwrap_or_else(|| GOOGLE_AUTHORIZE_URL.to_string()),
                    token_url: get("OAUTH_TOKEN_URL")
                        .unwrap_or_else(|| GOOGLE_TOKEN_URL.to_string()),
                    userinfo_url: get("OAUTH_USERINFO_URL")
                        .unwrap_or_else(|| GOOGLE_USERINFO_URL.to_string()),
                    timeout: Duration::from_secs(timeout_secs as u64),
                })
            }
            (client_id, client_secret, _) if production => {
                let missing = if client_id.is_none() {
                    "OAUTH_CLIENT_ID"
                } else if client_secret.is_none() {
                    "OAUTH_CLIENT_SECRET"
                } else {
                    "OAUTH_REDIRECT_URI"
                };
                return Err(ConfigError::Missing(missing));
            }
            _ => {
                tracing::warn!("OAuth client not configured; external login is disabled");
                None
            }
        };

        let allowed_redirect_origins = get("AUTH_ALLOWED_REDIRECT_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|o| o.trim().trim_end_matches('/').to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let link_external_by_email = match get("AUTH_LINK_EXTERNAL_BY_EMAIL").as_deref() {
            None => false,
            Some("1") | Some("true") | Some("yes") => true,
            Some("0") | Some("false") | Some("no") => false,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "AUTH_LINK_EXTERNAL_BY_EMAIL",
                    reason: format!("expected a boolean, got {other}"),
                });
            }
        };

        Ok(Self {
            env,
            token_secret,
            token_ttl_minutes,
            admin_key,
            oauth,
            allowed_redirect_origins,
            link_external_by_email,
            default_app_id: get("AUTH_DEFAULT_APP_ID")
                .unwrap_or_else(|| DEFAULT_APP_ID.to_string()),
            state_max_age: Duration::from_secs(10 * 60),
        })
    }

    /// Development config with a random secret and nothing external configured
    pub fn development() -> Self {
        Self {
            env: AppEnv::Development,
            token_secret: random_secret(),
            token_ttl_minutes: DEFAULT_TOKEN_TTL_MINUTES,
            admin_key: None,
            oauth: None,
            allowed_redirect_origins: Vec::new(),
            link_external_by_email: false,
            default_app_id: DEFAULT_APP_ID.to_string(),
            state_max_age: Duration::from_secs(10 * 60),
        }
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.token_ttl_minutes)
    }
}

fn random_secret() -> Vec<u8> {
    let mut secret = vec![0u8; MIN_TOKEN_SECRET_BYTES];
    rand::rng().fill_bytes(&mut secret);
    secret
}

fn parse_positive(var: &'static str, raw: &str) -> Result<i64, ConfigError> {
    match raw.parse::<i64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::Invalid {
            var,
            reason: format!("expected a positive integer, got {raw}"),
        }),
    }
}
