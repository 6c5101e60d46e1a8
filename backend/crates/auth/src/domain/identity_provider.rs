//! Identity Provider Trait
//!
//! The two calls of an OAuth2 authorization-code login. The HTTP client lives
//! in `infra::oauth`; tests script their own provider.

use std::fmt;

use crate::error::AuthResult;

/// Bearer credential returned by the provider's token endpoint
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderAccessToken(pub String);

impl fmt::Debug for ProviderAccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProviderAccessToken([REDACTED])")
    }
}

/// Profile as reported by the provider; fields are checked by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalProfile {
    pub subject: Option<String>,
    pub email: Option<String>,
    /// `None` when the provider does not say
    pub email_verified: Option<bool>,
    pub name: Option<String>,
}

#[trait_variant::make(IdentityProvider: Send)]
pub trait LocalIdentityProvider {
    /// Consent page URL carrying our opaque `state`.
    ///
    /// `ProviderUnavailable` when the provider is not configured.
    fn authorization_url(&self, state: &str) -> AuthResult<String>;

    /// Trade an authorization code for an access token.
    async fn exchange_code(&self, code: &str) -> AuthResult<ProviderAccessToken>;

    async fn fetch_profile(&self, access_token: &ProviderAccessToken)
    -> AuthResult<ExternalProfile>;
}
