//! External Login Use Case
//!
//! OAuth2 authorization-code login against the configured identity provider:
//! 1. `start` seals the caller's redirect target into `state` and returns the
//!    consent URL.
//! 2. `complete` exchanges the code, fetches the profile and reconciles it
//!    with a local user, then issues an access token.
//!
//! Nothing is written to the store until both provider calls have succeeded.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use platform::token::TokenService;
use reqwest::Url;

use crate::application::config::AuthConfig;
use crate::application::login::{IssuedToken, issue_for};
use crate::application::oauth_state::{OAuthState, StateSealer};
use crate::application::register::normalize_name;
use crate::domain::entity::user::{NewUser, User, UserUpdate};
use crate::domain::identity_provider::IdentityProvider;
use crate::domain::repository::IdentityStore;
use crate::domain::value_object::{email::Email, external_id::ExternalId};
use crate::error::{AuthError, AuthResult};

const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// Where to send the browser, and the nonce it must bring back
#[derive(Debug, Clone)]
pub struct ExternalLoginStart {
    pub consent_url: String,
    pub nonce: String,
}

pub struct ExternalLoginUseCase<R, P>
where
    R: IdentityStore,
    P: IdentityProvider,
{
    store: Arc<R>,
    provider: Arc<P>,
    tokens: Arc<TokenService>,
    sealer: Arc<StateSealer>,
    config: Arc<AuthConfig>,
}

impl<R, P> ExternalLoginUseCase<R, P>
where
    R: IdentityStore,
    P: IdentityProvider,
{
    pub fn new(
        store: Arc<R>,
        provider: Arc<P>,
        tokens: Arc<TokenService>,
        sealer: Arc<StateSealer>,
        config: Arc<AuthConfig>,
    ) -> Self {
        Self {
            store,
            provider,
            tokens,
            sealer,
            config,
        }
    }

    /// Consent URL for a login that will come back to `redirect_uri`
    pub fn start(&self, redirect_uri: &str) -> AuthResult<ExternalLoginStart> {
        validate_redirect(redirect_uri, &self.config.allowed_redirect_origins)?;
        let sealed = self.sealer.seal(redirect_uri)?;
        let consent_url = self.provider.authorization_url(&sealed.value)?;

        Ok(ExternalLoginStart {
            consent_url,
            nonce: sealed.nonce,
        })
    }

    /// Verify the `state` returned by the provider against the nonce held by
    /// the browser that called `start`
    pub fn open_state(&self, state: &str, browser_nonce: Option<&str>) -> AuthResult<OAuthState> {
        self.sealer.open(state, browser_nonce)
    }

    pub async fn complete(&self, code: &str) -> AuthResult<IssuedToken> {
        if code.trim().is_empty() {
            return Err(AuthError::Validation("Missing authorization code".into()));
        }

        let timeout = self.provider_timeout();
        let access_token =
            with_timeout(timeout, "token exchange", self.provider.exchange_code(code)).await?;
        let profile = with_timeout(
            timeout,
            "profile fetch",
            self.provider.fetch_profile(&access_token),
        )
        .await?;

        let external_id = profile
            .subject
            .as_deref()
            .ok_or_else(|| AuthError::ProviderResponseInvalid("profile has no subject".into()))
            .and_then(|s| {
                ExternalId::new(s)
                    .map_err(|_| AuthError::ProviderResponseInvalid("profile subject unusable".into()))
            })?;
        let email = profile
            .email
            .as_deref()
            .ok_or_else(|| AuthError::ProviderResponseInvalid("profile has no email".into()))
            .and_then(|e| {
                Email::new(e)
                    .map_err(|_| AuthError::ProviderResponseInvalid("profile email unusable".into()))
            })?;
        // A provider name we cannot store is dropped rather than failing the login
        let name = normalize_name(profile.name).unwrap_or(None);

        let email_verified = profile.email_verified == Some(true);

        let user = self
            .reconcile(external_id, email, email_verified, name)
            .await?;

        tracing::info!(user_id = %user.id, provider = %user.provider, "External login succeeded");

        issue_for(&self.tokens, user)
    }

    fn provider_timeout(&self) -> Duration {
        self.config
            .oauth
            .as_ref()
            .map(|o| o.timeout)
            .unwrap_or(DEFAULT_PROVIDER_TIMEOUT)
    }

    /// Find or create the local user for a provider identity.
    ///
    /// Linking onto an existing account by email needs the switch on and a
    /// provider-verified email.
    async fn reconcile(
        &self,
        external_id: ExternalId,
        email: Email,
        email_verified: bool,
        name: Option<String>,
    ) -> AuthResult<User> {
        if let Some(user) = self.store.get_user_by_external_id(&external_id).await? {
            return Ok(user);
        }

        if let Some(existing) = self.store.get_user_by_email(&email).await? {
            // Created by a concurrent login for this identity since the lookup above
            if existing.external_id.as_ref() == Some(&external_id) {
                return Ok(existing);
            }
            let reason = if !self.config.link_external_by_email || existing.external_id.is_some() {
                Some("email owned by another account")
            } else if !email_verified {
                Some("provider email not verified")
            } else {
                None
            };
            if let Some(reason) = reason {
                tracing::info!(user_id = %existing.id, reason, "External login rejected");
                return Err(AuthError::EmailTaken);
            }

            tracing::info!(user_id = %existing.id, "Linking external identity by email");
            return match self
                .store
                .update_user(existing.id, UserUpdate::link_external_id(external_id.clone()))
                .await
            {
                Err(AuthError::DuplicateExternalId) => self.winner(&external_id).await,
                other => other,
            };
        }

        match self
            .store
            .create_user(NewUser::external(email, external_id.clone(), name))
            .await
        {
            Ok(user) => {
                tracing::info!(user_id = %user.id, "User created from external identity");
                Ok(user)
            }
            // Lost a race against a concurrent login for the same identity
            Err(AuthError::DuplicateExternalId) => self.winner(&external_id).await,
            Err(AuthError::DuplicateEmail) => {
                match self.store.get_user_by_external_id(&external_id).await? {
                    Some(user) => Ok(user),
                    None => Err(AuthError::EmailTaken),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn winner(&self, external_id: &ExternalId) -> AuthResult<User> {
        self.store
            .get_user_by_external_id(external_id)
            .await?
            .ok_or_else(|| AuthError::Internal("external id conflict without a holder".into()))
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    step: &'static str,
    call: impl Future<Output = AuthResult<T>>,
) -> AuthResult<T> {
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| AuthError::ProviderUnavailable(format!("{step} timed out")))?
}

/// Redirect targets must be absolute http(s) URLs, and inside the allow-list
/// when one is configured.
pub fn validate_redirect(redirect_uri: &str, allowed_origins: &[String]) -> AuthResult<()> {
    let url = Url::parse(redirect_uri)
        .map_err(|_| AuthError::Validation("redirect_uri must be an absolute URL".into()))?;

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(AuthError::Validation(
            "redirect_uri must be an http(s) URL".into(),
        ));
    }

    if !allowed_origins.is_empty() {
        let origin = url.origin().ascii_serialization();
        if !allowed_origins.iter().any(|allowed| *allowed == origin) {
            return Err(AuthError::Validation("redirect_uri origin is not allowed".into()));
        }
    }

    Ok(())
}

/// Append query parameters to a redirect target
pub fn redirect_with(base: &str, params: &[(&str, &str)]) -> AuthResult<String> {
    let mut url = Url::parse(base).map_err(|_| AuthError::InvalidState)?;
    {
        let mut query = url.query_pairs_mut();
        for (key, value) in params {
            query.append_pair(key, value);
        }
    }
    Ok(url.into())
}
