//! OAuth2 identity provider client
//!
//! Authorization-code flow against configurable endpoints (Google defaults):
//! form-encoded POST to the token endpoint, then a bearer GET of the
//! userinfo endpoint.

use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;

use crate::application::config::OAuthSettings;
use crate::domain::identity_provider::{ExternalProfile, IdentityProvider, ProviderAccessToken};
use crate::error::{AuthError, AuthResult};

const SCOPES: &str = "openid email profile";

/// HTTP identity provider; disabled when constructed without settings
pub struct OAuthIdentityProvider {
    client: Client,
    settings: Option<OAuthSettings>,
}

impl OAuthIdentityProvider {
    pub fn new(settings: Option<OAuthSettings>) -> AuthResult<Self> {
        let mut builder = Client::builder();
        if let Some(settings) = &settings {
            builder = builder.timeout(settings.timeout);
        }
        let client = builder
            .build()
            .map_err(|e| AuthError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, settings })
    }

    fn settings(&self) -> AuthResult<&OAuthSettings> {
        self.settings
            .as_ref()
            .ok_or_else(|| AuthError::ProviderUnavailable("external login is not configured".into()))
    }
}

impl IdentityProvider for OAuthIdentityProvider {
    fn authorization_url(&self, state: &str) -> AuthResult<String> {
        let settings = self.settings()?;
        let mut url = Url::parse(&settings.authorize_url)
            .map_err(|e| AuthError::Internal(format!("invalid authorize URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", &settings.client_id)
            .append_pair("redirect_uri", &settings.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", SCOPES)
            .append_pair("state", state);

        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str) -> AuthResult<ProviderAccessToken> {
        let settings = self.settings()?;

        let response = self
            .client
            .post(&settings.token_url)
            .form(&[
                ("client_id", settings.client_id.as_str()),
                ("client_secret", settings.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", settings.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| transport_error("token exchange", e))?;
        check_status("token exchange", response.status())?;

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::ProviderResponseInvalid(format!("token response: {e}")))?;

        match token.access_token {
            Some(access_token) if !access_token.is_empty() => {
                Ok(ProviderAccessToken(access_token))
            }
            _ => Err(AuthError::ProviderResponseInvalid(
                "token response has no access_token".into(),
            )),
        }
    }

    async fn fetch_profile(
        &self,
        access_token: &ProviderAccessToken,
    ) -> AuthResult<ExternalProfile> {
        let settings = self.settings()?;

        let response = self
            .client
            .get(&settings.userinfo_url)
            .bearer_auth(&access_token.0)
            .send()
            .await
            .map_err(|e| transport_error("profile fetch", e))?;
        check_status("profile fetch", response.status())?;

        let info: UserInfoResponse = response
            .json()
            .await
            .map_err(|e| AuthError::ProviderResponseInvalid(format!("userinfo response: {e}")))?;

        Ok(info.into_profile())
    }
}

fn transport_error(step: &str, err: reqwest::Error) -> AuthError {
    if err.is_timeout() {
        AuthError::ProviderUnavailable(format!("{step} timed out"))
    } else {
        AuthError::ProviderUnavailable(format!("{step} failed: {err}"))
    }
}

fn check_status(step: &str, status: StatusCode) -> AuthResult<()> {
    if status.is_success() {
        Ok(())
    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(AuthError::ProviderUnavailable(format!("{step} returned {status}")))
    } else {
        Err(AuthError::ProviderResponseInvalid(format!("{step} returned {status}")))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// OIDC userinfo (`sub`, `email_verified`) or Google v2 userinfo (`id`,
/// `verified_email`)
#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    sub: Option<String>,
    id: Option<String>,
    email: Option<String>,
    email_verified: Option<bool>,
    verified_email: Option<bool>,
    name: Option<String>,
}

impl UserInfoResponse {
    fn into_profile(self) -> ExternalProfile {
        ExternalProfile {
            subject: self.sub.or(self.id),
            email: self.email,
            email_verified: self.email_verified.or(self.verified_email),
            name: self.name,
        }
    }
}
