//! HTTP Handlers

use axum::extract::{Extension, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect};
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::sync::Arc;

use platform::clock::Clock;
use platform::password::CredentialHasher;
use platform::token::TokenService;

use crate::application::config::AuthConfig;
use crate::application::external_login::redirect_with;
use crate::application::{
    AnalyticsUseCase, CurrentUserUseCase, ExternalLoginUseCase, LoginInput, LoginUseCase,
    RegisterInput, RegisterUseCase, StateSealer,
};
use crate::domain::entity::auth_event::AuthEventType;
use crate::domain::identity_provider::IdentityProvider;
use crate::domain::repository::IdentityStore;
use crate::error::{AuthError, AuthResult};
use crate::presentation::dto::{
    ExternalCallbackQuery, ExternalStartQuery, LoginRequest, LoginResponse, RegisterRequest,
    UserResponse,
};
use crate::presentation::middleware::AuthenticatedUser;

/// Header naming the calling application, used for analytics only
pub const APP_ID_HEADER: &str = "x-app-id";

/// Holds the external-login nonce between `start` and `callback`
pub const LOGIN_NONCE_COOKIE: &str = "authy_login_nonce";
const LOGIN_NONCE_COOKIE_PATH: &str = "/auth/external";

/// Shared state for auth handlers
pub struct AuthAppState<R, P>
where
    R: IdentityStore + Send + Sync + 'static,
    P: IdentityProvider + Send + Sync + 'static,
{
    pub store: Arc<R>,
    pub provider: Arc<P>,
    pub hasher: Arc<CredentialHasher>,
    pub tokens: Arc<TokenService>,
    pub sealer: Arc<StateSealer>,
    pub config: Arc<AuthConfig>,
}

impl<R, P> Clone for AuthAppState<R, P>
where
    R: IdentityStore + Send + Sync + 'static,
    P: IdentityProvider + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            provider: self.provider.clone(),
            hasher: self.hasher.clone(),
            tokens: self.tokens.clone(),
            sealer: self.sealer.clone(),
            config: self.config.clone(),
        }
    }
}

impl<R, P> AuthAppState<R, P>
where
    R: IdentityStore + Send + Sync + 'static,
    P: IdentityProvider + Send + Sync + 'static,
{
    /// Wire token service and state sealer from one secret and clock
    pub fn new(store: R, provider: P, config: AuthConfig, clock: Arc<dyn Clock>) -> Self {
        let tokens = TokenService::new(&config.token_secret, config.token_ttl(), clock.clone());
        let sealer = StateSealer::new(&config.token_secret, config.state_max_age, clock);

        Self {
            store: Arc::new(store),
            provider: Arc::new(provider),
            hasher: Arc::new(CredentialHasher::default()),
            tokens: Arc::new(tokens),
            sealer: Arc::new(sealer),
            config: Arc::new(config),
        }
    }

    /// Replace the password hasher (e.g. cheaper cost parameters)
    pub fn with_hasher(mut self, hasher: CredentialHasher) -> Self {
        self.hasher = Arc::new(hasher);
        self
    }

    pub(crate) fn analytics(&self) -> AnalyticsUseCase<R> {
        AnalyticsUseCase::new(self.store.clone())
    }

    pub(crate) fn external_login(&self) -> ExternalLoginUseCase<R, P> {
        ExternalLoginUseCase::new(
            self.store.clone(),
            self.provider.clone(),
            self.tokens.clone(),
            self.sealer.clone(),
            self.config.clone(),
        )
    }
}

/// Calling application id from `X-App-Id`, else the configured default
fn app_id(headers: &HeaderMap, config: &AuthConfig) -> String {
    headers
        .get(APP_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(&config.default_app_id)
        .to_string()
}

// ============================================================================
// Register
// ============================================================================

/// POST /auth/register
pub async fn register<R, P>(
    State(state): State<AuthAppState<R, P>>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> AuthResult<impl IntoResponse>
where
    R: IdentityStore + Send + Sync + 'static,
    P: IdentityProvider + Send + Sync + 'static,
{
    let app_id = app_id(&headers, &state.config);
    let use_case = RegisterUseCase::new(state.store.clone(), state.hasher.clone());

    let input = RegisterInput {
        email: req.email,
        password: req.password,
        name: req.name,
    };

    let result = use_case.execute(input).await;
    let event = match &result {
        Ok(_) => AuthEventType::RegisterSuccess,
        Err(_) => AuthEventType::RegisterFailure,
    };
    state.analytics().record(&app_id, event).await;

    let user = result?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(&user))))
}

// ============================================================================
// Login
// ============================================================================

/// POST /auth/login
pub async fn login<R, P>(
    State(state): State<AuthAppState<R, P>>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> AuthResult<Json<LoginResponse>>
where
    R: IdentityStore + Send + Sync + 'static,
    P: IdentityProvider + Send + Sync + 'static,
{
    let app_id = app_id(&headers, &state.config);
    let use_case = LoginUseCase::new(
        state.store.clone(),
        state.hasher.clone(),
        state.tokens.clone(),
    );

    let input = LoginInput {
        email: req.email,
        password: req.password,
    };

    let result = use_case.execute(input).await;
    let event = match &result {
        Ok(_) => AuthEventType::LoginSuccess,
        Err(_) => AuthEventType::LoginFailure,
    };
    state.analytics().record(&app_id, event).await;

    Ok(Json(LoginResponse::from(result?)))
}

// ============================================================================
// Current User
// ============================================================================

/// GET /auth/me (behind `require_bearer`)
pub async fn me<R, P>(
    State(state): State<AuthAppState<R, P>>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
) -> AuthResult<Json<UserResponse>>
where
    R: IdentityStore + Send + Sync + 'static,
    P: IdentityProvider + Send + Sync + 'static,
{
    let use_case = CurrentUserUseCase::new(state.store.clone(), state.tokens.clone());
    let user = use_case.execute(user_id).await?;

    Ok(Json(UserResponse::from(&user)))
}

// ============================================================================
// External Login
// ============================================================================

/// GET /auth/external/start
///
/// Sets the nonce cookie the callback checks the returned `state` against.
pub async fn external_start<R, P>(
    State(state): State<AuthAppState<R, P>>,
    jar: CookieJar,
    Query(query): Query<ExternalStartQuery>,
) -> AuthResult<(CookieJar, Redirect)>
where
    R: IdentityStore + Send + Sync + 'static,
    P: IdentityProvider + Send + Sync + 'static,
{
    let started = state.external_login().start(&query.redirect_uri)?;

    let cookie = Cookie::build((LOGIN_NONCE_COOKIE, started.nonce))
        .path(LOGIN_NONCE_COOKIE_PATH)
        .http_only(true)
        // Lax: the cookie must ride along on the provider's top-level redirect
        .same_site(SameSite::Lax)
        .secure(state.config.env.is_production());

    Ok((jar.add(cookie), Redirect::to(&started.consent_url)))
}

/// GET /auth/external/callback
///
/// Outcomes go back to the caller's redirect target as query parameters.
/// Only an unusable `state` (missing, forged, expired, or not issued to
/// this browser) is answered directly, since there is then no trusted place
/// to redirect to.
pub async fn external_callback<R, P>(
    State(state): State<AuthAppState<R, P>>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(query): Query<ExternalCallbackQuery>,
) -> AuthResult<(CookieJar, Redirect)>
where
    R: IdentityStore + Send + Sync + 'static,
    P: IdentityProvider + Send + Sync + 'static,
{
    let app_id = app_id(&headers, &state.config);
    let use_case = state.external_login();

    let browser_nonce = jar.get(LOGIN_NONCE_COOKIE).map(|c| c.value().to_string());
    let opened = query
        .state
        .as_deref()
        .ok_or(AuthError::InvalidState)
        .and_then(|sealed| use_case.open_state(sealed, browser_nonce.as_deref()));
    let login_state = match opened {
        Ok(login_state) => login_state,
        Err(e) => {
            state
                .analytics()
                .record(&app_id, AuthEventType::ExternalLoginFailure)
                .await;
            return Err(e);
        }
    };
    // Single use
    let jar = jar.remove(Cookie::build(LOGIN_NONCE_COOKIE).path(LOGIN_NONCE_COOKIE_PATH));

    if let Some(provider_error) = query.error.as_deref() {
        tracing::info!(provider_error, "External login declined at provider");
        state
            .analytics()
            .record(&app_id, AuthEventType::ExternalLoginFailure)
            .await;
        let url = redirect_with(
            &login_state.redirect_uri,
            &[
                ("error", "PROVIDER_DENIED"),
                ("message", "Login was cancelled or denied at the identity provider"),
            ],
        )?;
        return Ok((jar, Redirect::to(&url)));
    }

    let result = use_case
        .complete(query.code.as_deref().unwrap_or_default())
        .await;

    let url = match result {
        Ok(issued) => {
            state
                .analytics()
                .record(&app_id, AuthEventType::ExternalLoginSuccess)
                .await;
            let user_id = issued.user.id.to_string();
            redirect_with(
                &login_state.redirect_uri,
                &[
                    ("token", issued.access_token.as_str()),
                    ("user_id", user_id.as_str()),
                    ("email", issued.user.email.as_str()),
                    ("name", issued.user.name.as_deref().unwrap_or_default()),
                    ("provider", issued.user.provider.as_str()),
                ],
            )?
        }
        Err(e) => {
            e.log();
            state
                .analytics()
                .record(&app_id, AuthEventType::ExternalLoginFailure)
                .await;
            let message = e.public_message();
            redirect_with(
                &login_state.redirect_uri,
                &[("error", e.code()), ("message", message.as_str())],
            )?
        }
    };

    Ok((jar, Redirect::to(&url)))
}
