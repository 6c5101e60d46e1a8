//! End-to-end flows through the HTTP router with the in-memory store and a
//! scripted identity provider.

#[cfg(test)]
mod identity_flow_tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use axum::Router;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use axum::response::Response;
    use chrono::Utc;
    use parking_lot::Mutex;
    use platform::clock::ManualClock;
    use platform::password::{CredentialHasher, HashParams};
    use reqwest::Url;
    use serde_json::{Value, json};
    use tokio::task::JoinSet;
    use tower::ServiceExt;

    use crate::application::config::{AuthConfig, OAuthSettings};
    use crate::application::register::{RegisterInput, RegisterUseCase};
    use crate::domain::entity::{
        auth_event::{AuthEvent, AuthEventStats},
        user::{NewUser, User, UserUpdate},
    };
    use crate::domain::identity_provider::{ExternalProfile, IdentityProvider, ProviderAccessToken};
    use crate::domain::repository::IdentityStore;
    use crate::domain::value_object::{
        auth_provider::AuthProvider, email::Email, external_id::ExternalId, user_id::UserId,
    };
    use crate::error::{AuthError, AuthResult};
    use crate::infra::memory::InMemoryIdentityStore;
    use crate::presentation::handlers::{AuthAppState, LOGIN_NONCE_COOKIE};
    use crate::presentation::router::identity_router;

    const CALLER: &str = "https://app.example.com/after-login";
    const ADMIN_KEY: &str = "admin-key-for-tests";

    // ========================================================================
    // Scripted provider
    // ========================================================================

    struct ScriptedProvider {
        profile: Mutex<ExternalProfile>,
        delay: Option<Duration>,
    }

    impl ScriptedProvider {
        fn new(profile: ExternalProfile) -> Self {
            Self {
                profile: Mutex::new(profile),
                delay: None,
            }
        }

        fn slow(profile: ExternalProfile, delay: Duration) -> Self {
            Self {
                profile: Mutex::new(profile),
                delay: Some(delay),
            }
        }
    }

    impl IdentityProvider for ScriptedProvider {
        fn authorization_url(&self, state: &str) -> AuthResult<String> {
            let mut url = Url::parse("https://idp.example.com/consent").unwrap();
            url.query_pairs_mut().append_pair("state", state);
            Ok(url.into())
        }

        async fn exchange_code(&self, code: &str) -> AuthResult<ProviderAccessToken> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if code == "rejected" {
                return Err(AuthError::ProviderResponseInvalid("bad code".into()));
            }
            Ok(ProviderAccessToken(format!("at-{code}")))
        }

        async fn fetch_profile(&self, _: &ProviderAccessToken) -> AuthResult<ExternalProfile> {
            Ok(self.profile.lock().clone())
        }
    }

    fn profile(subject: &str, email: &str) -> ExternalProfile {
        ExternalProfile {
            subject: Some(subject.to_string()),
            email: Some(email.to_string()),
            email_verified: Some(true),
            name: Some("Carol Ext".to_string()),
        }
    }

    // ========================================================================
    // Harness
    // ========================================================================

    fn test_config() -> AuthConfig {
        let mut config = AuthConfig::development();
        config.admin_key = Some(ADMIN_KEY.to_string());
        config.oauth = Some(OAuthSettings {
            client_id: "client".into(),
            client_secret: "secret".into(),
            redirect_uri: "https://auth.example.com/auth/external/callback".into(),
            authorize_url: "https://idp.example.com/consent".into(),
            token_url: "https://idp.example.com/token".into(),
            userinfo_url: "https://idp.example.com/userinfo".into(),
            timeout: Duration::from_secs(5),
        });
        config
    }

    fn app_state<R: IdentityStore + Send + Sync + 'static>(
        store: R,
        provider: ScriptedProvider,
        config: AuthConfig,
    ) -> AuthAppState<R, ScriptedProvider> {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        AuthAppState::new(store, provider, config, clock)
            .with_hasher(CredentialHasher::new(HashParams::new(1024, 1, 1, None).unwrap()))
    }

    /// What a browser holds after `start`
    struct Started {
        state: String,
        /// `name=value` of the login nonce cookie
        cookie: String,
    }

    struct Harness {
        store: Arc<InMemoryIdentityStore>,
        provider: Arc<ScriptedProvider>,
        state: AuthAppState<InMemoryIdentityStore, ScriptedProvider>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with(ScriptedProvider::new(profile("ext-1", "carol@example.com")), |_| {})
        }

        fn with(provider: ScriptedProvider, tweak: impl FnOnce(&mut AuthConfig)) -> Self {
            let mut config = test_config();
            tweak(&mut config);

            let state = app_state(InMemoryIdentityStore::new(), provider, config);

            Self {
                store: state.store.clone(),
                provider: state.provider.clone(),
                state,
            }
        }

        fn router(&self) -> Router {
            identity_router(self.state.clone())
        }

        async fn send(&self, request: Request<Body>) -> Response {
            self.router().oneshot(request).await.unwrap()
        }

        async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
            let response = self
                .send(
                    Request::builder()
                        .method("POST")
                        .uri(uri)
                        .header(header::CONTENT_TYPE, "application/json")
                        .header("x-app-id", "web")
                        .body(Body::from(body.to_string()))
                        .unwrap(),
                )
                .await;
            json_of(response).await
        }

        async fn get(&self, uri: &str) -> Response {
            self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
        }

        async fn get_with_cookie(&self, uri: &str, cookie: &str) -> Response {
            self.send(
                Request::builder()
                    .uri(uri)
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
        }

        /// Run `start`; returns the sealed state the provider would echo back
        /// and the cookie the browser now carries
        async fn start_external(&self) -> Started {
            let uri = format!(
                "/auth/external/start?redirect_uri={}",
                urlencode(CALLER)
            );
            let response = self.get(&uri).await;
            assert_eq!(response.status(), StatusCode::SEE_OTHER);

            let set_cookie = response
                .headers()
                .get(header::SET_COOKIE)
                .unwrap()
                .to_str()
                .unwrap();
            assert!(set_cookie.contains("HttpOnly"));
            let cookie = set_cookie.split(';').next().unwrap().to_string();
            assert!(cookie.starts_with(LOGIN_NONCE_COOKIE));

            let consent = Url::parse(location(&response)).unwrap();
            let state = consent
                .query_pairs()
                .find(|(k, _)| k == "state")
                .map(|(_, v)| v.into_owned())
                .unwrap();

            Started { state, cookie }
        }

        async fn callback(&self, query: &str, started: &Started) -> Response {
            let uri = format!(
                "/auth/external/callback?{query}&state={}",
                urlencode(&started.state)
            );
            self.get_with_cookie(&uri, &started.cookie).await
        }

        /// Full external login; returns the query pairs of the final redirect
        async fn external_login(&self, code: &str) -> Vec<(String, String)> {
            let started = self.start_external().await;
            let response = self.callback(&format!("code={code}"), &started).await;
            assert_eq!(response.status(), StatusCode::SEE_OTHER);

            let target = Url::parse(location(&response)).unwrap();
            assert!(target.as_str().starts_with(CALLER));
            target.query_pairs().into_owned().collect()
        }
    }

    fn urlencode(s: &str) -> String {
        let mut url = Url::parse("http://x/").unwrap();
        url.query_pairs_mut().append_pair("v", s);
        url.query().unwrap().trim_start_matches("v=").to_string()
    }

    fn location(response: &Response) -> &str {
        response
            .headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap()
    }

    fn param<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
        pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    async fn json_of(response: Response) -> (StatusCode, Value) {
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    // ========================================================================
    // Register / Login
    // ========================================================================

    #[tokio::test]
    async fn test_register_then_duplicate_email() {
        let h = Harness::new();

        let (status, body) = h
            .post_json(
                "/auth/register",
                json!({"email": "alice@example.com", "password": "pw1"}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["email"], "alice@example.com");
        assert_eq!(body["provider"], "local");
        assert!(body.get("hashed_password").is_none());

        let (status, body) = h
            .post_json(
                "/auth/register",
                json!({"email": "Alice@Example.com", "password": "other"}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "EMAIL_TAKEN");
    }

    #[tokio::test]
    async fn test_login_wrong_then_right_password() {
        let h = Harness::new();
        let (_, registered) = h
            .post_json(
                "/auth/register",
                json!({"email": "bob@example.com", "password": "pw2", "name": "Bob"}),
            )
            .await;

        let (status, body) = h
            .post_json(
                "/auth/login",
                json!({"email": "bob@example.com", "password": "nope"}),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "INVALID_CREDENTIALS");

        let (status, body) = h
            .post_json(
                "/auth/login",
                json!({"email": "bob@example.com", "password": "pw2"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token_type"], "bearer");
        assert_eq!(body["expires_in"], 1800);
        assert_eq!(body["user"]["id"], registered["id"]);

        let token = body["access_token"].as_str().unwrap();
        let claims = h.state.tokens.validate(token).unwrap();
        assert_eq!(claims.sub, registered["id"].as_i64().unwrap().to_string());
    }

    #[tokio::test]
    async fn test_login_unknown_email_is_same_failure() {
        let h = Harness::new();
        let (status, body) = h
            .post_json(
                "/auth/login",
                json!({"email": "ghost@example.com", "password": "pw"}),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "INVALID_CREDENTIALS");
    }

    // ========================================================================
    // Bearer-protected route
    // ========================================================================

    #[tokio::test]
    async fn test_me_requires_valid_bearer() {
        let h = Harness::new();
        h.post_json(
            "/auth/register",
            json!({"email": "dave@example.com", "password": "pw"}),
        )
        .await;
        let (_, login) = h
            .post_json(
                "/auth/login",
                json!({"email": "dave@example.com", "password": "pw"}),
            )
            .await;
        let token = login["access_token"].as_str().unwrap();

        let response = h
            .send(
                Request::builder()
                    .uri("/auth/me")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        let (status, body) = json_of(response).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "dave@example.com");

        let (status, _) = json_of(h.get("/auth/me").await).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let response = h
            .send(
                Request::builder()
                    .uri("/auth/me")
                    .header(header::AUTHORIZATION, "Bearer not.a.token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        let (status, body) = json_of(response).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "TOKEN_MALFORMED");
    }

    // ========================================================================
    // External login
    // ========================================================================

    #[tokio::test]
    async fn test_external_login_creates_then_reuses_user() {
        let h = Harness::new();

        let first = h.external_login("code-1").await;
        assert!(param(&first, "error").is_none());
        assert_eq!(param(&first, "provider"), Some("external"));
        assert_eq!(param(&first, "email"), Some("carol@example.com"));
        assert_eq!(param(&first, "name"), Some("Carol Ext"));
        let user_id = param(&first, "user_id").unwrap().to_string();

        let user = h
            .store
            .get_user_by_external_id(&ExternalId::new("ext-1").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.id.to_string(), user_id);
        assert_eq!(user.provider, AuthProvider::External);
        assert!(user.hashed_password.is_none());

        let second = h.external_login("code-2").await;
        assert_eq!(param(&second, "user_id"), Some(user_id.as_str()));
        assert_eq!(h.store.auth_event_stats().await.unwrap().total_users, 1);

        let token = param(&second, "token").unwrap();
        assert_eq!(h.state.tokens.validate(token).unwrap().sub, user_id);
    }

    #[tokio::test]
    async fn test_external_login_email_collision_without_linking() {
        let h = Harness::new();
        h.post_json(
            "/auth/register",
            json!({"email": "carol@example.com", "password": "pw"}),
        )
        .await;

        let pairs = h.external_login("code").await;
        assert_eq!(param(&pairs, "error"), Some("EMAIL_TAKEN"));
        assert!(param(&pairs, "token").is_none());
        assert_eq!(h.store.auth_event_stats().await.unwrap().total_users, 1);
    }

    #[tokio::test]
    async fn test_external_login_links_by_email_when_enabled() {
        let h = Harness::with(
            ScriptedProvider::new(profile("ext-9", "erin@example.com")),
            |config| config.link_external_by_email = true,
        );
        let (_, registered) = h
            .post_json(
                "/auth/register",
                json!({"email": "erin@example.com", "password": "pw"}),
            )
            .await;

        let pairs = h.external_login("code").await;
        assert_eq!(
            param(&pairs, "user_id").map(str::to_string),
            Some(registered["id"].to_string())
        );
        // Linked accounts keep their original provider and password
        assert_eq!(param(&pairs, "provider"), Some("local"));

        let (status, _) = h
            .post_json(
                "/auth/login",
                json!({"email": "erin@example.com", "password": "pw"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_external_login_never_links_unverified_email() {
        let mut unverified = profile("ext-9", "erin@example.com");
        unverified.email_verified = Some(false);
        let h = Harness::with(ScriptedProvider::new(unverified), |config| {
            config.link_external_by_email = true
        });
        h.post_json(
            "/auth/register",
            json!({"email": "erin@example.com", "password": "pw"}),
        )
        .await;

        let pairs = h.external_login("code").await;
        assert_eq!(param(&pairs, "error"), Some("EMAIL_TAKEN"));
        assert!(param(&pairs, "token").is_none());

        // Silence from the provider is not proof either
        h.provider.profile.lock().email_verified = None;
        let pairs = h.external_login("code").await;
        assert_eq!(param(&pairs, "error"), Some("EMAIL_TAKEN"));

        let user = h
            .store
            .get_user_by_email(&Email::new("erin@example.com").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(user.external_id.is_none());
    }

    #[tokio::test]
    async fn test_external_login_missing_email_is_invalid_response() {
        let h = Harness::with(
            ScriptedProvider::new(ExternalProfile {
                subject: Some("ext-2".into()),
                email: None,
                email_verified: None,
                name: None,
            }),
            |_| {},
        );

        let pairs = h.external_login("code").await;
        assert_eq!(param(&pairs, "error"), Some("PROVIDER_RESPONSE_INVALID"));
        assert_eq!(h.store.auth_event_stats().await.unwrap().total_users, 0);
    }

    #[tokio::test]
    async fn test_external_login_timeout_creates_no_user() {
        let h = Harness::with(
            ScriptedProvider::slow(profile("ext-3", "slow@example.com"), Duration::from_secs(10)),
            |config| {
                if let Some(oauth) = config.oauth.as_mut() {
                    oauth.timeout = Duration::from_millis(50);
                }
            },
        );

        let pairs = h.external_login("code").await;
        assert_eq!(param(&pairs, "error"), Some("PROVIDER_UNAVAILABLE"));
        assert_eq!(h.store.auth_event_stats().await.unwrap().total_users, 0);
    }

    #[tokio::test]
    async fn test_external_login_profile_change_keeps_same_user() {
        let h = Harness::new();
        let first = h.external_login("code-1").await;

        *h.provider.profile.lock() = profile("ext-1", "carol.new@example.com");
        let second = h.external_login("code-2").await;

        assert_eq!(param(&first, "user_id"), param(&second, "user_id"));
    }

    #[tokio::test]
    async fn test_external_callback_denied_at_provider() {
        let h = Harness::new();
        let started = h.start_external().await;

        let response = h.callback("error=access_denied", &started).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(location(&response).contains("error=PROVIDER_DENIED"));
    }

    #[tokio::test]
    async fn test_external_callback_bad_state_is_400() {
        let h = Harness::new();
        let (status, body) =
            json_of(h.get("/auth/external/callback?code=c&state=forged.value").await).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_STATE");

        let (status, _) = json_of(h.get("/auth/external/callback?code=c").await).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // Both failures are counted even though no redirect target is trusted
        let events = h.store.list_auth_events(Some("authy"), 10).await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(
            events
                .iter()
                .all(|e| e.event_type.as_str() == "external_login_failure")
        );
        assert_eq!(h.store.auth_event_stats().await.unwrap().total_users, 0);
    }

    #[tokio::test]
    async fn test_external_callback_requires_starting_browser() {
        let h = Harness::new();
        let victim = h.start_external().await;
        let attacker = h.start_external().await;

        // Genuine state replayed without the cookie it was issued with
        let uri = format!(
            "/auth/external/callback?code=c&state={}",
            urlencode(&victim.state)
        );
        let (status, body) = json_of(h.get(&uri).await).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_STATE");

        // ...or delivered to a browser holding another login's cookie
        let (status, body) = json_of(h.get_with_cookie(&uri, &attacker.cookie).await).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_STATE");
        assert_eq!(h.store.auth_event_stats().await.unwrap().total_users, 0);

        // The rightful browser still completes
        let response = h.callback("code=c", &victim).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(location(&response).contains("token="));
        let cleared = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(cleared.starts_with(&format!("{LOGIN_NONCE_COOKIE}=")));
        assert!(cleared.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn test_external_start_rejects_disallowed_origin() {
        let h = Harness::with(
            ScriptedProvider::new(profile("ext-1", "carol@example.com")),
            |config| config.allowed_redirect_origins = vec!["https://app.example.com".into()],
        );

        let (status, body) = json_of(
            h.get("/auth/external/start?redirect_uri=https%3A%2F%2Fevil.example.com%2F")
                .await,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_FAILED");

        h.start_external().await;
    }

    // ========================================================================
    // Analytics / admin
    // ========================================================================

    #[tokio::test]
    async fn test_events_recorded_by_fingerprint() {
        let h = Harness::new();
        h.post_json(
            "/auth/register",
            json!({"email": "fay@example.com", "password": "pw"}),
        )
        .await;
        h.post_json(
            "/auth/login",
            json!({"email": "fay@example.com", "password": "wrong"}),
        )
        .await;

        let events = h.store.list_auth_events(Some("web"), 10).await.unwrap();
        let kinds: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(kinds, vec!["login_failure", "register_success"]);
        assert!(events.iter().all(|e| e.app_fingerprint.as_str() != "web"));
        assert!(h.store.list_auth_events(Some("other"), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_admin_requires_key() {
        let h = Harness::new();

        let (status, body) = json_of(h.get("/admin/stats").await).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHORIZED");

        let (status, _) = json_of(h.get("/admin/stats?admin_key=wrong").await).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = json_of(h.get("/admin/events?admin_key=wrong").await).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_admin_stats_and_events() {
        let h = Harness::new();
        h.post_json(
            "/auth/register",
            json!({"email": "gus@example.com", "password": "pw"}),
        )
        .await;

        let (status, stats) =
            json_of(h.get(&format!("/admin/stats?admin_key={ADMIN_KEY}")).await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["total_events"], 1);
        assert_eq!(stats["unique_apps"], 1);
        assert_eq!(stats["total_users"], 1);
        assert_eq!(stats["recent_events"][0]["event_type"], "register_success");

        let (status, events) = json_of(
            h.get(&format!("/admin/events?admin_key={ADMIN_KEY}&app_id=web&limit=5"))
                .await,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(events.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_admin_disabled_without_configured_key() {
        let h = Harness::with(
            ScriptedProvider::new(profile("ext-1", "carol@example.com")),
            |config| config.admin_key = None,
        );
        let (status, _) = json_of(h.get("/admin/stats?admin_key=").await).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    // ========================================================================
    // Lost races
    // ========================================================================

    /// In-memory store whose next email / external-id lookup can be made to
    /// miss, as if a concurrent request committed right after it ran
    #[derive(Default)]
    struct StaleReads {
        inner: InMemoryIdentityStore,
        miss_email: AtomicBool,
        miss_external_id: AtomicBool,
    }

    impl IdentityStore for StaleReads {
        async fn create_user(&self, new_user: NewUser) -> AuthResult<User> {
            self.inner.create_user(new_user).await
        }

        async fn get_user_by_email(&self, email: &Email) -> AuthResult<Option<User>> {
            if self.miss_email.swap(false, Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.get_user_by_email(email).await
        }

        async fn get_user_by_id(&self, user_id: UserId) -> AuthResult<Option<User>> {
            self.inner.get_user_by_id(user_id).await
        }

        async fn get_user_by_external_id(
            &self,
            external_id: &ExternalId,
        ) -> AuthResult<Option<User>> {
            if self.miss_external_id.swap(false, Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.get_user_by_external_id(external_id).await
        }

        async fn update_user(&self, user_id: UserId, update: UserUpdate) -> AuthResult<User> {
            self.inner.update_user(user_id, update).await
        }

        async fn delete_user(&self, user_id: UserId) -> AuthResult<bool> {
            self.inner.delete_user(user_id).await
        }

        async fn record_auth_event(&self, app_id: &str, event_type: &str) -> AuthResult<AuthEvent> {
            self.inner.record_auth_event(app_id, event_type).await
        }

        async fn list_auth_events(
            &self,
            app_id: Option<&str>,
            limit: u32,
        ) -> AuthResult<Vec<AuthEvent>> {
            self.inner.list_auth_events(app_id, limit).await
        }

        async fn auth_event_stats(&self) -> AuthResult<AuthEventStats> {
            self.inner.auth_event_stats().await
        }
    }

    fn stale_state(
        provider: ScriptedProvider,
        tweak: impl FnOnce(&mut AuthConfig),
    ) -> AuthAppState<StaleReads, ScriptedProvider> {
        let mut config = test_config();
        tweak(&mut config);
        app_state(StaleReads::default(), provider, config)
    }

    async fn seed_external(store: &StaleReads, email: &str, subject: &str) -> User {
        store
            .inner
            .create_user(NewUser::external(
                Email::new(email).unwrap(),
                ExternalId::new(subject).unwrap(),
                None,
            ))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_losing_race_is_email_taken() {
        let state = stale_state(ScriptedProvider::new(profile("ext-1", "x@example.com")), |_| {});
        let register = RegisterUseCase::new(state.store.clone(), state.hasher.clone());
        let input = || RegisterInput {
            email: "gil@example.com".into(),
            password: "pw".into(),
            name: None,
        };
        register.execute(input()).await.unwrap();

        // The pre-check misses; the store's unique constraint decides
        state.store.miss_email.store(true, Ordering::SeqCst);
        let err = register.execute(input()).await.unwrap_err();

        assert!(matches!(err, AuthError::EmailTaken));
        assert!(!state.store.miss_email.load(Ordering::SeqCst));
        assert_eq!(state.store.auth_event_stats().await.unwrap().total_users, 1);
    }

    #[tokio::test]
    async fn test_external_create_losing_race_returns_winner() {
        let state = stale_state(
            ScriptedProvider::new(profile("ext-1", "carol@example.com")),
            |_| {},
        );
        // The winner was created under the email the provider reported earlier
        let winner = seed_external(&state.store, "carol.old@example.com", "ext-1").await;

        state.store.miss_external_id.store(true, Ordering::SeqCst);
        let issued = state.external_login().complete("code").await.unwrap();

        assert_eq!(issued.user.id, winner.id);
        assert_eq!(state.store.auth_event_stats().await.unwrap().total_users, 1);
    }

    #[tokio::test]
    async fn test_external_link_losing_race_returns_winner() {
        let state = stale_state(
            ScriptedProvider::new(profile("ext-9", "erin@example.com")),
            |config| config.link_external_by_email = true,
        );
        RegisterUseCase::new(state.store.clone(), state.hasher.clone())
            .execute(RegisterInput {
                email: "erin@example.com".into(),
                password: "pw".into(),
                name: None,
            })
            .await
            .unwrap();
        let winner = seed_external(&state.store, "erin.ext@example.com", "ext-9").await;

        state.store.miss_external_id.store(true, Ordering::SeqCst);
        let issued = state.external_login().complete("code").await.unwrap();

        assert_eq!(issued.user.id, winner.id);
        let local = state
            .store
            .get_user_by_email(&Email::new("erin@example.com").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(local.external_id.is_none());
        assert_eq!(state.store.auth_event_stats().await.unwrap().total_users, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_external_logins_share_one_user() {
        let state = stale_state(
            ScriptedProvider::new(profile("ext-1", "carol@example.com")),
            |_| {},
        );

        let mut logins = JoinSet::new();
        for i in 0..8 {
            let state = state.clone();
            logins.spawn(async move { state.external_login().complete(&format!("code-{i}")).await });
        }

        let mut ids = Vec::new();
        while let Some(joined) = logins.join_next().await {
            ids.push(joined.unwrap().unwrap().user.id);
        }

        assert_eq!(ids.len(), 8);
        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_eq!(state.store.auth_event_stats().await.unwrap().total_users, 1);
    }
}
