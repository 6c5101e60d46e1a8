//! Login Use Case
//!
//! Verifies email + password and issues an access token. Every rejection is
//! the same `InvalidCredentials`; the reason is only logged.

use std::sync::Arc;

use platform::password::{ClearTextPassword, CredentialHasher};
use platform::token::{Claims, TokenService};

use crate::domain::entity::user::User;
use crate::domain::repository::IdentityStore;
use crate::domain::value_object::email::Email;
use crate::error::{AuthError, AuthResult};

pub struct LoginInput {
    pub email: String,
    pub password: String,
}

/// Access token plus the user it was issued for
#[derive(Debug)]
pub struct IssuedToken {
    pub access_token: String,
    /// Seconds until expiry
    pub expires_in: i64,
    pub user: User,
}

/// Sign a token whose subject is the user id
pub(crate) fn issue_for(tokens: &TokenService, user: User) -> AuthResult<IssuedToken> {
    let access_token = tokens.issue(Claims::new(user.id.to_string()))?;
    Ok(IssuedToken {
        access_token,
        expires_in: tokens.ttl().num_seconds(),
        user,
    })
}

pub struct LoginUseCase<R>
where
    R: IdentityStore,
{
    store: Arc<R>,
    hasher: Arc<CredentialHasher>,
    tokens: Arc<TokenService>,
}

impl<R> LoginUseCase<R>
where
    R: IdentityStore,
{
    pub fn new(store: Arc<R>, hasher: Arc<CredentialHasher>, tokens: Arc<TokenService>) -> Self {
        Self {
            store,
            hasher,
            tokens,
        }
    }

    pub async fn execute(&self, input: LoginInput) -> AuthResult<IssuedToken> {
        let password = ClearTextPassword::new(input.password).ok();
        let Ok(email) = Email::new(input.email) else {
            self.verify_decoy(password).await?;
            return Err(reject(None, "malformed email"));
        };
        let Some(password) = password else {
            self.verify_decoy(None).await?;
            return Err(reject(None, "blank password"));
        };

        let Some(user) = self.store.get_user_by_email(&email).await? else {
            self.verify_decoy(Some(password)).await?;
            return Err(reject(None, "unknown email"));
        };

        let Some(hashed) = user.hashed_password.clone() else {
            self.verify_decoy(Some(password)).await?;
            return Err(reject(Some(&user), "no local password"));
        };

        let hasher = self.hasher.clone();
        let verified = tokio::task::spawn_blocking(move || hasher.verify(&password, &hashed))
            .await
            .map_err(|e| AuthError::Internal(format!("verification task failed: {e}")))?;

        match verified {
            Ok(true) => {}
            Ok(false) => return Err(reject(Some(&user), "password mismatch")),
            Err(e) => {
                tracing::warn!(user_id = %user.id, error = %e, "Stored password digest is unusable");
                return Err(reject(Some(&user), "malformed digest"));
            }
        }

        tracing::info!(user_id = %user.id, "User logged in");

        issue_for(&self.tokens, user)
    }

    /// Rejections without a digest to check still pay for one verify
    async fn verify_decoy(&self, password: Option<ClearTextPassword>) -> AuthResult<()> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.verify_decoy(password.as_ref()))
            .await
            .map_err(|e| AuthError::Internal(format!("verification task failed: {e}")))
    }
}

fn reject(user: Option<&User>, reason: &'static str) -> AuthError {
    match user {
        Some(user) => tracing::info!(user_id = %user.id, reason, "Login rejected"),
        None => tracing::info!(reason, "Login rejected"),
    }
    AuthError::InvalidCredentials
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::user::NewUser;
    use crate::domain::value_object::external_id::ExternalId;
    use crate::infra::memory::InMemoryIdentityStore;
    use chrono::Utc;
    use platform::clock::ManualClock;
    use platform::password::{HashParams, HashedPassword};

    struct Fixture {
        store: Arc<InMemoryIdentityStore>,
        hasher: Arc<CredentialHasher>,
        tokens: Arc<TokenService>,
    }

    impl Fixture {
        fn new() -> Self {
            let clock = Arc::new(ManualClock::new(Utc::now()));
            Self {
                store: Arc::new(InMemoryIdentityStore::new()),
                hasher: Arc::new(CredentialHasher::new(
                    HashParams::new(1024, 1, 1, None).unwrap(),
                )),
                tokens: Arc::new(TokenService::new(
                    b"0123456789abcdef0123456789abcdef",
                    chrono::Duration::minutes(30),
                    clock,
                )),
            }
        }

        fn use_case(&self) -> LoginUseCase<InMemoryIdentityStore> {
            LoginUseCase::new(self.store.clone(), self.hasher.clone(), self.tokens.clone())
        }

        async fn seed_local(&self, email: &str, password: &str) -> User {
            let hashed = self
                .hasher
                .hash(&ClearTextPassword::new(password.to_string()).unwrap())
                .unwrap();
            self.store
                .create_user(NewUser::local(Email::new(email).unwrap(), hashed, None))
                .await
                .unwrap()
        }
    }

    fn login(email: &str, password: &str) -> LoginInput {
        LoginInput {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_login_success_issues_token_for_user() {
        let fx = Fixture::new();
        let user = fx.seed_local("a@x.com", "pw1").await;

        let issued = fx.use_case().execute(login("A@x.com", "pw1")).await.unwrap();
        assert_eq!(issued.user.id, user.id);
        assert_eq!(issued.expires_in, 1800);

        let claims = fx.tokens.validate(&issued.access_token).unwrap();
        assert_eq!(claims.sub, user.id.to_string());
    }

    #[tokio::test]
    async fn test_login_failures_are_uniform() {
        let fx = Fixture::new();
        fx.seed_local("a@x.com", "pw1").await;
        fx.store
            .create_user(NewUser::external(
                Email::new("ext@x.com").unwrap(),
                ExternalId::new("sub-1").unwrap(),
                None,
            ))
            .await
            .unwrap();

        for input in [
            login("a@x.com", "wrong"),
            login("nobody@x.com", "pw1"),
            login("ext@x.com", "pw1"),
            login("not-an-email", "pw1"),
        ] {
            let err = fx.use_case().execute(input).await.unwrap_err();
            assert!(matches!(err, AuthError::InvalidCredentials));
        }
    }

    #[tokio::test]
    async fn test_every_rejection_runs_a_verification() {
        let fx = Fixture::new();
        fx.seed_local("a@x.com", "pw1").await;
        fx.store
            .create_user(NewUser::external(
                Email::new("ext@x.com").unwrap(),
                ExternalId::new("sub-1").unwrap(),
                None,
            ))
            .await
            .unwrap();

        for input in [
            login("a@x.com", "wrong"),
            login("nobody@x.com", "pw1"),
            login("ext@x.com", "pw1"),
            login("not-an-email", "pw1"),
            login("a@x.com", "   "),
        ] {
            let before = fx.hasher.verifications();
            let err = fx.use_case().execute(input).await.unwrap_err();
            assert!(matches!(err, AuthError::InvalidCredentials));
            assert_eq!(fx.hasher.verifications(), before + 1);
        }
    }

    #[tokio::test]
    async fn test_login_with_corrupt_digest_fails_closed() {
        let fx = Fixture::new();
        fx.store
            .create_user(NewUser::local(
                Email::new("c@x.com").unwrap(),
                HashedPassword::from_db("garbage"),
                None,
            ))
            .await
            .unwrap();

        let err = fx.use_case().execute(login("c@x.com", "pw1")).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }
}
