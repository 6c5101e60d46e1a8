//! Register Use Case
//!
//! Creates a local account from email + password.

use std::sync::Arc;

use platform::password::{ClearTextPassword, CredentialHasher};

use crate::domain::entity::user::{NewUser, User};
use crate::domain::repository::IdentityStore;
use crate::domain::value_object::email::Email;
use crate::error::{AuthError, AuthResult};

const NAME_MAX_LENGTH: usize = 100;

pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

pub struct RegisterUseCase<R>
where
    R: IdentityStore,
{
    store: Arc<R>,
    hasher: Arc<CredentialHasher>,
}

impl<R> RegisterUseCase<R>
where
    R: IdentityStore,
{
    pub fn new(store: Arc<R>, hasher: Arc<CredentialHasher>) -> Self {
        Self { store, hasher }
    }

    pub async fn execute(&self, input: RegisterInput) -> AuthResult<User> {
        let email = Email::new(input.email)?;
        let password = ClearTextPassword::new(input.password)?;
        let name = normalize_name(input.name)?;

        // Fail fast before paying for the hash; the store still decides races
        if self.store.get_user_by_email(&email).await?.is_some() {
            tracing::info!(reason = "email taken", "Registration rejected");
            return Err(AuthError::EmailTaken);
        }

        let hasher = self.hasher.clone();
        let hashed = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AuthError::Internal(format!("hashing task failed: {e}")))??;

        let user = match self
            .store
            .create_user(NewUser::local(email, hashed, name))
            .await
        {
            Err(AuthError::DuplicateEmail) => {
                tracing::info!(reason = "email taken (concurrent)", "Registration rejected");
                return Err(AuthError::EmailTaken);
            }
            other => other?,
        };

        tracing::info!(user_id = %user.id, "User registered");

        Ok(user)
    }
}

/// Trim a display name; blank means absent.
pub(crate) fn normalize_name(name: Option<String>) -> AuthResult<Option<String>> {
    let Some(name) = name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };
    if name.chars().count() > NAME_MAX_LENGTH {
        return Err(AuthError::Validation(format!(
            "Name must be at most {NAME_MAX_LENGTH} characters"
        )));
    }
    Ok(Some(name))
}
