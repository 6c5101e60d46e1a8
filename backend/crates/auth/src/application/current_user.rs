//! Current User Use Case
//!
//! Resolves the user behind a bearer token.

use std::sync::Arc;

use platform::token::{TokenError, TokenService};

use crate::domain::entity::user::User;
use crate::domain::repository::IdentityStore;
use crate::domain::value_object::user_id::UserId;
use crate::error::{AuthError, AuthResult};

pub struct CurrentUserUseCase<R>
where
    R: IdentityStore,
{
    store: Arc<R>,
    tokens: Arc<TokenService>,
}

impl<R> CurrentUserUseCase<R>
where
    R: IdentityStore,
{
    pub fn new(store: Arc<R>, tokens: Arc<TokenService>) -> Self {
        Self { store, tokens }
    }

    /// Validate a token and return the user id it names.
    pub fn authenticate(&self, token: &str) -> AuthResult<UserId> {
        let claims = self.tokens.validate(token)?;
        claims
            .sub
            .parse::<UserId>()
            .map_err(|_| AuthError::Token(TokenError::Malformed))
    }

    /// Load the authenticated user; a deleted user is `Unauthorized`.
    pub async fn execute(&self, user_id: UserId) -> AuthResult<User> {
        self.store
            .get_user_by_id(user_id)
            .await?
            .ok_or(AuthError::Unauthorized)
    }
}
