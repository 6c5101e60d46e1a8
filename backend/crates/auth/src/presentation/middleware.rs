//! Auth Middleware
//!
//! `require_bearer` guards routes with an `Authorization: Bearer <token>`
//! header and hands the token's user id to handlers as [`AuthenticatedUser`].

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, header};
use axum::middleware::Next;
use axum::response::Response;

use crate::application::CurrentUserUseCase;
use crate::domain::identity_provider::IdentityProvider;
use crate::domain::repository::IdentityStore;
use crate::domain::value_object::user_id::UserId;
use crate::error::{AuthError, AuthResult};
use crate::presentation::handlers::AuthAppState;

/// User id of a validated bearer token, set as a request extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub UserId);

/// Middleware that requires a valid bearer token
pub async fn require_bearer<R, P>(
    State(state): State<AuthAppState<R, P>>,
    mut req: Request<Body>,
    next: Next,
) -> AuthResult<Response>
where
    R: IdentityStore + Send + Sync + 'static,
    P: IdentityProvider + Send + Sync + 'static,
{
    let token = bearer_token(req.headers()).ok_or(AuthError::Unauthorized)?;

    let use_case = CurrentUserUseCase::new(state.store.clone(), state.tokens.clone());
    let user_id = use_case.authenticate(token)?;

    req.extensions_mut().insert(AuthenticatedUser(user_id));

    Ok(next.run(req).await)
}

/// Token from `Authorization: Bearer <token>`; the scheme is case-insensitive
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();

    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
