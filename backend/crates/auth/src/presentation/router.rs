//! Auth Router

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::domain::identity_provider::IdentityProvider;
use crate::domain::repository::IdentityStore;
use crate::presentation::handlers::{self, AuthAppState};
use crate::presentation::{admin, middleware::require_bearer};

/// Routes mounted under `/auth`
pub fn auth_router<R, P>(state: AuthAppState<R, P>) -> Router
where
    R: IdentityStore + Send + Sync + 'static,
    P: IdentityProvider + Send + Sync + 'static,
{
    let protected = Router::new()
        .route("/me", get(handlers::me::<R, P>))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_bearer::<R, P>,
        ));

    Router::new()
        .route("/register", post(handlers::register::<R, P>))
        .route("/login", post(handlers::login::<R, P>))
        .route("/external/start", get(handlers::external_start::<R, P>))
        .route("/external/callback", get(handlers::external_callback::<R, P>))
        .merge(protected)
        .with_state(state)
}

/// Routes mounted under `/admin`
pub fn admin_router<R, P>(state: AuthAppState<R, P>) -> Router
where
    R: IdentityStore + Send + Sync + 'static,
    P: IdentityProvider + Send + Sync + 'static,
{
    Router::new()
        .route("/stats", get(admin::stats::<R, P>))
        .route("/events", get(admin::events::<R, P>))
        .with_state(state)
}

/// `/auth` and `/admin` together
pub fn identity_router<R, P>(state: AuthAppState<R, P>) -> Router
where
    R: IdentityStore + Send + Sync + 'static,
    P: IdentityProvider + Send + Sync + 'static,
{
    Router::new()
        .nest("/auth", auth_router(state.clone()))
        .nest("/admin", admin_router(state))
}
