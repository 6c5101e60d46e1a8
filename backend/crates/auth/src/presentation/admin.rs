//! Admin Handlers
//!
//! Read-only analytics, guarded by the configured admin key.

use axum::Json;
use axum::extract::{Query, State};

use crate::application::analytics::{AnalyticsSummary, SUMMARY_RECENT_EVENTS, verify_admin_key};
use crate::domain::entity::auth_event::AuthEvent;
use crate::domain::identity_provider::IdentityProvider;
use crate::domain::repository::IdentityStore;
use crate::error::AuthResult;
use crate::presentation::dto::{AdminEventsQuery, AdminStatsQuery};
use crate::presentation::handlers::AuthAppState;

const DEFAULT_EVENT_LIMIT: u32 = 50;

/// GET /admin/stats
pub async fn stats<R, P>(
    State(state): State<AuthAppState<R, P>>,
    Query(query): Query<AdminStatsQuery>,
) -> AuthResult<Json<AnalyticsSummary>>
where
    R: IdentityStore + Send + Sync + 'static,
    P: IdentityProvider + Send + Sync + 'static,
{
    verify_admin_key(&state.config, query.admin_key.as_deref())?;

    let summary = state.analytics().summary(SUMMARY_RECENT_EVENTS).await?;

    Ok(Json(summary))
}

/// GET /admin/events
pub async fn events<R, P>(
    State(state): State<AuthAppState<R, P>>,
    Query(query): Query<AdminEventsQuery>,
) -> AuthResult<Json<Vec<AuthEvent>>>
where
    R: IdentityStore + Send + Sync + 'static,
    P: IdentityProvider + Send + Sync + 'static,
{
    verify_admin_key(&state.config, query.admin_key.as_deref())?;

    let events = state
        .analytics()
        .recent(
            query.app_id.as_deref(),
            query.limit.unwrap_or(DEFAULT_EVENT_LIMIT),
        )
        .await?;

    Ok(Json(events))
}
