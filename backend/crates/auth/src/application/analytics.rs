//! Analytics Use Case
//!
//! Records anonymized auth events and serves the admin read side.

use std::sync::Arc;

use platform::crypto::constant_time_eq;
use serde::Serialize;

use crate::application::config::AuthConfig;
use crate::domain::entity::auth_event::{AuthEvent, AuthEventStats, AuthEventType};
use crate::domain::repository::IdentityStore;
use crate::error::{AuthError, AuthResult};

/// Events included in the stats summary
pub const SUMMARY_RECENT_EVENTS: u32 = 10;
/// Upper bound for any event listing
pub const MAX_EVENT_LIMIT: u32 = 500;

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsSummary {
    #[serde(flatten)]
    pub stats: AuthEventStats,
    pub recent_events: Vec<AuthEvent>,
}

pub struct AnalyticsUseCase<R>
where
    R: IdentityStore,
{
    store: Arc<R>,
}

impl<R> AnalyticsUseCase<R>
where
    R: IdentityStore,
{
    pub fn new(store: Arc<R>) -> Self {
        Self { store }
    }

    /// Record an event. Failures are logged and swallowed so analytics can
    /// never fail an auth flow.
    pub async fn record(&self, app_id: &str, event: AuthEventType) {
        if let Err(e) = self.store.record_auth_event(app_id, event.as_str()).await {
            tracing::warn!(error = %e, event = event.as_str(), "Failed to record auth event");
        }
    }

    pub async fn summary(&self, limit: u32) -> AuthResult<AnalyticsSummary> {
        let stats = self.store.auth_event_stats().await?;
        let recent_events = self
            .store
            .list_auth_events(None, limit.clamp(1, MAX_EVENT_LIMIT))
            .await?;

        Ok(AnalyticsSummary {
            stats,
            recent_events,
        })
    }

    pub async fn recent(&self, app_id: Option<&str>, limit: u32) -> AuthResult<Vec<AuthEvent>> {
        self.store
            .list_auth_events(app_id, limit.clamp(1, MAX_EVENT_LIMIT))
            .await
    }
}

/// Check an admin key against configuration in constant time.
///
/// Always `Unauthorized` when no admin key is configured.
pub fn verify_admin_key(config: &AuthConfig, provided: Option<&str>) -> AuthResult<()> {
    match (config.admin_key.as_deref(), provided) {
        (Some(expected), Some(given)) if constant_time_eq(expected.as_bytes(), given.as_bytes()) => {
            Ok(())
        }
        _ => Err(AuthError::Unauthorized),
    }
}
