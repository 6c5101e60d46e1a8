//! In-memory identity store for tests and local development.
//!
//! One mutex guards users, the id counter and events together, so every
//! operation (uniqueness check plus insert included) is atomic. Data is lost
//! on restart.

use std::collections::BTreeMap;

use chrono::Utc;
use parking_lot::Mutex;

use crate::domain::entity::{
    auth_event::{AuthEvent, AuthEventStats},
    user::{NewUser, User, UserUpdate},
};
use crate::domain::repository::IdentityStore;
use crate::domain::value_object::{
    app_fingerprint::AppFingerprint, email::Email, external_id::ExternalId, user_id::UserId,
};
use crate::error::{AuthError, AuthResult};

#[derive(Default)]
struct State {
    users: BTreeMap<i64, User>,
    last_user_id: i64,
    events: Vec<AuthEvent>,
}

impl State {
    /// Uniqueness check for `email` / `external_id`, ignoring user `except`
    fn check_unique(
        &self,
        email: Option<&Email>,
        external_id: Option<&ExternalId>,
        except: Option<i64>,
    ) -> AuthResult<()> {
        for (id, user) in &self.users {
            if Some(*id) == except {
                continue;
            }
            if email.is_some_and(|e| *e == user.email) {
                return Err(AuthError::DuplicateEmail);
            }
            if external_id.is_some() && external_id == user.external_id.as_ref() {
                return Err(AuthError::DuplicateExternalId);
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryIdentityStore {
    state: Mutex<State>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityStore for InMemoryIdentityStore {
    async fn create_user(&self, new_user: NewUser) -> AuthResult<User> {
        let mut state = self.state.lock();
        state.check_unique(Some(new_user.email()), new_user.external_id(), None)?;

        state.last_user_id += 1;
        let user = new_user.into_user(UserId::from_raw(state.last_user_id), Utc::now());
        state.users.insert(user.id.get(), user.clone());

        Ok(user)
    }

    async fn get_user_by_email(&self, email: &Email) -> AuthResult<Option<User>> {
        Ok(self
            .state
            .lock()
            .users
            .values()
            .find(|u| u.email == *email)
            .cloned())
    }

    async fn get_user_by_id(&self, user_id: UserId) -> AuthResult<Option<User>> {
        Ok(self.state.lock().users.get(&user_id.get()).cloned())
    }

    async fn get_user_by_external_id(
        &self,
        external_id: &ExternalId,
    ) -> AuthResult<Option<User>> {
        Ok(self
            .state
            .lock()
            .users
            .values()
            .find(|u| u.external_id.as_ref() == Some(external_id))
            .cloned())
    }

    async fn update_user(&self, user_id: UserId, update: UserUpdate) -> AuthResult<User> {
        let mut state = self.state.lock();
        if !state.users.contains_key(&user_id.get()) {
            return Err(AuthError::NotFound);
        }
        state.check_unique(
            update.email.as_ref(),
            update.external_id.as_ref(),
            Some(user_id.get()),
        )?;

        let user = state
            .users
            .get_mut(&user_id.get())
            .ok_or(AuthError::NotFound)?;
        update.apply_to(user);

        Ok(user.clone())
    }

    async fn delete_user(&self, user_id: UserId) -> AuthResult<bool> {
        Ok(self.state.lock().users.remove(&user_id.get()).is_some())
    }

    async fn record_auth_event(&self, app_id: &str, event_type: &str) -> AuthResult<AuthEvent> {
        let mut state = self.state.lock();
        let event = AuthEvent {
            id: state.events.len() as i64 + 1,
            app_fingerprint: AppFingerprint::of(app_id),
            event_type: event_type.to_string(),
            created_at: Utc::now(),
        };
        state.events.push(event.clone());

        Ok(event)
    }

    async fn list_auth_events(
        &self,
        app_id: Option<&str>,
        limit: u32,
    ) -> AuthResult<Vec<AuthEvent>> {
        let fingerprint = app_id.map(AppFingerprint::of);
        let state = self.state.lock();

        Ok(state
            .events
            .iter()
            .rev()
            .filter(|e| fingerprint.as_ref().is_none_or(|fp| e.app_fingerprint == *fp))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn auth_event_stats(&self) -> AuthResult<AuthEventStats> {
        let state = self.state.lock();
        let mut apps: Vec<&AppFingerprint> = state.events.iter().map(|e| &e.app_fingerprint).collect();
        apps.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        apps.dedup();

        Ok(AuthEventStats {
            total_events: state.events.len() as i64,
            unique_apps: apps.len() as i64,
            total_users: state.users.len() as i64,
        })
    }
}
