//! User Entity
//!
//! A user owns an email and at least one credential: a local password
//! digest, an external provider id, or both.

use chrono::{DateTime, Utc};
use platform::password::HashedPassword;

use crate::domain::value_object::{
    auth_provider::AuthProvider, email::Email, external_id::ExternalId, user_id::UserId,
};

/// Persisted user record
#[derive(Debug, Clone)]
pub struct User {
    /// Store-assigned, monotonically increasing
    pub id: UserId,
    /// Unique, lower-cased
    pub email: Email,
    /// Absent for users created through the identity provider
    pub hashed_password: Option<HashedPassword>,
    /// Display name
    pub name: Option<String>,
    /// Unique when present
    pub external_id: Option<ExternalId>,
    /// Origin of the account, fixed at creation
    pub provider: AuthProvider,
    pub created_at: DateTime<Utc>,
}

/// Input for `create_user`.
///
/// Only constructible with at least one credential.
#[derive(Debug, Clone)]
pub struct NewUser {
    email: Email,
    hashed_password: Option<HashedPassword>,
    name: Option<String>,
    external_id: Option<ExternalId>,
}

impl NewUser {
    /// Email + password registration
    pub fn local(email: Email, hashed_password: HashedPassword, name: Option<String>) -> Self {
        Self {
            email,
            hashed_password: Some(hashed_password),
            name,
            external_id: None,
        }
    }

    /// Account created from an identity-provider profile
    pub fn external(email: Email, external_id: ExternalId, name: Option<String>) -> Self {
        Self {
            email,
            hashed_password: None,
            name,
            external_id: Some(external_id),
        }
    }

    pub fn email(&self) -> &Email {
        &self.email
    }

    pub fn hashed_password(&self) -> Option<&HashedPassword> {
        self.hashed_password.as_ref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn external_id(&self) -> Option<&ExternalId> {
        self.external_id.as_ref()
    }

    pub fn provider(&self) -> AuthProvider {
        if self.external_id.is_some() {
            AuthProvider::External
        } else {
            AuthProvider::Local
        }
    }

    /// Materialize with store-assigned fields
    pub fn into_user(self, id: UserId, created_at: DateTime<Utc>) -> User {
        let provider = self.provider();
        User {
            id,
            email: self.email,
            hashed_password: self.hashed_password,
            name: self.name,
            external_id: self.external_id,
            provider,
            created_at,
        }
    }
}

/// Allow-listed partial update.
///
/// `None` leaves a field untouched; fields can be set but never cleared.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub email: Option<Email>,
    pub name: Option<String>,
    pub hashed_password: Option<HashedPassword>,
    pub external_id: Option<ExternalId>,
}

impl UserUpdate {
    pub fn link_external_id(external_id: ExternalId) -> Self {
        Self {
            external_id: Some(external_id),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.name.is_none()
            && self.hashed_password.is_none()
            && self.external_id.is_none()
    }

    /// Apply to an in-memory record
    pub fn apply_to(self, user: &mut User) {
        if let Some(email) = self.email {
            user.email = email;
        }
        if let Some(name) = self.name {
            user.name = Some(name);
        }
        if let Some(hashed_password) = self.hashed_password {
            user.hashed_password = Some(hashed_password);
        }
        if let Some(external_id) = self.external_id {
            user.external_id = Some(external_id);
        }
    }
}
