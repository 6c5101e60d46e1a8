//! External Id Value Object
//!
//! The identity provider's stable subject identifier for a user.

use crate::error::{AuthError, AuthResult};
use serde::{Deserialize, Serialize};

const EXTERNAL_ID_MAX_LENGTH: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalId(String);

impl ExternalId {
    pub fn new(subject: impl Into<String>) -> AuthResult<Self> {
        let subject = subject.into().trim().to_string();

        if subject.is_empty() {
            return Err(AuthError::Validation("External id cannot be empty".into()));
        }
        if subject.len() > EXTERNAL_ID_MAX_LENGTH {
            return Err(AuthError::Validation(format!(
                "External id must be at most {EXTERNAL_ID_MAX_LENGTH} characters"
            )));
        }

        Ok(Self(subject))
    }

    /// Create from database value (assumed already validated)
    pub fn from_db(subject: impl Into<String>) -> Self {
        Self(subject.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExternalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
