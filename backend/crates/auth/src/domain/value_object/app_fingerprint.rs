//! App Fingerprint Value Object
//!
//! Analytics never store the caller's application identifier, only its
//! SHA-256 digest. Filtering by application recomputes the digest.

use derive_more::Display;
use platform::crypto::sha256_hex;
use serde::{Deserialize, Serialize};

/// Lowercase hex SHA-256 of an application identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(transparent)]
#[display("{_0}")]
pub struct AppFingerprint(String);

impl AppFingerprint {
    pub fn of(app_id: &str) -> Self {
        Self(sha256_hex(app_id.as_bytes()))
    }

    /// Create from database value (assumed already a digest)
    pub fn from_db(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
