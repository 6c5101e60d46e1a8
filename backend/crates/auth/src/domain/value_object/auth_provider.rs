//! Auth Provider Value Object
//!
//! Where a user's identity originates. Fixed at creation from whether an
//! external id was supplied; linking an external id later does not change it.

use crate::error::AuthError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    /// Email + password registration
    Local,
    /// Third-party identity provider
    External,
}

impl AuthProvider {
    pub const fn as_str(&self) -> &'static str {
        match self {
            AuthProvider::Local => "local",
            AuthProvider::External => "external",
        }
    }
}

impl FromStr for AuthProvider {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(AuthProvider::Local),
            "external" => Ok(AuthProvider::External),
            other => Err(AuthError::Internal(format!("Unknown auth provider: {other}"))),
        }
    }
}

impl std::fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
