//! Email Value Object
//!
//! Trimmed and lower-cased; users are looked up by exactly this form, so
//! `A@X.com` and `a@x.com` are the same account.

use derive_more::Display;
use serde::Serialize;

use crate::error::{AuthError, AuthResult};

/// RFC 5321 path limit
const EMAIL_MAX_LENGTH: usize = 254;
const LOCAL_PART_MAX_LENGTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(transparent)]
#[display("{_0}")]
pub struct Email(String);

impl Email {
    pub fn new(raw: impl Into<String>) -> AuthResult<Self> {
        let email = raw.into().trim().to_lowercase();

        if email.is_empty() {
            return Err(AuthError::Validation("Email cannot be empty".into()));
        }
        if email.len() > EMAIL_MAX_LENGTH {
            return Err(AuthError::Validation(format!(
                "Email must be at most {EMAIL_MAX_LENGTH} characters"
            )));
        }
        if !plausible_address(&email) {
            return Err(AuthError::Validation("Invalid email format".into()));
        }

        Ok(Self(email))
    }

    /// Wrap a value read back from storage
    pub fn from_db(email: impl Into<String>) -> Self {
        Self(email.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One `@`, a non-empty local part, and a dotted ASCII host that does not
/// begin or end with `.` or `-`. Deliverability is not checked.
fn plausible_address(email: &str) -> bool {
    let Some((local, host)) = email.split_once('@') else {
        return false;
    };

    let local_ok = !local.is_empty() && local.len() <= LOCAL_PART_MAX_LENGTH;
    let host_ok = host.contains('.')
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
        && !host.starts_with(['.', '-'])
        && !host.ends_with(['.', '-']);

    local_ok && host_ok
}
