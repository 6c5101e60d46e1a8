//! OAuth State
//!
//! The `state` parameter round-trips the caller's redirect target through the
//! provider. It is `base64url(json) "." base64url(hmac_sha256(payload))`,
//! expires after a fixed age, and carries a random nonce. The same nonce is
//! handed to the browser that started the login; `open` only accepts the
//! state back from that browser, so a captured state cannot complete a
//! login in someone else's session.

use std::sync::Arc;
use std::time::Duration;

use platform::clock::Clock;
use platform::crypto::{constant_time_eq, from_base64url, hmac_sha256, random_bytes, to_base64url};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};

/// Separates the state key from the token key derived from the same secret
const STATE_KEY_CONTEXT: &[u8] = b"authy/oauth-state/v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthState {
    pub redirect_uri: String,
    pub nonce: String,
    pub issued_at: i64,
}

/// A sealed state plus the nonce the starting browser must present
#[derive(Debug, Clone)]
pub struct SealedState {
    pub value: String,
    pub nonce: String,
}

pub struct StateSealer {
    key: [u8; 32],
    max_age: Duration,
    clock: Arc<dyn Clock>,
}

impl StateSealer {
    pub fn new(secret: &[u8], max_age: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            key: hmac_sha256(secret, STATE_KEY_CONTEXT),
            max_age,
            clock,
        }
    }

    pub fn seal(&self, redirect_uri: &str) -> AuthResult<SealedState> {
        let state = OAuthState {
            redirect_uri: redirect_uri.to_string(),
            nonce: to_base64url(&random_bytes(16)),
            issued_at: self.clock.now().timestamp(),
        };
        let json = serde_json::to_vec(&state).map_err(|e| AuthError::Internal(e.to_string()))?;
        let payload = to_base64url(&json);
        let signature = to_base64url(&hmac_sha256(&self.key, payload.as_bytes()));

        Ok(SealedState {
            value: format!("{payload}.{signature}"),
            nonce: state.nonce,
        })
    }

    /// Verify signature, age and the browser's nonce. Every failure is
    /// `InvalidState`.
    pub fn open(&self, sealed: &str, browser_nonce: Option<&str>) -> AuthResult<OAuthState> {
        let (payload, signature) = sealed.split_once('.').ok_or(AuthError::InvalidState)?;

        let expected = hmac_sha256(&self.key, payload.as_bytes());
        let given = from_base64url(signature).map_err(|_| AuthError::InvalidState)?;
        if !constant_time_eq(&expected, &given) {
            return Err(AuthError::InvalidState);
        }

        let json = from_base64url(payload).map_err(|_| AuthError::InvalidState)?;
        let state: OAuthState =
            serde_json::from_slice(&json).map_err(|_| AuthError::InvalidState)?;

        let age = self.clock.now().timestamp() - state.issued_at;
        if age < 0 || age > self.max_age.as_secs() as i64 {
            return Err(AuthError::InvalidState);
        }

        let Some(browser_nonce) = browser_nonce else {
            return Err(AuthError::InvalidState);
        };
        if !constant_time_eq(state.nonce.as_bytes(), browser_nonce.as_bytes()) {
            return Err(AuthError::InvalidState);
        }

        Ok(state)
    }
}
