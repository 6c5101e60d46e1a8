//! Signed bearer tokens
//!
//! HS256 JWTs with a mandatory subject, free-form extra claims and an expiry
//! derived from the service's TTL. Expiry is checked against an injected
//! [`Clock`], not the `jsonwebtoken` wall clock, so tests can step time.

use std::{fmt, sync::Arc};

use chrono::Duration;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::ErrorKind as JwtErrorKind,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::clock::Clock;

/// Default access token lifetime.
pub const DEFAULT_TTL_MINUTES: i64 = 30;

/// Claims reserved by the service; callers cannot set them through `extra`.
const RESERVED_CLAIMS: [&str; 3] = ["sub", "iat", "exp"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Token signature is invalid")]
    SignatureInvalid,

    #[error("Token has expired")]
    Expired,

    #[error("Token is malformed")]
    Malformed,

    #[error("Token encoding failed: {0}")]
    Encoding(String),
}

/// What a token asserts: a subject plus arbitrary extra claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub extra: Map<String, Value>,
}

impl Claims {
    pub fn new(sub: impl Into<String>) -> Self {
        Self {
            sub: sub.into(),
            extra: Map::new(),
        }
    }

    pub fn with_claim(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

#[derive(Serialize, Deserialize)]
struct WireClaims {
    sub: String,
    iat: i64,
    exp: i64,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(secret: &[u8], ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // exp is checked against `clock` in `validate`
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign `claims`, stamping `iat` and `exp` from the clock.
    ///
    /// Caller-supplied `sub`/`iat`/`exp` entries in `extra` are dropped.
    pub fn issue(&self, claims: Claims) -> Result<String, TokenError> {
        let now = self.clock.now();
        let mut extra = claims.extra;
        for key in RESERVED_CLAIMS {
            extra.remove(key);
        }

        let wire = WireClaims {
            sub: claims.sub,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            extra,
        };

        encode(&Header::new(Algorithm::HS256), &wire, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    /// Verify signature and expiry, returning the claims as issued.
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        let data = decode::<WireClaims>(token, &self.decoding_key, &self.validation).map_err(
            |e| match e.kind() {
                JwtErrorKind::InvalidSignature | JwtErrorKind::InvalidAlgorithm => {
                    TokenError::SignatureInvalid
                }
                JwtErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            },
        )?;

        let wire = data.claims;
        if self.clock.now().timestamp() >= wire.exp {
            return Err(TokenError::Expired);
        }

        Ok(Claims {
            sub: wire.sub,
            extra: wire.extra,
        })
    }
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("algorithm", &"HS256")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
