//! Credential Hashing and Verification
//!
//! Argon2id password hashing with a length-safety pre-hash:
//! - Inputs longer than [`PREHASH_THRESHOLD_BYTES`] are first replaced by
//!   their SHA-256 hex digest, so every byte of a long password still
//!   influences the stored hash
//! - Fresh random salt per hash, embedded in the PHC output string
//! - Constant-time verification (delegated to Argon2)
//! - Zeroization of clear text and of the derived hashing input
//!
//! Verification against a malformed digest fails closed with
//! [`PasswordHashError::InvalidDigest`].

use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

use argon2::{
    Algorithm, Argon2, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::{self, SaltString},
};
use rand::rngs::OsRng;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto::sha256_hex;

pub use argon2::Params as HashParams;

// ============================================================================
// Constants
// ============================================================================

/// Inputs longer than this (in UTF-8 bytes) are pre-hashed before Argon2.
pub const PREHASH_THRESHOLD_BYTES: usize = 72;

/// Upper bound on accepted password size, so hashing cost stays bounded.
pub const MAX_PASSWORD_BYTES: usize = 4096;

/// Clear text checked against the decoy digest when the caller has none
const DECOY_INPUT: &str = "decoy-password-input";

// ============================================================================
// Error Types
// ============================================================================

/// Rejected password input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PasswordPolicyError {
    #[error("Password cannot be empty or contain only whitespace")]
    EmptyOrWhitespace,

    #[error("Password must be at most {max} bytes (got {actual})")]
    TooLong { max: usize, actual: usize },
}

/// Password hashing/verification errors
#[derive(Debug, Error)]
pub enum PasswordHashError {
    #[error("Password hashing failed: {0}")]
    HashingFailed(String),

    /// The stored digest is not a usable PHC string
    #[error("Invalid password digest")]
    InvalidDigest,
}

// ============================================================================
// Clear Text Password (Zeroized on drop)
// ============================================================================

/// Clear text password, erased from memory on drop.
///
/// Not `Clone`, and `Debug` is redacted.
///
/// ```rust
/// use platform::password::ClearTextPassword;
///
/// let password = ClearTextPassword::new("pw1".to_string()).unwrap();
/// assert_eq!(format!("{:?}", password), "ClearTextPassword(\"[REDACTED]\")");
/// ```
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ClearTextPassword(String);

impl ClearTextPassword {
    /// Accepts any non-blank password up to [`MAX_PASSWORD_BYTES`].
    ///
    /// The bytes are kept exactly as given; no trimming or normalization,
    /// so distinct inputs always hash differently.
    pub fn new(raw: String) -> Result<Self, PasswordPolicyError> {
        if raw.trim().is_empty() {
            return Err(PasswordPolicyError::EmptyOrWhitespace);
        }

        if raw.len() > MAX_PASSWORD_BYTES {
            return Err(PasswordPolicyError::TooLong {
                max: MAX_PASSWORD_BYTES,
                actual: raw.len(),
            });
        }

        Ok(Self(raw))
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for ClearTextPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ClearTextPassword")
            .field(&"[REDACTED]")
            .finish()
    }
}

/// Bytes actually fed to Argon2.
///
/// Over-long inputs become the 64-byte hex SHA-256 digest of the full input.
fn hashing_input(password: &[u8]) -> Zeroizing<Vec<u8>> {
    if password.len() > PREHASH_THRESHOLD_BYTES {
        Zeroizing::new(sha256_hex(password).into_bytes())
    } else {
        Zeroizing::new(password.to_vec())
    }
}

// ============================================================================
// Hashed Password (Safe to store)
// ============================================================================

/// Hashed password in PHC string format
///
/// `$argon2id$v=19$m=19456,t=2,p=1$<salt>$<hash>`: algorithm, version,
/// cost parameters and salt travel with the digest.
#[derive(Clone, PartialEq, Eq)]
pub struct HashedPassword {
    hash: String,
}

impl HashedPassword {
    /// Parse and validate a PHC string
    pub fn from_phc_string(s: impl Into<String>) -> Result<Self, PasswordHashError> {
        let hash = s.into();
        PasswordHash::new(&hash).map_err(|_| PasswordHashError::InvalidDigest)?;
        Ok(Self { hash })
    }

    /// Wrap a stored digest without parsing it.
    ///
    /// A corrupt value is caught at verification time and fails closed.
    pub fn from_db(s: impl Into<String>) -> Self {
        Self { hash: s.into() }
    }

    /// PHC string for storage
    pub fn as_phc_string(&self) -> &str {
        &self.hash
    }
}

impl fmt::Debug for HashedPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashedPassword")
            .field("hash", &"[HASH]")
            .finish()
    }
}

// ============================================================================
// Credential Hasher
// ============================================================================

/// Stateless Argon2id hasher.
///
/// Holds only the cost parameters used for new hashes. Verification always
/// uses the parameters recorded in the digest, so hashes made under older
/// settings keep verifying.
#[derive(Debug)]
pub struct CredentialHasher {
    params: HashParams,
    /// Digest of [`DECOY_INPUT`] under `params`, built on first use
    decoy: OnceLock<HashedPassword>,
    verifications: AtomicU64,
}

impl Default for CredentialHasher {
    /// OWASP recommended Argon2id parameters: m=19456 (19 MiB), t=2, p=1
    fn default() -> Self {
        Self::new(HashParams::default())
    }
}

impl CredentialHasher {
    pub fn new(params: HashParams) -> Self {
        Self {
            params,
            decoy: OnceLock::new(),
            verifications: AtomicU64::new(0),
        }
    }

    /// Number of digest verifications run so far, decoys included
    pub fn verifications(&self) -> u64 {
        self.verifications.load(Ordering::Relaxed)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a password with a fresh 128-bit salt.
    pub fn hash(&self, password: &ClearTextPassword) -> Result<HashedPassword, PasswordHashError> {
        let input = hashing_input(password.as_bytes());
        let salt = SaltString::generate(OsRng);

        let hash = self
            .argon2()
            .hash_password(&input, &salt)
            .map_err(|e| PasswordHashError::HashingFailed(e.to_string()))?;

        Ok(HashedPassword {
            hash: hash.to_string(),
        })
    }

    /// Verify a password against a stored digest.
    ///
    /// Returns `Ok(false)` on mismatch and `Err(InvalidDigest)` when the
    /// digest cannot be parsed or names an unsupported algorithm.
    pub fn verify(
        &self,
        password: &ClearTextPassword,
        hashed: &HashedPassword,
    ) -> Result<bool, PasswordHashError> {
        self.verifications.fetch_add(1, Ordering::Relaxed);
        let parsed =
            PasswordHash::new(&hashed.hash).map_err(|_| PasswordHashError::InvalidDigest)?;
        let input = hashing_input(password.as_bytes());

        match self.argon2().verify_password(&input, &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(_) => Err(PasswordHashError::InvalidDigest),
        }
    }

    /// Spend one verification's worth of work and discard the outcome.
    ///
    /// For rejection paths that have no stored digest to check (unknown
    /// account, account without a password, unusable input), so they cost
    /// the same as a wrong password.
    pub fn verify_decoy(&self, password: Option<&ClearTextPassword>) {
        let decoy = match self.decoy.get() {
            Some(decoy) => decoy,
            None => match self.hash(&ClearTextPassword(DECOY_INPUT.to_string())) {
                Ok(digest) => self.decoy.get_or_init(|| digest),
                Err(_) => return,
            },
        };

        let fallback;
        let password = match password {
            Some(password) => password,
            None => {
                fallback = ClearTextPassword(DECOY_INPUT.to_string());
                &fallback
            }
        };

        let _ = self.verify(password, decoy);
    }
}

// ============================================================================
// Tests
// ============================================================================
