//! Platform Crate - Technical Infrastructure
//!
//! Shared technical foundations with no knowledge of users or HTTP:
//! - Cryptographic utilities (SHA-256, HMAC, base64url, constant-time compare)
//! - Credential hashing (Argon2id behind a length-safety pre-hash)
//! - Signed, expiring bearer tokens (HS256)
//! - Wall-clock abstraction so token expiry is testable

pub mod clock;
pub mod crypto;
pub mod password;
pub mod token;
