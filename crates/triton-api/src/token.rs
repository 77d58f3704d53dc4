//! Opaque bearer tokens.
//!
//! A token is 16 random bytes rendered as unpadded base-32 (26 characters).
//! Only the SHA-256 of the plaintext is ever persisted; the plaintext is
//! handed to the client once, at issue time.

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use data_encoding::BASE32_NOPAD;
use rand::TryRngCore;
use rand::rngs::OsRng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Length of an encoded plaintext token.
pub const TOKEN_LEN: usize = 26;

const RANDOM_BYTES: usize = 16;

/// Scope for session tokens presented in `Authorization` headers.
pub const SCOPE_AUTHENTICATION: &str = "authentication";

pub type TokenHash = [u8; 32];

#[derive(Debug, Clone, Serialize)]
pub struct Token {
    #[serde(rename = "token")]
    pub plaintext: String,
    #[serde(skip)]
    pub hash: TokenHash,
    #[serde(skip)]
    pub user_id: Uuid,
    pub expiry: DateTime<Utc>,
    #[serde(skip)]
    pub scope: String,
}

#[derive(Debug, thiserror::Error)]
#[error("system random source unavailable: {0}")]
pub struct RandomSourceError(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ShapeError {
    #[error("token must be provided")]
    Empty,
    #[error("token must be 26 bytes long")]
    WrongLength,
}

/// Mint a fresh token for `user_id` that expires `ttl` from now.
pub fn generate(user_id: Uuid, ttl: TimeDelta, scope: &str) -> Result<Token, RandomSourceError> {
    let plaintext = random_text()?;
    let hash = digest(&plaintext);

    Ok(Token {
        plaintext,
        hash,
        user_id,
        // Stored as whole seconds; hand out the same instant that is stored.
        expiry: (Utc::now() + ttl).trunc_subsecs(0),
        scope: scope.to_string(),
    })
}

/// 16 bytes from the OS random source, base-32 encoded without padding.
pub fn random_text() -> Result<String, RandomSourceError> {
    let mut bytes = [0u8; RANDOM_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| RandomSourceError(e.to_string()))?;
    Ok(BASE32_NOPAD.encode(&bytes))
}

pub fn digest(plaintext: &str) -> TokenHash {
    Sha256::digest(plaintext.as_bytes()).into()
}

/// Cheap shape check done before any store lookup. Says nothing about
/// whether the token exists or has expired.
pub fn validate_shape(plaintext: &str) -> Result<(), ShapeError> {
    if plaintext.is_empty() {
        return Err(ShapeError::Empty);
    }
    if plaintext.len() != TOKEN_LEN {
        return Err(ShapeError::WrongLength);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_token_has_expected_shape() {
        let user_id = Uuid::new_v4();
        let before = Utc::now();
        let token = generate(user_id, TimeDelta::hours(24), SCOPE_AUTHENTICATION).unwrap();

        assert_eq!(token.plaintext.len(), TOKEN_LEN);
        assert!(
            token
                .plaintext
                .chars()
                .all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c))
        );
        assert!(validate_shape(&token.plaintext).is_ok());
        assert_eq!(token.user_id, user_id);
        assert_eq!(token.scope, SCOPE_AUTHENTICATION);
        assert!(token.expiry > before + TimeDelta::hours(24) - TimeDelta::seconds(1));
        assert!(token.expiry <= Utc::now() + TimeDelta::hours(24));
        assert_eq!(token.expiry.timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn hash_is_sha256_of_plaintext() {
        let token = generate(Uuid::new_v4(), TimeDelta::hours(1), SCOPE_AUTHENTICATION).unwrap();
        assert_eq!(token.hash, digest(&token.plaintext));
        assert_ne!(token.hash, digest("AAAAAAAAAAAAAAAAAAAAAAAAAA"));
    }

    #[test]
    fn tokens_are_unique() {
        let a = random_text().unwrap();
        let b = random_text().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn shape_check() {
        assert_eq!(validate_shape(""), Err(ShapeError::Empty));
        assert_eq!(validate_shape("short"), Err(ShapeError::WrongLength));
        assert_eq!(
            validate_shape("AAAAAAAAAAAAAAAAAAAAAAAAAAA"),
            Err(ShapeError::WrongLength)
        );
        assert!(validate_shape("AAAAAAAAAAAAAAAAAAAAAAAAAA").is_ok());
    }

    #[test]
    fn serialized_token_hides_hash() {
        let token = generate(Uuid::new_v4(), TimeDelta::hours(1), SCOPE_AUTHENTICATION).unwrap();
        let json = serde_json::to_value(&token).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert_eq!(obj["token"], token.plaintext);
        assert!(obj.contains_key("expiry"));
    }

    #[test]
    fn known_digest() {
        // sha256("abc")
        let expected: TokenHash = [
            0xba, 0x78, 0x16, 0xbf, 0x8f, 0x01, 0xcf, 0xea, 0x41, 0x41, 0x40, 0xde, 0x5d, 0xae,
            0x22, 0x23, 0xb0, 0x03, 0x61, 0xa3, 0x96, 0x17, 0x7a, 0x9c, 0xb4, 0x10, 0xff, 0x61,
            0xf2, 0x00, 0x15, 0xad,
        ];
        assert_eq!(digest("abc"), expected);
    }
}
