//! Salted password hashing for signup and login.
//!
//! Hashes are PBKDF2-HMAC-SHA256 over the UTF-8 password with a 16-byte
//! random salt; hash and salt are stored as lowercase hex. Derivation is
//! one-way and deliberately slow.

use anyhow::{Context, Result};
use pbkdf2::pbkdf2_hmac;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use subtle::ConstantTimeEq;

const SALT_BYTES: usize = 16;
const HASH_BYTES: usize = 32;
const PBKDF2_ROUNDS: u32 = 100_000;

/// Hex-encoded hash/salt pair as stored in the `users` table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PasswordHash {
    pub hash: String,
    pub salt: String,
}

fn derive(password: &str, salt: &[u8]) -> [u8; HASH_BYTES] {
    let mut out = [0u8; HASH_BYTES];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ROUNDS, &mut out);
    out
}

/// Hash a password with a fresh random salt.
///
/// # Errors
/// Returns an error if the system RNG fails.
pub fn hash_password(password: &str) -> Result<PasswordHash> {
    let mut salt = [0u8; SALT_BYTES];
    OsRng
        .try_fill_bytes(&mut salt)
        .context("failed to generate password salt")?;
    Ok(hash_with_salt(password, &salt))
}

/// Deterministic variant for a caller-supplied salt.
/// Same password + same salt always yields the same hash.
#[must_use]
pub fn hash_with_salt(password: &str, salt: &[u8]) -> PasswordHash {
    PasswordHash {
        hash: hex::encode(derive(password, salt)),
        salt: hex::encode(salt),
    }
}

/// Check a password against a stored hash/salt pair.
///
/// Malformed stored values count as a failed verification, never an error;
/// a caller probing login cannot tell a broken credential record apart from
/// a wrong password.
#[must_use]
pub fn verify_password(password: &str, salt_hex: &str, expected_hash_hex: &str) -> bool {
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    let Ok(expected) = hex::decode(expected_hash_hex) else {
        return false;
    };
    // Constant-time comparison; a length mismatch also verifies as false
    derive(password, &salt)
        .as_slice()
        .ct_eq(expected.as_slice())
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_round_trip() {
        let credentials = hash_password("CorrectHorseBatteryStaple").unwrap();
        assert!(verify_password(
            "CorrectHorseBatteryStaple",
            &credentials.salt,
            &credentials.hash
        ));
    }

    #[test]
    fn wrong_password_fails_verification() {
        let credentials = hash_password("CorrectHorseBatteryStaple").unwrap();
        assert!(!verify_password(
            "correcthorsebatterystaple",
            &credentials.salt,
            &credentials.hash
        ));
        assert!(!verify_password("", &credentials.salt, &credentials.hash));
    }

    #[test]
    fn fresh_salts_differ() {
        let first = hash_password("password").unwrap();
        let second = hash_password("password").unwrap();
        assert_ne!(first.salt, second.salt);
        assert_ne!(first.hash, second.hash);
    }

    #[test]
    fn fixed_salt_is_deterministic() {
        let salt = [7u8; SALT_BYTES];
        let first = hash_with_salt("password", &salt);
        let second = hash_with_salt("password", &salt);
        assert_eq!(first, second);
        assert_eq!(first.salt, hex::encode(salt));
    }

    #[test]
    fn hash_and_salt_are_lowercase_hex() {
        let credentials = hash_password("password").unwrap();
        assert_eq!(credentials.salt.len(), SALT_BYTES * 2);
        assert_eq!(credentials.hash.len(), HASH_BYTES * 2);
        for value in [&credentials.salt, &credentials.hash] {
            assert!(value
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn malformed_salt_or_hash_is_a_failed_verification() {
        let credentials = hash_password("password").unwrap();
        assert!(!verify_password("password", "not-hex", &credentials.hash));
        assert!(!verify_password("password", &credentials.salt, "not-hex"));
        assert!(!verify_password("password", "", ""));
    }

    #[test]
    fn truncated_stored_hash_fails_verification() {
        let credentials = hash_password("password").unwrap();
        // Valid hex but the wrong length
        let truncated = &credentials.hash[..10];
        assert!(!verify_password("password", &credentials.salt, truncated));
    }
}
