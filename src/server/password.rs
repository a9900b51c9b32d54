//! Password hashing and password rules.
//!
//! Hashes are stored as `pbkdf2-sha256$<rounds>$<salt>$<hash>` with base64
//! salt and hash, so the round count can change without breaking old rows.

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pbkdf2::pbkdf2_hmac_array;
use rand::RngCore;
use sha2::Sha256;

const SCHEME: &str = "pbkdf2-sha256";
const ROUNDS: u32 = 10_000;
const SALT_LENGTH: usize = 16;

pub const MIN_PASSWORD_LENGTH: usize = 8;

pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);
    let hash = pbkdf2_hmac_array::<Sha256, 32>(password.as_bytes(), &salt, ROUNDS);
    format!(
        "{SCHEME}${ROUNDS}${}${}",
        BASE64.encode(salt),
        BASE64.encode(hash)
    )
}

pub fn verify_password(password: &str, stored: &str) -> Result<bool> {
    let parts: Vec<&str> = stored.split('$').collect();
    let [scheme, rounds, salt, hash] = parts.as_slice() else {
        bail!("malformed password hash");
    };
    if *scheme != SCHEME {
        bail!("unsupported password hash scheme '{scheme}'");
    }
    let rounds: u32 = rounds.parse().context("parse password hash rounds")?;
    let salt = BASE64.decode(salt).context("decode password salt")?;
    let expect = BASE64.decode(hash).context("decode password hash")?;

    let actual = pbkdf2_hmac_array::<Sha256, 32>(password.as_bytes(), &salt, rounds);
    if expect.len() != actual.len() {
        return Ok(false);
    }
    // Compare without short-circuiting.
    let diff = expect
        .iter()
        .zip(actual.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b));
    Ok(diff == 0)
}

/// Returns the reason a password is rejected, if any.
pub fn check_password_requirements(username: &str, password: &str) -> Option<String> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Some(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters long"
        ));
    }
    if password == username {
        return Some(String::from("password cannot be the same as the username"));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_verify() {
        let hash = hash_password("correct horse");
        assert!(hash.starts_with("pbkdf2-sha256$10000$"));
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("correct horsE", &hash).unwrap());
        assert!(!verify_password("", &hash).unwrap());

        // Salted.
        assert_ne!(hash, hash_password("correct horse"));
    }

    #[test]
    fn test_malformed() {
        assert!(verify_password("x", "").is_err());
        assert!(verify_password("x", "md5$1$a$b").is_err());
        assert!(verify_password("x", "pbkdf2-sha256$many$a$b").is_err());
        assert!(verify_password("x", "pbkdf2-sha256$10$!!$b").is_err());
    }

    #[test]
    fn test_requirements() {
        assert!(check_password_requirements("alice", "short").is_some());
        assert!(check_password_requirements("alice-long-name", "alice-long-name").is_some());
        assert!(check_password_requirements("alice", "long enough").is_none());
    }
}
