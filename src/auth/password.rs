/*!
 * # Password Module
 *
 * Argon2id hashing plus the minimum password policy applied at registration.
 */

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PasswordPolicyError {
    #[error("Password too short: minimum {min_length} characters required")]
    TooShort { min_length: usize },

    #[error("Password too long: maximum {max_length} characters allowed")]
    TooLong { max_length: usize },

    #[error("Password must contain at least one letter and one number")]
    MissingCharacterClass,

    #[error("Password is in the list of commonly used passwords")]
    CommonPassword,
}

#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub max_length: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_length: 128,
        }
    }
}

lazy_static! {
    static ref COMMON_PASSWORDS: HashSet<&'static str> = [
        "password", "password1", "password123", "12345678", "123456789", "qwerty123",
        "letmein1", "welcome1", "admin123", "iloveyou1", "abc12345", "passw0rd",
        "sailor123", "captain1", "vessel123",
    ]
    .into_iter()
    .collect();
}

impl PasswordPolicy {
    pub fn validate(&self, password: &str) -> Result<(), PasswordPolicyError> {
        let len = password.chars().count();
        if len < self.min_length {
            return Err(PasswordPolicyError::TooShort {
                min_length: self.min_length,
            });
        }
        if len > self.max_length {
            return Err(PasswordPolicyError::TooLong {
                max_length: self.max_length,
            });
        }
        let has_letter = password.chars().any(|c| c.is_alphabetic());
        let has_digit = password.chars().any(|c| c.is_ascii_digit());
        if !(has_letter && has_digit) {
            return Err(PasswordPolicyError::MissingCharacterClass);
        }
        if COMMON_PASSWORDS.contains(password.to_lowercase().as_str()) {
            return Err(PasswordPolicyError::CommonPassword);
        }
        Ok(())
    }
}

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

/// False for a wrong password and for an unparseable stored hash
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("Engine-room-42").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("Engine-room-42", &hash));
        assert!(!verify_password("engine-room-42", &hash));
        assert!(!verify_password("Engine-room-42", "not-a-hash"));
    }

    #[test]
    fn policy_rejects_weak_passwords() {
        let policy = PasswordPolicy::default();
        assert_eq!(
            policy.validate("short1"),
            Err(PasswordPolicyError::TooShort { min_length: 8 })
        );
        assert_eq!(
            policy.validate("onlyletters"),
            Err(PasswordPolicyError::MissingCharacterClass)
        );
        assert_eq!(
            policy.validate("Password123"),
            Err(PasswordPolicyError::CommonPassword)
        );
        assert!(policy.validate("Bilge-pump-7").is_ok());
    }
}
