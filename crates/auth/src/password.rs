//! Password hashing (Argon2id) and strength policy.

use std::borrow::Cow;

use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand_core::OsRng;

use warden_core::DomainError;

use crate::AuthError;

/// One-way password hashing.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, AuthError>;

    /// `Ok(false)` on mismatch; `Err` only when the stored hash is unusable.
    fn verify(&self, password: &str, hash: &str) -> Result<bool, AuthError>;
}

/// Argon2id hasher producing PHC strings, with an optional server-side pepper.
#[derive(Clone)]
pub struct Argon2PasswordHasher {
    pepper: Option<String>,
    params: Params,
}

impl Argon2PasswordHasher {
    pub fn new(pepper: Option<String>) -> Self {
        Self {
            pepper,
            params: Params::default(),
        }
    }

    /// Tune memory (KiB) and iteration cost.
    pub fn with_cost(pepper: Option<String>, memory_kib: u32, iterations: u32) -> Result<Self, AuthError> {
        let params = Params::new(memory_kib, iterations, 1, None)
            .map_err(|e| AuthError::Crypto(format!("invalid argon2 params: {e}")))?;
        Ok(Self { pepper, params })
    }

    fn argon2(&self) -> Argon2<'_> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    fn peppered<'a>(&self, password: &'a str) -> Cow<'a, [u8]> {
        match &self.pepper {
            Some(p) => Cow::Owned(format!("{p}{password}").into_bytes()),
            None => Cow::Borrowed(password.as_bytes()),
        }
    }
}

impl core::fmt::Debug for Argon2PasswordHasher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Argon2PasswordHasher")
            .field("peppered", &self.pepper.is_some())
            .field("m_cost", &self.params.m_cost())
            .field("t_cost", &self.params.t_cost())
            .finish()
    }
}

impl PasswordHasher for Argon2PasswordHasher {
    fn hash(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(&self.peppered(password), &salt)
            .map(|h| h.to_string())
            .map_err(|e| AuthError::Crypto(format!("hash error: {e}")))
    }

    fn verify(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| AuthError::Crypto(format!("invalid hash format: {e}")))?;

        // Cost parameters are read back from the PHC string.
        match self.argon2().verify_password(&self.peppered(password), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AuthError::Crypto(format!("verify error: {e}"))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Strength policy
// ─────────────────────────────────────────────────────────────────────────────

/// Minimum strength for user-chosen passwords.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub min_length: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self { min_length: 8 }
    }
}

impl PasswordPolicy {
    pub const SPECIAL_CHARS: &'static str = "@$!%*?&";

    pub fn validate(&self, password: &str) -> Result<(), DomainError> {
        let long_enough = password.chars().count() >= self.min_length;
        let upper = password.chars().any(|c| c.is_ascii_uppercase());
        let lower = password.chars().any(|c| c.is_ascii_lowercase());
        let digit = password.chars().any(|c| c.is_ascii_digit());
        let special = password.chars().any(|c| Self::SPECIAL_CHARS.contains(c));

        if long_enough && upper && lower && digit && special {
            Ok(())
        } else {
            Err(DomainError::validation(format!(
                "password must be at least {} characters long and contain an uppercase letter, \
                 a lowercase letter, a digit and one of {}",
                self.min_length,
                Self::SPECIAL_CHARS
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap(pepper: Option<&str>) -> Argon2PasswordHasher {
        Argon2PasswordHasher::with_cost(pepper.map(str::to_string), 1024, 1).unwrap()
    }

    #[test]
    fn correct_password_matches() {
        let h = cheap(None);
        let hash = h.hash("hunter2").unwrap();
        assert!(h.verify("hunter2", &hash).unwrap());
        assert!(!h.verify("hunter3", &hash).unwrap());
    }

    #[test]
    fn pepper_is_part_of_the_secret() {
        let hash = cheap(Some("pepper!")).hash("hunter2").unwrap();
        assert!(cheap(Some("pepper!")).verify("hunter2", &hash).unwrap());
        assert!(!cheap(None).verify("hunter2", &hash).unwrap());
    }

    #[test]
    fn malformed_hash_is_a_crypto_error() {
        assert!(matches!(cheap(None).verify("pw", "not-a-hash"), Err(AuthError::Crypto(_))));
    }

    #[test]
    fn strength_rules() {
        let p = PasswordPolicy::default();
        assert!(p.validate("Str0ng!pass").is_ok());
        assert!(p.validate("Sh0rt!").is_err());
        assert!(p.validate("nouppercase1!").is_err());
        assert!(p.validate("NOLOWERCASE1!").is_err());
        assert!(p.validate("NoDigits!!").is_err());
        assert!(p.validate("NoSpecial123").is_err());
        assert!(p.validate("Wrong#Special1").is_err());
    }
}
