//! Password hashing
//!
//! One-way Argon2id hashing behind a small trait so the service can be
//! exercised with cheaper parameters in tests.

use crate::config::AuthConfig;
use crate::error::AuthError;

use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString,
    },
    Argon2, Params,
};

/// Hash/verify pair used by registration and login
pub trait PasswordHasher: Send + Sync {
    /// Hash a plaintext password into a PHC string
    fn hash(&self, plaintext: &str) -> Result<String, AuthError>;

    /// Check a plaintext password against a stored hash
    fn verify(&self, hash: &str, plaintext: &str) -> Result<bool, AuthError>;
}

/// Argon2id hasher
pub struct Argon2Hasher {
    params: Params,
}

impl Argon2Hasher {
    pub fn new(memory_cost: u32, time_cost: u32, parallelism: u32) -> Result<Self, AuthError> {
        let params = Params::new(memory_cost, time_cost, parallelism, None)
            .map_err(|e| AuthError::Config(format!("Invalid Argon2 parameters: {e}")))?;
        Ok(Self { params })
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        Self::new(
            config.argon2_memory_cost,
            config.argon2_time_cost,
            config.argon2_parallelism,
        )
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            self.params.clone(),
        )
    }
}

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, plaintext: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);

        let hash = self
            .argon2()
            .hash_password(plaintext.as_bytes(), &salt)?
            .to_string();

        Ok(hash)
    }

    fn verify(&self, hash: &str, plaintext: &str) -> Result<bool, AuthError> {
        let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::Internal)?;

        Ok(self
            .argon2()
            .verify_password(plaintext.as_bytes(), &parsed_hash)
            .is_ok())
    }
}
