//! Password Verifier
//! Mission: Salted one-way hashing of credentials with bcrypt

use crate::auth::error::PasswordError;
use bcrypt::{hash, hash_with_salt, verify, BcryptError, DEFAULT_COST};
use tracing::error;

// Fixed salt for the unknown-account path; the output is discarded
const DUMMY_SALT: [u8; 16] = *b"auth-dummy-salt!";

/// bcrypt hasher with a fixed cost factor
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self { cost: DEFAULT_COST }
    }
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a plaintext password. Output embeds salt and cost.
    pub fn hash(&self, plaintext: &str) -> Result<String, PasswordError> {
        hash(plaintext, self.cost).map_err(PasswordError::Hashing)
    }

    /// Compare a plaintext password to a stored hash.
    /// `Ok(false)` for a wrong password, `Err` only for a malformed hash.
    pub fn verify(&self, plaintext: &str, hash: &str) -> Result<bool, PasswordError> {
        match verify(plaintext, hash) {
            Ok(valid) => Ok(valid),
            Err(
                BcryptError::InvalidHash(_)
                | BcryptError::InvalidPrefix(_)
                | BcryptError::InvalidCost(_)
                | BcryptError::CostNotAllowed(_)
                | BcryptError::InvalidSaltLen(_)
                | BcryptError::InvalidBase64(_),
            ) => {
                error!("🚨 stored password hash is malformed; account data needs repair");
                Err(PasswordError::HashFormat)
            }
            Err(e) => Err(PasswordError::Hashing(e)),
        }
    }

    /// Burn one bcrypt round at this hasher's cost for an unknown account,
    /// so a miss takes as long as a wrong password. Always false.
    pub fn verify_dummy(&self, plaintext: &str) -> bool {
        let _ = hash_with_salt(plaintext, self.cost, DUMMY_SALT);
        false
    }
}
