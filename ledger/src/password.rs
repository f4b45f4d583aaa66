use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::{LedgerError, Result};

/// Argon2id hash of `password` as a PHC string, salt and parameters included.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::b64_encode(&rand::random::<[u8; 16]>())
        .map_err(|e| LedgerError::PasswordHash(e.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| LedgerError::PasswordHash(e.to_string()))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
