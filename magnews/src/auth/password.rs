//! Password hashing, password policy, and the random tokens mailed to readers.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use rand::prelude::RngExt;
use rand::rng;

use crate::config::PasswordConfig;
use crate::errors::Error;

/// Alphabet for password reset codes. Omits 0/O, 1/I/L, 5/S and 8 so codes survive being read aloud
/// or retyped from a phone.
pub const RESET_CODE_ALPHABET: &[u8] = b"234679ABCDEFGHJKMNPQRTUVWXYZ";
pub const RESET_CODE_LENGTH: usize = 6;

/// Argon2 hashing parameters.
#[derive(Debug, Clone, Copy)]
pub struct Argon2Params {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Argon2Params {
    fn to_argon2(self) -> Result<Argon2<'static>, Error> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None).map_err(|e| Error::Internal {
            operation: format!("create argon2 params: {e}"),
        })?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            memory_kib: 19456, // 19 MB
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl From<&PasswordConfig> for Argon2Params {
    fn from(config: &PasswordConfig) -> Self {
        Self {
            memory_kib: config.argon2_memory_kib,
            iterations: config.argon2_iterations,
            parallelism: config.argon2_parallelism,
        }
    }
}

/// Hash a string using Argon2id. Uses secure defaults when `params` is None.
pub fn hash_string_with_params(input: &str, params: Option<Argon2Params>) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = params.unwrap_or_default().to_argon2()?;

    let hash = argon2.hash_password(input.as_bytes(), &salt).map_err(|e| Error::Internal {
        operation: format!("hash string: {e}"),
    })?;

    Ok(hash.to_string())
}

pub fn hash_string(input: &str) -> Result<String, Error> {
    hash_string_with_params(input, None)
}

/// Verify a string against a hash.
///
/// Verification uses the parameters embedded in the hash itself.
pub fn verify_string(input: &str, hash: &str) -> Result<bool, Error> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| Error::Internal {
        operation: format!("parse hash: {e}"),
    })?;

    Ok(Argon2::default().verify_password(input.as_bytes(), &parsed_hash).is_ok())
}

/// Check a candidate password against the configured length policy.
pub fn validate_password(password: &str, policy: &PasswordConfig) -> Result<(), Error> {
    let length = password.chars().count();
    if length < policy.min_length {
        return Err(Error::bad_request(format!(
            "Password must be at least {} characters",
            policy.min_length
        )));
    }
    if length > policy.max_length {
        return Err(Error::bad_request(format!(
            "Password must be at most {} characters",
            policy.max_length
        )));
    }
    Ok(())
}

/// 32 random bytes, hex encoded (64 chars). Used for email verification links.
pub fn generate_verification_token() -> String {
    let mut token_bytes = [0u8; 32];
    rng().fill(&mut token_bytes);
    hex::encode(token_bytes)
}

/// Short human-typeable password reset code over [`RESET_CODE_ALPHABET`].
pub fn generate_reset_code() -> String {
    let mut rng = rng();
    (0..RESET_CODE_LENGTH)
        .map(|_| RESET_CODE_ALPHABET[rng.random_range(0..RESET_CODE_ALPHABET.len())] as char)
        .collect()
}

/// Random opaque token for newsletter unsubscribe links.
pub fn generate_unsubscribe_token() -> String {
    let mut token_bytes = [0u8; 16];
    rng().fill(&mut token_bytes);
    hex::encode(token_bytes)
}
