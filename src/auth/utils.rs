use anyhow::Result;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::Rng;
use validator::ValidationError;

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();
    Ok(password_hash)
}

pub fn verify_password(hash: &str, password: &str) -> Result<()> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let argon2 = Argon2::default();
    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    Ok(())
}

/// Random identifier mixed into every session JWT so two logins in the same
/// second still produce distinct session tokens.
pub fn generate_secure_token() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    const TOKEN_LEN: usize = 32;

    let mut rng = rand::thread_rng();
    (0..TOKEN_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// At least 7 characters and must not contain the word "password".
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    let password = password.trim();
    if password.chars().count() < 7 {
        let mut err = ValidationError::new("password_length");
        err.message = Some("Password must be at least 7 characters".into());
        return Err(err);
    }
    if password.to_lowercase().contains("password") {
        let mut err = ValidationError::new("password_word");
        err.message = Some("Password cannot contain 'password'".into());
        return Err(err);
    }
    Ok(())
}

/// Checked on the stored form, so surrounding whitespace never counts.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let len = normalize_handle(username).chars().count();
    if !(3..=30).contains(&len) {
        let mut err = ValidationError::new("username_length");
        err.message = Some("Username must be between 3 and 30 characters".into());
        return Err(err);
    }
    Ok(())
}

/// Usernames and emails are stored trimmed and lower-cased.
pub fn normalize_handle(value: &str) -> String {
    value.trim().to_lowercase()
}
