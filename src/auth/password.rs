/// Password Hashing and Verification
///
/// Passwords are stored as Argon2id hash records produced by the hashing
/// codec, after a strength check.

use crate::auth::hashing::{encode_hash, verify_secret, HashError, HashParams};
use crate::error::{AppError, ValidationError};

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;

/// Hash a password for storage
///
/// # Errors
/// Returns error if:
/// - Password fails validation (too short, weak, etc.)
/// - Hashing fails
pub fn hash_password(password: &str, params: &HashParams) -> Result<String, AppError> {
    validate_password_strength(password)?;

    encode_hash(password.as_bytes(), params)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against its stored record
///
/// # Errors
/// Only when the stored record cannot be decoded; a wrong password is `Ok(false)`.
pub fn verify_password(password: &str, record: &str) -> Result<bool, HashError> {
    verify_secret(password.as_bytes(), record)
}

/// Validate password strength requirements
///
/// Requirements:
/// - 8 to 128 characters
/// - At least one digit, one lowercase and one uppercase letter
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort(
            "password".to_string(),
            MIN_PASSWORD_LENGTH,
        ));
    }

    // Upper bound also caps the work a single hash request can demand
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong(
            "password".to_string(),
            MAX_PASSWORD_LENGTH,
        ));
    }

    let has_digit = password.chars().any(|c| c.is_numeric());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_uppercase());

    if !has_digit || !has_lowercase || !has_uppercase {
        return Err(ValidationError::InvalidFormat(
            "password must contain at least one digit, one lowercase letter, and one uppercase letter"
                .to_string(),
        ));
    }

    Ok(())
}
