/// Access Token Minter/Verifier
///
/// HS256-signed JWTs with a short fixed lifetime, signed with the
/// server-held secret from `JwtSettings`.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::auth::claims::Claims;
use crate::configuration::JwtSettings;
use crate::error::AuthError;
use crate::principal::{PrincipalId, Role};

/// Mint a new access token
///
/// # Errors
/// Returns the signing library's message if encoding fails
pub fn generate_access_token(
    principal_id: PrincipalId,
    role: Role,
    config: &JwtSettings,
) -> Result<String, String> {
    let claims = Claims::new(
        principal_id,
        role,
        config.access_token_expiry,
        config.issuer.clone(),
    );

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| format!("Token generation failed: {}", e))
}

/// Verify signature, issuer and expiry; return the principal and role
///
/// # Errors
/// `AuthError::TokenInvalid` for any verification failure
pub fn validate_access_token(
    token: &str,
    config: &JwtSettings,
) -> Result<(PrincipalId, Role), AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.issuer]);
    validation.leeway = 0;

    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::warn!("JWT validation error: {}", e);
        AuthError::TokenInvalid
    })?;

    Ok((claims.principal_id()?, claims.role))
}
