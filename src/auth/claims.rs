/// JWT Claims structure
///
/// Payload of an access token: the principal, a snapshot of its role taken
/// at mint time, and the standard RFC 7519 timing claims.

use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::principal::{PrincipalId, Role};

/// JWT Claims for access tokens
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (principal id as decimal string)
    pub sub: String,
    /// Role at mint time
    pub role: Role,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    pub iss: String,
}

impl Claims {
    pub fn new(principal_id: PrincipalId, role: Role, expiry_seconds: i64, issuer: String) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: principal_id.to_string(),
            role,
            exp: now + expiry_seconds,
            iat: now,
            iss: issuer,
        }
    }

    /// Extract the principal id from the subject claim
    pub fn principal_id(&self) -> Result<PrincipalId, AuthError> {
        self.sub.parse::<PrincipalId>().map_err(|_| AuthError::TokenInvalid)
    }
}
