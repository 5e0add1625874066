/// Refresh Token Codec
///
/// A refresh credential is the principal id and a 64-character random
/// alphanumeric secret joined by a dot:
///
/// `<principal_id>.<secret>`
///
/// The id is recoverable by structural decoding alone so the session service
/// knows which slot to examine. It is not trusted: the whole credential,
/// id included, is what gets hashed and compared.

use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use std::fmt;

use crate::principal::PrincipalId;

/// Length of the random secret portion (~381 bits of entropy)
pub const SECRET_LENGTH: usize = 64;

const SEPARATOR: char = '.';

/// Credential could not be structurally decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedCredential;

impl fmt::Display for MalformedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Malformed refresh credential")
    }
}

impl std::error::Error for MalformedCredential {}

/// A freshly minted refresh credential
///
/// Debug output redacts the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshCredential {
    principal_id: PrincipalId,
    encoded: String,
}

impl RefreshCredential {
    pub fn principal_id(&self) -> PrincipalId {
        self.principal_id
    }

    /// The bearer string handed to the client
    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    pub fn into_string(self) -> String {
        self.encoded
    }
}

impl fmt::Debug for RefreshCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshCredential")
            .field("principal_id", &self.principal_id)
            .field("encoded", &"[redacted]")
            .finish()
    }
}

/// Generate a new refresh credential for `principal_id`
pub fn generate_refresh_token(principal_id: PrincipalId) -> RefreshCredential {
    let secret: String = OsRng
        .sample_iter(&Alphanumeric)
        .take(SECRET_LENGTH)
        .map(char::from)
        .collect();

    RefreshCredential {
        principal_id,
        encoded: format!("{}{}{}", principal_id, SEPARATOR, secret),
    }
}

/// Recover the principal id embedded in a presented credential
pub fn extract_principal_id(credential: &str) -> Result<PrincipalId, MalformedCredential> {
    let (id, secret) = credential.split_once(SEPARATOR).ok_or(MalformedCredential)?;

    if secret.len() != SECRET_LENGTH || !secret.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(MalformedCredential);
    }

    id.parse::<PrincipalId>().map_err(|_| MalformedCredential)
}
