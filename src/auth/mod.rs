/// Authentication module
///
/// Secret hashing, refresh credential encoding, access token minting and
/// the session service that ties them into login and refresh.

mod claims;
mod hasher;
mod hashing;
mod jwt;
mod password;
mod refresh_token;
mod session;

pub use claims::Claims;
pub use hasher::Hasher;
pub use hashing::{
    decode_hash, encode_hash, hash_with_salt, needs_rehash, verify_secret, DecodedHash, HashError,
    HashParams,
};
pub use jwt::{generate_access_token, validate_access_token};
pub use password::{hash_password, validate_password_strength, verify_password};
pub use refresh_token::{
    extract_principal_id, generate_refresh_token, MalformedCredential, RefreshCredential,
    SECRET_LENGTH,
};
pub use session::{SessionService, TokenPair};
