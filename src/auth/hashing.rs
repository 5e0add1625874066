/// Secret Hashing Codec
///
/// Argon2id hashing for secrets at rest (passwords and refresh credentials).
/// Records are PHC strings that carry their own cost parameters and salt:
///
/// `$argon2id$v=19$m=19456,t=2,p=1$<salt-b64>$<digest-b64>`
///
/// so a record produced under older parameters stays verifiable after the
/// defaults are raised.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use std::fmt;
use subtle::ConstantTimeEq;

/// Digest length in bytes
pub const DEFAULT_OUTPUT_LEN: usize = 32;

/// Longest salt accepted when decoding (PHC limit)
const MAX_SALT_LEN: usize = 64;

/// Errors raised by the hashing codec
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    /// Record string or its parameter block could not be understood
    MalformedHashRecord(String),
    /// Parameters were rejected by the hashing primitive
    InvalidParams(String),
    /// The primitive failed while hashing
    Hashing(String),
}

impl fmt::Display for HashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashError::MalformedHashRecord(msg) => write!(f, "Malformed hash record: {}", msg),
            HashError::InvalidParams(msg) => write!(f, "Invalid hash parameters: {}", msg),
            HashError::Hashing(msg) => write!(f, "Hashing failed: {}", msg),
        }
    }
}

impl std::error::Error for HashError {}

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashParams {
    /// Memory cost in KiB
    pub memory_cost: u32,
    /// Number of passes
    pub time_cost: u32,
    /// Degree of parallelism (lanes)
    pub parallelism: u32,
    /// Digest length in bytes
    pub output_len: usize,
}

impl HashParams {
    pub fn new(memory_cost: u32, time_cost: u32, parallelism: u32) -> Self {
        Self {
            memory_cost,
            time_cost,
            parallelism,
            output_len: DEFAULT_OUTPUT_LEN,
        }
    }

    fn argon2(&self) -> Result<Argon2<'static>, HashError> {
        let params = Params::new(
            self.memory_cost,
            self.time_cost,
            self.parallelism,
            Some(self.output_len),
        )
        .map_err(|e| HashError::InvalidParams(e.to_string()))?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

impl Default for HashParams {
    /// OWASP-recommended Argon2id baseline (19 MiB, 2 passes, 1 lane)
    fn default() -> Self {
        Self::new(Params::DEFAULT_M_COST, Params::DEFAULT_T_COST, Params::DEFAULT_P_COST)
    }
}

/// A parsed hash record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedHash {
    pub params: HashParams,
    pub salt: Vec<u8>,
    pub digest: Vec<u8>,
}

/// Hash `secret` under `params` with a fresh random salt and serialize the
/// result into a self-describing record.
pub fn encode_hash(secret: &[u8], params: &HashParams) -> Result<String, HashError> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = params
        .argon2()?
        .hash_password(secret, &salt)
        .map_err(|e| HashError::Hashing(e.to_string()))?;

    Ok(hash.to_string())
}

/// Parse a record produced by [`encode_hash`].
pub fn decode_hash(record: &str) -> Result<DecodedHash, HashError> {
    let parsed = PasswordHash::new(record)
        .map_err(|e| HashError::MalformedHashRecord(e.to_string()))?;

    match Algorithm::try_from(parsed.algorithm) {
        Ok(Algorithm::Argon2id) => {}
        _ => {
            return Err(HashError::MalformedHashRecord(format!(
                "unsupported algorithm {}",
                parsed.algorithm
            )))
        }
    }

    if let Some(version) = parsed.version {
        if version != Version::V0x13 as u32 {
            return Err(HashError::MalformedHashRecord(format!(
                "unsupported version {}",
                version
            )));
        }
    }

    let param = |name: &str| {
        parsed.params.get_decimal(name).ok_or_else(|| {
            HashError::MalformedHashRecord(format!("missing parameter {}", name))
        })
    };
    let memory_cost = param("m")?;
    let time_cost = param("t")?;
    let parallelism = param("p")?;

    let salt = parsed
        .salt
        .ok_or_else(|| HashError::MalformedHashRecord("missing salt".to_string()))?;
    let mut salt_buf = [0u8; MAX_SALT_LEN];
    let salt = salt
        .decode_b64(&mut salt_buf)
        .map_err(|e| HashError::MalformedHashRecord(e.to_string()))?
        .to_vec();

    let digest = parsed
        .hash
        .ok_or_else(|| HashError::MalformedHashRecord("missing digest".to_string()))?
        .as_bytes()
        .to_vec();

    let params = HashParams {
        memory_cost,
        time_cost,
        parallelism,
        output_len: digest.len(),
    };
    // Reject blocks the primitive would refuse at verification time
    params.argon2()?;

    Ok(DecodedHash { params, salt, digest })
}

/// Deterministically compute the digest of `secret` under `params` and `salt`.
pub fn hash_with_salt(
    secret: &[u8],
    params: &HashParams,
    salt: &[u8],
) -> Result<Vec<u8>, HashError> {
    let mut digest = vec![0u8; params.output_len];
    params
        .argon2()?
        .hash_password_into(secret, salt, &mut digest)
        .map_err(|e| HashError::Hashing(e.to_string()))?;
    Ok(digest)
}

/// Recompute the digest of `secret` with the record's own parameters and salt
/// and compare in constant time.
///
/// Returns `Ok(false)` on mismatch; `Err` only when the record is unusable.
pub fn verify_secret(secret: &[u8], record: &str) -> Result<bool, HashError> {
    let decoded = decode_hash(record)?;
    let candidate = hash_with_salt(secret, &decoded.params, &decoded.salt)?;
    Ok(candidate.ct_eq(&decoded.digest).into())
}

/// Whether a record was produced with parameters other than `current`.
pub fn needs_rehash(record: &str, current: &HashParams) -> Result<bool, HashError> {
    let decoded = decode_hash(record)?;
    Ok(decoded.params != *current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> HashParams {
        HashParams::new(1024, 1, 1)
    }

    #[test]
    fn test_record_is_self_describing() {
        let record = encode_hash(b"secret", &cheap()).unwrap();
        assert!(record.starts_with("$argon2id$v=19$m=1024,t=1,p=1$"));
    }

    #[test]
    fn test_decode_recovers_embedded_params_and_digest() {
        let params = HashParams::new(2048, 2, 2);
        let record = encode_hash(b"correct horse", &params).unwrap();
        let decoded = decode_hash(&record).unwrap();

        assert_eq!(decoded.params, params);
        assert_eq!(decoded.salt.len(), 16);
        assert_eq!(decoded.digest.len(), DEFAULT_OUTPUT_LEN);

        let recomputed = hash_with_salt(b"correct horse", &decoded.params, &decoded.salt).unwrap();
        assert_eq!(recomputed, decoded.digest);
    }

    #[test]
    fn test_hash_with_salt_is_deterministic() {
        let salt = [7u8; 16];
        let a = hash_with_salt(b"pw", &cheap(), &salt).unwrap();
        let b = hash_with_salt(b"pw", &cheap(), &salt).unwrap();
        assert_eq!(a, b);

        let other_salt = hash_with_salt(b"pw", &cheap(), &[8u8; 16]).unwrap();
        assert_ne!(a, other_salt);
    }

    #[test]
    fn test_same_secret_gets_fresh_salt() {
        let a = encode_hash(b"pw", &cheap()).unwrap();
        let b = encode_hash(b"pw", &cheap()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_secret() {
        let record = encode_hash(b"right", &cheap()).unwrap();
        assert!(verify_secret(b"right", &record).unwrap());
        assert!(!verify_secret(b"wrong", &record).unwrap());
    }

    #[test]
    fn test_old_params_remain_verifiable() {
        let record = encode_hash(b"legacy", &cheap()).unwrap();
        let stronger = HashParams::new(4096, 3, 1);

        assert!(verify_secret(b"legacy", &record).unwrap());
        assert!(needs_rehash(&record, &stronger).unwrap());
        assert!(!needs_rehash(&record, &cheap()).unwrap());
    }

    #[test]
    fn test_malformed_records_rejected() {
        let cases = vec![
            "",
            "not-a-hash",
            "$argon2id$v=19$m=1024,t=1,p=1",
            "$argon2id$v=19$t=1,p=1$c29tZXNhbHQ$aGFzaA",
            "$argon2i$v=19$m=1024,t=1,p=1$c29tZXNhbHRzb21lc2FsdA$YWJjZGVmZ2hpamtsbW5vcHFyc3R1dnd4eXoxMjM0NTY",
            "$argon2id$v=16$m=1024,t=1,p=1$c29tZXNhbHRzb21lc2FsdA$YWJjZGVmZ2hpamtsbW5vcHFyc3R1dnd4eXoxMjM0NTY",
            "$2b$12$abcdefghijklmnopqrstuv",
        ];
        for case in cases {
            assert!(
                matches!(decode_hash(case), Err(HashError::MalformedHashRecord(_))),
                "expected malformed: {:?}",
                case
            );
        }
    }

    #[test]
    fn test_invalid_params_rejected_on_encode() {
        let result = encode_hash(b"pw", &HashParams::new(1, 1, 1));
        assert!(matches!(result, Err(HashError::InvalidParams(_))));
    }
}
