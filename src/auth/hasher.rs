/// Bounded hashing
///
/// Argon2 is deliberately expensive in CPU and memory. Request-path hashing
/// runs on the blocking pool, and a semaphore caps how many computations are
/// in flight at once.

use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::auth::hashing::{encode_hash, verify_secret, HashError, HashParams};
use crate::auth::password::verify_password;

#[derive(Clone)]
pub struct Hasher {
    params: HashParams,
    permits: Arc<Semaphore>,
    decoy_record: Arc<str>,
}

impl Hasher {
    /// `params` are the defaults for new records; `max_concurrent` is clamped to at least 1.
    pub fn new(params: HashParams, max_concurrent: usize) -> Result<Self, HashError> {
        // Verified against when there is nothing real to compare with, so
        // those rejections cost the same as a digest mismatch.
        let decoy_record = encode_hash(b"decoy", &params)?;

        Ok(Self {
            params,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            decoy_record: Arc::from(decoy_record),
        })
    }

    pub fn params(&self) -> &HashParams {
        &self.params
    }

    /// Hash under the current default parameters
    pub async fn encode(&self, secret: String) -> Result<String, HashError> {
        let params = self.params;
        self.run(move || encode_hash(secret.as_bytes(), &params)).await
    }

    /// Constant-time verification against a stored record
    pub async fn verify(&self, secret: String, record: String) -> Result<bool, HashError> {
        self.run(move || verify_secret(secret.as_bytes(), &record)).await
    }

    /// Password check for login; a wrong password is `Ok(false)`
    pub async fn verify_password(&self, password: String, record: String) -> Result<bool, HashError> {
        self.run(move || verify_password(&password, &record)).await
    }

    /// Burn one verification's worth of work; always reports a mismatch
    pub async fn verify_decoy(&self, secret: String) {
        let record = self.decoy_record.to_string();
        if let Err(e) = self.verify(secret, record).await {
            tracing::error!(error = %e, "Decoy verification failed");
        }
    }

    async fn run<T, F>(&self, job: F) -> Result<T, HashError>
    where
        F: FnOnce() -> Result<T, HashError> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| HashError::Hashing(e.to_string()))?;

        // The job owns the permit: a cancelled caller does not free the slot
        // while the computation is still running on the blocking pool.
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await
        .map_err(|e| HashError::Hashing(format!("hashing task failed: {}", e)))?
    }
}
