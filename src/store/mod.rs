/// Credential Store
///
/// Persistence boundary consumed by the session service. Each principal owns
/// exactly one refresh-credential slot; the only way to change a populated
/// slot during refresh is `compare_and_swap_credential_slot`.

mod memory;
mod postgres;

pub use memory::InMemoryCredentialStore;
pub use postgres::PgCredentialStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::principal::{PrincipalId, Role};

/// Hashed refresh credential and its expiry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialSlot {
    pub hash_record: String,
    pub expires_at: DateTime<Utc>,
}

impl CredentialSlot {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Login-time view of a principal
#[derive(Debug, Clone)]
pub struct PrincipalRecord {
    pub id: PrincipalId,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// Outcome of a conditional slot write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapOutcome {
    Swapped,
    /// The slot no longer holds the expected hash record
    Conflict,
    NotFound,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// `None` when the principal does not exist or its slot was never populated
    async fn get_credential_slot(
        &self,
        principal_id: PrincipalId,
    ) -> Result<Option<CredentialSlot>, StoreError>;

    /// Replace the slot only if it still holds `expected_hash_record`
    async fn compare_and_swap_credential_slot(
        &self,
        principal_id: PrincipalId,
        expected_hash_record: &str,
        new_slot: CredentialSlot,
    ) -> Result<SwapOutcome, StoreError>;

    /// Unconditionally overwrite the slot (login). Returns false if the principal does not exist.
    async fn replace_credential_slot(
        &self,
        principal_id: PrincipalId,
        new_slot: CredentialSlot,
    ) -> Result<bool, StoreError>;

    async fn get_role(&self, principal_id: PrincipalId) -> Result<Option<Role>, StoreError>;

    async fn find_principal_by_email(
        &self,
        email: &str,
    ) -> Result<Option<PrincipalRecord>, StoreError>;

    async fn update_password_hash(
        &self,
        principal_id: PrincipalId,
        password_hash: &str,
    ) -> Result<(), StoreError>;
}
