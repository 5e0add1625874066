use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use super::{CredentialSlot, CredentialStore, PrincipalRecord, SwapOutcome};
use crate::error::StoreError;
use crate::principal::{PrincipalId, Role};

#[derive(Debug, Clone)]
struct PrincipalRow {
    email: String,
    password_hash: String,
    role: Role,
    slot: Option<CredentialSlot>,
}

/// Principal table held in memory
///
/// Rows are keyed by principal id. A write takes the shard lock for that key,
/// so the compare and the swap happen under one lock.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    rows: DashMap<PrincipalId, PrincipalRow>,
    emails: DashMap<String, PrincipalId>,
    next_id: AtomicI64,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a principal and return its id. Emails are matched case-insensitively.
    pub fn insert_principal(&self, email: &str, password_hash: String, role: Role) -> PrincipalId {
        let raw = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        // Counter starts at zero, so ids are always positive
        let id = PrincipalId::new(raw).unwrap_or_else(|| unreachable!("ids start at 1"));
        let email = email.trim().to_lowercase();

        self.rows.insert(
            id,
            PrincipalRow {
                email: email.clone(),
                password_hash,
                role,
                slot: None,
            },
        );
        self.emails.insert(email, id);
        id
    }

    pub fn set_role(&self, principal_id: PrincipalId, role: Role) -> bool {
        match self.rows.get_mut(&principal_id) {
            Some(mut row) => {
                row.role = role;
                true
            }
            None => false,
        }
    }

    /// Move the expiry of a populated slot; false if there is no slot
    pub fn set_slot_expiry(&self, principal_id: PrincipalId, expires_at: DateTime<Utc>) -> bool {
        match self.rows.get_mut(&principal_id) {
            Some(mut row) => match row.slot.as_mut() {
                Some(slot) => {
                    slot.expires_at = expires_at;
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    pub fn password_hash(&self, principal_id: PrincipalId) -> Option<String> {
        self.rows.get(&principal_id).map(|row| row.password_hash.clone())
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get_credential_slot(
        &self,
        principal_id: PrincipalId,
    ) -> Result<Option<CredentialSlot>, StoreError> {
        Ok(self.rows.get(&principal_id).and_then(|row| row.slot.clone()))
    }

    async fn compare_and_swap_credential_slot(
        &self,
        principal_id: PrincipalId,
        expected_hash_record: &str,
        new_slot: CredentialSlot,
    ) -> Result<SwapOutcome, StoreError> {
        let mut row = match self.rows.get_mut(&principal_id) {
            Some(row) => row,
            None => return Ok(SwapOutcome::NotFound),
        };

        let holds_expected = row
            .slot
            .as_ref()
            .map(|slot| slot.hash_record == expected_hash_record)
            .unwrap_or(false);

        if !holds_expected {
            return Ok(SwapOutcome::Conflict);
        }

        row.slot = Some(new_slot);
        Ok(SwapOutcome::Swapped)
    }

    async fn replace_credential_slot(
        &self,
        principal_id: PrincipalId,
        new_slot: CredentialSlot,
    ) -> Result<bool, StoreError> {
        match self.rows.get_mut(&principal_id) {
            Some(mut row) => {
                row.slot = Some(new_slot);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_role(&self, principal_id: PrincipalId) -> Result<Option<Role>, StoreError> {
        Ok(self.rows.get(&principal_id).map(|row| row.role))
    }

    async fn find_principal_by_email(
        &self,
        email: &str,
    ) -> Result<Option<PrincipalRecord>, StoreError> {
        let key = email.trim().to_lowercase();
        // Copy the id out before touching `rows` so no two shard guards are held
        let id = match self.emails.get(&key) {
            Some(entry) => *entry.value(),
            None => return Ok(None),
        };

        Ok(self.rows.get(&id).map(|row| PrincipalRecord {
            id,
            email: row.email.clone(),
            password_hash: row.password_hash.clone(),
            role: row.role,
        }))
    }

    async fn update_password_hash(
        &self,
        principal_id: PrincipalId,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        match self.rows.get_mut(&principal_id) {
            Some(mut row) => {
                row.password_hash = password_hash.to_string();
                Ok(())
            }
            None => Err(StoreError::Unexpected(format!(
                "principal {} disappeared during password update",
                principal_id
            ))),
        }
    }
}
