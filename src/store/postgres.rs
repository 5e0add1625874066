use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{CredentialSlot, CredentialStore, PrincipalRecord, SwapOutcome};
use crate::error::StoreError;
use crate::principal::{PrincipalId, Role};

/// PostgreSQL-backed credential store over the `users` table
///
/// The refresh slot is two nullable columns on the user row. The
/// compare-and-swap is a single conditional `UPDATE`, so it is atomic at the
/// row level without an explicit transaction.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn principal_exists(&self, principal_id: PrincipalId) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(principal_id.as_i64())
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }
}

fn parse_role(raw: &str) -> Result<Role, StoreError> {
    raw.parse::<Role>().map_err(StoreError::Corrupt)
}

fn parse_id(raw: i64) -> Result<PrincipalId, StoreError> {
    PrincipalId::new(raw).ok_or_else(|| StoreError::Corrupt(format!("invalid user id {}", raw)))
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn get_credential_slot(
        &self,
        principal_id: PrincipalId,
    ) -> Result<Option<CredentialSlot>, StoreError> {
        let row = sqlx::query_as::<_, (Option<String>, Option<DateTime<Utc>>)>(
            r#"
            SELECT refresh_token_hash, refresh_token_expires_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(principal_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((Some(hash_record), Some(expires_at))) => Ok(Some(CredentialSlot {
                hash_record,
                expires_at,
            })),
            Some((None, None)) | None => Ok(None),
            Some(_) => Err(StoreError::Corrupt(format!(
                "half-populated refresh slot for user {}",
                principal_id
            ))),
        }
    }

    async fn compare_and_swap_credential_slot(
        &self,
        principal_id: PrincipalId,
        expected_hash_record: &str,
        new_slot: CredentialSlot,
    ) -> Result<SwapOutcome, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET refresh_token_hash = $1, refresh_token_expires_at = $2, updated_at = $3
            WHERE id = $4 AND refresh_token_hash = $5
            "#,
        )
        .bind(&new_slot.hash_record)
        .bind(new_slot.expires_at)
        .bind(Utc::now())
        .bind(principal_id.as_i64())
        .bind(expected_hash_record)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(SwapOutcome::Swapped);
        }

        if self.principal_exists(principal_id).await? {
            Ok(SwapOutcome::Conflict)
        } else {
            Ok(SwapOutcome::NotFound)
        }
    }

    async fn replace_credential_slot(
        &self,
        principal_id: PrincipalId,
        new_slot: CredentialSlot,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET refresh_token_hash = $1, refresh_token_expires_at = $2, updated_at = $3
            WHERE id = $4
            "#,
        )
        .bind(&new_slot.hash_record)
        .bind(new_slot.expires_at)
        .bind(Utc::now())
        .bind(principal_id.as_i64())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_role(&self, principal_id: PrincipalId) -> Result<Option<Role>, StoreError> {
        let role = sqlx::query_scalar::<_, String>("SELECT role FROM users WHERE id = $1")
            .bind(principal_id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        role.as_deref().map(parse_role).transpose()
    }

    async fn find_principal_by_email(
        &self,
        email: &str,
    ) -> Result<Option<PrincipalRecord>, StoreError> {
        let row = sqlx::query_as::<_, (i64, String, String, String)>(
            "SELECT id, email, password_hash, role FROM users WHERE lower(email) = lower($1)",
        )
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((id, email, password_hash, role)) => Ok(Some(PrincipalRecord {
                id: parse_id(id)?,
                email,
                password_hash,
                role: parse_role(&role)?,
            })),
            None => Ok(None),
        }
    }

    async fn update_password_hash(
        &self,
        principal_id: PrincipalId,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET password_hash = $1, updated_at = $2 WHERE id = $3")
            .bind(password_hash)
            .bind(Utc::now())
            .bind(principal_id.as_i64())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
