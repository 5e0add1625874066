/// Session Service
///
/// Password login and the rotate-on-refresh protocol.
///
/// A refresh walks `Presented -> Parsed -> Looked Up -> Verified -> Rotated ->
/// Issued`. Any step may end in a rejection, and every rejection is narrowed
/// to `InvalidRefreshToken` or `InternalError` before it leaves this module.
/// The rotation write is a compare-and-swap against the hash record that was
/// just verified, so a credential can be redeemed at most once.

use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::auth::hasher::Hasher;
use crate::auth::hashing::{needs_rehash, HashError};
use crate::auth::jwt::generate_access_token;
use crate::auth::refresh_token::{extract_principal_id, generate_refresh_token};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError, ErrorContext, RefreshError, RefreshRejection};
use crate::principal::{PrincipalId, Role};
use crate::store::{CredentialSlot, CredentialStore, PrincipalRecord, SwapOutcome};
use crate::validators::is_valid_email;

/// Attempts at the rotation write before giving up with `RotationConflict`
const MAX_ROTATION_ATTEMPTS: usize = 3;

/// Tokens handed back on login and refresh
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl TokenPair {
    fn bearer(access_token: String, refresh_token: String, expires_in: i64) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in,
        }
    }
}

#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn CredentialStore>,
    hasher: Hasher,
    jwt: JwtSettings,
}

impl SessionService {
    pub fn new(store: Arc<dyn CredentialStore>, hasher: Hasher, jwt: JwtSettings) -> Self {
        Self { store, hasher, jwt }
    }

    pub fn jwt_settings(&self) -> &JwtSettings {
        &self.jwt
    }

    /// Authenticate with email and password and start a new session
    ///
    /// Starting a session overwrites the principal's refresh slot, so any
    /// previously issued refresh credential stops working.
    ///
    /// # Errors
    /// - `Validation` for a malformed email
    /// - `Auth(InvalidCredentials)` for an unknown email or wrong password
    /// - `Store` / `Internal` for infrastructure failures
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        context: &ErrorContext,
    ) -> Result<TokenPair, AppError> {
        let email = is_valid_email(email)?;

        let principal = match self.store.find_principal_by_email(&email).await? {
            Some(principal) => principal,
            None => {
                self.hasher.verify_decoy(password.to_string()).await;
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        let password_valid = self
            .hasher
            .verify_password(password.to_string(), principal.password_hash.clone())
            .await
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))?;
        if !password_valid {
            return Err(AuthError::InvalidCredentials.into());
        }

        let context = context.clone().with_principal_id(principal.id);
        self.rehash_password_if_stale(&principal, password, &context).await;

        let credential = generate_refresh_token(principal.id);
        let hash_record = self
            .hasher
            .encode(credential.as_str().to_string())
            .await
            .map_err(|e| AppError::Internal(format!("Refresh token hashing failed: {}", e)))?;

        let slot = CredentialSlot {
            hash_record,
            expires_at: Utc::now() + Duration::seconds(self.jwt.refresh_token_expiry),
        };
        if !self.store.replace_credential_slot(principal.id, slot).await? {
            // Principal deleted between lookup and write
            return Err(AuthError::InvalidCredentials.into());
        }

        let access_token = generate_access_token(principal.id, principal.role, &self.jwt)
            .map_err(AppError::Internal)?;

        tracing::info!(
            request_id = %context.request_id,
            principal_id = %principal.id,
            "Principal logged in successfully"
        );

        Ok(TokenPair::bearer(
            access_token,
            credential.into_string(),
            self.jwt.access_token_expiry,
        ))
    }

    /// Redeem a refresh credential for a new access token and a rotated
    /// refresh credential
    pub async fn refresh(
        &self,
        presented: Option<&str>,
        context: &ErrorContext,
    ) -> Result<TokenPair, RefreshRejection> {
        match self.rotate(presented).await {
            Ok((principal_id, tokens)) => {
                tracing::info!(
                    request_id = %context.request_id,
                    principal_id = %principal_id,
                    "Token refreshed successfully"
                );
                Ok(tokens)
            }
            Err(e) => {
                e.log(&context.request_id);
                Err(e.rejection())
            }
        }
    }

    async fn rotate(
        &self,
        presented: Option<&str>,
    ) -> Result<(PrincipalId, TokenPair), RefreshError> {
        // Presented
        let presented = presented
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(RefreshError::MissingCredential)?;

        // Parsed
        let principal_id = match extract_principal_id(presented) {
            Ok(id) => id,
            Err(_) => {
                self.hasher.verify_decoy(presented.to_string()).await;
                return Err(RefreshError::MalformedCredential);
            }
        };

        let mut attempt = 0;
        loop {
            attempt += 1;

            // Looked Up + Verified
            let verified = self.verify_presented(principal_id, presented).await?;

            // Rotated
            let credential = generate_refresh_token(principal_id);
            let hash_record = self
                .hasher
                .encode(credential.as_str().to_string())
                .await
                .map_err(|e| RefreshError::HashingFailure(e.to_string()))?;
            let new_slot = CredentialSlot {
                hash_record,
                expires_at: Utc::now() + Duration::seconds(self.jwt.refresh_token_expiry),
            };

            match self
                .store
                .compare_and_swap_credential_slot(principal_id, &verified.hash_record, new_slot)
                .await?
            {
                SwapOutcome::Swapped => {
                    // Issued, with the role as it is now
                    let role = self.current_role(principal_id).await?;
                    let access_token = generate_access_token(principal_id, role, &self.jwt)
                        .map_err(RefreshError::SigningFailure)?;

                    return Ok((
                        principal_id,
                        TokenPair::bearer(
                            access_token,
                            credential.into_string(),
                            self.jwt.access_token_expiry,
                        ),
                    ));
                }
                SwapOutcome::NotFound => return Err(RefreshError::NoSuchPrincipal(principal_id)),
                SwapOutcome::Conflict if attempt >= MAX_ROTATION_ATTEMPTS => {
                    return Err(RefreshError::RotationConflict(principal_id));
                }
                SwapOutcome::Conflict => {
                    // Re-verify against whatever the slot holds now. If a
                    // concurrent refresh already rotated it, this fails as a
                    // digest mismatch.
                    tracing::debug!(
                        principal_id = %principal_id,
                        attempt = attempt,
                        "Refresh slot changed during rotation, re-verifying"
                    );
                }
            }
        }
    }

    /// Steps 3 to 6: look up the slot, recompute and compare the digest, check expiry
    async fn verify_presented(
        &self,
        principal_id: PrincipalId,
        presented: &str,
    ) -> Result<CredentialSlot, RefreshError> {
        let slot = match self.store.get_credential_slot(principal_id).await? {
            Some(slot) => slot,
            None => {
                self.hasher.verify_decoy(presented.to_string()).await;
                return Err(RefreshError::NoSuchPrincipal(principal_id));
            }
        };

        let matches = self
            .hasher
            .verify(presented.to_string(), slot.hash_record.clone())
            .await
            .map_err(|e| match e {
                HashError::Hashing(msg) => RefreshError::HashingFailure(msg),
                other => RefreshError::HashRecordCorrupt(other.to_string()),
            })?;
        if !matches {
            return Err(RefreshError::DigestMismatch(principal_id));
        }

        if slot.is_expired_at(Utc::now()) {
            return Err(RefreshError::CredentialExpired(principal_id));
        }

        Ok(slot)
    }

    async fn current_role(&self, principal_id: PrincipalId) -> Result<Role, RefreshError> {
        self.store
            .get_role(principal_id)
            .await?
            .ok_or(RefreshError::NoSuchPrincipal(principal_id))
    }

    async fn rehash_password_if_stale(
        &self,
        principal: &PrincipalRecord,
        password: &str,
        context: &ErrorContext,
    ) {
        match needs_rehash(&principal.password_hash, self.hasher.params()) {
            Ok(false) => return,
            Ok(true) => {}
            Err(e) => {
                tracing::warn!(principal_id = %principal.id, error = %e, "Cannot inspect password hash");
                return;
            }
        }

        let upgraded = match self.hasher.encode(password.to_string()).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(principal_id = %principal.id, error = %e, "Password re-hash failed");
                return;
            }
        };

        match self.store.update_password_hash(principal.id, &upgraded).await {
            Ok(()) => tracing::info!(
                request_id = %context.request_id,
                principal_id = %principal.id,
                "Password hash upgraded to current parameters"
            ),
            // Not fatal: the old record still verifies
            Err(e) => context.log_error(&AppError::Store(e)),
        }
    }
}
