//! Service-level tests for the refresh rotation protocol

mod common;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokenkeeper::auth::{
    decode_hash, encode_hash, generate_refresh_token, hash_with_salt, validate_access_token,
    HashParams, Hasher, SessionService,
};
use tokenkeeper::error::{ErrorContext, RefreshRejection, StoreError};
use tokenkeeper::principal::{PrincipalId, Role};
use tokenkeeper::store::{
    CredentialSlot, CredentialStore, InMemoryCredentialStore, PrincipalRecord, SwapOutcome,
};

use common::{cheap_params, jwt_settings, seeded_store, session_service, EMAIL, PASSWORD};

fn ctx() -> ErrorContext {
    ErrorContext::new("test")
}

// --- Hash codec properties ---

#[test]
fn decoded_record_reproduces_its_digest() {
    let param_sets = vec![
        HashParams::new(1024, 1, 1),
        HashParams::new(2048, 2, 2),
        HashParams::new(4096, 1, 4),
    ];

    for params in param_sets {
        for secret in ["", "short", "a considerably longer secret with spaces"] {
            let record = encode_hash(secret.as_bytes(), &params).unwrap();
            let decoded = decode_hash(&record).unwrap();

            assert_eq!(decoded.params, params);
            let recomputed = hash_with_salt(secret.as_bytes(), &decoded.params, &decoded.salt).unwrap();
            assert_eq!(recomputed, decoded.digest);
        }
    }
}

// --- Rotation ---

#[tokio::test]
async fn login_refresh_replay_scenario() {
    let (store, _) = seeded_store(Role::User);
    let service = session_service(store);

    let login = service.login(EMAIL, PASSWORD, &ctx()).await.unwrap();
    let refresh0 = login.refresh_token;

    let first = service.refresh(Some(&refresh0), &ctx()).await.unwrap();
    let refresh1 = first.refresh_token;
    assert_ne!(refresh1, refresh0);

    assert_eq!(
        service.refresh(Some(&refresh0), &ctx()).await.unwrap_err(),
        RefreshRejection::InvalidRefreshToken
    );
    assert!(service.refresh(Some(&refresh1), &ctx()).await.is_ok());
}

#[tokio::test]
async fn expired_credential_is_rejected_even_when_digest_matches() {
    let (store, id) = seeded_store(Role::User);
    let service = session_service(store.clone());

    let login = service.login(EMAIL, PASSWORD, &ctx()).await.unwrap();
    assert!(store.set_slot_expiry(id, Utc::now() - Duration::seconds(1)));

    assert_eq!(
        service.refresh(Some(&login.refresh_token), &ctx()).await.unwrap_err(),
        RefreshRejection::InvalidRefreshToken
    );
}

#[tokio::test]
async fn tampered_secret_is_rejected() {
    let (store, _) = seeded_store(Role::User);
    let service = session_service(store);

    let login = service.login(EMAIL, PASSWORD, &ctx()).await.unwrap();
    let token = login.refresh_token;
    let secret_start = token.find('.').unwrap() + 1;

    for offset in [0, 17, 63] {
        let mut bytes = token.clone().into_bytes();
        bytes[secret_start + offset] ^= 0x01;
        let tampered = String::from_utf8_lossy(&bytes).into_owned();

        assert_eq!(
            service.refresh(Some(&tampered), &ctx()).await.unwrap_err(),
            RefreshRejection::InvalidRefreshToken,
            "bit flip at offset {}",
            offset
        );
    }

    // Untouched credential still works afterwards
    assert!(service.refresh(Some(&token), &ctx()).await.is_ok());
}

#[tokio::test]
async fn forged_principal_id_cannot_redeem_another_session() {
    let store = Arc::new(InMemoryCredentialStore::new());
    let record = encode_hash(PASSWORD.as_bytes(), &cheap_params()).unwrap();
    let victim = store.insert_principal("victim@example.com", record.clone(), Role::Admin);
    store.insert_principal("attacker@example.com", record, Role::User);
    let service = session_service(store);

    service.login("victim@example.com", PASSWORD, &ctx()).await.unwrap();
    let attacker = service.login("attacker@example.com", PASSWORD, &ctx()).await.unwrap();

    let (_, secret) = attacker.refresh_token.split_once('.').unwrap();
    let forged = format!("{}.{}", victim, secret);

    assert_eq!(
        service.refresh(Some(&forged), &ctx()).await.unwrap_err(),
        RefreshRejection::InvalidRefreshToken
    );
}

#[tokio::test]
async fn unknown_principal_and_malformed_credential_look_the_same() {
    let (store, _) = seeded_store(Role::User);
    let service = session_service(store);

    let unknown = generate_refresh_token(PrincipalId::new(424242).unwrap());
    let a = service.refresh(Some(unknown.as_str()), &ctx()).await.unwrap_err();
    let b = service.refresh(Some("definitely not a token"), &ctx()).await.unwrap_err();
    let c = service.refresh(None, &ctx()).await.unwrap_err();

    assert_eq!(a, RefreshRejection::InvalidRefreshToken);
    assert_eq!(a, b);
    assert_eq!(b, c);
}

#[tokio::test]
async fn role_change_applies_on_next_rotation() {
    let (store, id) = seeded_store(Role::User);
    let service = session_service(store.clone());
    let jwt = jwt_settings();

    let login = service.login(EMAIL, PASSWORD, &ctx()).await.unwrap();
    assert_eq!(validate_access_token(&login.access_token, &jwt).unwrap(), (id, Role::User));

    let first = service.refresh(Some(&login.refresh_token), &ctx()).await.unwrap();
    assert_eq!(validate_access_token(&first.access_token, &jwt).unwrap().1, Role::User);

    store.set_role(id, Role::Admin);

    let second = service.refresh(Some(&first.refresh_token), &ctx()).await.unwrap();
    assert_eq!(validate_access_token(&second.access_token, &jwt).unwrap().1, Role::Admin);
}

// --- Concurrency ---

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_refreshes_yield_at_most_one_winner() {
    let (store, _) = seeded_store(Role::User);
    let service = session_service(store);

    let login = service.login(EMAIL, PASSWORD, &ctx()).await.unwrap();
    let token = login.refresh_token;

    let mut handles = Vec::new();
    for _ in 0..4 {
        let service = service.clone();
        let token = token.clone();
        handles.push(tokio::spawn(async move {
            service.refresh(Some(&token), &ErrorContext::new("race")).await
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(tokens) => winners.push(tokens),
            Err(rejection) => assert_eq!(rejection, RefreshRejection::InvalidRefreshToken),
        }
    }

    assert_eq!(winners.len(), 1, "exactly one concurrent refresh may win");
    // The winner's credential is the one the slot now holds
    let winner = winners.pop().unwrap();
    assert!(service.refresh(Some(&winner.refresh_token), &ctx()).await.is_ok());
}

/// Store that lets a competing refresh rotate the slot between a caller's
/// verification and its compare-and-swap.
struct RacingStore {
    inner: Arc<InMemoryCredentialStore>,
    rival: std::sync::Mutex<Option<CredentialSlot>>,
    fired: AtomicBool,
}

#[async_trait]
impl CredentialStore for RacingStore {
    async fn get_credential_slot(
        &self,
        principal_id: PrincipalId,
    ) -> Result<Option<CredentialSlot>, StoreError> {
        self.inner.get_credential_slot(principal_id).await
    }

    async fn compare_and_swap_credential_slot(
        &self,
        principal_id: PrincipalId,
        expected_hash_record: &str,
        new_slot: CredentialSlot,
    ) -> Result<SwapOutcome, StoreError> {
        if !self.fired.swap(true, Ordering::SeqCst) {
            let rival = self.rival.lock().unwrap().take();
            if let Some(rival) = rival {
                let outcome = self
                    .inner
                    .compare_and_swap_credential_slot(principal_id, expected_hash_record, rival)
                    .await?;
                assert_eq!(outcome, SwapOutcome::Swapped);
            }
        }
        self.inner
            .compare_and_swap_credential_slot(principal_id, expected_hash_record, new_slot)
            .await
    }

    async fn replace_credential_slot(
        &self,
        principal_id: PrincipalId,
        new_slot: CredentialSlot,
    ) -> Result<bool, StoreError> {
        self.inner.replace_credential_slot(principal_id, new_slot).await
    }

    async fn get_role(&self, principal_id: PrincipalId) -> Result<Option<Role>, StoreError> {
        self.inner.get_role(principal_id).await
    }

    async fn find_principal_by_email(
        &self,
        email: &str,
    ) -> Result<Option<PrincipalRecord>, StoreError> {
        self.inner.find_principal_by_email(email).await
    }

    async fn update_password_hash(
        &self,
        principal_id: PrincipalId,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        self.inner.update_password_hash(principal_id, password_hash).await
    }
}

#[tokio::test]
async fn losing_a_rotation_race_rejects_the_late_caller() {
    let (inner, id) = seeded_store(Role::User);
    let plain = session_service(inner.clone());
    let login = plain.login(EMAIL, PASSWORD, &ctx()).await.unwrap();

    let rival_token = generate_refresh_token(id);
    let rival_slot = CredentialSlot {
        hash_record: encode_hash(rival_token.as_str().as_bytes(), &cheap_params()).unwrap(),
        expires_at: Utc::now() + Duration::hours(1),
    };
    let racing = Arc::new(RacingStore {
        inner: inner.clone(),
        rival: std::sync::Mutex::new(Some(rival_slot)),
        fired: AtomicBool::new(false),
    });
    let service = SessionService::new(racing, Hasher::new(cheap_params(), 2).unwrap(), jwt_settings());

    assert_eq!(
        service.refresh(Some(&login.refresh_token), &ctx()).await.unwrap_err(),
        RefreshRejection::InvalidRefreshToken
    );
    // The rival's rotation stands
    assert!(service.refresh(Some(rival_token.as_str()), &ctx()).await.is_ok());
}

/// Store whose slot writes always report a conflict without changing anything
struct AlwaysConflicting(Arc<InMemoryCredentialStore>);

#[async_trait]
impl CredentialStore for AlwaysConflicting {
    async fn get_credential_slot(
        &self,
        principal_id: PrincipalId,
    ) -> Result<Option<CredentialSlot>, StoreError> {
        self.0.get_credential_slot(principal_id).await
    }

    async fn compare_and_swap_credential_slot(
        &self,
        _principal_id: PrincipalId,
        _expected_hash_record: &str,
        _new_slot: CredentialSlot,
    ) -> Result<SwapOutcome, StoreError> {
        Ok(SwapOutcome::Conflict)
    }

    async fn replace_credential_slot(
        &self,
        principal_id: PrincipalId,
        new_slot: CredentialSlot,
    ) -> Result<bool, StoreError> {
        self.0.replace_credential_slot(principal_id, new_slot).await
    }

    async fn get_role(&self, principal_id: PrincipalId) -> Result<Option<Role>, StoreError> {
        self.0.get_role(principal_id).await
    }

    async fn find_principal_by_email(
        &self,
        email: &str,
    ) -> Result<Option<PrincipalRecord>, StoreError> {
        self.0.find_principal_by_email(email).await
    }

    async fn update_password_hash(
        &self,
        principal_id: PrincipalId,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        self.0.update_password_hash(principal_id, password_hash).await
    }
}

#[tokio::test]
async fn persistent_write_conflict_surfaces_as_internal_error() {
    let (inner, _) = seeded_store(Role::User);
    let service = SessionService::new(
        Arc::new(AlwaysConflicting(inner)),
        Hasher::new(cheap_params(), 2).unwrap(),
        jwt_settings(),
    );

    let login = service.login(EMAIL, PASSWORD, &ctx()).await.unwrap();
    assert_eq!(
        service.refresh(Some(&login.refresh_token), &ctx()).await.unwrap_err(),
        RefreshRejection::InternalError
    );
}

// --- Infrastructure failures ---

/// Store that is unreachable
struct UnreachableStore;

#[async_trait]
impl CredentialStore for UnreachableStore {
    async fn get_credential_slot(
        &self,
        _principal_id: PrincipalId,
    ) -> Result<Option<CredentialSlot>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn compare_and_swap_credential_slot(
        &self,
        _principal_id: PrincipalId,
        _expected_hash_record: &str,
        _new_slot: CredentialSlot,
    ) -> Result<SwapOutcome, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn replace_credential_slot(
        &self,
        _principal_id: PrincipalId,
        _new_slot: CredentialSlot,
    ) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn get_role(&self, _principal_id: PrincipalId) -> Result<Option<Role>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn find_principal_by_email(
        &self,
        _email: &str,
    ) -> Result<Option<PrincipalRecord>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn update_password_hash(
        &self,
        _principal_id: PrincipalId,
        _password_hash: &str,
    ) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

#[tokio::test]
async fn unreachable_store_is_internal_error_not_invalid_token() {
    let service = SessionService::new(
        Arc::new(UnreachableStore),
        Hasher::new(cheap_params(), 2).unwrap(),
        jwt_settings(),
    );

    let credential = generate_refresh_token(PrincipalId::new(1).unwrap());
    assert_eq!(
        service.refresh(Some(credential.as_str()), &ctx()).await.unwrap_err(),
        RefreshRejection::InternalError
    );

    // Malformed input never reaches the store
    assert_eq!(
        service.refresh(Some("junk"), &ctx()).await.unwrap_err(),
        RefreshRejection::InvalidRefreshToken
    );
}
