#![allow(dead_code)]

use std::net::TcpListener;
use std::sync::Arc;
use tokenkeeper::auth::{hash_password, HashParams, Hasher, SessionService};
use tokenkeeper::configuration::JwtSettings;
use tokenkeeper::principal::{PrincipalId, Role};
use tokenkeeper::startup::run;
use tokenkeeper::store::InMemoryCredentialStore;

pub const EMAIL: &str = "chef@example.com";
pub const PASSWORD: &str = "SecurePass123";

/// Argon2 parameters cheap enough for tests
pub fn cheap_params() -> HashParams {
    HashParams::new(1024, 1, 1)
}

pub fn jwt_settings() -> JwtSettings {
    JwtSettings {
        secret: "integration-test-secret-key-at-least-32-chars".to_string(),
        access_token_expiry: 1800,
        refresh_token_expiry: 3600,
        issuer: "tokenkeeper-test".to_string(),
    }
}

pub fn seeded_store(role: Role) -> (Arc<InMemoryCredentialStore>, PrincipalId) {
    let store = Arc::new(InMemoryCredentialStore::new());
    let record = hash_password(PASSWORD, &cheap_params()).expect("Failed to hash password");
    let id = store.insert_principal(EMAIL, record, role);
    (store, id)
}

pub fn session_service(store: Arc<InMemoryCredentialStore>) -> SessionService {
    let hasher = Hasher::new(cheap_params(), 4).expect("Failed to build hasher");
    SessionService::new(store, hasher, jwt_settings())
}

pub struct TestApp {
    pub address: String,
    pub store: Arc<InMemoryCredentialStore>,
    pub principal_id: PrincipalId,
}

pub fn spawn_app() -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let (store, principal_id) = seeded_store(Role::User);
    let server = run(listener, session_service(store.clone())).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        store,
        principal_id,
    }
}
