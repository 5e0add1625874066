use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;
use tokenkeeper::auth::{Hasher, SessionService};
use tokenkeeper::configuration::get_configuration;
use tokenkeeper::startup::run;
use tokenkeeper::store::PgCredentialStore;
use tokenkeeper::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // 구조화된 로깅 초기화
    init_telemetry();

    tracing::info!("Starting application");

    // 설정 로드 및 검증
    let configuration = get_configuration().map_err(|e| {
        tracing::error!("Failed to read configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;
    configuration.validate().map_err(|e| {
        tracing::error!("Invalid configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;
    tracing::info!("Configuration loaded successfully");

    // 데이터베이스 연결 풀 생성
    let pool = PgPoolOptions::new()
        .max_connections(configuration.database.max_connections)
        .connect(&configuration.database.connection_string())
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "Database connection error",
            )
        })?;

    sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
        tracing::error!("Failed to run migrations: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, "Migration error")
    })?;
    tracing::info!("Database ready");

    // 해시 파라미터 및 동시 해시 계산 상한
    let hasher = Hasher::new(
        configuration.hashing.params(),
        configuration.hashing.max_concurrent,
    )
    .map_err(|e| {
        tracing::error!("Invalid hashing parameters: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;

    let store = Arc::new(PgCredentialStore::new(pool));
    let sessions = SessionService::new(store, hasher, configuration.jwt.clone());

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    run(listener, sessions)?.await
}
