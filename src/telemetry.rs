use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// 구조화된 로깅을 초기화합니다.
/// JSON 형식의 로그를 출력하며, RUST_LOG 환경 변수로 로그 레벨을 제어합니다.
pub fn init_telemetry() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let formatting_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .json();

    // 이미 전역 subscriber가 설정된 경우(테스트 등)에는 무시합니다.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(formatting_layer)
        .try_init();
}
