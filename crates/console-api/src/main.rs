//! 대시보드 백엔드 API 서버.
//!
//! REST 라우트, WebSocket 스트리밍, Prometheus 메트릭을 하나의 axum
//! 서버로 묶어 시작합니다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{http::StatusCode, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use console_api::metrics::setup_metrics_recorder;
use console_api::routes::create_api_router;
use console_api::state::AppState;
use console_api::websocket::{websocket_router, Broadcaster, WsState};
use console_core::config::Settings;
use console_core::logging::init_logging_from_env;
use console_exchange::{ExchangeClient, ExchangeConfig};

/// CORS 미들웨어 구성.
///
/// `CORS_ORIGINS` 환경변수(쉼표 구분)가 있으면 해당 origin만 허용하고,
/// 없으면 개발 모드로 간주해 모든 origin을 허용합니다.
fn cors_layer() -> CorsLayer {
    let allow_origin = match std::env::var("CORS_ORIGINS") {
        Ok(origins) if !origins.is_empty() => {
            let origins: Vec<_> = origins
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();

            if origins.is_empty() {
                warn!("CORS_ORIGINS is set but contains no valid origins, allowing any");
                AllowOrigin::any()
            } else {
                info!("CORS configured with {} allowed origins", origins.len());
                AllowOrigin::list(origins)
            }
        }
        _ => {
            warn!("CORS_ORIGINS not set, allowing any origin (development mode)");
            AllowOrigin::any()
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
}

/// /metrics 엔드포인트 핸들러.
async fn metrics_handler(
    axum::extract::State(handle): axum::extract::State<PrometheusHandle>,
) -> String {
    handle.render()
}

/// 전체 라우터 생성.
fn create_router(
    state: AppState,
    metrics_handle: PrometheusHandle,
    ws_state: WsState,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics_handle);

    Router::new()
        .merge(metrics_router)
        .merge(create_api_router().with_state(state))
        .merge(websocket_router(ws_state))
        .layer(TraceLayer::new_for_http())
        // WebSocket 업그레이드는 장수 연결이므로 전역 타임아웃에서 제외할 수
        // 없다 - axum이 업그레이드 응답을 즉시 반환하므로 문제가 없다
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(cors_layer())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 파일 로드 (있는 경우)
    let _ = dotenvy::dotenv();

    init_logging_from_env().map_err(|e| anyhow::anyhow!("failed to init logging: {e}"))?;
    info!("Starting arb-console API server...");

    let metrics_handle = setup_metrics_recorder()?;
    info!("Prometheus metrics recorder initialized");

    let settings = Settings::from_env();
    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid API_HOST/API_PORT: {e}"))?;

    // 프로세스당 하나의 거래소 클라이언트 (breaker 공유)
    let exchange = Arc::new(ExchangeClient::new(ExchangeConfig::from_env())?);

    let broadcaster = Broadcaster::shared();
    let shutdown_token = CancellationToken::new();

    let ws_state = WsState::new(
        broadcaster.clone(),
        settings.live.clone(),
        shutdown_token.clone(),
    );
    let state = AppState::new(settings, exchange, broadcaster.clone());

    info!(
        version = %state.version,
        data_dir = %state.settings.live.data_dir.display(),
        "Application state initialized"
    );

    let app = create_router(state, metrics_handle, ws_state);

    info!(%addr, "API server listening");
    info!("Metrics available at http://{}/metrics", addr);
    info!("WebSocket available at ws://{}/api/ws", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_token.clone()))
        .await?;

    info!("Server shutdown initiated, cleaning up...");

    // 세션 태스크에 종료 전파 (세션은 1001 close를 시도한다)
    shutdown_token.cancel();

    // 정리 작업에 최대 10초 대기
    let cleanup = tokio::time::timeout(Duration::from_secs(10), async {
        while broadcaster.client_count().await > 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        info!("All WebSocket sessions closed");
    })
    .await;

    if cleanup.is_err() {
        warn!("Cleanup timeout, forcing shutdown");
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Graceful shutdown 시그널 대기.
///
/// Ctrl+C 또는 SIGTERM을 수신하면 종료 토큰을 취소합니다.
async fn shutdown_signal(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }

    shutdown_token.cancel();
    info!("Shutdown signal propagated to sessions");
}
