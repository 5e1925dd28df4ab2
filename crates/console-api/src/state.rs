//! 애플리케이션 공유 상태.

use std::sync::Arc;

use console_core::config::Settings;
use console_exchange::ExchangeClient;

use crate::websocket::SharedBroadcaster;

/// 전체 핸들러가 공유하는 애플리케이션 상태.
///
/// `ExchangeClient`는 프로세스당 하나입니다 — 다운스트림 의존성 하나에
/// circuit breaker 하나를 공유하므로, 티커 조회 실패가 주문 경로의
/// breaker도 엽니다 (의도된 동작).
#[derive(Clone)]
pub struct AppState {
    /// 앱 설정
    pub settings: Settings,
    /// 공유 거래소 클라이언트
    pub exchange: Arc<ExchangeClient>,
    /// WebSocket 브로드캐스터
    pub broadcaster: SharedBroadcaster,
    /// 서버 버전
    pub version: String,
    /// 서버 시작 시각
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    /// 새로운 애플리케이션 상태 생성.
    pub fn new(
        settings: Settings,
        exchange: Arc<ExchangeClient>,
        broadcaster: SharedBroadcaster,
    ) -> Self {
        Self {
            settings,
            exchange,
            broadcaster,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: chrono::Utc::now(),
        }
    }

    /// 서버 업타임(초).
    pub fn uptime_secs(&self) -> i64 {
        (chrono::Utc::now() - self.started_at).num_seconds()
    }
}

#[cfg(test)]
pub fn create_test_state() -> AppState {
    use console_exchange::ExchangeConfig;

    use crate::websocket::Broadcaster;

    let exchange = ExchangeClient::new(ExchangeConfig::new("http://127.0.0.1:9"))
        .expect("test client");
    AppState::new(
        Settings::default(),
        Arc::new(exchange),
        Broadcaster::shared(),
    )
}
