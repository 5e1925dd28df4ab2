//! API 라우트.
//!
//! # 라우트 구조
//!
//! - `GET /health` - 헬스 체크
//! - `GET /api/live/quotes` - 최근 호가 조회
//! - `GET /api/live/top-spread` - 베뉴 간 최고 스프레드
//! - `GET /api/live/status` - 수집기 상태 스냅샷
//! - `GET /api/market/ticker` - 거래소 티커 프록시
//! - `POST /api/orders` - 거래소 주문 프록시
//!
//! WebSocket(`/api/ws`)과 `/metrics`는 별도 상태를 쓰므로 main에서 merge합니다.

pub mod exchange;
pub mod health;
pub mod live;

pub use health::HealthResponse;

use axum::Router;

use crate::state::AppState;

/// 전체 REST API 라우터 생성.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .merge(health::health_router())
        .nest("/api/live", live::live_router())
        .nest("/api", exchange::exchange_router())
}
