//! 대시보드 백엔드 API 서버 라이브러리.
//!
//! - REST: 실시간 파일 조회, 거래소 프록시, 헬스/메트릭 엔드포인트
//! - WebSocket: 호가/상태 스트리밍 + ping/pong liveness 프로토콜

pub mod error;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod websocket;

pub use error::ApiError;
pub use state::AppState;
