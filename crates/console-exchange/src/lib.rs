//! 외부 거래소 호출 계층.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - Circuit breaker: 장애 전파를 차단하는 회로 차단기
//! - Retry/backoff: 지수 백오프 + 지터 재시도 정책
//! - ExchangeClient: 위 둘을 결합한 복원력 있는 HTTP 클라이언트
//! - 요청 카운터: operation/outcome별 관측용 카운터

pub mod circuit_breaker;
pub mod client;
pub mod error;
pub mod retry;

pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use client::{
    ExchangeClient, ExchangeConfig, OrderRequest, OrderType, RequestCounters, RequestOutcome, Side,
};
pub use error::ExchangeError;
pub use retry::RetryConfig;
