//! Circuit Breaker pattern implementation.
//!
//! 외부 거래소 장애 시 연쇄 실패를 방지하고 시스템 복원력을 향상시킵니다.
//!
//! # 상태 전이
//!
//! ```text
//! Closed ──[연속 실패 임계치 도달]──> Open
//!    ↑                                │
//!    │                      [cooldown 경과 후 allow_request]
//!    │                                ↓
//!    └──[성공]── HalfOpen ──[실패]──> Open
//! ```
//!
//! Open → HalfOpen 전이는 `allow_request()` 호출의 부수효과로 일어나며,
//! `true`를 받은 호출자가 복구 프로브가 됩니다. HalfOpen에서 단일 프로브
//! 규율은 권고 수준입니다 — 호출자가 직렬화하지 않으면 프로브가 겹칠 수
//! 있으나, 최악의 경우 실패 요청 한 번이 추가되는 데 그치므로 락으로
//! 강제하지 않습니다.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use metrics::gauge;
use serde::{Deserialize, Serialize};

/// Circuit Breaker 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// 정상 상태 - 모든 요청 허용, 실패 카운트 누적
    Closed,
    /// 장애 상태 - cooldown 경과 전까지 모든 요청 거부
    Open,
    /// 복구 테스트 상태 - 프로브 요청 허용
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Circuit Breaker 설정.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// 연속 실패 임계치 (도달 시 Open으로 전이)
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Open 상태 유지 시간 (밀리초, 경과 후 프로브 허용)
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

fn default_failure_threshold() -> u32 {
    5
}
fn default_cooldown_ms() -> u64 {
    30_000
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_ms: default_cooldown_ms(),
        }
    }
}

impl CircuitBreakerConfig {
    /// 새 설정 생성.
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown_ms: cooldown.as_millis() as u64,
        }
    }

    /// cooldown Duration 반환.
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Circuit Breaker 내부 상태.
///
/// 불변식: `opened_at`은 state가 Open 또는 HalfOpen일 때만 Some.
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Circuit Breaker.
///
/// 하나의 다운스트림 의존성(거래소)을 보호하는 프로세스 전역 게이트.
/// operation별 분리는 하지 않습니다 — ticker 엔드포인트 장애가 주문
/// 엔드포인트까지 차단하는 것은 의도된 동작입니다.
pub struct CircuitBreaker {
    /// 서비스 이름 (로깅 및 메트릭용)
    name: String,
    config: CircuitBreakerConfig,
    inner: RwLock<BreakerInner>,
}

impl CircuitBreaker {
    /// 새 Circuit Breaker 생성.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        set_open_gauge(false);
        Self {
            name: name.into(),
            config,
            inner: RwLock::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// 기본 설정으로 생성.
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    /// 서비스 이름 반환.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 요청이 허용되는지 확인.
    ///
    /// Open 상태에서 cooldown이 경과했으면 HalfOpen으로 전이하며,
    /// 이때 `true`를 받은 호출자가 복구 프로브가 됩니다.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.write().unwrap();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.config.cooldown() {
                    // opened_at은 유지 — HalfOpen도 "열린" 구간에 속함
                    inner.state = CircuitState::HalfOpen;
                    tracing::info!(
                        circuit_breaker = %self.name,
                        "Circuit breaker cooldown elapsed: Open -> HalfOpen"
                    );
                    true
                } else {
                    false
                }
            }
            // 단일 프로브 가정은 호출자 직렬화에 맡긴다 (모듈 문서 참조)
            CircuitState::HalfOpen => true,
        }
    }

    /// 성공 기록: 실패 카운터 리셋, Closed로 복귀.
    pub fn on_success(&self) {
        let mut inner = self.inner.write().unwrap();
        if inner.state != CircuitState::Closed {
            tracing::info!(
                circuit_breaker = %self.name,
                "Circuit breaker recovered: {} -> Closed",
                inner.state
            );
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        set_open_gauge(false);
    }

    /// 실패 기록.
    ///
    /// HalfOpen에서는 카운터와 무관하게 즉시 Open으로 복귀하고
    /// `opened_at`을 갱신합니다 (프로브 실패 = 다시 대기).
    pub fn on_failure(&self) {
        let mut inner = self.inner.write().unwrap();

        if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            set_open_gauge(true);
            tracing::warn!(
                circuit_breaker = %self.name,
                "Circuit breaker probe failed: HalfOpen -> Open"
            );
            return;
        }

        inner.consecutive_failures += 1;
        if inner.consecutive_failures >= self.config.failure_threshold {
            if inner.state == CircuitState::Closed {
                tracing::warn!(
                    circuit_breaker = %self.name,
                    failures = inner.consecutive_failures,
                    "Circuit breaker tripped: Closed -> Open"
                );
            }
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            set_open_gauge(true);
        }
    }

    /// 현재 상태 반환 (전이 부수효과 없음).
    pub fn state(&self) -> CircuitState {
        self.inner.read().unwrap().state
    }

    /// 관측용 스냅샷.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.read().unwrap();
        BreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            open_for: inner.opened_at.map(|t| t.elapsed()),
        }
    }
}

/// Circuit Breaker 관측 스냅샷.
#[derive(Debug, Clone)]
pub struct BreakerSnapshot {
    /// 현재 상태
    pub state: CircuitState,
    /// 연속 실패 횟수
    pub consecutive_failures: u32,
    /// 열린 이후 경과 시간 (Open/HalfOpen일 때만 Some)
    pub open_for: Option<Duration>,
}

/// "열림" 게이지 내보내기 (1=open/half_open, 0=closed).
fn set_open_gauge(open: bool) {
    gauge!("exchange_circuit_breaker_open").set(if open { 1.0 } else { 0.0 });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn breaker(threshold: u32, cooldown_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                cooldown_ms,
            },
        )
    }

    #[test]
    fn test_initial_state() {
        let cb = CircuitBreaker::with_defaults("test");
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow_request());
    }

    #[test]
    fn test_opens_exactly_at_threshold() {
        let cb = breaker(3, 30_000);

        cb.on_failure();
        cb.on_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow_request());

        cb.on_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow_request());
    }

    #[test]
    fn test_success_resets_failure_count() {
        let cb = breaker(3, 30_000);

        cb.on_failure();
        cb.on_failure();
        cb.on_success();
        assert_eq!(cb.snapshot().consecutive_failures, 0);

        cb.on_failure();
        cb.on_failure();
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.on_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_cooldown_allows_probe() {
        let cb = breaker(1, 50);

        cb.on_failure();
        assert!(!cb.allow_request());

        thread::sleep(Duration::from_millis(60));

        // cooldown 경과 후 첫 allow_request가 프로브가 된다
        assert!(cb.allow_request());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        // opened_at은 HalfOpen에서도 유지
        assert!(cb.snapshot().open_for.is_some());
    }

    #[test]
    fn test_half_open_failure_reopens_with_fresh_cooldown() {
        let cb = breaker(1, 50);

        cb.on_failure();
        thread::sleep(Duration::from_millis(60));
        assert!(cb.allow_request());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.on_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        // opened_at이 갱신되었으므로 바로는 거부
        assert!(!cb.allow_request());
        assert!(cb.snapshot().open_for.unwrap() < Duration::from_millis(50));
    }

    #[test]
    fn test_half_open_success_closes() {
        let cb = breaker(1, 50);

        cb.on_failure();
        thread::sleep(Duration::from_millis(60));
        assert!(cb.allow_request());

        cb.on_success();
        let snap = cb.snapshot();
        assert_eq!(snap.state, CircuitState::Closed);
        assert_eq!(snap.consecutive_failures, 0);
        assert!(snap.open_for.is_none());
    }

    #[test]
    fn test_state_read_has_no_side_effect() {
        let cb = breaker(1, 10);
        cb.on_failure();
        thread::sleep(Duration::from_millis(20));

        // state()는 전이시키지 않는다 - allow_request만 프로브를 승인
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.allow_request());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }
}
