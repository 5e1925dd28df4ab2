//! 지수 백오프 + 지터 재시도 정책.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// 재시도 설정.
///
/// attempt *n*의 대기 시간은
/// `min(base_delay * multiplier^n, max_delay) + uniform(0, jitter)` 입니다.
/// 지터는 동시 장애 시 재시도 폭주(retry storm)가 동기화되는 것을 막습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// 첫 시도 이후 최대 재시도 횟수
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 기본 대기 시간 (밀리초)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// 대기 시간 증가 배수
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// 대기 시간 상한 (밀리초)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// 지터 범위 (밀리초, `[0, jitter_ms]` 균등 분포)
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

fn default_max_retries() -> u32 {
    4
}
fn default_base_delay_ms() -> u64 {
    200
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_max_delay_ms() -> u64 {
    5_000
}
fn default_jitter_ms() -> u64 {
    50
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

impl RetryConfig {
    /// 재시도 없는 설정 (테스트용).
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// attempt번째 실패 후 대기 시간 계산 (attempt는 0부터).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay_ms as f64 * self.multiplier.powi(attempt as i32);
        let capped = exp.min(self.max_delay_ms as f64).max(0.0);
        let jitter = if self.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        } else {
            0
        };
        Duration::from_millis(capped as u64 + jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_within_bounds() {
        let config = RetryConfig::default();

        for attempt in 0..8u32 {
            let expected = (config.base_delay_ms as f64
                * config.multiplier.powi(attempt as i32))
            .min(config.max_delay_ms as f64) as u64;

            // 지터가 확률적이므로 여러 번 샘플링
            for _ in 0..50 {
                let delay = config.delay_for(attempt).as_millis() as u64;
                assert!(delay >= expected, "attempt {}: {} < {}", attempt, delay, expected);
                assert!(
                    delay <= expected + config.jitter_ms,
                    "attempt {}: {} > {}",
                    attempt,
                    delay,
                    expected + config.jitter_ms
                );
            }
        }
    }

    #[test]
    fn test_delay_never_exceeds_cap() {
        let config = RetryConfig::default();

        // 충분히 큰 attempt에서도 max_delay + jitter를 넘지 않는다
        for _ in 0..100 {
            let delay = config.delay_for(20).as_millis() as u64;
            assert!(delay <= config.max_delay_ms + config.jitter_ms);
        }
    }

    #[test]
    fn test_zero_jitter_is_deterministic() {
        let config = RetryConfig {
            max_retries: 4,
            base_delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: 1_000,
            jitter_ms: 0,
        };

        assert_eq!(config.delay_for(0), Duration::from_millis(100));
        assert_eq!(config.delay_for(1), Duration::from_millis(200));
        assert_eq!(config.delay_for(2), Duration::from_millis(400));
        assert_eq!(config.delay_for(3), Duration::from_millis(800));
        assert_eq!(config.delay_for(4), Duration::from_millis(1_000));
        assert_eq!(config.delay_for(10), Duration::from_millis(1_000));
    }
}
