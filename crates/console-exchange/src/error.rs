//! 거래소 클라이언트 에러 타입.

use thiserror::Error;

/// 거래소 호출 관련 에러.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Circuit breaker가 열려 있어 요청이 거부됨
    #[error("Circuit breaker is open")]
    CircuitOpen,

    /// 모든 재시도 소진
    #[error("Exchange request failed for {operation} after {attempts} attempts: {source}")]
    Exhausted {
        /// 호출한 operation 이름
        operation: String,
        /// 시도 횟수 (첫 시도 포함)
        attempts: u32,
        /// 마지막 실패 원인
        #[source]
        source: Box<ExchangeError>,
    },

    /// 네트워크/연결 에러
    #[error("Network error: {0}")]
    Network(String),

    /// 요청 타임아웃
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// 서버 에러 응답 (HTTP 5xx)
    #[error("Server error: HTTP {0}")]
    Server(u16),

    /// 응답 파싱/역직렬화 에러
    #[error("Parse error: {0}")]
    Parse(String),
}

impl ExchangeError {
    /// 재시도 가능한 에러인지 확인.
    ///
    /// 전송 계층 실패와 5xx 응답만 재시도합니다. 파싱 실패는
    /// 재시도해도 같은 결과이므로 즉시 반환됩니다.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExchangeError::Network(_) | ExchangeError::Timeout(_) | ExchangeError::Server(_)
        )
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExchangeError::Timeout(err.to_string())
        } else if err.is_decode() {
            ExchangeError::Parse(err.to_string())
        } else {
            ExchangeError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        ExchangeError::Parse(err.to_string())
    }
}
