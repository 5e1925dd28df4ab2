//! 복원력 있는 거래소 HTTP 클라이언트.
//!
//! 모든 아웃바운드 호출은 circuit breaker 게이트를 통과한 뒤
//! 재시도 루프에서 실행됩니다. 프로세스당 하나의 클라이언트를
//! 명시적으로 생성해 공유하며, breaker는 다운스트림(거래소) 단위로
//! 하나입니다 — operation별로 분리하지 않습니다.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;
use std::time::Duration;

use metrics::counter;
use reqwest::{Client, Method};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::error::ExchangeError;
use crate::retry::RetryConfig;

/// 거래소 클라이언트 설정.
///
/// # 보안
/// - `Debug` 구현은 민감 정보(`api_key`, `api_secret`)를 마스킹합니다.
#[derive(Clone)]
pub struct ExchangeConfig {
    /// 거래소 REST API 기본 URL
    pub base_url: String,
    /// API 키 (`X-API-KEY` 헤더)
    pub api_key: Option<String>,
    /// API 시크릿 (`X-API-SECRET` 헤더)
    pub api_secret: Option<SecretString>,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
    /// 재시도 정책
    pub retry: RetryConfig,
    /// Circuit breaker 설정
    pub breaker: CircuitBreakerConfig,
}

impl fmt::Debug for ExchangeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_deref().map(|_| "***REDACTED***"))
            .field("api_secret", &self.api_secret.as_ref().map(|_| "***REDACTED***"))
            .field("timeout_secs", &self.timeout_secs)
            .field("retry", &self.retry)
            .field("breaker", &self.breaker)
            .finish()
    }
}

impl ExchangeConfig {
    /// 새 설정 생성.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            api_secret: None,
            timeout_secs: 10,
            retry: RetryConfig::default(),
            breaker: CircuitBreakerConfig::default(),
        }
    }

    /// 환경 변수에서 생성.
    ///
    /// - `EXCHANGE_BASE_URL`: 기본 URL
    /// - `EXCHANGE_API_KEY` / `EXCHANGE_API_SECRET`: 인증 헤더
    pub fn from_env() -> Self {
        let base_url = std::env::var("EXCHANGE_BASE_URL")
            .unwrap_or_else(|_| "https://example-exchange.invalid".to_string());
        let mut config = Self::new(base_url);
        config.api_key = std::env::var("EXCHANGE_API_KEY").ok();
        config.api_secret = std::env::var("EXCHANGE_API_SECRET")
            .ok()
            .map(SecretString::from);
        config
    }

    /// 인증 정보 설정.
    pub fn with_credentials(
        mut self,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        self.api_key = Some(api_key.into());
        self.api_secret = Some(SecretString::from(api_secret.into()));
        self
    }

    /// 재시도 정책 설정.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Circuit breaker 설정.
    pub fn with_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }
}

/// 주문 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

/// 주문 유형.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

/// 주문 요청 본문 (`POST /orders`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    /// 심볼 (예: "BTC-USD")
    pub symbol: String,
    /// 주문 방향
    pub side: Side,
    /// 수량
    pub qty: f64,
    /// 주문 유형
    #[serde(rename = "type")]
    pub order_type: OrderType,
    /// 지정가 (limit 주문일 때만)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

/// 요청 결과 분류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestOutcome {
    /// 성공 응답
    Ok,
    /// 실패 후 재시도 예정
    Retry,
    /// 모든 재시도 소진
    Failed,
    /// Circuit breaker가 요청을 거부
    CircuitOpen,
}

impl RequestOutcome {
    /// 메트릭 레이블 문자열.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestOutcome::Ok => "ok",
            RequestOutcome::Retry => "retry",
            RequestOutcome::Failed => "failed",
            RequestOutcome::CircuitOpen => "circuit_open",
        }
    }
}

/// operation/outcome별 요청 카운터.
///
/// Prometheus 카운터로 내보내는 동시에, 테스트에서 직접 조회할 수 있도록
/// 프로세스 내 테이블로도 유지합니다.
#[derive(Default)]
pub struct RequestCounters {
    inner: RwLock<HashMap<(String, RequestOutcome), u64>>,
}

impl RequestCounters {
    /// 카운터 증가 + Prometheus 내보내기.
    pub fn record(&self, operation: &str, outcome: RequestOutcome) {
        let mut inner = self.inner.write().unwrap();
        *inner
            .entry((operation.to_string(), outcome))
            .or_insert(0) += 1;

        counter!(
            "exchange_requests_total",
            "operation" => operation.to_string(),
            "outcome" => outcome.as_str().to_string()
        )
        .increment(1);
    }

    /// 특정 operation/outcome 카운트 조회.
    pub fn get(&self, operation: &str, outcome: RequestOutcome) -> u64 {
        self.inner
            .read()
            .unwrap()
            .get(&(operation.to_string(), outcome))
            .copied()
            .unwrap_or(0)
    }
}

/// 복원력 있는 거래소 클라이언트.
pub struct ExchangeClient {
    http: Client,
    config: ExchangeConfig,
    breaker: CircuitBreaker,
    counters: RequestCounters,
}

impl ExchangeClient {
    /// 새 클라이언트 생성.
    pub fn new(config: ExchangeConfig) -> Result<Self, ExchangeError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let breaker = CircuitBreaker::new("exchange", config.breaker.clone());

        Ok(Self {
            http,
            config,
            breaker,
            counters: RequestCounters::default(),
        })
    }

    /// Circuit breaker 참조.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// 요청 카운터 참조.
    pub fn counters(&self) -> &RequestCounters {
        &self.counters
    }

    /// 티커 조회 (`GET /ticker?symbol=S`).
    pub async fn get_ticker(&self, symbol: &str) -> Result<Value, ExchangeError> {
        self.request(
            "get_ticker",
            Method::GET,
            "/ticker",
            Some(&[("symbol", symbol)]),
            None,
        )
        .await
    }

    /// 주문 접수 (`POST /orders`).
    pub async fn place_order(&self, order: &OrderRequest) -> Result<Value, ExchangeError> {
        let body = serde_json::to_value(order)?;
        self.request("place_order", Method::POST, "/orders", None, Some(&body))
            .await
    }

    /// Breaker 게이트 + 재시도 루프를 통과하는 공통 요청 경로.
    ///
    /// - 게이트 거부 시 네트워크 시도 없이 즉시 `CircuitOpen` 반환
    /// - 전송 에러와 HTTP 5xx만 재시도 대상
    /// - 5xx 미만이면서 본문이 파싱되는 응답은 전부 성공으로 취급
    ///   (4xx를 별도 분류하지 않는 것은 의도된 정책)
    /// - 파싱 실패는 breaker에 기록하지 않고 즉시 반환
    async fn request(
        &self,
        operation: &str,
        method: Method,
        path: &str,
        query: Option<&[(&str, &str)]>,
        body: Option<&Value>,
    ) -> Result<Value, ExchangeError> {
        if !self.breaker.allow_request() {
            self.counters.record(operation, RequestOutcome::CircuitOpen);
            debug!(operation, "Request rejected: circuit breaker open");
            return Err(ExchangeError::CircuitOpen);
        }

        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let max_retries = self.config.retry.max_retries;
        let mut attempt: u32 = 0;

        loop {
            match self.attempt(method.clone(), &url, query, body).await {
                Ok(value) => {
                    self.breaker.on_success();
                    self.counters.record(operation, RequestOutcome::Ok);
                    return Ok(value);
                }
                Err(err) if !err.is_retryable() => {
                    // 파싱 실패 등 - 재시도도 breaker 기록도 하지 않는다
                    return Err(err);
                }
                Err(err) => {
                    self.breaker.on_failure();

                    if attempt < max_retries {
                        self.counters.record(operation, RequestOutcome::Retry);
                        let delay = self.config.retry.delay_for(attempt);
                        debug!(
                            operation,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "Exchange request failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    } else {
                        self.counters.record(operation, RequestOutcome::Failed);
                        warn!(operation, attempts = attempt + 1, error = %err, "Exchange request exhausted");
                        return Err(ExchangeError::Exhausted {
                            operation: operation.to_string(),
                            attempts: attempt + 1,
                            source: Box::new(err),
                        });
                    }
                }
            }
        }
    }

    /// 단일 HTTP 시도.
    async fn attempt(
        &self,
        method: Method,
        url: &str,
        query: Option<&[(&str, &str)]>,
        body: Option<&Value>,
    ) -> Result<Value, ExchangeError> {
        let mut req = self.http.request(method, url).header(
            reqwest::header::USER_AGENT,
            concat!("arb-console/", env!("CARGO_PKG_VERSION")),
        );
        if let Some(key) = &self.config.api_key {
            req = req.header("X-API-KEY", key);
        }
        if let Some(secret) = &self.config.api_secret {
            req = req.header("X-API-SECRET", secret.expose_secret());
        }
        if let Some(query) = query {
            req = req.query(query);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status().as_u16();
        if status >= 500 {
            return Err(ExchangeError::Server(status));
        }

        // reqwest의 decode 에러는 From 구현에서 Parse로 분류된다
        let value = resp.json::<Value>().await?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitState;

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_delay_ms: 1,
            multiplier: 1.0,
            max_delay_ms: 1,
            jitter_ms: 0,
        }
    }

    fn client_for(base_url: &str, max_retries: u32, threshold: u32) -> ExchangeClient {
        let config = ExchangeConfig::new(base_url)
            .with_retry(fast_retry(max_retries))
            .with_breaker(CircuitBreakerConfig {
                failure_threshold: threshold,
                cooldown_ms: 60_000,
            });
        ExchangeClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_success_records_ok() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/ticker?symbol=BTC-USD")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"symbol":"BTC-USD","price":50000.0}"#)
            .create_async()
            .await;

        let client = client_for(&server.url(), 4, 5);
        let resp = client.get_ticker("BTC-USD").await.unwrap();

        assert_eq!(resp["price"], 50000.0);
        assert_eq!(client.counters().get("get_ticker", RequestOutcome::Ok), 1);
        assert_eq!(client.breaker().state(), CircuitState::Closed);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_retries_then_exhausts() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/ticker?symbol=BTC-USD")
            .with_status(502)
            .with_body("bad gateway")
            .expect(3)
            .create_async()
            .await;

        let client = client_for(&server.url(), 2, 10);
        let err = client.get_ticker("BTC-USD").await.unwrap_err();

        match err {
            ExchangeError::Exhausted {
                operation,
                attempts,
                source,
            } => {
                assert_eq!(operation, "get_ticker");
                assert_eq!(attempts, 3);
                assert!(matches!(*source, ExchangeError::Server(502)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(client.counters().get("get_ticker", RequestOutcome::Retry), 2);
        assert_eq!(client.counters().get("get_ticker", RequestOutcome::Failed), 1);
        assert_eq!(client.breaker().snapshot().consecutive_failures, 3);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_4xx_parsed_body_is_success_path() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/ticker?symbol=BTC-USD")
            .with_status(404)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"unknown symbol"}"#)
            .create_async()
            .await;

        let client = client_for(&server.url(), 4, 2);
        // 4xx는 재시도 대상이 아니며 breaker 성공으로 기록된다 (의도된 정책)
        let resp = client.get_ticker("BTC-USD").await.unwrap();

        assert_eq!(resp["error"], "unknown symbol");
        assert_eq!(client.counters().get("get_ticker", RequestOutcome::Ok), 1);
        assert_eq!(client.breaker().snapshot().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_unparseable_body_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/ticker?symbol=BTC-USD")
            .with_status(200)
            .with_body("not json at all")
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server.url(), 4, 5);
        let err = client.get_ticker("BTC-USD").await.unwrap_err();

        assert!(matches!(err, ExchangeError::Parse(_)));
        // breaker에는 성공도 실패도 기록되지 않는다
        assert_eq!(client.breaker().snapshot().consecutive_failures, 0);
        assert_eq!(client.counters().get("get_ticker", RequestOutcome::Failed), 0);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_breaker_opens_after_consecutive_transport_failures() {
        // 닫힌 포트로 연결 실패 유도, threshold=5, 재시도 없음
        let client = client_for("http://127.0.0.1:9", 0, 5);

        for _ in 0..5 {
            let err = client.get_ticker("BTC-USD").await.unwrap_err();
            assert!(matches!(err, ExchangeError::Exhausted { .. }));
        }
        assert_eq!(client.breaker().state(), CircuitState::Open);

        // 6번째 호출은 네트워크 시도 없이 즉시 거부되고 재시도 카운터도 그대로
        let err = client.get_ticker("BTC-USD").await.unwrap_err();
        assert!(matches!(err, ExchangeError::CircuitOpen));
        assert_eq!(
            client.counters().get("get_ticker", RequestOutcome::CircuitOpen),
            1
        );
        assert_eq!(client.counters().get("get_ticker", RequestOutcome::Failed), 5);
        assert_eq!(client.counters().get("get_ticker", RequestOutcome::Retry), 0);
    }

    #[tokio::test]
    async fn test_order_request_serialization() {
        let order = OrderRequest {
            symbol: "ETH-USD".to_string(),
            side: Side::Buy,
            qty: 1.5,
            order_type: OrderType::Limit,
            price: Some(2500.0),
        };
        let value = serde_json::to_value(&order).unwrap();
        assert_eq!(value["side"], "buy");
        assert_eq!(value["type"], "limit");
        assert_eq!(value["price"], 2500.0);

        let market = OrderRequest {
            symbol: "ETH-USD".to_string(),
            side: Side::Sell,
            qty: 1.0,
            order_type: OrderType::Market,
            price: None,
        };
        let value = serde_json::to_value(&market).unwrap();
        assert!(value.get("price").is_none());
    }

    #[tokio::test]
    async fn test_auth_headers_forwarded() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/ticker?symbol=BTC-USD")
            .match_header("X-API-KEY", "key-123")
            .match_header("X-API-SECRET", "secret-456")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let config = ExchangeConfig::new(server.url())
            .with_credentials("key-123", "secret-456")
            .with_retry(RetryConfig::no_retry());
        let client = ExchangeClient::new(config).unwrap();

        client.get_ticker("BTC-USD").await.unwrap();
        mock.assert_async().await;
    }
}
