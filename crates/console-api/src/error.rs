//! API 에러 응답 타입.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use console_exchange::ExchangeError;
use serde::Serialize;
use tracing::warn;

/// API 핸들러 에러.
///
/// 거래소 클라이언트 에러를 HTTP 상태 코드로 매핑합니다:
/// circuit open은 503 (우리 쪽 보호 장치가 닫힘), 나머지 다운스트림
/// 실패는 502 (게이트웨이 뒤의 거래소가 원인).
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("잘못된 요청: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

/// 에러 응답 바디.
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    /// 에러 코드 (예: "CIRCUIT_OPEN", "UPSTREAM_ERROR")
    pub code: String,
    /// 사람이 읽을 수 있는 에러 메시지
    pub message: String,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Exchange(ExchangeError::CircuitOpen) => {
                (StatusCode::SERVICE_UNAVAILABLE, "CIRCUIT_OPEN")
            }
            ApiError::Exchange(ExchangeError::Exhausted { .. }) => {
                (StatusCode::BAD_GATEWAY, "UPSTREAM_EXHAUSTED")
            }
            ApiError::Exchange(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        warn!(%status, code, error = %self, "API request failed");

        let body = ApiErrorBody {
            code: code.to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// API 핸들러 Result 타입 별칭.
pub type ApiResult<T> = Result<T, ApiError>;
