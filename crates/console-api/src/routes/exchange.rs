//! 거래소 프록시 endpoint.
//!
//! `ExchangeClient`의 호출자입니다 — breaker/재시도 정책은 클라이언트
//! 내부에 있고, 여기서는 에러를 HTTP 상태로 매핑만 합니다.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;

use console_exchange::OrderRequest;

use crate::error::ApiResult;
use crate::state::AppState;

/// `GET /api/market/ticker` 쿼리.
#[derive(Debug, Deserialize)]
pub struct TickerQuery {
    /// 심볼 (예: "BTC-USD")
    pub symbol: String,
}

/// 티커 조회 프록시 (`GET /api/market/ticker?symbol`).
pub async fn get_ticker(
    State(state): State<AppState>,
    Query(query): Query<TickerQuery>,
) -> ApiResult<Json<Value>> {
    let ticker = state.exchange.get_ticker(&query.symbol).await?;
    Ok(Json(ticker))
}

/// 주문 접수 프록시 (`POST /api/orders`).
pub async fn place_order(
    State(state): State<AppState>,
    Json(order): Json<OrderRequest>,
) -> ApiResult<Json<Value>> {
    let ack = state.exchange.place_order(&order).await?;
    Ok(Json(ack))
}

/// 거래소 프록시 라우터 생성.
pub fn exchange_router() -> Router<AppState> {
    Router::new()
        .route("/market/ticker", get(get_ticker))
        .route("/orders", post(place_order))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::state::create_test_state;

    #[tokio::test]
    async fn test_open_breaker_maps_to_503() {
        let state = create_test_state();
        // breaker를 강제로 연다 (기본 threshold 5)
        for _ in 0..5 {
            state.exchange.breaker().on_failure();
        }

        let response = exchange_router()
            .with_state(state)
            .oneshot(
                Request::builder()
                    .uri("/market/ticker?symbol=BTC-USD")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["code"], "CIRCUIT_OPEN");
    }

    #[tokio::test]
    async fn test_missing_symbol_is_client_error() {
        let response = exchange_router()
            .with_state(create_test_state())
            .oneshot(
                Request::builder()
                    .uri("/market/ticker")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
