//! 실시간 파일 조회 endpoint.
//!
//! WebSocket을 쓰지 않는 클라이언트를 위한 단발성 REST 조회입니다.
//! 모두 읽기 전용이고, 파일 부재/파싱 실패는 빈 결과로 응답합니다.

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use console_live::{latest_ndjson_path, parse_rows, read_last_lines, top_spread, StatusReader};

use crate::state::AppState;

/// 조회당 기본/최대 라인 수.
const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

/// 스프레드 계산 기본 lookback (밀리초).
const DEFAULT_LOOKBACK_MS: f64 = 10_000.0;

/// 응답의 `file` 필드는 전체 경로가 아닌 파일명만 노출한다.
fn base_name(path: &std::path::Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

/// 쉼표 구분 필터를 대문자 목록으로 정규화.
fn split_filter(raw: String) -> Vec<String> {
    raw.split(',')
        .map(|v| v.trim().to_uppercase())
        .filter(|v| !v.is_empty())
        .collect()
}

/// `GET /api/live/quotes` 쿼리.
#[derive(Debug, Deserialize)]
pub struct QuotesQuery {
    /// 최대 행 수 (기본 100, 최대 1000)
    pub limit: Option<usize>,
    /// 쉼표로 구분된 베뉴 필터
    pub venues: Option<String>,
}

/// 최근 호가 조회 (`GET /api/live/quotes?limit&venues`).
pub async fn get_quotes(
    State(state): State<AppState>,
    Query(query): Query<QuotesQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let venues: Option<Vec<String>> = query.venues.map(split_filter);

    let path = latest_ndjson_path(&state.settings.live.data_dir);
    let rows = match &path {
        // 필터로 걸러질 것을 감안해 넉넉히 읽고 마지막에 자른다
        Some(path) => parse_rows(&read_last_lines(path, MAX_LIMIT)),
        None => Vec::new(),
    };

    let items: Vec<_> = rows
        .into_iter()
        .filter(|row| match &venues {
            Some(venues) => venues.iter().any(|v| v == &row.venue.to_uppercase()),
            None => true,
        })
        .collect();
    let skip = items.len().saturating_sub(limit);

    Json(json!({
        "items": &items[skip..],
        "file": path.as_deref().and_then(base_name),
    }))
}

/// `GET /api/live/top-spread` 쿼리.
#[derive(Debug, Deserialize)]
pub struct TopSpreadQuery {
    /// 호가 신선도 기준 (밀리초, 기본 10000)
    pub lookback_ms: Option<f64>,
    /// 쉼표로 구분된 페어 필터
    pub pairs: Option<String>,
}

/// 베뉴 간 최고 스프레드 (`GET /api/live/top-spread?lookback_ms&pairs`).
pub async fn get_top_spread(
    State(state): State<AppState>,
    Query(query): Query<TopSpreadQuery>,
) -> impl IntoResponse {
    let lookback_ms = query.lookback_ms.unwrap_or(DEFAULT_LOOKBACK_MS);
    let pairs: Option<Vec<String>> = query.pairs.map(split_filter);
    let now_ms = chrono::Utc::now().timestamp_millis() as f64;

    let path = latest_ndjson_path(&state.settings.live.data_dir);
    let top = path.as_deref().and_then(|path| {
        let mut rows = parse_rows(&read_last_lines(path, MAX_LIMIT));
        if let Some(pairs) = &pairs {
            // pair 필드가 없는 행은 필터가 있으면 제외
            rows.retain(|row| {
                row.pair
                    .as_deref()
                    .map(|p| pairs.iter().any(|q| q == &p.to_uppercase()))
                    .unwrap_or(false)
            });
        }
        top_spread(&rows, &state.settings.fees, lookback_ms, now_ms)
    });

    Json(json!({
        "top": top,
        "file": path.as_deref().and_then(base_name),
    }))
}

/// 수집기 상태 스냅샷 (`GET /api/live/status`).
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let reader = StatusReader::new(state.settings.live.status_path());
    let status: Option<Value> = reader.read();

    Json(json!({
        "status": status,
        "file": base_name(reader.path()),
    }))
}

/// 실시간 조회 라우터 생성.
pub fn live_router() -> Router<AppState> {
    Router::new()
        .route("/quotes", get(get_quotes))
        .route("/top-spread", get(get_top_spread))
        .route("/status", get(get_status))
}
