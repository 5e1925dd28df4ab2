//! WebSocket 연결 handler.
//!
//! `GET /api/ws?topic=<market|quotes|all>&token=...` 업그레이드 엔드포인트.
//! 연결마다 세션 태스크 하나와 writer pump 하나가 생성됩니다.

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use console_core::config::LiveSettings;
use console_live::{LogTailer, StatusReader};

use super::broadcaster::{ConnectionHandle, Outbound, SharedBroadcaster, Topic};
use super::session::{SessionConfig, StreamSession};
use crate::metrics::{decrement_websocket_connections, increment_websocket_connections};

/// 핸드셰이크 토큰 검증 인터페이스.
///
/// 실제 검증 구현은 이 서버의 범위 밖입니다 — 주입 지점만 제공하며
/// 기본 구현은 모든 연결을 허용합니다.
pub trait TokenValidator: Send + Sync {
    /// 토큰이 유효하면 true.
    fn validate(&self, token: Option<&str>) -> bool;
}

/// 모든 연결을 허용하는 기본 검증기.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl TokenValidator for AllowAll {
    fn validate(&self, _token: Option<&str>) -> bool {
        true
    }
}

/// WebSocket 서버 상태.
#[derive(Clone)]
pub struct WsState {
    /// 연결 레지스트리
    pub broadcaster: SharedBroadcaster,
    /// 파일 위치 및 주기 설정
    pub live: LiveSettings,
    /// 전역 종료 토큰
    pub shutdown: CancellationToken,
    /// 핸드셰이크 토큰 검증기
    pub validator: Arc<dyn TokenValidator>,
}

impl WsState {
    /// 새로운 WebSocket 상태 생성 (기본 검증기: 전부 허용).
    pub fn new(
        broadcaster: SharedBroadcaster,
        live: LiveSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            broadcaster,
            live,
            shutdown,
            validator: Arc::new(AllowAll),
        }
    }

    /// 토큰 검증기 교체.
    pub fn with_validator(mut self, validator: Arc<dyn TokenValidator>) -> Self {
        self.validator = validator;
        self
    }
}

/// 핸드셰이크 쿼리 파라미터.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// 구독 토픽 (기본: market)
    pub topic: Option<String>,
    /// 인증 토큰 (검증기에 전달)
    pub token: Option<String>,
}

/// WebSocket 업그레이드 핸들러.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<WsState>,
) -> impl IntoResponse {
    if !state.validator.validate(query.token.as_deref()) {
        warn!("WebSocket handshake rejected: invalid token");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let topic = match query.topic.as_deref() {
        None => Topic::default(),
        Some(raw) => match raw.parse() {
            Ok(topic) => topic,
            Err(_) => {
                warn!(topic = raw, "WebSocket handshake rejected: unknown topic");
                return StatusCode::BAD_REQUEST.into_response();
            }
        },
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, topic))
}

/// WebSocket 연결 처리.
async fn handle_socket(socket: WebSocket, state: WsState, topic: Topic) {
    let id = Uuid::new_v4();
    info!(%id, ?topic, "WebSocket connected");
    increment_websocket_connections();

    let (sink, inbound) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel();
    state
        .broadcaster
        .register(ConnectionHandle { id, topic, tx })
        .await;

    let pump = tokio::spawn(outbound_pump(rx, sink));

    let session = StreamSession::new(
        id,
        topic,
        state.broadcaster.clone(),
        LogTailer::new(state.live.data_dir.clone(), state.live.max_lines_per_batch),
        StatusReader::new(state.live.status_path()),
        SessionConfig::from_live(&state.live),
        state.shutdown.clone(),
    );
    let end = session.drive(inbound).await;

    // 세션 종료로 연결이 레지스트리에서 빠지면 tx가 drop되고
    // pump는 남은 항목(close 프레임 포함)을 내보낸 뒤 끝난다
    let _ = pump.await;

    decrement_websocket_connections();
    info!(%id, reason = ?end, "WebSocket disconnected");
}

/// 아웃바운드 채널을 소켓 sink로 퍼내는 writer pump.
async fn outbound_pump(
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    mut sink: SplitSink<WebSocket, Message>,
) {
    while let Some(item) = rx.recv().await {
        match item {
            Outbound::Message(msg) => {
                let json = match msg.to_json() {
                    Ok(json) => json,
                    Err(err) => {
                        warn!(error = %err, "Failed to serialize outbound message");
                        continue;
                    }
                };
                if sink.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            Outbound::Close(code) => {
                let _ = sink
                    .send(Message::Close(Some(CloseFrame {
                        code,
                        reason: "".into(),
                    })))
                    .await;
                break;
            }
        }
    }
}

/// WebSocket 라우터 생성 (`/api/ws`).
pub fn websocket_router(ws_state: WsState) -> Router {
    Router::new()
        .route("/api/ws", get(websocket_handler))
        .with_state(ws_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::broadcaster::Broadcaster;

    #[test]
    fn test_allow_all_validator() {
        let validator = AllowAll;
        assert!(validator.validate(None));
        assert!(validator.validate(Some("anything")));
    }

    #[test]
    fn test_validator_injection() {
        struct DenyAll;
        impl TokenValidator for DenyAll {
            fn validate(&self, _token: Option<&str>) -> bool {
                false
            }
        }

        let state = WsState::new(
            Broadcaster::shared(),
            LiveSettings::default(),
            CancellationToken::new(),
        )
        .with_validator(Arc::new(DenyAll));

        assert!(!state.validator.validate(Some("token")));
    }
}
