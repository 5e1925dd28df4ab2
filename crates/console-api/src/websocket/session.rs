//! 연결별 스트리밍 세션 루프.
//!
//! 주기마다: 상태 스냅샷을 전 연결에 브로드캐스트 → (구독 시) 호가 배치를
//! 이 연결에 전송 → ping 전송 후 인바운드 대기 → liveness 판정 → 대기.
//! 모든 대기는 종료 토큰과 select되므로 shutdown이 즉시 끼어듭니다.
//!
//! 인바운드 스트림을 제네릭으로 받아 실제 소켓 없이도 세션 로직을
//! 결정적으로 테스트할 수 있습니다.

use axum::extract::ws::Message;
use console_core::config::LiveSettings;
use futures::{Stream, StreamExt};
use tokio::time::{timeout, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use console_live::{LogTailer, StatusReader, TailCursor};

use super::broadcaster::{SharedBroadcaster, Topic};
use super::messages::{ClientMessage, ServerMessage};

/// WebSocket close 코드: 서버 내부 판단에 의한 비정상 종료.
const CLOSE_INTERNAL_ERROR: u16 = 1011;
/// WebSocket close 코드: 서버 종료.
const CLOSE_GOING_AWAY: u16 = 1001;

/// 세션 루프 주기 파라미터.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// 루프 간 대기 시간
    pub broadcast_interval: Duration,
    /// ping 후 인바운드를 기다리는 최대 시간
    pub ping_interval: Duration,
    /// 마지막 pong 이후 허용되는 무응답 시간
    pub pong_timeout: Duration,
}

impl SessionConfig {
    /// 실시간 설정에서 변환.
    pub fn from_live(settings: &LiveSettings) -> Self {
        Self {
            broadcast_interval: Duration::from_secs(settings.broadcast_interval_secs),
            ping_interval: Duration::from_millis(settings.ping_interval_ms),
            pong_timeout: Duration::from_millis(settings.pong_timeout_ms),
        }
    }
}

/// 세션 종료 사유.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// 클라이언트가 정상적으로 연결을 닫음 (close 프레임 또는 스트림 종료)
    ClientClosed,
    /// pong 무응답으로 서버가 연결을 닫음 (1011)
    LivenessTimeout,
    /// 수신/전송 채널 오류 - 연결 단절로 취급
    ConnectionFault,
    /// 서버 종료로 세션 중단 (1001)
    Shutdown,
}

/// 연결 하나의 스트리밍 세션.
///
/// tail 커서는 세션 소유입니다 — 연결마다 같은 파일을 독립적으로 읽고,
/// 세션 간 오프셋 경합이 없습니다.
pub struct StreamSession {
    id: Uuid,
    topic: Topic,
    broadcaster: SharedBroadcaster,
    tailer: LogTailer,
    status: StatusReader,
    cursor: TailCursor,
    config: SessionConfig,
    shutdown: CancellationToken,
    last_pong: Instant,
}

impl StreamSession {
    /// 새 세션 생성. 연결은 이미 브로드캐스터에 등록되어 있어야 합니다.
    pub fn new(
        id: Uuid,
        topic: Topic,
        broadcaster: SharedBroadcaster,
        tailer: LogTailer,
        status: StatusReader,
        config: SessionConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id,
            topic,
            broadcaster,
            tailer,
            status,
            cursor: TailCursor::default(),
            config,
            shutdown,
            last_pong: Instant::now(),
        }
    }

    /// 세션 루프 실행. 종료 시 연결을 레지스트리에서 제거합니다.
    pub async fn drive<S>(mut self, mut inbound: S) -> SessionEnd
    where
        S: Stream<Item = Result<Message, axum::Error>> + Unpin,
    {
        let end = self.run_loop(&mut inbound).await;
        match end {
            // 서버가 닫는 경우에만 close 프레임을 보낸다
            SessionEnd::LivenessTimeout => {
                self.broadcaster.close(self.id, CLOSE_INTERNAL_ERROR).await;
            }
            SessionEnd::Shutdown => {
                self.broadcaster.close(self.id, CLOSE_GOING_AWAY).await;
            }
            SessionEnd::ClientClosed | SessionEnd::ConnectionFault => {
                self.broadcaster.unregister(self.id).await;
            }
        }
        debug!(id = %self.id, reason = ?end, "Stream session ended");
        end
    }

    async fn run_loop<S>(&mut self, inbound: &mut S) -> SessionEnd
    where
        S: Stream<Item = Result<Message, axum::Error>> + Unpin,
    {
        loop {
            // 1. 상태 스냅샷은 모든 연결에 전파된다
            let status = self.status.read();
            self.broadcaster
                .broadcast(&ServerMessage::live_status(status))
                .await;

            // 2. 호가 배치는 구독한 이 연결에만
            if self.topic.wants_quotes() {
                let rows = self.tailer.poll(&mut self.cursor);
                if !rows.is_empty()
                    && !self.broadcaster.send_to(self.id, ServerMessage::quotes(rows)).await
                {
                    return SessionEnd::ConnectionFault;
                }
            }

            // 3. ping 후 인바운드 대기 + liveness 판정
            if !self.broadcaster.send_to(self.id, ServerMessage::ping()).await {
                return SessionEnd::ConnectionFault;
            }
            if let Some(end) = self.await_inbound(inbound).await {
                return end;
            }

            // 4. 다음 주기까지 대기
            tokio::select! {
                _ = self.shutdown.cancelled() => return SessionEnd::Shutdown,
                _ = tokio::time::sleep(self.config.broadcast_interval) => {}
            }
        }
    }

    /// 인바운드 프레임 하나를 `ping_interval`까지 기다린다.
    ///
    /// 타임아웃 자체는 종료 사유가 아니다 — 마지막 pong이
    /// `pong_timeout`보다 오래됐을 때만 liveness 실패로 판정한다.
    async fn await_inbound<S>(&mut self, inbound: &mut S) -> Option<SessionEnd>
    where
        S: Stream<Item = Result<Message, axum::Error>> + Unpin,
    {
        tokio::select! {
            _ = self.shutdown.cancelled() => Some(SessionEnd::Shutdown),
            result = timeout(self.config.ping_interval, inbound.next()) => match result {
                Err(_) => {
                    if self.last_pong.elapsed() > self.config.pong_timeout {
                        warn!(id = %self.id, "Client unresponsive, closing connection");
                        Some(SessionEnd::LivenessTimeout)
                    } else {
                        None
                    }
                }
                Ok(None) => Some(SessionEnd::ClientClosed),
                Ok(Some(Err(err))) => {
                    debug!(id = %self.id, error = %err, "WebSocket receive error");
                    Some(SessionEnd::ConnectionFault)
                }
                Ok(Some(Ok(msg))) => self.handle_inbound(msg),
            }
        }
    }

    fn handle_inbound(&mut self, msg: Message) -> Option<SessionEnd> {
        match msg {
            Message::Text(text) => {
                // pong만 의미가 있다. 그 외의 텍스트는 조용히 무시.
                if let Some(ClientMessage::Pong { .. }) = ClientMessage::from_json(&text) {
                    self.last_pong = Instant::now();
                }
                None
            }
            Message::Close(_) => Some(SessionEnd::ClientClosed),
            // 바이너리 및 프로토콜 레벨 ping/pong 프레임은 무시
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::broadcaster::{Broadcaster, ConnectionHandle, Outbound};
    use futures::stream;
    use tokio::sync::mpsc;

    fn fast_config() -> SessionConfig {
        SessionConfig {
            broadcast_interval: Duration::from_millis(10),
            ping_interval: Duration::from_millis(100),
            pong_timeout: Duration::from_millis(50),
        }
    }

    struct Fixture {
        broadcaster: SharedBroadcaster,
        rx: mpsc::UnboundedReceiver<Outbound>,
        session: StreamSession,
        _dir: tempfile::TempDir,
    }

    async fn fixture(topic: Topic, config: SessionConfig, shutdown: CancellationToken) -> Fixture {
        let dir = tempfile::TempDir::new().unwrap();
        let broadcaster = Broadcaster::shared();
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        broadcaster
            .register(ConnectionHandle { id, topic, tx })
            .await;

        let session = StreamSession::new(
            id,
            topic,
            broadcaster.clone(),
            LogTailer::new(dir.path(), 100),
            StatusReader::new(dir.path().join("ws_status.json")),
            config,
            shutdown,
        );
        Fixture {
            broadcaster,
            rx,
            session,
            _dir: dir,
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut items = Vec::new();
        while let Ok(item) = rx.try_recv() {
            items.push(item);
        }
        items
    }

    fn pong() -> Result<Message, axum::Error> {
        Ok(Message::Text(r#"{"type":"pong"}"#.into()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_client_closed_with_1011() {
        let mut fx = fixture(Topic::Market, fast_config(), CancellationToken::new()).await;

        let end = fx.session.drive(stream::pending()).await;

        assert_eq!(end, SessionEnd::LivenessTimeout);
        assert_eq!(fx.broadcaster.client_count().await, 0);
        let items = drain(&mut fx.rx);
        assert!(matches!(items.last(), Some(Outbound::Close(1011))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_period_allows_several_pings_before_close() {
        // ping 50ms 주기, 200ms 무응답까지 허용
        let config = SessionConfig {
            broadcast_interval: Duration::from_millis(10),
            ping_interval: Duration::from_millis(50),
            pong_timeout: Duration::from_millis(200),
        };
        let mut fx = fixture(Topic::Market, config, CancellationToken::new()).await;

        let end = fx.session.drive(stream::pending()).await;

        assert_eq!(end, SessionEnd::LivenessTimeout);
        let pings = drain(&mut fx.rx)
            .iter()
            .filter(|o| matches!(o, Outbound::Message(ServerMessage::Ping { .. })))
            .count();
        assert!(pings >= 3, "expected several pings before close, got {pings}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_pong_keeps_session_alive() {
        // pong 3회로 가상 시간이 pong_timeout을 한참 넘겨도 열려 있어야 한다
        let config = SessionConfig {
            broadcast_interval: Duration::from_millis(100),
            ping_interval: Duration::from_millis(100),
            pong_timeout: Duration::from_millis(150),
        };
        let mut fx = fixture(Topic::Market, config, CancellationToken::new()).await;

        let inbound = stream::iter(vec![pong(), pong(), pong()]);
        let end = fx.session.drive(inbound).await;

        // 스트림 종료는 정상 종료이며 close 프레임을 보내지 않는다
        assert_eq!(end, SessionEnd::ClientClosed);
        assert!(!drain(&mut fx.rx)
            .iter()
            .any(|o| matches!(o, Outbound::Close(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_pong_inbound_ignored() {
        let mut fx = fixture(Topic::Market, fast_config(), CancellationToken::new()).await;

        let inbound = stream::iter(vec![
            Ok(Message::Text(r#"{"type":"subscribe"}"#.into())),
            Ok(Message::Text("garbage".into())),
            Ok(Message::Close(None)),
        ]);
        let end = fx.session.drive(inbound).await;

        assert_eq!(end, SessionEnd::ClientClosed);
        assert_eq!(fx.broadcaster.client_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_error_is_connection_fault() {
        let mut fx = fixture(Topic::Market, fast_config(), CancellationToken::new()).await;

        let inbound = stream::iter(vec![Err(axum::Error::new(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        )))]);
        let end = fx.session.drive(inbound).await;

        assert_eq!(end, SessionEnd::ConnectionFault);
        assert_eq!(fx.broadcaster.client_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_with_1001() {
        let token = CancellationToken::new();
        let mut fx = fixture(Topic::Market, fast_config(), token.clone()).await;
        token.cancel();

        let end = fx.session.drive(stream::pending()).await;

        assert_eq!(end, SessionEnd::Shutdown);
        let items = drain(&mut fx.rx);
        assert!(matches!(items.last(), Some(Outbound::Close(1001))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_quotes_delivered_to_subscriber_only_once() {
        let config = SessionConfig {
            broadcast_interval: Duration::from_millis(100),
            ping_interval: Duration::from_millis(100),
            pong_timeout: Duration::from_millis(10_000),
        };
        let mut fx = fixture(Topic::Quotes, config, CancellationToken::new()).await;

        // 세션이 tail할 오늘자 파일에 호가 한 줄
        let path = fx._dir.path().join(format!(
            "live_{}.ndjson",
            chrono::Utc::now().format("%Y%m%d")
        ));
        std::fs::write(&path, "{\"type\":\"quote\",\"venue\":\"A\",\"mid\":100.0}\n").unwrap();

        // 두 주기 돌 만큼의 pong 후 종료
        let inbound = stream::iter(vec![pong(), pong()]);
        fx.session.drive(inbound).await;

        let quote_batches: Vec<usize> = drain(&mut fx.rx)
            .iter()
            .filter_map(|o| match o {
                Outbound::Message(ServerMessage::Quotes { count, .. }) => Some(*count),
                _ => None,
            })
            .collect();
        // 같은 줄이 두 번 전달되지 않는다
        assert_eq!(quote_batches, vec![1]);
    }
}
