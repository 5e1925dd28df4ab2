//! 연결 레지스트리 및 팬아웃.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use super::messages::ServerMessage;

/// 연결별 writer pump로 전달되는 아웃바운드 항목.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// 직렬화해 전송할 메시지
    Message(ServerMessage),
    /// 지정한 코드로 close 프레임 전송 후 소켓 종료
    Close(u16),
}

/// 구독 토픽.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Topic {
    /// 상태 브로드캐스트만
    #[default]
    Market,
    /// 호가 배치만 (상태 브로드캐스트는 전 연결 공통)
    Quotes,
    /// 전부
    All,
}

impl Topic {
    /// 이 토픽이 호가 배치를 수신하는지.
    pub fn wants_quotes(&self) -> bool {
        matches!(self, Topic::Quotes | Topic::All)
    }
}

impl FromStr for Topic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "market" => Ok(Topic::Market),
            "quotes" => Ok(Topic::Quotes),
            "all" => Ok(Topic::All),
            other => Err(format!("unknown topic: {other}")),
        }
    }
}

/// 등록된 연결 하나.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// 연결 ID
    pub id: Uuid,
    /// 구독 토픽
    pub topic: Topic,
    /// writer pump로 가는 채널
    pub tx: mpsc::UnboundedSender<Outbound>,
}

/// 연결 레지스트리.
///
/// 전송 실패한 연결은 같은 호출 안에서 즉시 제거됩니다 — 별도의
/// 정리 패스가 없고, 실패한 전송을 재시도하지 않습니다. 브로드캐스트와
/// 동시 register/unregister 사이의 순서는 보장하지 않습니다.
#[derive(Debug, Default)]
pub struct Broadcaster {
    connections: RwLock<HashMap<Uuid, ConnectionHandle>>,
}

/// 태스크 간 공유용 타입 별칭.
pub type SharedBroadcaster = Arc<Broadcaster>;

impl Broadcaster {
    /// 새 브로드캐스터 생성.
    pub fn new() -> Self {
        Self::default()
    }

    /// 공유 브로드캐스터 생성.
    pub fn shared() -> SharedBroadcaster {
        Arc::new(Self::new())
    }

    /// 연결 등록.
    pub async fn register(&self, handle: ConnectionHandle) {
        let id = handle.id;
        self.connections.write().await.insert(id, handle);
        debug!(%id, "WebSocket connection registered");
    }

    /// 연결 해제. 이미 제거된 연결이면 no-op.
    pub async fn unregister(&self, id: Uuid) {
        if self.connections.write().await.remove(&id).is_some() {
            debug!(%id, "WebSocket connection unregistered");
        }
    }

    /// 등록된 모든 연결에 메시지 전달.
    ///
    /// 채널이 닫힌 연결(writer pump 종료)은 이 호출 안에서 제거됩니다.
    pub async fn broadcast(&self, msg: &ServerMessage) {
        let mut connections = self.connections.write().await;
        let before = connections.len();
        connections.retain(|id, handle| {
            let ok = handle.tx.send(Outbound::Message(msg.clone())).is_ok();
            if !ok {
                warn!(%id, "Dropping connection with closed channel");
            }
            ok
        });
        let dropped = before - connections.len();
        if dropped > 0 {
            debug!(dropped, remaining = connections.len(), "Broadcast pruned dead connections");
        }
    }

    /// 특정 연결에만 메시지 전달. 실패 시 해당 연결을 제거하고 `false`.
    pub async fn send_to(&self, id: Uuid, msg: ServerMessage) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get(&id) {
            Some(handle) if handle.tx.send(Outbound::Message(msg)).is_ok() => true,
            Some(_) => {
                connections.remove(&id);
                warn!(%id, "Dropping connection with closed channel");
                false
            }
            None => false,
        }
    }

    /// 특정 연결에 close 프레임을 지시하고 레지스트리에서 제거.
    pub async fn close(&self, id: Uuid, code: u16) {
        let mut connections = self.connections.write().await;
        if let Some(handle) = connections.remove(&id) {
            let _ = handle.tx.send(Outbound::Close(code));
            debug!(%id, code, "WebSocket close requested");
        }
    }

    /// 현재 등록된 연결 수.
    pub async fn client_count(&self) -> usize {
        self.connections.read().await.len()
    }
}
