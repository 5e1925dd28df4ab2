//! WebSocket 와이어 메시지 타입.

use chrono::Utc;
use console_live::QuoteRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 서버에서 클라이언트로 보내는 메시지.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// 수집기 상태 스냅샷 (모든 연결에 브로드캐스트)
    #[serde(rename = "liveStatus")]
    LiveStatus {
        /// 스냅샷 내용 (읽기 실패 시 null)
        status: Option<Value>,
        /// 읽은 시각 (RFC 3339)
        #[serde(rename = "lastUpdated")]
        last_updated: String,
    },
    /// 새 호가 배치 (구독한 연결에만)
    #[serde(rename = "quotes")]
    Quotes {
        /// 행 수
        count: usize,
        /// 호가 레코드 (수신 원형 그대로)
        rows: Vec<QuoteRecord>,
    },
    /// 연결 유지 확인 요청
    #[serde(rename = "ping")]
    Ping {
        /// 서버 시각 (RFC 3339)
        ts: String,
    },
}

impl ServerMessage {
    /// 상태 스냅샷 메시지 생성.
    pub fn live_status(status: Option<Value>) -> Self {
        ServerMessage::LiveStatus {
            status,
            last_updated: Utc::now().to_rfc3339(),
        }
    }

    /// 호가 배치 메시지 생성.
    pub fn quotes(rows: Vec<QuoteRecord>) -> Self {
        ServerMessage::Quotes {
            count: rows.len(),
            rows,
        }
    }

    /// ping 메시지 생성.
    pub fn ping() -> Self {
        ServerMessage::Ping {
            ts: Utc::now().to_rfc3339(),
        }
    }

    /// JSON 문자열로 직렬화.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// 클라이언트에서 서버로 보내는 메시지.
///
/// pong 외의 모든 인바운드 형태는 프로토콜 위반이 아니라 무시 대상입니다.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// ping에 대한 생존 응답
    Pong {
        /// 클라이언트 시각 (선택적)
        #[serde(default)]
        ts: Option<String>,
    },
}

impl ClientMessage {
    /// JSON 문자열에서 파싱. 인식하지 못하는 형태는 `None`.
    pub fn from_json(json: &str) -> Option<Self> {
        serde_json::from_str(json).ok()
    }
}
