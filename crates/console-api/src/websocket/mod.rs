//! WebSocket 스트리밍 레이어.
//!
//! 연결 레지스트리(`Broadcaster`), 연결별 세션 루프(`StreamSession`),
//! 와이어 메시지 타입, axum 핸들러로 구성됩니다.

pub mod broadcaster;
pub mod handler;
pub mod messages;
pub mod session;

pub use broadcaster::{Broadcaster, ConnectionHandle, Outbound, SharedBroadcaster, Topic};
pub use handler::{websocket_router, AllowAll, TokenValidator, WsState};
pub use messages::{ClientMessage, ServerMessage};
pub use session::{SessionConfig, SessionEnd, StreamSession};
