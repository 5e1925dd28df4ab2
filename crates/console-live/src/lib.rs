//! 실시간 시장 데이터 파일 처리.
//!
//! 외부 수집기 프로세스가 기록하는 파일을 읽기 전용으로 소비합니다:
//! - 일별 회전하는 append-only NDJSON 호가 로그 (`live_YYYYMMDD.ndjson`)
//! - 단일 상태 스냅샷 파일 (`ws_status.json`)
//!
//! 이 크레이트는 절대 쓰기/잠금을 하지 않으며, 읽기 실패는 모두
//! 빈 결과로 흡수됩니다 — 파일 장애가 스트리밍 루프를 죽이면 안 됩니다.

pub mod record;
pub mod recent;
pub mod spread;
pub mod status;
pub mod tail;

pub use record::QuoteRecord;
pub use recent::{latest_ndjson_path, parse_rows, read_last_lines};
pub use spread::{top_spread, TopSpread};
pub use status::StatusReader;
pub use tail::{split_lines, LogTailer, TailCursor};
