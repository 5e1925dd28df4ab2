//! 수집기 상태 스냅샷 파일 읽기.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::trace;

/// 상태 스냅샷 파일(`ws_status.json`) 리더.
///
/// 수집기가 통째로 덮어쓰는 단일 JSON 문서를 읽습니다. 스키마를
/// 해석하지 않고 원형 그대로 전달하며, 파일 부재/파싱 실패는
/// 모두 `None`입니다 — 쓰기 도중의 찢어진 읽기도 같은 방식으로
/// 흡수되어 다음 주기에 자연히 복구됩니다.
#[derive(Debug, Clone)]
pub struct StatusReader {
    path: PathBuf,
}

impl StatusReader {
    /// 새 리더 생성.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 스냅샷 파일 경로.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 현재 스냅샷 읽기.
    pub fn read(&self) -> Option<Value> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) => {
                trace!(path = %self.path.display(), error = %err, "Status snapshot unavailable");
                return None;
            }
        };
        serde_json::from_str(&text).ok()
    }
}
