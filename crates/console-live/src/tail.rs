//! Append-only NDJSON 파일의 증분 tail.
//!
//! 커서(바이트 오프셋 + carryover)를 기준으로 새로 추가된 바이트만 읽어
//! 라인 단위로 분해합니다. 라인 분해는 순수 함수(`split_lines`)로 분리되어
//! I/O 없이 테스트할 수 있습니다.
//!
//! 실패 의미론: 어떤 I/O 에러도 전파되지 않습니다 — 해당 poll은 빈 배치를
//! 반환하고 커서는 그대로 유지됩니다.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, trace};

use crate::record::QuoteRecord;

/// Tail 커서.
///
/// 불변식: 같은 파일에 대해 `offset`은 단조 증가합니다. 활성 파일 경로가
/// 바뀌면 (일별 회전) offset 0, 빈 carryover로 리셋됩니다.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TailCursor {
    /// 현재 추적 중인 파일 경로
    pub path: Option<PathBuf>,
    /// 처리 완료된 바이트 오프셋
    pub offset: u64,
    /// 개행으로 끝나지 않은 마지막 조각 (다음 읽기에 접두됨)
    pub carryover: String,
}

/// carryover와 새 청크를 합쳐 완성된 라인들과 새 carryover로 분해. (순수 함수)
///
/// 청크가 개행으로 끝나지 않으면 마지막 조각은 라인에 포함되지 않고
/// carryover로 보류됩니다 — 쓰기 도중 관측된 불완전한 레코드를
/// 완성될 때까지 내보내지 않기 위함입니다.
pub fn split_lines(carryover: &str, chunk: &str) -> (Vec<String>, String) {
    let text = format!("{carryover}{chunk}");
    if text.is_empty() {
        return (Vec::new(), String::new());
    }

    let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();
    // split('\n')은 끝 개행 뒤에 빈 문자열을 남긴다. 마지막 요소는
    // 항상 "아직 끝나지 않은 조각"이므로 carryover가 된다.
    let carry = lines.pop().unwrap_or_default();
    (lines, carry)
}

/// NDJSON 증분 tailer.
///
/// tailer 자체는 상태가 없습니다 — 커서는 세션마다 하나씩 소유하며,
/// 여러 세션이 같은 파일을 독립적으로 읽습니다 (중복 읽기 허용,
/// 오프셋 경합 없음).
#[derive(Debug, Clone)]
pub struct LogTailer {
    data_dir: PathBuf,
    max_lines_per_batch: usize,
}

impl LogTailer {
    /// 새 tailer 생성.
    pub fn new(data_dir: impl Into<PathBuf>, max_lines_per_batch: usize) -> Self {
        Self {
            data_dir: data_dir.into(),
            max_lines_per_batch,
        }
    }

    /// 오늘 날짜(UTC)의 활성 파일 경로.
    pub fn active_path(&self) -> PathBuf {
        self.data_dir
            .join(format!("live_{}.ndjson", Utc::now().format("%Y%m%d")))
    }

    /// 활성 파일에서 새 레코드 poll.
    pub fn poll(&self, cursor: &mut TailCursor) -> Vec<QuoteRecord> {
        self.poll_path(&self.active_path(), cursor)
    }

    /// 지정한 경로에서 새 레코드 poll.
    ///
    /// 회전 시뮬레이션 및 테스트를 위해 경로를 직접 받습니다.
    pub fn poll_path(&self, active: &Path, cursor: &mut TailCursor) -> Vec<QuoteRecord> {
        // 로그 회전 감지: 날짜가 바뀌면 새 파일의 처음부터
        if cursor.path.as_deref() != Some(active) {
            debug!(path = %active.display(), "Tail target changed, resetting cursor");
            cursor.path = Some(active.to_path_buf());
            cursor.offset = 0;
            cursor.carryover.clear();
        }

        let (chunk, new_offset) = match read_from(active, cursor.offset) {
            Ok(Some(read)) => read,
            // 새 바이트 없음, 또는 읽기 실패 - 커서 유지, 빈 배치
            Ok(None) => return Vec::new(),
            Err(err) => {
                trace!(path = %active.display(), error = %err, "Tail read failed, skipping poll");
                return Vec::new();
            }
        };

        let (mut lines, carry) = split_lines(&cursor.carryover, &chunk);
        cursor.offset = new_offset;
        cursor.carryover = carry;

        // 과잉 배치는 최근 N줄만 유지 (오래된 줄은 버퍼링 없이 폐기) -
        // 프레임 크기와 메모리를 의도적으로 제한하는 backpressure 정책
        if lines.len() > self.max_lines_per_batch {
            let drop = lines.len() - self.max_lines_per_batch;
            lines.drain(..drop);
        }

        lines
            .iter()
            .filter_map(|line| QuoteRecord::parse(line))
            .collect()
    }
}

/// `offset` 이후의 바이트를 읽는다. 새 바이트가 없으면 `None`.
fn read_from(path: &Path, offset: u64) -> std::io::Result<Option<(String, u64)>> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    if len <= offset {
        return Ok(None);
    }

    file.seek(SeekFrom::Start(offset))?;
    let mut buf = Vec::with_capacity((len - offset) as usize);
    file.take(len - offset).read_to_end(&mut buf)?;

    Ok(Some((String::from_utf8_lossy(&buf).into_owned(), len)))
}
