//! REST 조회용 제한된 최근 읽기.
//!
//! tail 커서와 달리 상태 없이 "파일 끝의 최근 N줄"만 읽습니다.
//! 큰 파일은 마지막 1MB 청크만 읽어 응답 시간을 제한합니다.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::record::QuoteRecord;

/// 큰 파일에서 읽을 꼬리 청크 크기.
const TAIL_CHUNK_BYTES: u64 = 1_000_000;

/// 데이터 디렉토리에서 가장 최근 NDJSON 파일 경로.
///
/// 파일명이 `live_YYYYMMDD.ndjson` 형식이므로 사전순 최대가 최신입니다.
/// 디렉토리가 없거나 비어 있으면 `None`.
pub fn latest_ndjson_path(data_dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(data_dir).ok()?;
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("live_") && n.ends_with(".ndjson"))
                .unwrap_or(false)
        })
        .max()
}

/// 파일 끝의 최근 `max_lines`줄.
///
/// 읽기 실패는 빈 결과로 흡수됩니다.
pub fn read_last_lines(path: &Path, max_lines: usize) -> Vec<String> {
    read_tail_text(path)
        .map(|text| {
            let lines: Vec<String> = text.lines().map(str::to_string).collect();
            let skip = lines.len().saturating_sub(max_lines);
            lines.into_iter().skip(skip).collect()
        })
        .unwrap_or_default()
}

/// 라인들을 호가 레코드로 파싱 (불일치 줄은 조용히 버림).
pub fn parse_rows(lines: &[String]) -> Vec<QuoteRecord> {
    lines
        .iter()
        .filter_map(|line| QuoteRecord::parse(line))
        .collect()
}

fn read_tail_text(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    if len > TAIL_CHUNK_BYTES {
        file.seek(SeekFrom::Start(len - TAIL_CHUNK_BYTES))?;
    }
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
