//! 수집기가 기록하는 호가 레코드.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// NDJSON 로그의 호가 레코드.
///
/// `"type": "quote"` 판별자와 `venue`/`mid` 필수 필드를 가진 객체만
/// 레코드로 인정됩니다. 수집기가 추가하는 그 외 필드는 `extra`에
/// 보존되어 구독자에게 원형 그대로 전달됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRecord {
    /// 판별자 필드 (항상 "quote")
    #[serde(rename = "type")]
    pub kind: String,
    /// 베뉴 이름
    pub venue: String,
    /// 중간가
    pub mid: f64,
    /// 수집 시각 (epoch 밀리초)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<f64>,
    /// 거래쌍 (수집기가 포함하는 경우)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pair: Option<String>,
    /// 나머지 필드 (원형 보존)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl QuoteRecord {
    /// NDJSON 한 줄을 파싱.
    ///
    /// 파싱 실패나 스키마 불일치는 에러가 아니라 `None`입니다 —
    /// 호출자는 해당 줄을 조용히 버립니다.
    pub fn parse(line: &str) -> Option<Self> {
        let record: QuoteRecord = serde_json::from_str(line.trim()).ok()?;
        (record.kind == "quote").then_some(record)
    }
}
