//! 베뉴 간 순스프레드 계산.

use std::collections::HashMap;

use console_core::config::FeeSettings;
use serde::Serialize;

use crate::record::QuoteRecord;

/// 수수료 반영 후 최고 스프레드 기회.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopSpread {
    /// 매수 레그 베뉴
    pub buy_venue: String,
    /// 매도 레그 베뉴
    pub sell_venue: String,
    /// 수수료/헤어컷 차감 후 순스프레드 (bps)
    pub spread_bps: f64,
    /// 매수 베뉴 중간가
    pub mid_buy: f64,
    /// 매도 베뉴 중간가
    pub mid_sell: f64,
    /// 계산 시각 (epoch 밀리초)
    pub ts: f64,
}

/// 최근 호가에서 최고 순스프레드를 찾는다.
///
/// 베뉴마다 lookback 안의 가장 최신 호가 하나만 쓰고, 모든 순서쌍
/// (매수 베뉴 != 매도 베뉴)에 대해 수수료 반영 가격으로 비교합니다:
///
/// ```text
/// nb = mid_buy  * (1 + (fee_buy  + haircut) / 1e4)
/// ns = mid_sell * (1 - (fee_sell + haircut) / 1e4)
/// spread_bps = (ns - nb) / mid_buy * 1e4
/// ```
///
/// 순스프레드가 양수인 쌍이 없으면 `None`. `ts` 없는 호가는
/// 신선한 것으로 취급합니다 (수집기가 시각을 생략하는 경우).
/// 결과의 `ts`는 계산 시각(`now_ms`)입니다.
pub fn top_spread(
    rows: &[QuoteRecord],
    fees: &FeeSettings,
    lookback_ms: f64,
    now_ms: f64,
) -> Option<TopSpread> {
    // 베뉴별 최신 호가 (나중 줄이 우선)
    let mut latest: HashMap<&str, &QuoteRecord> = HashMap::new();
    for row in rows {
        if row.mid <= 0.0 {
            continue;
        }
        if let Some(ts) = row.ts {
            if now_ms - ts > lookback_ms {
                continue;
            }
        }
        match latest.get(row.venue.as_str()) {
            Some(prev) if row.ts.unwrap_or(0.0) < prev.ts.unwrap_or(0.0) => {}
            _ => {
                latest.insert(row.venue.as_str(), row);
            }
        }
    }

    let mut best: Option<TopSpread> = None;
    for (buy_venue, buy) in &latest {
        for (sell_venue, sell) in &latest {
            if buy_venue == sell_venue {
                continue;
            }
            let nb = buy.mid * (1.0 + (fees.fee_for(buy_venue) + fees.haircut_bps) / 1e4);
            let ns = sell.mid * (1.0 - (fees.fee_for(sell_venue) + fees.haircut_bps) / 1e4);
            let spread_bps = (ns - nb) / buy.mid * 1e4;
            if spread_bps <= 0.0 {
                continue;
            }
            if best.as_ref().map(|b| spread_bps > b.spread_bps).unwrap_or(true) {
                best = Some(TopSpread {
                    buy_venue: (*buy_venue).to_string(),
                    sell_venue: (*sell_venue).to_string(),
                    spread_bps,
                    mid_buy: buy.mid,
                    mid_sell: sell.mid,
                    ts: now_ms,
                });
            }
        }
    }
    best
}
