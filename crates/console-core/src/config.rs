//! 환경변수 기반 설정 모듈.
//!
//! 모든 설정은 환경변수에서 읽고, 값이 없으면 기본값을 사용합니다.
//! `.env` 파일은 바이너리 진입점에서 `dotenvy::dotenv()`로 로드합니다.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

/// 환경변수 파싱 헬퍼. 값이 없거나 파싱에 실패하면 기본값 사용.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// 애플리케이션 전체 설정.
#[derive(Debug, Clone)]
pub struct Settings {
    /// API 서버 설정
    pub server: ServerSettings,
    /// 실시간 데이터 스트리밍 설정
    pub live: LiveSettings,
    /// 스프레드 계산용 수수료 설정
    pub fees: FeeSettings,
}

impl Settings {
    /// 환경변수에서 전체 설정 로드.
    pub fn from_env() -> Self {
        Self {
            server: ServerSettings::from_env(),
            live: LiveSettings::from_env(),
            fees: FeeSettings::from_env(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            live: LiveSettings::default(),
            fees: FeeSettings::default(),
        }
    }
}

/// 서버 바인딩 설정.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// 바인딩할 호스트
    pub host: String,
    /// 리스닝할 포트
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl ServerSettings {
    /// 환경변수에서 로드 (`API_HOST`, `API_PORT`).
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: env_or("API_PORT", defaults.port),
        }
    }
}

/// 실시간 데이터 스트리밍 설정.
///
/// 외부 수집기 프로세스가 기록하는 NDJSON 파일과 상태 스냅샷 파일의
/// 위치, 그리고 WebSocket 세션 루프의 주기 파라미터를 담습니다.
#[derive(Debug, Clone)]
pub struct LiveSettings {
    /// 수집기 출력 디렉토리 (일별 `live_YYYYMMDD.ndjson` + 상태 파일)
    pub data_dir: PathBuf,
    /// 상태 스냅샷 파일명
    pub status_file: String,
    /// 세션 루프 주기 (초)
    pub broadcast_interval_secs: u64,
    /// ping 후 인바운드 메시지 대기 시간 (밀리초)
    pub ping_interval_ms: u64,
    /// 마지막 pong 이후 허용되는 무응답 시간 (밀리초)
    pub pong_timeout_ms: u64,
    /// poll당 전달할 최대 라인 수 (초과분은 오래된 것부터 버림)
    pub max_lines_per_batch: usize,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            status_file: "ws_status.json".to_string(),
            broadcast_interval_secs: 2,
            ping_interval_ms: 15_000,
            pong_timeout_ms: 10_000,
            max_lines_per_batch: 100,
        }
    }
}

impl LiveSettings {
    /// 환경변수에서 로드.
    ///
    /// - `LIVE_DATA_DIR`: 수집기 출력 디렉토리
    /// - `WS_BROADCAST_INTERVAL`: 세션 루프 주기 (초)
    /// - `WS_PING_INTERVAL_MS` / `WS_PONG_TIMEOUT_MS`: liveness 파라미터
    /// - `WS_MAX_LINES_PER_BATCH`: 배치당 최대 라인 수
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            data_dir: std::env::var("LIVE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            status_file: std::env::var("LIVE_STATUS_FILE").unwrap_or(defaults.status_file),
            broadcast_interval_secs: env_or(
                "WS_BROADCAST_INTERVAL",
                defaults.broadcast_interval_secs,
            ),
            ping_interval_ms: env_or("WS_PING_INTERVAL_MS", defaults.ping_interval_ms),
            pong_timeout_ms: env_or("WS_PONG_TIMEOUT_MS", defaults.pong_timeout_ms),
            max_lines_per_batch: env_or("WS_MAX_LINES_PER_BATCH", defaults.max_lines_per_batch),
        }
    }

    /// 상태 스냅샷 파일 경로.
    pub fn status_path(&self) -> PathBuf {
        self.data_dir.join(&self.status_file)
    }
}

/// 스프레드 계산용 수수료/헤어컷 설정 (bps).
#[derive(Debug, Clone)]
pub struct FeeSettings {
    /// 양쪽 레그에 공통 적용되는 보수적 헤어컷
    pub haircut_bps: f64,
    /// 베뉴별 수수료 (미등록 베뉴는 0 취급)
    pub venue_bps: HashMap<String, f64>,
}

impl Default for FeeSettings {
    fn default() -> Self {
        let mut venue_bps = HashMap::new();
        venue_bps.insert("HYPERSWAP".to_string(), 30.0);
        venue_bps.insert("PRJX".to_string(), 30.0);
        venue_bps.insert("HYBRA".to_string(), 30.0);
        Self {
            haircut_bps: 10.0,
            venue_bps,
        }
    }
}

impl FeeSettings {
    /// 환경변수에서 로드.
    ///
    /// - `LIVE_HAIRCUT_BPS`: 공통 헤어컷
    /// - `FEE_BPS_HYPERSWAP` / `FEE_BPS_PRJX` / `FEE_BPS_HYBRA`: 베뉴별 수수료
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mut venue_bps = HashMap::new();
        for venue in ["HYPERSWAP", "PRJX", "HYBRA"] {
            let default = defaults.venue_bps.get(venue).copied().unwrap_or(0.0);
            venue_bps.insert(
                venue.to_string(),
                env_or(&format!("FEE_BPS_{}", venue), default),
            );
        }
        Self {
            haircut_bps: env_or("LIVE_HAIRCUT_BPS", defaults.haircut_bps),
            venue_bps,
        }
    }

    /// 수수료/헤어컷이 전혀 없는 설정.
    pub fn zero() -> Self {
        Self {
            haircut_bps: 0.0,
            venue_bps: HashMap::new(),
        }
    }

    /// 베뉴별 수수료 조회. 미등록 베뉴는 0.
    pub fn fee_for(&self, venue: &str) -> f64 {
        self.venue_bps.get(venue).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.live.broadcast_interval_secs, 2);
        assert_eq!(settings.live.ping_interval_ms, 15_000);
        assert_eq!(settings.live.pong_timeout_ms, 10_000);
        assert_eq!(settings.live.max_lines_per_batch, 100);
    }

    #[test]
    fn test_status_path() {
        let live = LiveSettings::default();
        assert_eq!(live.status_path(), PathBuf::from("data/ws_status.json"));
    }

    #[test]
    fn test_fee_lookup() {
        let fees = FeeSettings::default();
        assert_eq!(fees.fee_for("HYPERSWAP"), 30.0);
        assert_eq!(fees.fee_for("UNKNOWN"), 0.0);
        assert_eq!(fees.haircut_bps, 10.0);

        let zero = FeeSettings::zero();
        assert_eq!(zero.fee_for("HYPERSWAP"), 0.0);
        assert_eq!(zero.haircut_bps, 0.0);
    }
}
