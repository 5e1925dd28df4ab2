//! 공용 인프라 크레이트.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - 환경변수 기반 설정 (`Settings`)
//! - tracing 기반 로깅 초기화

pub mod config;
pub mod logging;

pub use config::{FeeSettings, LiveSettings, ServerSettings, Settings};
pub use logging::{init_logging, init_logging_from_env, LogConfig, LogFormat};
