//! auditpost 공통 크레이트
//!
//! 커널 감사 레코드 재조립기와 출력 싱크가 공유하는 타입, trait, 에러, 설정을 제공합니다.
//!
//! - [`types`]: 원시 레코드, 감사 메시지, 메시지 그룹
//! - [`pipeline`]: 출력 [`Sink`] trait
//! - [`config`]: `auditpost.toml` 설정
//! - [`error`]: 도메인 에러
//! - [`metrics`]: 메트릭 이름 상수

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{AuditpostError, ConfigError, MarshalError, ParseError, SinkError};

// 설정
pub use config::{AuditpostConfig, FilterAction, FilterConfig, OutputKind};

// 파이프라인 trait
pub use pipeline::Sink;

// 도메인 타입
pub use types::{
    AuditMessage, AuditMessageGroup, EVENT_EOE, EVENT_SYSCALL, EventDocument, RawRecord,
};
