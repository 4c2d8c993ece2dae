//! auditpost 재조립 크레이트
//!
//! 커널 감사 레코드를 이벤트 단위로 재조립하고, 필터 규칙을 적용한 뒤
//! JSON Lines로 인코딩해 출력 싱크에 기록합니다.
//!
//! # 모듈 구성
//!
//! - [`parser`]: 원시 레코드 헤더 파싱, 그룹 생성
//! - [`reassembler`]: 재조립기 ([`AuditMarshaller`])
//! - [`filter`]: syscall / rule key 2단계 필터 엔진
//! - [`sequence`]: 시퀀스 누락/역순 추적
//! - [`writer`]: 재시도하는 JSON Lines 기록기
//! - [`config`]: 재조립기 설정 (core 설정에서 파생)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! RawRecord -> AuditMarshaller -> FilterEngine -> ReliableWriter -> Sink
//!                  |                   |                |
//!          SequenceTracker     syscall/rule key    JSON Lines + retry
//! ```

pub mod config;
pub mod error;
pub mod filter;
pub mod parser;
pub mod reassembler;
pub mod sequence;
pub mod writer;

// --- 주요 타입 re-export ---

// 재조립기
pub use reassembler::AuditMarshaller;

// 설정
pub use config::{MarshallerConfig, MarshallerConfigBuilder};

// 에러
pub use error::MarshallerError;

// 필터
pub use filter::{FilterEngine, FilterRule};

// 시퀀스 추적
pub use sequence::{SequenceReport, SequenceTracker};

// 기록기
pub use writer::{JsonLinesEncoder, ReliableWriter};
