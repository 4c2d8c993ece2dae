//! auditpost 출력 크레이트
//!
//! [`Sink`](auditpost_core::pipeline::Sink) trait의 구현체와 설정 기반 생성기를 제공합니다.
//!
//! # 모듈 구성
//!
//! - [`file`]: 추가 모드 파일 싱크 (로그 로테이션 시 reopen)
//! - [`stdout`]: 표준 출력 싱크
//! - [`http`]: 제한 큐 + 워커 풀 + 회로 차단기 기반 HTTP 비동기 싱크
//! - [`registry`]: `OutputKind` -> 싱크 생성
//! - [`error`]: 도메인 에러 타입

pub mod error;
pub mod file;
pub mod http;
pub mod registry;
pub mod stdout;

// --- 주요 타입 re-export ---

// 에러
pub use error::OutputError;

// 싱크
pub use file::FileSink;
pub use http::{
    BodyTransformer, GuardedTransport, HttpSink, ReqwestTransport, with_circuit_breaker,
};
pub use stdout::StdoutSink;

// 생성기
pub use registry::{BuiltSink, build_sink};
