//! 마샬러 에러 타입
//!
//! [`MarshallerError`]는 필터 구성, 이벤트 기록 등 재조립 계층의 모든 에러를 표현합니다.
//! `From<MarshallerError> for AuditpostError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use auditpost_core::error::{AuditpostError, MarshalError, SinkError};

/// 재조립 계층 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum MarshallerError {
    /// 필터 정규식 컴파일 실패
    #[error("filter compile error: filters[{index}]: {reason}")]
    FilterCompile {
        /// 설정 내 필터 위치
        index: usize,
        /// 실패 사유
        reason: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 이벤트 인코딩 실패
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// 모든 시도가 실패함. 호출자는 프로세스를 종료해야 합니다
    #[error("write failed after {attempts} attempts: {source}")]
    WriteExhausted {
        /// 시도 횟수
        attempts: usize,
        /// 마지막 에러
        source: SinkError,
    },

    /// 싱크가 이미 종료됨
    #[error("sink closed")]
    SinkClosed,
}

impl MarshallerError {
    /// 프로세스 종료가 필요한 에러인지 확인합니다.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::WriteExhausted { .. } | Self::SinkClosed)
    }
}

impl From<MarshallerError> for AuditpostError {
    fn from(err: MarshallerError) -> Self {
        match err {
            MarshallerError::SinkClosed => AuditpostError::Sink(SinkError::Closed),
            MarshallerError::WriteExhausted { .. } => {
                AuditpostError::Marshal(MarshalError::WriteFailed(err.to_string()))
            }
            other => AuditpostError::Marshal(MarshalError::Filter(other.to_string())),
        }
    }
}
