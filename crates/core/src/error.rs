//! 에러 타입 — 도메인별 에러 정의

/// auditpost 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum AuditpostError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 이벤트 재조립/필터링 에러
    #[error("marshal error: {0}")]
    Marshal(#[from] MarshalError),

    /// 출력 싱크 에러
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// 파싱 에러
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 재조립/필터/기록 계층 에러
#[derive(Debug, thiserror::Error)]
pub enum MarshalError {
    /// 필터 규칙 구성 실패
    #[error("filter error: {0}")]
    Filter(String),

    /// 재시도 후에도 기록 실패 (치명적)
    #[error("write failed: {0}")]
    WriteFailed(String),
}

/// 출력 싱크 에러
///
/// [`Sink`](crate::pipeline::Sink) 구현체가 반환합니다.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// 이미 닫힌 싱크에 기록 시도 (종료 경로)
    #[error("sink closed")]
    Closed,

    /// 기록 실패
    #[error("sink write failed: {0}")]
    Write(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SinkError {
    /// 종료 상태 에러인지 확인합니다. 종료 상태는 재시도 대상이 아닙니다.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// 파싱 에러
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// 레코드 헤더 형식 오류
    #[error("malformed record: {0}")]
    Malformed(String),

    /// 알 수 없는 레코드 타입
    #[error("unknown record type: {0}")]
    UnknownType(String),

    /// 입력 데이터 초과
    #[error("input too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_closed_is_terminal() {
        assert!(SinkError::Closed.is_closed());
        assert!(!SinkError::Write("boom".to_owned()).is_closed());
    }

    #[test]
    fn config_error_display() {
        let err = ConfigError::InvalidValue {
            field: "output.attempts".to_owned(),
            reason: "must be at least 1".to_owned(),
        };
        assert!(err.to_string().contains("output.attempts"));
    }

    #[test]
    fn sink_error_converts_to_top_level() {
        let err: AuditpostError = SinkError::Closed.into();
        assert!(matches!(err, AuditpostError::Sink(SinkError::Closed)));
    }
}
