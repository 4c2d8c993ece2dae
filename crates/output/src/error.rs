//! 출력 계층 에러 타입
//!
//! [`OutputError`]는 싱크 생성과 HTTP 전송 준비 과정의 에러를 표현합니다.
//! 실행 중 기록 에러는 core의 [`SinkError`]로 보고됩니다.

use auditpost_core::error::{AuditpostError, ConfigError, SinkError};

/// 출력 계층 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 출력 파일 열기/권한 설정 실패
    #[error("failed to open output file '{path}': {source}")]
    FileOpen {
        /// 파일 경로
        path: String,
        /// 원인
        source: std::io::Error,
    },

    /// HTTP 클라이언트 생성 실패
    #[error("http client error: {0}")]
    HttpClient(String),

    /// TLS 인증서/키 로딩 실패
    #[error("tls material '{path}' could not be loaded: {reason}")]
    Tls {
        /// 파일 경로
        path: String,
        /// 에러 사유
        reason: String,
    },

    /// tokio 런타임 밖에서 비동기 싱크 시작 시도
    #[error("async sink requires a tokio runtime: {0}")]
    Runtime(String),

    /// 알 수 없는 본문 변환기
    #[error("unknown body transformer '{0}'")]
    UnknownTransformer(String),
}

impl From<OutputError> for AuditpostError {
    fn from(err: OutputError) -> Self {
        match err {
            OutputError::Config { field, reason } => {
                AuditpostError::Config(ConfigError::InvalidValue { field, reason })
            }
            OutputError::UnknownTransformer(name) => {
                AuditpostError::Config(ConfigError::InvalidValue {
                    field: "output.http.transformer".to_owned(),
                    reason: format!("unknown transformer '{name}'"),
                })
            }
            OutputError::Tls { path, reason } => AuditpostError::Config(ConfigError::InvalidValue {
                field: "output.http.tls".to_owned(),
                reason: format!("{path}: {reason}"),
            }),
            OutputError::FileOpen { source, .. } => AuditpostError::Sink(SinkError::Io(source)),
            OutputError::HttpClient(reason) | OutputError::Runtime(reason) => {
                AuditpostError::Sink(SinkError::Write(reason))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_open_display_includes_path() {
        let err = OutputError::FileOpen {
            path: "/var/log/auditpost/audit.log".to_owned(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("/var/log/auditpost/audit.log"));
    }

    #[test]
    fn transformer_error_becomes_config_error() {
        let err: AuditpostError = OutputError::UnknownTransformer("gzip".to_owned()).into();
        assert!(matches!(
            err,
            AuditpostError::Config(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn tls_error_becomes_config_error() {
        let err: AuditpostError = OutputError::Tls {
            path: "/etc/auditpost/ca.pem".to_owned(),
            reason: "no certificate found".to_owned(),
        }
        .into();
        assert!(err.to_string().contains("/etc/auditpost/ca.pem"));
        assert!(matches!(
            err,
            AuditpostError::Config(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn file_open_becomes_sink_io() {
        let err: AuditpostError = OutputError::FileOpen {
            path: "x".to_owned(),
            source: std::io::Error::other("boom"),
        }
        .into();
        assert!(matches!(err, AuditpostError::Sink(SinkError::Io(_))));
    }
}
