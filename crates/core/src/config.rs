//! 설정 관리 — auditpost.toml 파싱 및 런타임 설정
//!
//! [`AuditpostConfig`]는 모든 구성 요소의 설정을 담는 최상위 구조체입니다.
//! 로딩 후에는 불변 값으로 각 구성 요소의 생성자에 전달됩니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`AUDITPOST_OUTPUT_KIND=http` 형식)
//! 3. 설정 파일 (`auditpost.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), auditpost_core::error::AuditpostError> {
//! use auditpost_core::config::AuditpostConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = AuditpostConfig::load("auditpost.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = AuditpostConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AuditpostError, ConfigError};

/// auditpost 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditpostConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 관심 이벤트 범위 및 재조립 타이밍
    #[serde(default)]
    pub events: EventsConfig,
    /// 시퀀스 추적 설정
    #[serde(default)]
    pub message_tracking: MessageTrackingConfig,
    /// 필터 규칙 (설정 순서가 매칭 우선순위)
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
    /// 출력 설정
    #[serde(default)]
    pub output: OutputConfig,
    /// Prometheus 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl AuditpostConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, AuditpostError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, AuditpostError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AuditpostError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                AuditpostError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, AuditpostError> {
        toml::from_str(toml_str).map_err(|e| {
            AuditpostError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `AUDITPOST_{SECTION}_{FIELD}`
    /// 필터 목록은 파일로만 설정합니다.
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "AUDITPOST_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "AUDITPOST_GENERAL_LOG_FORMAT");

        // Events
        override_parse(&mut self.events.min, "AUDITPOST_EVENTS_MIN");
        override_parse(&mut self.events.max, "AUDITPOST_EVENTS_MAX");
        override_parse(
            &mut self.events.complete_after_ms,
            "AUDITPOST_EVENTS_COMPLETE_AFTER_MS",
        );
        override_parse(
            &mut self.events.flush_interval_ms,
            "AUDITPOST_EVENTS_FLUSH_INTERVAL_MS",
        );

        // Message tracking
        override_parse(
            &mut self.message_tracking.enabled,
            "AUDITPOST_MESSAGE_TRACKING_ENABLED",
        );
        override_parse(
            &mut self.message_tracking.log_out_of_order,
            "AUDITPOST_MESSAGE_TRACKING_LOG_OUT_OF_ORDER",
        );
        override_parse(
            &mut self.message_tracking.max_out_of_order,
            "AUDITPOST_MESSAGE_TRACKING_MAX_OUT_OF_ORDER",
        );

        // Output
        override_parse(&mut self.output.kind, "AUDITPOST_OUTPUT_KIND");
        override_parse(&mut self.output.attempts, "AUDITPOST_OUTPUT_ATTEMPTS");
        override_string(&mut self.output.file.path, "AUDITPOST_OUTPUT_FILE_PATH");
        override_parse(&mut self.output.file.mode, "AUDITPOST_OUTPUT_FILE_MODE");
        override_string(&mut self.output.http.url, "AUDITPOST_OUTPUT_HTTP_URL");
        override_parse(
            &mut self.output.http.buffer_size,
            "AUDITPOST_OUTPUT_HTTP_BUFFER_SIZE",
        );
        override_parse(
            &mut self.output.http.worker_count,
            "AUDITPOST_OUTPUT_HTTP_WORKER_COUNT",
        );
        override_parse(
            &mut self.output.http.failure_ratio,
            "AUDITPOST_OUTPUT_HTTP_FAILURE_RATIO",
        );
        override_string(
            &mut self.output.http.trace_header_name,
            "AUDITPOST_OUTPUT_HTTP_TRACE_HEADER_NAME",
        );
        override_string(
            &mut self.output.http.transformer,
            "AUDITPOST_OUTPUT_HTTP_TRANSFORMER",
        );
        override_parse(&mut self.output.http.debug, "AUDITPOST_OUTPUT_HTTP_DEBUG");
        override_parse(
            &mut self.output.http.tls.enabled,
            "AUDITPOST_OUTPUT_HTTP_TLS_ENABLED",
        );
        override_string(
            &mut self.output.http.tls.ca_cert,
            "AUDITPOST_OUTPUT_HTTP_TLS_CA_CERT",
        );
        override_string(
            &mut self.output.http.tls.client_cert,
            "AUDITPOST_OUTPUT_HTTP_TLS_CLIENT_CERT",
        );
        override_string(
            &mut self.output.http.tls.client_key,
            "AUDITPOST_OUTPUT_HTTP_TLS_CLIENT_KEY",
        );

        // Metrics
        override_parse(&mut self.metrics.enabled, "AUDITPOST_METRICS_ENABLED");
        override_string(
            &mut self.metrics.listen_addr,
            "AUDITPOST_METRICS_LISTEN_ADDR",
        );
        override_parse(&mut self.metrics.port, "AUDITPOST_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), AuditpostError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.events.min > self.events.max {
            return Err(invalid(
                "events.min",
                format!(
                    "min ({}) must not exceed max ({})",
                    self.events.min, self.events.max
                ),
            ));
        }

        if self.events.flush_interval_ms == 0 {
            return Err(invalid("events.flush_interval_ms", "must be greater than 0"));
        }

        for (idx, filter) in self.filters.iter().enumerate() {
            if filter.syscall.is_empty() && filter.key.is_empty() {
                return Err(invalid(
                    &format!("filters[{idx}]"),
                    "either syscall or key must be set",
                ));
            }
            if filter.regex.is_empty() {
                return Err(invalid(&format!("filters[{idx}].regex"), "must not be empty"));
            }
        }

        if self.output.attempts == 0 {
            return Err(invalid("output.attempts", "must be at least 1"));
        }

        match self.output.kind {
            OutputKind::File => {
                if self.output.file.path.is_empty() {
                    return Err(invalid("output.file.path", "must not be empty"));
                }
                if self.output.file.mode == 0 {
                    return Err(invalid("output.file.mode", "must be greater than 0000"));
                }
            }
            OutputKind::Http => self.output.http.validate()?,
            OutputKind::Stdout => {}
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> AuditpostError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 관심 이벤트 타입 범위 및 재조립 타이밍
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// 관심 대상 최소 레코드 타입
    pub min: u16,
    /// 관심 대상 최대 레코드 타입
    pub max: u16,
    /// 그룹 생성 후 종료 마커 없이 완료되기까지의 시간 (밀리초)
    pub complete_after_ms: u64,
    /// 입력이 없을 때 기한 만료 그룹을 점검하는 주기 (밀리초)
    pub flush_interval_ms: u64,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            min: 1300,
            max: 1399,
            complete_after_ms: 2000,
            flush_interval_ms: 1000,
        }
    }
}

/// 시퀀스 누락/역순 추적 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageTrackingConfig {
    /// 추적 활성화 여부
    pub enabled: bool,
    /// 역순 도착을 로그로 남길지 여부
    pub log_out_of_order: bool,
    /// 허용하는 최대 역순 거리 (이보다 멀면 유실로 간주)
    pub max_out_of_order: u32,
}

impl Default for MessageTrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_out_of_order: false,
            max_out_of_order: 500,
        }
    }
}

/// 필터 동작
///
/// 두 가지 결과만 존재합니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterAction {
    /// 이벤트를 출력으로 보냄
    #[default]
    Keep,
    /// 이벤트를 버림
    #[serde(alias = "discard")]
    Drop,
}

impl FilterAction {
    /// 버림 결정인지 확인합니다.
    pub fn is_drop(self) -> bool {
        self == Self::Drop
    }
}

/// 단일 필터 규칙 설정
///
/// `syscall`이 비어 있으면 `key`가 기본 키가 되며, 이때 `message_type`은 사용하지 않습니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// syscall 번호 문자열 (예: "59")
    pub syscall: String,
    /// 메시지 타입 (syscall 규칙 전용, 0이면 타입 무관)
    pub message_type: u16,
    /// 감사 규칙 키
    pub key: String,
    /// 정규식
    pub regex: String,
    /// 매칭 시 동작
    pub action: FilterAction,
}

/// 출력 종류
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// 파일 (로그 로테이션 지원)
    #[default]
    File,
    /// 표준 출력
    Stdout,
    /// HTTP 비동기 전송
    Http,
}

impl std::str::FromStr for OutputKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(Self::File),
            "stdout" => Ok(Self::Stdout),
            "http" => Ok(Self::Http),
            other => Err(format!("unknown output kind '{other}'")),
        }
    }
}

impl std::fmt::Display for OutputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Stdout => write!(f, "stdout"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// 출력 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// 출력 종류
    pub kind: OutputKind,
    /// 기록 시도 횟수 (1 이상)
    pub attempts: usize,
    /// 파일 출력 설정
    pub file: FileOutputConfig,
    /// HTTP 출력 설정
    pub http: HttpOutputConfig,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            kind: OutputKind::File,
            attempts: 3,
            file: FileOutputConfig::default(),
            http: HttpOutputConfig::default(),
        }
    }
}

/// 파일 출력 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileOutputConfig {
    /// 출력 파일 경로
    pub path: String,
    /// 파일 권한 (8진수, 예: 0o600 = 384)
    pub mode: u32,
}

impl Default for FileOutputConfig {
    fn default() -> Self {
        Self {
            path: "/var/log/auditpost/audit.log".to_owned(),
            mode: 0o600,
        }
    }
}

/// HTTP 출력 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpOutputConfig {
    /// 전송 대상 URL
    pub url: String,
    /// 큐 용량
    pub buffer_size: usize,
    /// 워커 수
    pub worker_count: usize,
    /// 회로 차단기 실패 비율 임계값 (0, 1]
    pub failure_ratio: f64,
    /// 차단기가 열린 뒤 재시도까지 대기 시간 (밀리초)
    pub breaker_cooldown_ms: u64,
    /// 차단기가 실패 비율을 계산하는 최근 호출 수 (판단 시작 최소 관측 수)
    pub breaker_min_observations: usize,
    /// 유휴 커넥션 유지 시간 (초)
    pub idle_conn_timeout_secs: u64,
    /// 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
    /// 추적 ID를 담을 헤더 이름 (비어 있으면 미첨부)
    pub trace_header_name: String,
    /// 본문 변환기 이름 (noop, envelope)
    pub transformer: String,
    /// 디버그 로그 활성화
    pub debug: bool,
    /// 수집 서버 TLS 설정
    pub tls: TlsConfig,
}

impl Default for HttpOutputConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8080/audit".to_owned(),
            buffer_size: 1000,
            worker_count: 4,
            failure_ratio: 0.05,
            breaker_cooldown_ms: 1_000,
            breaker_min_observations: 10,
            idle_conn_timeout_secs: 90,
            request_timeout_secs: 10,
            trace_header_name: String::new(),
            transformer: "noop".to_owned(),
            debug: false,
            tls: TlsConfig::default(),
        }
    }
}

impl HttpOutputConfig {
    /// HTTP 출력 설정을 검증합니다.
    pub fn validate(&self) -> Result<(), AuditpostError> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(invalid(
                "output.http.url",
                format!("'{}' must be an http(s) URL", self.url),
            ));
        }
        if self.buffer_size == 0 {
            return Err(invalid("output.http.buffer_size", "must be at least 1"));
        }
        if self.worker_count == 0 {
            return Err(invalid("output.http.worker_count", "must be at least 1"));
        }
        if !(self.failure_ratio > 0.0 && self.failure_ratio <= 1.0) {
            return Err(invalid("output.http.failure_ratio", "must be in (0, 1]"));
        }
        if self.breaker_min_observations == 0 {
            return Err(invalid(
                "output.http.breaker_min_observations",
                "must be at least 1",
            ));
        }
        let valid_transformers = ["noop", "envelope"];
        if !valid_transformers.contains(&self.transformer.as_str()) {
            return Err(invalid(
                "output.http.transformer",
                format!("must be one of: {}", valid_transformers.join(", ")),
            ));
        }
        self.tls.validate(&self.url)
    }
}

/// HTTP 출력 TLS 설정
///
/// `ca_cert`는 수집 서버 검증용 루트 인증서(PEM 묶음)입니다. 비어 있으면 내장 루트를 씁니다.
/// `client_cert`/`client_key`는 상호 TLS용 클라이언트 인증서로, 둘 다 지정하거나 둘 다 비웁니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// CA 인증서 경로 (PEM)
    pub ca_cert: String,
    /// 클라이언트 인증서 경로 (PEM)
    pub client_cert: String,
    /// 클라이언트 개인 키 경로 (PEM)
    pub client_key: String,
}

impl TlsConfig {
    fn validate(&self, url: &str) -> Result<(), AuditpostError> {
        if !self.enabled {
            return Ok(());
        }
        if !url.starts_with("https://") {
            return Err(invalid(
                "output.http.tls.enabled",
                format!("requires an https URL, got '{url}'"),
            ));
        }
        if self.client_cert.is_empty() != self.client_key.is_empty() {
            return Err(invalid(
                "output.http.tls.client_key",
                "client_cert and client_key must be set together",
            ));
        }
        Ok(())
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 바인드 주소
    pub listen_addr: String,
    /// 포트
    pub port: u16,
    /// 스크레이프 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9102,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_parse<T: std::str::FromStr>(target: &mut T, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse env var, ignoring"
            ),
        }
    }
}
