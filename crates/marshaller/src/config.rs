//! 재조립기 설정
//!
//! [`MarshallerConfig`]는 core의 [`AuditpostConfig`]에서 재조립에 필요한 값만 추려
//! 시간 단위를 [`Duration`]으로 바꾼 형태입니다.
//!
//! # 사용 예시
//! ```ignore
//! use auditpost_core::config::AuditpostConfig;
//! use auditpost_marshaller::config::MarshallerConfig;
//!
//! let core_config = AuditpostConfig::default();
//! let config = MarshallerConfig::from_core(&core_config);
//! ```

use std::time::Duration;

use auditpost_core::config::{AuditpostConfig, FilterConfig};

use crate::error::MarshallerError;
use crate::writer::DEFAULT_BACKOFF;

/// 재조립기 설정
#[derive(Debug, Clone)]
pub struct MarshallerConfig {
    /// 관심 대상 최소 레코드 타입
    pub event_min: u16,
    /// 관심 대상 최대 레코드 타입
    pub event_max: u16,
    /// 종료 마커 없이 그룹이 완료되기까지의 시간
    pub complete_after: Duration,
    /// 시퀀스 추적 활성화
    pub track_messages: bool,
    /// 역순 도착 로그 여부
    pub log_out_of_order: bool,
    /// 허용 역순 거리
    pub max_out_of_order: u32,
    /// 필터 규칙 (설정 순서)
    pub filters: Vec<FilterConfig>,
    /// 기록 시도 횟수
    pub attempts: usize,
    /// 재시도 사이 대기 시간
    pub backoff: Duration,
}

impl Default for MarshallerConfig {
    fn default() -> Self {
        Self::from_core(&AuditpostConfig::default())
    }
}

impl MarshallerConfig {
    /// core 설정에서 재조립기 설정을 생성합니다.
    pub fn from_core(core: &AuditpostConfig) -> Self {
        Self {
            event_min: core.events.min,
            event_max: core.events.max,
            complete_after: Duration::from_millis(core.events.complete_after_ms),
            track_messages: core.message_tracking.enabled,
            log_out_of_order: core.message_tracking.log_out_of_order,
            max_out_of_order: core.message_tracking.max_out_of_order,
            filters: core.filters.clone(),
            attempts: core.output.attempts,
            backoff: DEFAULT_BACKOFF,
        }
    }

    /// 설정값을 검증합니다.
    pub fn validate(&self) -> Result<(), MarshallerError> {
        if self.event_min > self.event_max {
            return Err(MarshallerError::Config {
                field: "event_min".to_owned(),
                reason: format!(
                    "min ({}) must not exceed max ({})",
                    self.event_min, self.event_max
                ),
            });
        }
        if self.attempts == 0 {
            return Err(MarshallerError::Config {
                field: "attempts".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }
        Ok(())
    }

    /// 레코드 타입이 관심 범위 안인지 확인합니다.
    pub fn in_range(&self, record_type: u16) -> bool {
        (self.event_min..=self.event_max).contains(&record_type)
    }
}

/// 재조립기 설정 빌더
#[derive(Debug, Default)]
pub struct MarshallerConfigBuilder {
    config: MarshallerConfig,
}

impl MarshallerConfigBuilder {
    /// 기본값으로 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 관심 레코드 타입 범위를 설정합니다.
    pub fn event_range(mut self, min: u16, max: u16) -> Self {
        self.config.event_min = min;
        self.config.event_max = max;
        self
    }

    /// 완료 기한을 설정합니다.
    pub fn complete_after(mut self, complete_after: Duration) -> Self {
        self.config.complete_after = complete_after;
        self
    }

    /// 시퀀스 추적을 설정합니다.
    pub fn message_tracking(mut self, enabled: bool, max_out_of_order: u32) -> Self {
        self.config.track_messages = enabled;
        self.config.max_out_of_order = max_out_of_order;
        self
    }

    /// 역순 도착 로그 여부를 설정합니다.
    pub fn log_out_of_order(mut self, log: bool) -> Self {
        self.config.log_out_of_order = log;
        self
    }

    /// 필터 규칙을 추가합니다.
    pub fn filter(mut self, filter: FilterConfig) -> Self {
        self.config.filters.push(filter);
        self
    }

    /// 기록 시도 횟수와 백오프를 설정합니다.
    pub fn retry(mut self, attempts: usize, backoff: Duration) -> Self {
        self.config.attempts = attempts;
        self.config.backoff = backoff;
        self
    }

    /// 설정을 검증하고 빌드합니다.
    pub fn build(self) -> Result<MarshallerConfig, MarshallerError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = MarshallerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.complete_after, Duration::from_secs(2));
        assert_eq!(config.backoff, DEFAULT_BACKOFF);
    }

    #[test]
    fn from_core_preserves_values() {
        let mut core = AuditpostConfig::default();
        core.events.min = 1100;
        core.events.max = 1500;
        core.events.complete_after_ms = 250;
        core.message_tracking.max_out_of_order = 42;
        core.output.attempts = 7;

        let config = MarshallerConfig::from_core(&core);
        assert_eq!(config.event_min, 1100);
        assert_eq!(config.event_max, 1500);
        assert_eq!(config.complete_after, Duration::from_millis(250));
        assert_eq!(config.max_out_of_order, 42);
        assert_eq!(config.attempts, 7);
    }

    #[test]
    fn range_is_inclusive() {
        let config = MarshallerConfig::default();
        assert!(config.in_range(1300));
        assert!(config.in_range(1399));
        assert!(!config.in_range(1400));
        assert!(!config.in_range(1299));
    }

    #[test]
    fn builder_rejects_inverted_range() {
        let result = MarshallerConfigBuilder::new().event_range(1400, 1300).build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_rejects_zero_attempts() {
        let result = MarshallerConfigBuilder::new()
            .retry(0, Duration::ZERO)
            .build();
        assert!(matches!(result, Err(MarshallerError::Config { .. })));
    }
}
