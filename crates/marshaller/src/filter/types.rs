//! 필터 규칙 데이터 구조

use regex::Regex;

use auditpost_core::config::{FilterAction, FilterConfig};

use crate::error::MarshallerError;

/// 메시지 타입과 무관한 규칙을 담는 버킷 (rule key 규칙 전용)
pub const ANY_MESSAGE_TYPE: u16 = 0;

/// 컴파일된 필터 규칙
#[derive(Debug, Clone)]
pub struct FilterRule {
    /// 기본 키 (syscall, 없으면 rule key)
    pub key: String,
    /// 메시지 타입 선택자 ([`ANY_MESSAGE_TYPE`]이면 타입 무관)
    pub message_type: u16,
    /// 본문에 적용할 정규식
    pub regex: Regex,
    /// 매칭 시 동작
    pub action: FilterAction,
}

impl FilterRule {
    /// 설정 항목에서 규칙을 만듭니다. 정규식은 여기서 한 번만 컴파일합니다.
    pub fn compile(index: usize, config: &FilterConfig) -> Result<Self, MarshallerError> {
        let (key, message_type) = if !config.syscall.is_empty() {
            (config.syscall.clone(), config.message_type)
        } else if !config.key.is_empty() {
            (config.key.clone(), ANY_MESSAGE_TYPE)
        } else {
            return Err(MarshallerError::Config {
                field: format!("filters[{index}]"),
                reason: "either syscall or key must be set".to_owned(),
            });
        };

        let regex = Regex::new(&config.regex).map_err(|e| MarshallerError::FilterCompile {
            index,
            reason: format!("invalid regex for '{key}': {e}"),
        })?;

        Ok(Self {
            key,
            message_type,
            regex,
            action: config.action,
        })
    }

    /// 본문이 정규식에 매칭되는지 확인합니다.
    pub fn matches(&self, data: &str) -> bool {
        self.regex.is_match(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syscall_takes_precedence_over_key() {
        let config = FilterConfig {
            syscall: "49".to_owned(),
            message_type: 1306,
            key: "net".to_owned(),
            regex: "saddr=0A".to_owned(),
            action: FilterAction::Drop,
        };
        let rule = FilterRule::compile(0, &config).unwrap();
        assert_eq!(rule.key, "49");
        assert_eq!(rule.message_type, 1306);
    }

    #[test]
    fn key_rule_ignores_message_type() {
        let config = FilterConfig {
            key: "exec_watch".to_owned(),
            message_type: 1309,
            regex: ".*".to_owned(),
            ..FilterConfig::default()
        };
        let rule = FilterRule::compile(0, &config).unwrap();
        assert_eq!(rule.key, "exec_watch");
        assert_eq!(rule.message_type, ANY_MESSAGE_TYPE);
    }

    #[test]
    fn invalid_regex_fails_compilation() {
        let config = FilterConfig {
            key: "k".to_owned(),
            regex: "[invalid".to_owned(),
            ..FilterConfig::default()
        };
        let err = FilterRule::compile(7, &config).unwrap_err();
        assert!(matches!(err, MarshallerError::FilterCompile { index: 7, .. }));
    }

    #[test]
    fn missing_keys_is_config_error() {
        let config = FilterConfig {
            regex: "x".to_owned(),
            ..FilterConfig::default()
        };
        assert!(matches!(
            FilterRule::compile(0, &config),
            Err(MarshallerError::Config { .. })
        ));
    }
}
