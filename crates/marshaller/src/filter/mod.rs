//! 필터 엔진 — 완성된 이벤트의 유지/폐기 판정
//!
//! 두 단계로 평가합니다.
//!
//! 1. **syscall 단계**: 그룹의 syscall로 인덱스를 찾고, 메시지를 도착 순서대로 돌며
//!    메시지 타입별 규칙을 설정 순서대로 적용합니다. 첫 매칭의 동작이 이 단계의 결과입니다.
//! 2. **rule key 단계**: syscall 단계가 폐기를 내리지 않았을 때만 평가합니다.
//!    그룹의 rule key로 타입 무관 버킷을 찾고, 모든 메시지 본문을 도착 순서대로 이어 붙인
//!    문자열에 규칙을 설정 순서대로 적용합니다.
//!
//! 어느 단계에서도 매칭이 없으면 유지합니다.
//!
//! # 설정 예시
//! ```toml
//! [[filters]]
//! syscall = "49"
//! message_type = 1306
//! regex = "saddr=(10..|0A..)"
//! action = "drop"
//!
//! [[filters]]
//! key = "exec_watch"
//! regex = "comm=\"cron\""
//! action = "drop"
//! ```

pub mod types;

pub use types::{ANY_MESSAGE_TYPE, FilterRule};

use std::collections::HashMap;
use std::time::Instant;

use metrics::{counter, histogram};

use auditpost_core::config::{FilterAction, FilterConfig};
use auditpost_core::metrics::{
    LABEL_FILTER_TIER, MARSHALLER_FILTER_DURATION_SECONDS, MARSHALLER_MESSAGES_FILTERED_TOTAL,
};
use auditpost_core::types::AuditMessageGroup;

use crate::error::MarshallerError;

/// 기본 키 -> 메시지 타입 -> 규칙 목록 (설정 순서 유지)
type FilterIndex = HashMap<String, HashMap<u16, Vec<FilterRule>>>;

/// 필터 엔진
///
/// 설정에서 한 번 구성한 뒤에는 읽기 전용입니다.
#[derive(Debug, Default)]
pub struct FilterEngine {
    index: FilterIndex,
    rule_count: usize,
}

impl FilterEngine {
    /// 설정된 필터 목록으로 인덱스를 구성합니다.
    pub fn new(filters: &[FilterConfig]) -> Result<Self, MarshallerError> {
        let mut engine = Self::default();
        for (idx, config) in filters.iter().enumerate() {
            engine.add_rule(FilterRule::compile(idx, config)?);
        }
        tracing::debug!(rules = engine.rule_count, "filter index built");
        Ok(engine)
    }

    /// 규칙을 해당 버킷의 끝에 추가합니다.
    pub fn add_rule(&mut self, rule: FilterRule) {
        self.index
            .entry(rule.key.clone())
            .or_default()
            .entry(rule.message_type)
            .or_default()
            .push(rule);
        self.rule_count += 1;
    }

    /// 등록된 규칙 수
    pub fn rule_count(&self) -> usize {
        self.rule_count
    }

    /// 그룹을 유지할지 폐기할지 판정합니다.
    pub fn decide(&self, group: &AuditMessageGroup) -> FilterAction {
        let started = Instant::now();
        let (action, tier) = match self.decide_by_syscall(group) {
            FilterAction::Drop => (FilterAction::Drop, "syscall"),
            FilterAction::Keep => (self.decide_by_rule_key(group), "rule_key"),
        };
        histogram!(MARSHALLER_FILTER_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        if action.is_drop() {
            counter!(MARSHALLER_MESSAGES_FILTERED_TOTAL, LABEL_FILTER_TIER => tier).increment(1);
        }
        action
    }

    fn decide_by_syscall(&self, group: &AuditMessageGroup) -> FilterAction {
        let Some(by_type) = group.syscall().and_then(|s| self.index.get(s)) else {
            return FilterAction::Keep;
        };

        // 메시지마다 해당 타입의 규칙을 모두 적용한 뒤 다음 메시지로 이동
        for message in group.messages() {
            let Some(rules) = by_type.get(&message.record_type) else {
                continue;
            };
            if let Some(rule) = rules.iter().find(|r| r.matches(&message.data)) {
                tracing::debug!(
                    sequence = group.sequence(),
                    syscall = %rule.key,
                    regex = rule.regex.as_str(),
                    action = ?rule.action,
                    "syscall filter matched"
                );
                return rule.action;
            }
        }

        FilterAction::Keep
    }

    fn decide_by_rule_key(&self, group: &AuditMessageGroup) -> FilterAction {
        let Some(rules) = group
            .rule_key()
            .and_then(|k| self.index.get(k))
            .and_then(|by_type| by_type.get(&ANY_MESSAGE_TYPE))
        else {
            return FilterAction::Keep;
        };

        let full_message: String = group.messages().iter().map(|m| m.data.as_str()).collect();

        // 규칙마다 전체 메시지를 평가
        match rules.iter().find(|r| r.matches(&full_message)) {
            Some(rule) => {
                tracing::debug!(
                    sequence = group.sequence(),
                    rule_key = %rule.key,
                    regex = rule.regex.as_str(),
                    action = ?rule.action,
                    "rule key filter matched"
                );
                rule.action
            }
            None => FilterAction::Keep,
        }
    }
}
