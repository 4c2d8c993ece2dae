#![no_main]

use std::time::Instant;

use arbitrary::Arbitrary;
use auditpost_core::config::{FilterAction, FilterConfig};
use auditpost_core::types::{AuditMessage, AuditMessageGroup};
use auditpost_marshaller::FilterEngine;
use libfuzzer_sys::fuzz_target;

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    /// 필터 규칙 (최대 8개로 제한)
    rules: Vec<FuzzRule>,
    /// 그룹을 이룰 메시지 (타입, 본문)
    messages: Vec<(u16, String)>,
}

#[derive(Arbitrary, Debug)]
struct FuzzRule {
    syscall: String,
    message_type: u16,
    key: String,
    regex: String,
    drop: bool,
}

fuzz_target!(|input: FuzzInput| {
    let filters: Vec<FilterConfig> = input
        .rules
        .into_iter()
        .take(8)
        .map(|rule| FilterConfig {
            syscall: rule.syscall,
            message_type: rule.message_type,
            key: rule.key,
            regex: rule.regex,
            action: if rule.drop {
                FilterAction::Drop
            } else {
                FilterAction::Keep
            },
        })
        .collect();

    // 잘못된 정규식은 생성 단계에서 거부된다
    let Ok(engine) = FilterEngine::new(&filters) else {
        return;
    };

    let mut messages = input.messages.into_iter().take(16).map(|(record_type, data)| AuditMessage {
        record_type,
        sequence: 1,
        timestamp: "1.000".to_owned(),
        data,
    });
    let Some(first) = messages.next() else {
        return;
    };

    let mut group = AuditMessageGroup::new(first, Instant::now());
    for message in messages {
        group.add_message(message);
    }

    let _ = engine.decide(&group);
});
