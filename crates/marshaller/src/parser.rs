//! 레코드 파서 — 원시 레코드를 감사 메시지와 메시지 그룹으로 변환합니다.
//!
//! 커널이 보내는 페이로드는 `audit(<초>.<밀리초>:<시퀀스>): <본문>` 형식입니다.
//! 헤더를 해석할 수 없으면 시퀀스 0을 돌려주고, 재조립기는 이를 플러시 신호로 취급합니다.

use std::time::{Duration, Instant};

use auditpost_core::types::{AuditMessage, AuditMessageGroup, RawRecord};

/// 파싱 가능한 최대 페이로드 크기 (커널 MAX_AUDIT_MESSAGE_LENGTH)
pub const MAX_RECORD_SIZE: usize = 8970;

const HEADER_PREFIX: &str = "audit(";

/// 원시 레코드에서 감사 메시지를 만듭니다.
///
/// 헤더가 없거나 잘못된 경우 `sequence == 0`인 메시지를 반환합니다.
pub fn new_message(record: &RawRecord) -> AuditMessage {
    let payload = &record.data[..record.data.len().min(MAX_RECORD_SIZE)];
    let text = String::from_utf8_lossy(payload);

    match parse_header(&text) {
        Some((timestamp, sequence, body)) => AuditMessage {
            record_type: record.record_type,
            sequence,
            timestamp: timestamp.to_owned(),
            data: body.to_owned(),
        },
        None => AuditMessage {
            record_type: record.record_type,
            sequence: 0,
            timestamp: String::new(),
            data: text.into_owned(),
        },
    }
}

/// 첫 메시지로 새 그룹을 만듭니다. 완료 기한은 지금부터 `complete_after` 뒤입니다.
pub fn new_group(first: AuditMessage, complete_after: Duration) -> AuditMessageGroup {
    new_group_at(first, Instant::now(), complete_after)
}

/// 기준 시각을 지정해 새 그룹을 만듭니다.
pub fn new_group_at(
    first: AuditMessage,
    now: Instant,
    complete_after: Duration,
) -> AuditMessageGroup {
    AuditMessageGroup::new(first, now + complete_after)
}

/// `audit(ts:seq): body`를 (ts, seq, body)로 분해합니다.
fn parse_header(text: &str) -> Option<(&str, u32, &str)> {
    let start = text.find(HEADER_PREFIX)? + HEADER_PREFIX.len();
    let end = start + text[start..].find(')')?;
    let (timestamp, sequence) = text[start..end].split_once(':')?;
    let sequence = sequence.parse::<u32>().ok()?;

    let rest = &text[end + 1..];
    let body = rest.strip_prefix(':').unwrap_or(rest).trim_start();
    Some((timestamp, sequence, body.trim_end_matches(['\n', '\0'])))
}
