//! 도메인 타입 — 원시 레코드, 감사 메시지, 메시지 그룹
//!
//! 커널 감사 서브시스템은 하나의 논리 이벤트를 여러 레코드로 나눠 보냅니다.
//! 같은 시퀀스 번호를 가진 레코드들이 하나의 [`AuditMessageGroup`]으로 모입니다.

use std::time::Instant;

use bytes::Bytes;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize};

/// 다중 패킷 이벤트 종료 마커 (AUDIT_EOE)
pub const EVENT_EOE: u16 = 1320;

/// SYSCALL 레코드 타입 (AUDIT_SYSCALL)
pub const EVENT_SYSCALL: u16 = 1300;

/// 커널 전송 계층에서 받은 원시 레코드
///
/// 시퀀스 번호는 페이로드 헤더 `audit(<초>.<밀리초>:<시퀀스>): ...`에 실려 옵니다.
#[derive(Debug, Clone)]
pub struct RawRecord {
    /// 레코드 타입 코드 (예: 1300 = SYSCALL)
    pub record_type: u16,
    /// 원시 페이로드
    pub data: Bytes,
}

impl RawRecord {
    /// 새 원시 레코드를 생성합니다.
    pub fn new(record_type: u16, data: impl Into<Bytes>) -> Self {
        Self {
            record_type,
            data: data.into(),
        }
    }
}

/// 파싱된 단일 감사 메시지
///
/// 직렬화 시에는 `type`과 `data`만 출력합니다.
/// 시퀀스와 타임스탬프는 그룹 단위로 한 번만 기록됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditMessage {
    /// 레코드 타입 코드
    #[serde(rename = "type")]
    pub record_type: u16,
    /// 시퀀스 번호 (0이면 유효하지 않은 레코드)
    #[serde(skip)]
    pub sequence: u32,
    /// 커널 타임스탬프 문자열 (`1364481363.243`)
    #[serde(skip)]
    pub timestamp: String,
    /// 헤더를 제외한 본문
    pub data: String,
}

/// 재조립 중인 이벤트. 같은 시퀀스 번호를 공유하는 메시지 묶음
///
/// 모든 메시지는 그룹의 시퀀스 번호를 공유합니다. 메시지 순서는 도착 순서입니다.
#[derive(Debug, Clone)]
pub struct AuditMessageGroup {
    sequence: u32,
    timestamp: String,
    messages: Vec<AuditMessage>,
    syscall: Option<String>,
    rule_key: Option<String>,
    complete_after: Instant,
}

impl AuditMessageGroup {
    /// 첫 메시지로 그룹을 생성합니다. `complete_after` 이후에는 마커 없이도 완료됩니다.
    pub fn new(first: AuditMessage, complete_after: Instant) -> Self {
        let mut group = Self {
            sequence: first.sequence,
            timestamp: first.timestamp.clone(),
            messages: Vec::with_capacity(6),
            syscall: None,
            rule_key: None,
            complete_after,
        };
        group.add_message(first);
        group
    }

    /// 메시지를 추가하고 syscall / rule key를 갱신합니다.
    pub fn add_message(&mut self, message: AuditMessage) {
        debug_assert_eq!(message.sequence, self.sequence);

        // syscall과 rule key는 SYSCALL 레코드에서만 읽음
        if message.record_type == EVENT_SYSCALL {
            if self.syscall.is_none() {
                self.syscall = find_field(&message.data, "syscall").map(str::to_owned);
            }
            if self.rule_key.is_none() {
                self.rule_key = find_field(&message.data, "key")
                    .map(|k| k.trim_matches('"'))
                    .filter(|k| !k.is_empty() && *k != "(null)")
                    .map(str::to_owned);
            }
        }

        self.messages.push(message);
    }

    /// 시퀀스 번호
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// 첫 메시지의 타임스탬프
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// 도착 순서대로 정렬된 메시지
    pub fn messages(&self) -> &[AuditMessage] {
        &self.messages
    }

    /// SYSCALL 레코드의 `syscall=` 값
    pub fn syscall(&self) -> Option<&str> {
        self.syscall.as_deref()
    }

    /// 감사 규칙에 지정된 `key=` 값
    pub fn rule_key(&self) -> Option<&str> {
        self.rule_key.as_deref()
    }

    /// 완료 기한
    pub fn complete_after(&self) -> Instant {
        self.complete_after
    }

    /// 기한이 `now` 이전이거나 같으면 true
    pub fn is_due(&self, now: Instant) -> bool {
        self.complete_after <= now
    }
}

impl Serialize for AuditMessageGroup {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("AuditMessageGroup", 5)?;
        state.serialize_field("sequence", &self.sequence)?;
        state.serialize_field("timestamp", &self.timestamp)?;
        state.serialize_field("messages", &self.messages)?;
        state.serialize_field("syscall", self.syscall.as_deref().unwrap_or_default())?;
        state.serialize_field("rule_key", self.rule_key.as_deref().unwrap_or_default())?;
        state.end()
    }
}

/// 출력 문서의 역직렬화 형태
///
/// 싱크 뒤쪽(변환기, 테스트)에서 기록된 한 줄을 다시 읽을 때 사용합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDocument {
    /// 시퀀스 번호
    pub sequence: u32,
    /// 타임스탬프
    #[serde(default)]
    pub timestamp: String,
    /// 메시지 목록 (도착 순서)
    pub messages: Vec<AuditMessage>,
    /// syscall (없으면 빈 문자열)
    #[serde(default)]
    pub syscall: String,
    /// rule key (없으면 빈 문자열)
    #[serde(default)]
    pub rule_key: String,
}

/// `name=value` 형식 본문에서 필드 값을 찾습니다.
///
/// 필드 이름은 공백 뒤 또는 본문 시작에서만 인정합니다 (`a1=`가 `1=`로 잡히지 않도록).
pub fn find_field<'a>(data: &'a str, name: &str) -> Option<&'a str> {
    data.split(' ').find_map(|token| {
        let (field, value) = token.split_once('=')?;
        (field == name).then_some(value)
    })
}
