//! 본문 변환기
//!
//! 워커가 요청을 만들기 전에 페이로드를 변환합니다.
//! `None`을 반환하면 해당 메시지는 전송하지 않고 건너뜁니다.

use bytes::Bytes;
use uuid::Uuid;

use crate::error::OutputError;

/// 등록된 본문 변환기 (이름으로 선택)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BodyTransformer {
    /// 페이로드를 그대로 전송
    #[default]
    Noop,
    /// `{"trace_id": "...", "event": <payload>}`로 감싸서 전송
    Envelope,
}

impl BodyTransformer {
    /// 설정 이름으로 변환기를 찾습니다.
    pub fn from_name(name: &str) -> Result<Self, OutputError> {
        match name {
            "noop" => Ok(Self::Noop),
            "envelope" => Ok(Self::Envelope),
            other => Err(OutputError::UnknownTransformer(other.to_owned())),
        }
    }

    /// 변환기 이름
    pub fn name(self) -> &'static str {
        match self {
            Self::Noop => "noop",
            Self::Envelope => "envelope",
        }
    }

    /// 페이로드를 변환합니다.
    pub fn transform(self, trace_id: Uuid, payload: &Bytes) -> Option<Bytes> {
        match self {
            Self::Noop => Some(payload.clone()),
            Self::Envelope => {
                let event: serde_json::Value = match serde_json::from_slice(payload) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!(
                            %trace_id,
                            error = %e,
                            "payload is not valid JSON, skipping"
                        );
                        return None;
                    }
                };
                let envelope = serde_json::json!({
                    "trace_id": trace_id.to_string(),
                    "event": event,
                });
                serde_json::to_vec(&envelope).ok().map(Bytes::from)
            }
        }
    }
}
