//! 메시지 재조립기 — 같은 시퀀스의 레코드를 하나의 이벤트로 모읍니다.
//!
//! # 처리 흐름
//!
//! ```text
//! RawRecord -> parser::new_message -> (seq 0?) -> SequenceTracker
//!           -> (범위 밖?) -> (EOE?) -> pending 그룹에 추가 -> 기한 만료 그룹 완료
//!                                          |
//!                               FilterEngine -> ReliableWriter -> Sink
//! ```
//!
//! 그룹은 종료 마커(1320)를 받거나 완료 기한이 지나면 완료됩니다.
//! 모든 변경 연산은 `&mut self`를 받으며, 한 스레드가 인스턴스를 소유하는 것을 전제로 합니다.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, gauge};

use auditpost_core::metrics::{
    MARSHALLER_EVENTS_WRITTEN_TOTAL, MARSHALLER_PENDING_GROUPS, MARSHALLER_RECORDS_IGNORED_TOTAL,
};
use auditpost_core::pipeline::Sink;
use auditpost_core::types::{AuditMessageGroup, EVENT_EOE, RawRecord};

use crate::config::MarshallerConfig;
use crate::error::MarshallerError;
use crate::filter::FilterEngine;
use crate::parser;
use crate::sequence::SequenceTracker;
use crate::writer::ReliableWriter;

/// 감사 레코드 재조립기
#[derive(Debug)]
pub struct AuditMarshaller {
    config: MarshallerConfig,
    pending: BTreeMap<u32, AuditMessageGroup>,
    filters: FilterEngine,
    writer: ReliableWriter,
    tracker: Option<SequenceTracker>,
    filtered_count: u64,
    written_count: u64,
}

impl AuditMarshaller {
    /// 설정과 출력 싱크로 재조립기를 생성합니다.
    ///
    /// 필터 정규식은 여기서 모두 컴파일됩니다.
    pub fn new(config: MarshallerConfig, sink: Arc<dyn Sink>) -> Result<Self, MarshallerError> {
        config.validate()?;
        let filters = FilterEngine::new(&config.filters)?;
        let writer = ReliableWriter::new(sink, config.attempts).with_backoff(config.backoff);
        let tracker = config
            .track_messages
            .then(|| SequenceTracker::new(config.max_out_of_order, config.log_out_of_order));

        tracing::info!(
            event_min = config.event_min,
            event_max = config.event_max,
            complete_after_ms = config.complete_after.as_millis() as u64,
            filters = filters.rule_count(),
            tracking = config.track_messages,
            "audit marshaller created"
        );

        Ok(Self {
            config,
            pending: BTreeMap::new(),
            filters,
            writer,
            tracker,
            filtered_count: 0,
            written_count: 0,
        })
    }

    /// 원시 레코드 하나를 처리합니다.
    pub fn consume(&mut self, record: &RawRecord) -> Result<(), MarshallerError> {
        self.consume_at(record, Instant::now())
    }

    /// 기준 시각을 지정해 레코드를 처리합니다.
    pub fn consume_at(&mut self, record: &RawRecord, now: Instant) -> Result<(), MarshallerError> {
        let message = parser::new_message(record);

        if message.sequence == 0 {
            // 헤더가 없는 레코드는 버리고 기한 만료 그룹만 정리
            tracing::debug!(record_type = record.record_type, "record without valid header");
            return self.flush_due_at(now);
        }

        if let Some(tracker) = self.tracker.as_mut() {
            tracker.detect(message.sequence);
        }

        if record.record_type == EVENT_EOE {
            // 종료 마커 자체는 출력하지 않음
            return self.complete(message.sequence);
        }

        if !self.config.in_range(record.record_type) {
            tracing::info!(
                record_type = record.record_type,
                sequence = message.sequence,
                "ignoring record outside event range"
            );
            counter!(MARSHALLER_RECORDS_IGNORED_TOTAL).increment(1);
            return self.flush_due_at(now);
        }

        match self.pending.get_mut(&message.sequence) {
            Some(group) => group.add_message(message),
            None => {
                let group = parser::new_group_at(message, now, self.config.complete_after);
                self.pending.insert(group.sequence(), group);
            }
        }

        self.flush_due_at(now)
    }

    /// 시퀀스의 그룹을 완료합니다. 그룹이 없으면 아무 일도 하지 않습니다.
    ///
    /// 그룹은 결과와 무관하게 대기 목록에서 제거됩니다.
    pub fn complete(&mut self, sequence: u32) -> Result<(), MarshallerError> {
        let Some(group) = self.pending.remove(&sequence) else {
            return Ok(());
        };
        gauge!(MARSHALLER_PENDING_GROUPS).set(self.pending.len() as f64);

        if self.filters.decide(&group).is_drop() {
            self.filtered_count += 1;
            tracing::debug!(sequence, "event dropped by filter");
            return Ok(());
        }

        self.writer.write(&group)?;
        self.written_count += 1;
        counter!(MARSHALLER_EVENTS_WRITTEN_TOTAL).increment(1);
        Ok(())
    }

    /// 완료 기한이 지난 그룹을 모두 완료합니다.
    pub fn flush_due(&mut self) -> Result<(), MarshallerError> {
        self.flush_due_at(Instant::now())
    }

    /// 기준 시각을 지정해 기한 만료 그룹을 완료합니다.
    pub fn flush_due_at(&mut self, now: Instant) -> Result<(), MarshallerError> {
        let due: Vec<u32> = self
            .pending
            .values()
            .filter(|group| group.is_due(now))
            .map(AuditMessageGroup::sequence)
            .collect();

        for sequence in due {
            self.complete(sequence)?;
        }
        gauge!(MARSHALLER_PENDING_GROUPS).set(self.pending.len() as f64);
        Ok(())
    }

    /// 대기 중인 모든 그룹을 시퀀스 순서로 완료합니다 (종료 시 사용).
    pub fn flush_all(&mut self) -> Result<(), MarshallerError> {
        let sequences: Vec<u32> = self.pending.keys().copied().collect();
        tracing::info!(pending = sequences.len(), "flushing all pending events");
        for sequence in sequences {
            self.complete(sequence)?;
        }
        Ok(())
    }

    /// 완료를 기다리는 그룹 수
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// 필터로 버려진 이벤트 수
    pub fn filtered_count(&self) -> u64 {
        self.filtered_count
    }

    /// 출력으로 보낸 이벤트 수
    pub fn written_count(&self) -> u64 {
        self.written_count
    }

    /// 시퀀스 추적기 (추적이 꺼져 있으면 `None`)
    pub fn tracker(&self) -> Option<&SequenceTracker> {
        self.tracker.as_ref()
    }
}
