#![no_main]

use std::sync::Arc;
use std::time::Duration;

use arbitrary::Arbitrary;
use auditpost_core::error::SinkError;
use auditpost_core::pipeline::Sink;
use auditpost_core::types::RawRecord;
use auditpost_marshaller::{AuditMarshaller, MarshallerConfigBuilder};
use libfuzzer_sys::fuzz_target;

/// 기록된 바이트를 버리는 싱크
struct NullSink;

impl Sink for NullSink {
    fn write(&self, buf: &[u8]) -> Result<usize, SinkError> {
        Ok(buf.len())
    }
}

#[derive(Arbitrary, Debug)]
struct FuzzRecord {
    record_type: u16,
    sequence: u32,
    body: String,
    /// 헤더 없이 원시 본문만 보냄
    raw: bool,
}

fuzz_target!(|records: Vec<FuzzRecord>| {
    let config = MarshallerConfigBuilder::new()
        .complete_after(Duration::ZERO)
        .message_tracking(true, 16)
        .retry(1, Duration::ZERO)
        .build()
        .expect("static config is valid");
    let mut marshaller =
        AuditMarshaller::new(config, Arc::new(NullSink)).expect("no filters to compile");

    for record in records.into_iter().take(256) {
        let data = if record.raw {
            record.body
        } else {
            format!("audit(1.000:{}): {}", record.sequence, record.body)
        };
        marshaller
            .consume(&RawRecord::new(record.record_type, data.into_bytes()))
            .expect("null sink never fails");
    }

    marshaller.flush_all().expect("null sink never fails");
    assert_eq!(marshaller.pending_count(), 0);
});
