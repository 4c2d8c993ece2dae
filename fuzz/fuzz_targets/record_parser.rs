#![no_main]

use std::time::Duration;

use auditpost_core::types::RawRecord;
use auditpost_marshaller::parser;
use auditpost_marshaller::writer::JsonLinesEncoder;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let record = RawRecord::new(1300, data.to_vec());

    // 어떤 입력이든 패닉 없이 메시지가 만들어져야 한다
    let message = parser::new_message(&record);
    if message.sequence == 0 {
        return;
    }

    let group = parser::new_group(message, Duration::from_secs(2));
    let mut encoder = JsonLinesEncoder::new();
    let line = encoder.encode(&group).expect("group must always encode");
    assert_eq!(line.last(), Some(&b'\n'));
});
