//! 신뢰성 있는 기록기 — 완성된 이벤트를 JSON Lines로 인코딩해 싱크로 전달합니다.
//!
//! 실패하면 인코더를 새로 만들고 백오프 후 재시도합니다.
//! 모든 시도가 실패하면 [`MarshallerError::WriteExhausted`]를 반환하며,
//! 호출자(데몬)는 프로세스를 종료해 외부 감독자의 재시작에 맡깁니다.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::Serialize;

use auditpost_core::error::SinkError;
use auditpost_core::metrics::WRITER_RETRIES_TOTAL;
use auditpost_core::pipeline::Sink;
use auditpost_core::types::AuditMessageGroup;

use crate::error::MarshallerError;

/// 재시도 사이 기본 대기 시간
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// JSON Lines 인코더
///
/// 문서 하나를 인코딩할 때마다 내부 버퍼를 비우고 재사용합니다.
#[derive(Debug, Default)]
pub struct JsonLinesEncoder {
    buf: Vec<u8>,
}

impl JsonLinesEncoder {
    /// 새 인코더를 생성합니다.
    pub fn new() -> Self {
        Self::with_capacity(4096)
    }

    /// 버퍼 용량을 지정해 생성합니다.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// 값을 한 줄의 JSON으로 인코딩합니다. 반환된 슬라이스는 개행으로 끝납니다.
    pub fn encode<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<&[u8], MarshallerError> {
        self.buf.clear();
        serde_json::to_writer(&mut self.buf, value)?;
        self.buf.push(b'\n');
        Ok(&self.buf)
    }
}

/// 재시도하는 이벤트 기록기
pub struct ReliableWriter {
    sink: Arc<dyn Sink>,
    encoder: JsonLinesEncoder,
    attempts: usize,
    backoff: Duration,
}

impl ReliableWriter {
    /// 싱크와 시도 횟수로 기록기를 생성합니다. `attempts`는 최소 1로 취급합니다.
    pub fn new(sink: Arc<dyn Sink>, attempts: usize) -> Self {
        Self {
            sink,
            encoder: JsonLinesEncoder::new(),
            attempts: attempts.max(1),
            backoff: DEFAULT_BACKOFF,
        }
    }

    /// 재시도 사이 대기 시간을 변경합니다.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// 설정된 시도 횟수
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// 하위 싱크
    pub fn sink(&self) -> &Arc<dyn Sink> {
        &self.sink
    }

    /// 그룹을 기록합니다. 호출 스레드를 백오프 동안 블로킹합니다.
    pub fn write(&mut self, group: &AuditMessageGroup) -> Result<(), MarshallerError> {
        let mut last_error = SinkError::Write("no attempt made".to_owned());

        for attempt in 1..=self.attempts {
            let result = match self.encoder.encode(group) {
                Ok(bytes) => self.sink.write(bytes).map(|_| ()),
                // 인코딩 실패는 재시도해도 같은 결과
                Err(e) => return Err(e),
            };

            match result {
                Ok(()) => return Ok(()),
                Err(SinkError::Closed) => return Err(MarshallerError::SinkClosed),
                Err(e) => {
                    tracing::error!(
                        sequence = group.sequence(),
                        attempt,
                        max_attempts = self.attempts,
                        error = %e,
                        "failed to write event"
                    );
                    last_error = e;
                }
            }

            if attempt < self.attempts {
                counter!(WRITER_RETRIES_TOTAL).increment(1);
                self.encoder = JsonLinesEncoder::new();
                std::thread::sleep(self.backoff);
            }
        }

        Err(MarshallerError::WriteExhausted {
            attempts: self.attempts,
            source: last_error,
        })
    }
}

impl std::fmt::Debug for ReliableWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReliableWriter")
            .field("attempts", &self.attempts)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use auditpost_core::types::{AuditMessage, EVENT_SYSCALL, EventDocument};

    /// 처음 `fail_first`번은 실패하고 이후 성공하는 싱크
    struct FlakySink {
        fail_first: usize,
        calls: AtomicUsize,
        written: Mutex<Vec<Vec<u8>>>,
    }

    impl FlakySink {
        fn new(fail_first: usize) -> Arc<Self> {
            Arc::new(Self {
                fail_first,
                calls: AtomicUsize::new(0),
                written: Mutex::new(Vec::new()),
            })
        }
    }

    impl Sink for FlakySink {
        fn write(&self, buf: &[u8]) -> Result<usize, SinkError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err(SinkError::Write("broken pipe".to_owned()));
            }
            self.written.lock().unwrap().push(buf.to_vec());
            Ok(buf.len())
        }
    }

    struct ClosedSink {
        calls: AtomicUsize,
    }

    impl Sink for ClosedSink {
        fn write(&self, _buf: &[u8]) -> Result<usize, SinkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(SinkError::Closed)
        }
    }

    fn sample_group() -> AuditMessageGroup {
        let mut group = AuditMessageGroup::new(
            AuditMessage {
                record_type: EVENT_SYSCALL,
                sequence: 24287,
                timestamp: "1364481363.243".to_owned(),
                data: "arch=c000003e syscall=2 success=no key=\"watch\"".to_owned(),
            },
            Instant::now(),
        );
        group.add_message(AuditMessage {
            record_type: 1307,
            sequence: 24287,
            timestamp: "1364481363.243".to_owned(),
            data: "cwd=\"/root\"".to_owned(),
        });
        group
    }

    #[test]
    fn encoder_appends_newline() {
        let mut encoder = JsonLinesEncoder::new();
        let bytes = encoder.encode(&serde_json::json!({"a": 1})).unwrap();
        assert_eq!(bytes, b"{\"a\":1}\n");
    }

    #[test]
    fn successful_write_happens_once() {
        let sink = FlakySink::new(0);
        let mut writer = ReliableWriter::new(sink.clone(), 3).with_backoff(Duration::ZERO);
        writer.write(&sample_group()).unwrap();
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn written_line_decodes_to_document() {
        let sink = FlakySink::new(0);
        let mut writer = ReliableWriter::new(sink.clone(), 1).with_backoff(Duration::ZERO);
        writer.write(&sample_group()).unwrap();

        let group = sample_group();
        let written = sink.written.lock().unwrap();
        let line = &written[0];
        assert_eq!(line.last(), Some(&b'\n'));
        let doc: EventDocument = serde_json::from_slice(line).unwrap();
        assert_eq!(doc.sequence, group.sequence());
        assert_eq!(doc.timestamp, "1364481363.243");
        assert_eq!(doc.syscall, "2");
        assert_eq!(doc.rule_key, "watch");

        // 타입과 본문이 도착 순서 그대로 유지됨
        let decoded: Vec<(u16, &str)> = doc
            .messages
            .iter()
            .map(|msg| (msg.record_type, msg.data.as_str()))
            .collect();
        let expected: Vec<(u16, &str)> = group
            .messages()
            .iter()
            .map(|msg| (msg.record_type, msg.data.as_str()))
            .collect();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn recovers_after_transient_failures() {
        let sink = FlakySink::new(2);
        let mut writer = ReliableWriter::new(sink.clone(), 3).with_backoff(Duration::ZERO);
        writer.write(&sample_group()).unwrap();
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
        assert_eq!(sink.written.lock().unwrap().len(), 1);
    }

    #[test]
    fn exhaustion_reports_attempts() {
        let sink = FlakySink::new(usize::MAX);
        let mut writer = ReliableWriter::new(sink.clone(), 4).with_backoff(Duration::ZERO);
        let err = writer.write(&sample_group()).unwrap_err();
        assert!(matches!(err, MarshallerError::WriteExhausted { attempts: 4, .. }));
        assert!(err.is_fatal());
        assert_eq!(sink.calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn closed_sink_is_not_retried() {
        let sink = Arc::new(ClosedSink {
            calls: AtomicUsize::new(0),
        });
        let mut writer = ReliableWriter::new(sink.clone(), 5).with_backoff(Duration::ZERO);
        let err = writer.write(&sample_group()).unwrap_err();
        assert!(matches!(err, MarshallerError::SinkClosed));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let sink = FlakySink::new(0);
        let mut writer = ReliableWriter::new(sink.clone(), 0).with_backoff(Duration::ZERO);
        assert_eq!(writer.attempts(), 1);
        writer.write(&sample_group()).unwrap();
    }

    #[test]
    fn backoff_is_applied_between_attempts() {
        let sink = FlakySink::new(1);
        let mut writer =
            ReliableWriter::new(sink.clone(), 2).with_backoff(Duration::from_millis(20));
        let started = Instant::now();
        writer.write(&sample_group()).unwrap();
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
