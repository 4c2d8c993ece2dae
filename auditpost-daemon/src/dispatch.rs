//! 디스패치 스레드 — 재조립기를 소유하고 명령을 순서대로 처리합니다.
//!
//! [`AuditMarshaller`]는 내부 동기화가 없으므로 전용 OS 스레드 하나만 접근합니다.
//! 입력 태스크와 주기 타이머는 제한 채널로 [`Command`]를 보내고,
//! 스레드는 `blocking_recv`로 하나씩 꺼내 처리합니다.
//!
//! ```text
//! source task --Record--> [bounded mpsc] --> dispatch thread --> AuditMarshaller
//! ticker task --Tick----^                         |
//! shutdown    --Shutdown^                   oneshot(DispatchOutcome)
//! ```
//!
//! 기록 실패가 치명적이면 스레드는 즉시 멈추고 결과를 돌려줍니다.
//! 프로세스 종료 코드는 [`DispatchOutcome::exit_code`]로 결정합니다.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use auditpost_core::types::RawRecord;
use auditpost_marshaller::{AuditMarshaller, MarshallerError};

/// 디스패치 채널 용량
pub const COMMAND_QUEUE_CAPACITY: usize = 4096;

/// 디스패치 스레드 명령
#[derive(Debug)]
pub enum Command {
    /// 원시 레코드 하나를 재조립기에 전달
    Record(RawRecord),
    /// 기한이 지난 그룹 완료 (입력이 없는 동안에도 플러시)
    Tick,
    /// 대기 중인 모든 그룹을 완료하고 종료
    Shutdown,
}

/// 디스패치 스레드 종료 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 모든 대기 그룹을 기록하고 정상 종료
    Drained,
    /// 싱크가 먼저 닫힘
    SinkClosed,
    /// 재시도를 모두 소진함
    WriteExhausted(String),
    /// 스레드가 결과 없이 사라짐
    Aborted,
}

impl DispatchOutcome {
    /// 프로세스 종료 코드
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Drained | Self::SinkClosed => 0,
            Self::WriteExhausted(_) | Self::Aborted => 1,
        }
    }
}

/// 실행 중인 디스패치 스레드 핸들
#[derive(Debug)]
pub struct Dispatcher {
    done: oneshot::Receiver<DispatchOutcome>,
    outcome: Option<DispatchOutcome>,
}

impl Dispatcher {
    /// 재조립기를 넘겨받아 전용 스레드를 시작합니다.
    pub fn spawn(
        marshaller: AuditMarshaller,
        rx: mpsc::Receiver<Command>,
    ) -> std::io::Result<Self> {
        let (done_tx, done) = oneshot::channel();

        std::thread::Builder::new()
            .name("auditpost-dispatch".to_owned())
            .spawn(move || {
                let outcome = run(marshaller, rx);
                let _ = done_tx.send(outcome);
            })?;

        Ok(Self {
            done,
            outcome: None,
        })
    }

    /// 스레드가 끝날 때까지 기다립니다. 여러 번 호출해도 같은 결과를 돌려줍니다.
    pub async fn wait(&mut self) -> DispatchOutcome {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        let outcome = (&mut self.done).await.unwrap_or(DispatchOutcome::Aborted);
        self.outcome = Some(outcome.clone());
        outcome
    }
}

/// 명령 채널을 비울 때까지 처리합니다. 디스패치 스레드 본체입니다.
///
/// 채널이 닫히면 `Shutdown`과 같이 대기 그룹을 모두 기록합니다.
pub fn run(mut marshaller: AuditMarshaller, mut rx: mpsc::Receiver<Command>) -> DispatchOutcome {
    tracing::info!("dispatch thread started");

    loop {
        let result = match rx.blocking_recv() {
            Some(Command::Record(record)) => marshaller.consume(&record),
            Some(Command::Tick) => marshaller.flush_due(),
            Some(Command::Shutdown) | None => break,
        };

        if let Err(e) = result {
            if let Some(outcome) = fatal_outcome(&e) {
                return outcome;
            }
            tracing::error!(error = %e, "failed to process record");
        }
    }

    let outcome = match marshaller.flush_all() {
        Ok(()) => DispatchOutcome::Drained,
        Err(e) => fatal_outcome(&e).unwrap_or_else(|| {
            tracing::error!(error = %e, "failed to flush pending events");
            DispatchOutcome::Drained
        }),
    };

    tracing::info!(
        written = marshaller.written_count(),
        filtered = marshaller.filtered_count(),
        "dispatch thread stopped"
    );
    outcome
}

fn fatal_outcome(err: &MarshallerError) -> Option<DispatchOutcome> {
    match err {
        MarshallerError::SinkClosed => {
            tracing::warn!("output closed, stopping dispatch");
            Some(DispatchOutcome::SinkClosed)
        }
        MarshallerError::WriteExhausted { .. } => {
            tracing::error!(error = %err, "output failed permanently, stopping dispatch");
            Some(DispatchOutcome::WriteExhausted(err.to_string()))
        }
        _ => None,
    }
}

/// 주기적으로 `Tick`을 보내는 태스크를 시작합니다.
///
/// 채널이 가득 차 있으면 해당 틱은 건너뜁니다.
pub fn spawn_ticker(
    tx: mpsc::Sender<Command>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // 첫 틱은 즉시 발생하므로 소비
        interval.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    match tx.try_send(Command::Tick) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            tracing::debug!("dispatch queue full, skipping tick");
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => break,
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use auditpost_core::error::SinkError;
    use auditpost_core::pipeline::Sink;
    use auditpost_marshaller::MarshallerConfigBuilder;

    #[derive(Default)]
    struct MemorySink {
        lines: Mutex<Vec<String>>,
    }

    impl Sink for MemorySink {
        fn write(&self, buf: &[u8]) -> Result<usize, SinkError> {
            self.lines
                .lock()
                .unwrap()
                .push(String::from_utf8_lossy(buf).into_owned());
            Ok(buf.len())
        }
    }

    struct FailingSink(fn() -> SinkError);

    impl Sink for FailingSink {
        fn write(&self, _buf: &[u8]) -> Result<usize, SinkError> {
            Err((self.0)())
        }
    }

    fn marshaller(sink: Arc<dyn Sink>) -> AuditMarshaller {
        let config = MarshallerConfigBuilder::new()
            .complete_after(Duration::from_secs(60))
            .retry(2, Duration::ZERO)
            .build()
            .unwrap();
        AuditMarshaller::new(config, sink).unwrap()
    }

    fn record(record_type: u16, seq: u32, body: &str) -> Command {
        Command::Record(RawRecord::new(
            record_type,
            format!("audit(1.000:{seq}): {body}").into_bytes(),
        ))
    }

    #[test]
    fn drains_pending_groups_on_shutdown() {
        let sink = Arc::new(MemorySink::default());
        let (tx, rx) = mpsc::channel(16);

        tx.blocking_send(record(1300, 1, "syscall=59")).unwrap();
        tx.blocking_send(record(1320, 1, "")).unwrap();
        tx.blocking_send(record(1300, 2, "syscall=2")).unwrap();
        tx.blocking_send(Command::Tick).unwrap();
        tx.blocking_send(Command::Shutdown).unwrap();

        let outcome = run(marshaller(sink.clone()), rx);
        assert_eq!(outcome, DispatchOutcome::Drained);
        assert_eq!(outcome.exit_code(), 0);

        let lines = sink.lines.lock().unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"sequence\":1"));
        assert!(lines[1].contains("\"sequence\":2"));
    }

    #[test]
    fn closed_channel_flushes_like_shutdown() {
        let sink = Arc::new(MemorySink::default());
        let (tx, rx) = mpsc::channel(16);
        tx.blocking_send(record(1300, 7, "syscall=1")).unwrap();
        drop(tx);

        assert_eq!(run(marshaller(sink.clone()), rx), DispatchOutcome::Drained);
        assert_eq!(sink.lines.lock().unwrap().len(), 1);
    }

    #[test]
    fn exhausted_writes_stop_with_failure_code() {
        let sink = Arc::new(FailingSink(|| SinkError::Write("disk full".to_owned())));
        let (tx, rx) = mpsc::channel(16);
        tx.blocking_send(record(1300, 1, "syscall=59")).unwrap();
        tx.blocking_send(record(1320, 1, "")).unwrap();
        // 치명적 에러 이후의 명령은 처리되지 않음
        tx.blocking_send(record(1300, 2, "syscall=2")).unwrap();

        let outcome = run(marshaller(sink), rx);
        assert!(matches!(outcome, DispatchOutcome::WriteExhausted(_)));
        assert_eq!(outcome.exit_code(), 1);
    }

    #[test]
    fn closed_sink_stops_cleanly() {
        let sink = Arc::new(FailingSink(|| SinkError::Closed));
        let (tx, rx) = mpsc::channel(16);
        tx.blocking_send(record(1300, 1, "syscall=59")).unwrap();
        tx.blocking_send(Command::Shutdown).unwrap();

        let outcome = run(marshaller(sink), rx);
        assert_eq!(outcome, DispatchOutcome::SinkClosed);
        assert_eq!(outcome.exit_code(), 0);
    }

    #[tokio::test]
    async fn spawned_dispatcher_reports_outcome() {
        let sink = Arc::new(MemorySink::default());
        let (tx, rx) = mpsc::channel(16);
        let mut dispatcher = Dispatcher::spawn(marshaller(sink.clone()), rx).unwrap();

        tx.send(record(1300, 3, "syscall=59")).await.unwrap();
        tx.send(Command::Shutdown).await.unwrap();

        assert_eq!(dispatcher.wait().await, DispatchOutcome::Drained);
        assert_eq!(dispatcher.wait().await, DispatchOutcome::Drained);
        assert_eq!(sink.lines.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_sends_ticks_until_cancelled() {
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let ticker = spawn_ticker(tx, Duration::from_millis(100), cancel.clone());

        tokio::time::sleep(Duration::from_millis(350)).await;
        cancel.cancel();
        ticker.await.unwrap();

        let mut ticks = 0;
        while let Ok(Command::Tick) = rx.try_recv() {
            ticks += 1;
        }
        assert_eq!(ticks, 3);
    }
}
