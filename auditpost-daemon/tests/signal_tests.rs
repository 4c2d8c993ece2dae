//! SIGUSR1 reopen handling.
//!
//! Sends real signals to the test process, so every test here is serialized.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use auditpost_core::error::SinkError;
use auditpost_core::pipeline::Sink;
use auditpost_daemon::signals::spawn_reopen_handler;
use serial_test::serial;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct CountingSink {
    reopens: AtomicUsize,
}

impl Sink for CountingSink {
    fn write(&self, buf: &[u8]) -> Result<usize, SinkError> {
        Ok(buf.len())
    }

    fn reopen(&self) -> Result<(), SinkError> {
        self.reopens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn send_sigusr1() {
    let status = std::process::Command::new("kill")
        .arg("-USR1")
        .arg(std::process::id().to_string())
        .status()
        .unwrap();
    assert!(status.success());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn sigusr1_reopens_sink() {
    let sink = Arc::new(CountingSink::default());
    let cancel = CancellationToken::new();
    let handler = spawn_reopen_handler(sink.clone(), cancel.clone()).unwrap();

    send_sigusr1();

    let mut reopened = false;
    for _ in 0..100 {
        if sink.reopens.load(Ordering::SeqCst) >= 1 {
            reopened = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(reopened, "sink was not reopened after SIGUSR1");

    cancel.cancel();
    handler.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn handler_stops_on_cancel() {
    let sink = Arc::new(CountingSink::default());
    let cancel = CancellationToken::new();
    let handler = spawn_reopen_handler(sink.clone(), cancel.clone()).unwrap();

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handler)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sink.reopens.load(Ordering::SeqCst), 0);
}
