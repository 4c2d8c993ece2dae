//! HTTP 비동기 싱크 — 제한 큐와 워커 풀로 이벤트를 POST합니다.
//!
//! # 동작
//!
//! - `write`는 절대 블로킹하지 않습니다. 큐가 가득 차면 메시지를 버리고 드롭 카운터만 올립니다.
//! - 고정 수의 워커가 하나의 큐를 공유합니다. 워커 간 전송 순서는 보장하지 않습니다.
//! - 전송은 회로 차단기로 감싼 [`GuardedTransport`]를 거치므로 하위 서버 장애 시 빠르게 실패합니다.
//! - `close`는 새 기록을 거부하고 취소 신호를 보냅니다. 대기/전송 중인 워커는 즉시 종료합니다.
//!
//! ```text
//! write() --try_send--> [bounded queue] --> worker x N --> transform --> GuardedTransport
//!    |                                          |
//!  full: drop + count                   cancel: exit
//! ```

pub mod transformer;
pub mod transport;

pub use transformer::BodyTransformer;
pub use transport::{
    GuardedTransport, OutboundRequest, ReqwestTransport, TransportError, classify_status,
    with_circuit_breaker,
};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use bytes::Bytes;
use metrics::{counter, histogram};
use reqwest::header::{HeaderName, HeaderValue};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceExt};
use uuid::Uuid;

use auditpost_core::config::HttpOutputConfig;
use auditpost_core::error::SinkError;
use auditpost_core::metrics::{
    HTTP_SINK_BREAKER_REJECTED_TOTAL, HTTP_SINK_LATENCY_SECONDS, HTTP_SINK_MESSAGES_DROPPED_TOTAL,
    HTTP_SINK_MESSAGES_TOTAL, HTTP_SINK_REQUEST_ERRORS_TOTAL, HTTP_SINK_RESPONSES_TOTAL,
    LABEL_STATUS_CODE,
};
use auditpost_core::pipeline::Sink;

use crate::error::OutputError;

/// 큐에 들어가는 전달 단위
#[derive(Debug, Clone)]
pub struct Delivery {
    /// 인코딩된 이벤트
    pub payload: Bytes,
    /// 추적 ID
    pub trace_id: Uuid,
    /// 큐 진입 시각 (지연 시간 측정용)
    pub enqueued_at: Instant,
}

/// 워커가 공유하는 상태
///
/// `tower::Service`는 `&mut self`로 호출하므로 전송은 async mutex 뒤에 둡니다.
/// 잠금은 `ready` + `call`까지만 유지하고 응답 대기는 잠금 밖에서 합니다.
struct WorkerContext {
    transport: tokio::sync::Mutex<GuardedTransport>,
    transformer: BodyTransformer,
    trace_header: Option<HeaderName>,
    debug: bool,
}

/// HTTP 비동기 싱크
pub struct HttpSink {
    tx: mpsc::Sender<Delivery>,
    cancel: CancellationToken,
    closed: AtomicBool,
    dropped: AtomicU64,
    workers: Mutex<Vec<JoinHandle<()>>>,
    debug: bool,
}

impl HttpSink {
    /// 전송을 회로 차단기로 감싸고 워커를 띄웁니다. tokio 런타임 안에서 호출해야 합니다.
    pub fn start<T>(
        config: &HttpOutputConfig,
        transport: T,
        transformer: BodyTransformer,
    ) -> Result<Self, OutputError>
    where
        T: Service<OutboundRequest, Response = u16, Error = TransportError>
            + Clone
            + Send
            + 'static,
        T::Future: Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| OutputError::Runtime(e.to_string()))?;

        if config.buffer_size == 0 || config.worker_count == 0 {
            return Err(OutputError::Config {
                field: "output.http".to_owned(),
                reason: "buffer_size and worker_count must be at least 1".to_owned(),
            });
        }

        let trace_header = if config.trace_header_name.is_empty() {
            None
        } else {
            Some(
                HeaderName::from_bytes(config.trace_header_name.as_bytes()).map_err(|e| {
                    OutputError::Config {
                        field: "output.http.trace_header_name".to_owned(),
                        reason: e.to_string(),
                    }
                })?,
            )
        };

        let context = Arc::new(WorkerContext {
            transport: tokio::sync::Mutex::new(with_circuit_breaker(transport, config)),
            transformer,
            trace_header,
            debug: config.debug,
        });

        let (tx, rx) = mpsc::channel(config.buffer_size);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let cancel = CancellationToken::new();

        let workers = (0..config.worker_count)
            .map(|id| {
                runtime.spawn(run_worker(
                    id,
                    Arc::clone(&rx),
                    Arc::clone(&context),
                    cancel.clone(),
                ))
            })
            .collect();

        tracing::info!(
            url = %config.url,
            buffer_size = config.buffer_size,
            workers = config.worker_count,
            transformer = transformer.name(),
            "http sink started"
        );

        Ok(Self {
            tx,
            cancel,
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
            workers: Mutex::new(workers),
            debug: config.debug,
        })
    }

    /// 새 기록을 거부하고 워커에 취소 신호를 보냅니다.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!(
            dropped = self.dropped_count(),
            "http sink closing, cancelling workers"
        );
        self.cancel.cancel();
    }

    /// 모든 워커가 종료될 때까지 기다립니다.
    pub async fn wait_for_workers(&self) {
        let workers = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for handle in workers {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "http sink worker panicked");
            }
        }
        tracing::info!("http sink workers completed");
    }

    /// 큐가 가득 차 버려진 메시지 수
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// 종료되었는지 확인합니다.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Sink for HttpSink {
    fn write(&self, buf: &[u8]) -> Result<usize, SinkError> {
        if self.is_closed() {
            return Err(SinkError::Closed);
        }

        let delivery = Delivery {
            payload: Bytes::copy_from_slice(buf),
            trace_id: Uuid::new_v4(),
            enqueued_at: Instant::now(),
        };

        if self.debug {
            let text = String::from_utf8_lossy(buf);
            tracing::info!(trace_id = %delivery.trace_id, payload = %text.trim_end(), "enqueue");
            if let Err(e) = serde_json::from_slice::<serde::de::IgnoredAny>(buf) {
                tracing::info!(
                    trace_id = %delivery.trace_id,
                    error = %e,
                    "payload is not valid JSON"
                );
            }
        }

        counter!(HTTP_SINK_MESSAGES_TOTAL).increment(1);

        match self.tx.try_send(delivery) {
            Ok(()) => Ok(buf.len()),
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                counter!(HTTP_SINK_MESSAGES_DROPPED_TOTAL).increment(1);
                tracing::error!("http sink queue full, message dropped");
                Ok(buf.len())
            }
            Err(TrySendError::Closed(_)) => Err(SinkError::Closed),
        }
    }

    fn shutdown(&self) {
        self.close();
    }
}

impl std::fmt::Debug for HttpSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSink")
            .field("closed", &self.is_closed())
            .field("dropped", &self.dropped_count())
            .finish_non_exhaustive()
    }
}

async fn run_worker(
    id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Delivery>>>,
    context: Arc<WorkerContext>,
    cancel: CancellationToken,
) {
    tracing::debug!(worker = id, "http sink worker started");

    loop {
        let delivery = tokio::select! {
            _ = cancel.cancelled() => break,
            next = async { rx.lock().await.recv().await } => match next {
                Some(delivery) => delivery,
                None => break,
            },
        };

        let trace_id = delivery.trace_id;
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(worker = id, %trace_id, "request abandoned on shutdown");
                break;
            }
            _ = context.deliver(delivery) => {}
        }
    }

    tracing::debug!(worker = id, "http sink worker stopped");
}

impl WorkerContext {
    async fn deliver(&self, delivery: Delivery) {
        let trace_id = delivery.trace_id;

        let Some(body) = self.transformer.transform(trace_id, &delivery.payload) else {
            return;
        };
        if self.debug {
            tracing::info!(%trace_id, body = %String::from_utf8_lossy(&body), "sending");
        }

        let mut request = OutboundRequest::new(body);
        if let Some(name) = &self.trace_header {
            // UUID 문자열은 항상 유효한 헤더 값
            if let Ok(value) = HeaderValue::from_str(&trace_id.to_string()) {
                request = request.with_header(name.clone(), value);
            }
        }

        let response = {
            let mut transport = self.transport.lock().await;
            transport
                .ready()
                .await
                .map(|service| service.call(request))
        };
        let result = match response {
            Ok(future) => future.await,
            Err(e) => Err(e),
        };

        match result {
            Ok(status) => {
                record_response(status, delivery.enqueued_at);
            }
            Err(TransportError::Status(status)) => {
                record_response(status, delivery.enqueued_at);
                tracing::warn!(%trace_id, status, "collector returned server error");
            }
            Err(TransportError::BreakerOpen) => {
                counter!(HTTP_SINK_BREAKER_REJECTED_TOTAL).increment(1);
                tracing::debug!(%trace_id, "circuit breaker open, message skipped");
            }
            Err(e) => {
                counter!(HTTP_SINK_REQUEST_ERRORS_TOTAL).increment(1);
                tracing::error!(%trace_id, error = %e, "could not send request");
            }
        }
    }
}

fn record_response(status: u16, enqueued_at: Instant) {
    counter!(HTTP_SINK_RESPONSES_TOTAL, LABEL_STATUS_CODE => status.to_string()).increment(1);
    histogram!(HTTP_SINK_LATENCY_SECONDS).record(enqueued_at.elapsed().as_secs_f64());
}
