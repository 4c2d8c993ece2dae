//! HTTP 전송 계층
//!
//! 전송은 `tower::Service<OutboundRequest>`로 표현합니다. 응답은 상태 코드(`u16`)이고
//! 5xx 응답은 [`TransportError::Status`]로 돌려주어 회로 차단기가 실패로 집계합니다.
//! 운영 환경은 [`ReqwestTransport`]를, 테스트는 `MockTransport`를 사용합니다.
//!
//! ```text
//! worker -> GuardedTransport = MapErr(CircuitBreaker(ReqwestTransport)) -> 수집 서버
//!                                        |
//!                            열리면 호출 없이 BreakerOpen
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use reqwest::{Certificate, Identity};
use tower::util::BoxService;
use tower::{Service, ServiceBuilder};
use tower_resilience_circuitbreaker::{CircuitBreakerError, CircuitBreakerLayer};

use auditpost_core::config::{HttpOutputConfig, TlsConfig};

use crate::error::OutputError;

/// 전송할 요청
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    /// 요청 본문
    pub body: Bytes,
    /// 추가 헤더 (이름, 값)
    pub headers: Vec<(HeaderName, HeaderValue)>,
}

impl OutboundRequest {
    /// 본문만 있는 요청을 생성합니다.
    pub fn new(body: Bytes) -> Self {
        Self {
            body,
            headers: Vec::new(),
        }
    }

    /// 헤더를 추가합니다.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.push((name, value));
        self
    }
}

/// 전송 에러
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// 회로 차단기가 열려 있어 요청을 보내지 않음
    #[error("circuit breaker open")]
    BreakerOpen,

    /// 서버 에러 응답 (5xx)
    #[error("server responded with status {0}")]
    Status(u16),

    /// 연결/타임아웃 등 요청 실패
    #[error("request failed: {0}")]
    Request(String),
}

/// 회로 차단기로 감싼 전송
pub type GuardedTransport = BoxService<OutboundRequest, u16, TransportError>;

type TransportFuture = Pin<Box<dyn Future<Output = Result<u16, TransportError>> + Send>>;

/// 상태 코드를 결과로 분류합니다. 5xx는 실패입니다.
pub fn classify_status(status: u16) -> Result<u16, TransportError> {
    if status >= 500 {
        Err(TransportError::Status(status))
    } else {
        Ok(status)
    }
}

fn breaker_error(err: CircuitBreakerError<TransportError>) -> TransportError {
    match err {
        CircuitBreakerError::OpenCircuit => TransportError::BreakerOpen,
        CircuitBreakerError::Inner(e) => e,
    }
}

/// 전송을 회로 차단기로 감쌉니다.
///
/// 최근 `breaker_min_observations`개 호출의 실패 비율이 `failure_ratio` 이상이면 열리고,
/// `breaker_cooldown_ms` 뒤 반개방 상태에서 시험 요청을 통과시킵니다.
pub fn with_circuit_breaker<S>(transport: S, config: &HttpOutputConfig) -> GuardedTransport
where
    S: Service<OutboundRequest, Response = u16, Error = TransportError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    let breaker: CircuitBreakerLayer<u16, TransportError> = CircuitBreakerLayer::builder()
        .name("auditpost-http-sink")
        .failure_rate_threshold(config.failure_ratio)
        .sliding_window_size(config.breaker_min_observations)
        .minimum_number_of_calls(config.breaker_min_observations)
        .wait_duration_in_open(Duration::from_millis(config.breaker_cooldown_ms))
        .on_state_transition(|from, to| {
            tracing::warn!(from = ?from, to = ?to, "circuit breaker state transition");
        })
        .build();

    let service = ServiceBuilder::new()
        .map_err(breaker_error)
        .layer(breaker.for_request::<OutboundRequest>())
        .service(transport);
    BoxService::new(service)
}

/// reqwest 기반 운영 전송
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    url: Arc<str>,
}

impl ReqwestTransport {
    /// HTTP 출력 설정으로 클라이언트를 생성합니다.
    pub fn new(config: &HttpOutputConfig) -> Result<Self, OutputError> {
        let mut builder = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(config.idle_conn_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs));

        if config.tls.enabled {
            builder = apply_tls(builder, &config.tls)?;
        }

        let client = builder
            .build()
            .map_err(|e| OutputError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            url: Arc::from(config.url.as_str()),
        })
    }

    /// 대상 URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// CA 인증서와 클라이언트 인증서(mTLS)를 클라이언트에 설정합니다.
fn apply_tls(
    mut builder: reqwest::ClientBuilder,
    tls: &TlsConfig,
) -> Result<reqwest::ClientBuilder, OutputError> {
    if !tls.ca_cert.is_empty() {
        let pem = read_pem(&tls.ca_cert)?;
        let certs = Certificate::from_pem_bundle(&pem).map_err(|e| OutputError::Tls {
            path: tls.ca_cert.clone(),
            reason: e.to_string(),
        })?;
        if certs.is_empty() {
            return Err(OutputError::Tls {
                path: tls.ca_cert.clone(),
                reason: "no certificate found".to_owned(),
            });
        }
        for cert in certs {
            builder = builder.add_root_certificate(cert);
        }
    }

    if !tls.client_cert.is_empty() {
        let mut pem = read_pem(&tls.client_cert)?;
        pem.extend_from_slice(b"\n");
        pem.extend_from_slice(&read_pem(&tls.client_key)?);
        let identity = Identity::from_pem(&pem).map_err(|e| OutputError::Tls {
            path: tls.client_cert.clone(),
            reason: e.to_string(),
        })?;
        builder = builder.identity(identity);
    }

    tracing::info!(
        ca_cert = %tls.ca_cert,
        client_cert = %tls.client_cert,
        "tls configured for http sink"
    );
    Ok(builder)
}

fn read_pem(path: &str) -> Result<Vec<u8>, OutputError> {
    std::fs::read(path).map_err(|e| OutputError::Tls {
        path: path.to_owned(),
        reason: e.to_string(),
    })
}

impl Service<OutboundRequest> for ReqwestTransport {
    type Response = u16;
    type Error = TransportError;
    type Future = TransportFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: OutboundRequest) -> Self::Future {
        let client = self.client.clone();
        let url = Arc::clone(&self.url);

        Box::pin(async move {
            let mut builder = client
                .post(&*url)
                .header(CONTENT_TYPE, "application/json");
            for (name, value) in request.headers {
                builder = builder.header(name, value);
            }

            // 응답 본문은 읽지 않고 해제
            let response = builder
                .body(request.body)
                .send()
                .await
                .map_err(|e| TransportError::Request(e.to_string()))?;
            classify_status(response.status().as_u16())
        })
    }
}

/// 테스트용 Mock 전송
///
/// 받은 요청을 기록하고, 설정에 따라 고정 상태 코드/실패/무한 대기로 응답합니다.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct MockTransport {
    /// 호출 횟수
    pub calls: Arc<std::sync::atomic::AtomicUsize>,
    /// 받은 요청
    pub requests: Arc<std::sync::Mutex<Vec<OutboundRequest>>>,
    /// 호출 시 알림
    pub started: Arc<tokio::sync::Notify>,
    /// 요청 실패 시뮬레이션 (실행 중 전환 가능)
    pub fail: Arc<std::sync::atomic::AtomicBool>,
    /// 반환할 상태 코드 (기본 200)
    pub status: Option<u16>,
    /// 응답하지 않고 대기
    pub hang: bool,
}

#[cfg(test)]
impl MockTransport {
    /// 항상 200을 반환하는 mock
    pub fn new() -> Self {
        Self::default()
    }

    /// 지정 상태 코드를 반환하도록 설정합니다.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// 요청 실패를 반환하도록 설정합니다.
    pub fn failing(self) -> Self {
        self.fail.store(true, std::sync::atomic::Ordering::SeqCst);
        self
    }

    /// 응답 없이 대기하도록 설정합니다.
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }
}

#[cfg(test)]
impl Service<OutboundRequest> for MockTransport {
    type Response = u16;
    type Error = TransportError;
    type Future = TransportFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: OutboundRequest) -> Self::Future {
        use std::sync::atomic::Ordering;

        let mock = self.clone();
        Box::pin(async move {
            mock.requests.lock().unwrap().push(request);
            mock.calls.fetch_add(1, Ordering::SeqCst);
            mock.started.notify_one();

            if mock.hang {
                std::future::pending::<()>().await;
            }
            if mock.fail.load(Ordering::SeqCst) {
                return Err(TransportError::Request("connection refused".to_owned()));
            }
            classify_status(mock.status.unwrap_or(200))
        })
    }
}
