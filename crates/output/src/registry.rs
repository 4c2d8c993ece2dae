//! 출력 종류별 싱크 생성
//!
//! [`OutputKind`]에서 생성자로의 명시적 매핑입니다. 시작 시 한 번 호출합니다.

use std::sync::Arc;

use auditpost_core::config::{OutputConfig, OutputKind};
use auditpost_core::pipeline::Sink;

use crate::error::OutputError;
use crate::file::FileSink;
use crate::http::{BodyTransformer, HttpSink, ReqwestTransport};
use crate::stdout::StdoutSink;

/// 생성된 싱크
///
/// 재조립기에는 [`BuiltSink::as_sink`]로 trait 객체를 넘기고,
/// 데몬은 이 값을 보관해 종료 시 [`BuiltSink::close_and_wait`]를 호출합니다.
#[derive(Debug, Clone)]
pub enum BuiltSink {
    /// 파일 싱크
    File(Arc<FileSink>),
    /// 표준 출력 싱크
    Stdout(Arc<StdoutSink>),
    /// HTTP 비동기 싱크
    Http(Arc<HttpSink>),
}

impl BuiltSink {
    /// 출력 종류
    pub fn kind(&self) -> OutputKind {
        match self {
            Self::File(_) => OutputKind::File,
            Self::Stdout(_) => OutputKind::Stdout,
            Self::Http(_) => OutputKind::Http,
        }
    }

    /// 공유 가능한 [`Sink`] trait 객체
    pub fn as_sink(&self) -> Arc<dyn Sink> {
        match self {
            Self::File(sink) => sink.clone() as Arc<dyn Sink>,
            Self::Stdout(sink) => sink.clone(),
            Self::Http(sink) => sink.clone(),
        }
    }

    /// 새 기록을 막고, 비동기 싱크라면 워커 종료까지 기다립니다.
    ///
    /// HTTP 싱크는 취소 신호로 워커를 즉시 멈춥니다. 큐에 남아 있거나 전송 중인 메시지는
    /// 보내지 않고 버리므로, 종료 직전 `flush_all`로 넣은 이벤트도 전달이 보장되지 않습니다.
    /// 파일/표준 출력 싱크는 기록이 동기식이라 잃는 것이 없습니다.
    pub async fn close_and_wait(&self) {
        self.as_sink().shutdown();
        if let Self::Http(sink) = self {
            sink.wait_for_workers().await;
        }
    }
}

/// 설정에 맞는 싱크를 생성합니다. HTTP 싱크는 tokio 런타임 안에서 생성해야 합니다.
pub fn build_sink(config: &OutputConfig) -> Result<BuiltSink, OutputError> {
    if config.attempts == 0 {
        return Err(OutputError::Config {
            field: "output.attempts".to_owned(),
            reason: "must be at least 1".to_owned(),
        });
    }

    let sink = match config.kind {
        OutputKind::File => BuiltSink::File(Arc::new(FileSink::open(&config.file)?)),
        OutputKind::Stdout => BuiltSink::Stdout(Arc::new(StdoutSink::new())),
        OutputKind::Http => {
            let transformer = BodyTransformer::from_name(&config.http.transformer)?;
            let transport = ReqwestTransport::new(&config.http)?;
            BuiltSink::Http(Arc::new(HttpSink::start(
                &config.http,
                transport,
                transformer,
            )?))
        }
    };

    tracing::info!(kind = %config.kind, attempts = config.attempts, "output sink built");
    Ok(sink)
}
