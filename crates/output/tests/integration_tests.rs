//! 출력 싱크 통합 테스트
//!
//! 설정 -> build_sink -> 실제 파일/로컬 HTTP 서버까지의 경로를 검증합니다.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use auditpost_core::config::{OutputConfig, OutputKind};
use auditpost_output::{BuiltSink, build_sink};

/// 수집 서버가 받은 요청
#[derive(Debug)]
struct Received {
    headers: String,
    body: Vec<u8>,
}

/// 모든 요청에 고정 상태 코드로 응답하는 최소 HTTP 서버
async fn spawn_collector(status: u16) -> (String, mpsc::UnboundedReceiver<Received>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Some(received) = handle_connection(stream, status).await {
                    let _ = tx.send(received);
                }
            });
        }
    });

    (format!("http://{addr}/audit"), rx)
}

async fn handle_connection(mut stream: TcpStream, status: u16) -> Option<Received> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
    let content_length = headers
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let response =
        format!("HTTP/1.1 {status} OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
    stream.write_all(response.as_bytes()).await.ok()?;
    let _ = stream.shutdown().await;

    Some(Received {
        headers,
        body: buf[header_end..].to_vec(),
    })
}

async fn next_request(rx: &mut mpsc::UnboundedReceiver<Received>) -> Received {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("collector did not receive a request in time")
        .expect("collector closed")
}

fn http_config(url: String) -> OutputConfig {
    let mut config = OutputConfig {
        kind: OutputKind::Http,
        ..OutputConfig::default()
    };
    config.http.url = url;
    config.http.worker_count = 2;
    config.http.buffer_size = 16;
    config
}

#[tokio::test]
async fn http_sink_posts_events_to_collector() {
    let (url, mut rx) = spawn_collector(200).await;
    let sink = build_sink(&http_config(url)).unwrap();

    let payload = b"{\"sequence\":42,\"messages\":[]}\n";
    assert_eq!(sink.as_sink().write(payload).unwrap(), payload.len());

    let received = next_request(&mut rx).await;
    assert!(received.headers.starts_with("post /audit"));
    assert!(received.headers.contains("content-type: application/json"));
    assert_eq!(received.body, payload);

    sink.close_and_wait().await;
}

#[tokio::test]
async fn http_sink_envelope_and_trace_header() {
    let (url, mut rx) = spawn_collector(202).await;
    let mut config = http_config(url);
    config.http.transformer = "envelope".to_owned();
    config.http.trace_header_name = "X-Trace-Id".to_owned();
    let sink = build_sink(&config).unwrap();

    sink.as_sink()
        .write(b"{\"sequence\":7,\"rule_key\":\"exec\"}\n")
        .unwrap();

    let received = next_request(&mut rx).await;
    let doc: serde_json::Value = serde_json::from_slice(&received.body).unwrap();
    assert_eq!(doc["event"]["sequence"], 7);
    assert_eq!(doc["event"]["rule_key"], "exec");

    let trace_id = doc["trace_id"].as_str().unwrap();
    assert!(
        received
            .headers
            .contains(&format!("x-trace-id: {}", trace_id.to_ascii_lowercase()))
    );

    sink.close_and_wait().await;
}

#[tokio::test]
async fn http_sink_never_blocks_on_unreachable_collector() {
    // 바인드 후 즉시 닫아 연결이 거부되는 주소를 만듦
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut config = http_config(format!("http://{addr}/audit"));
    config.http.buffer_size = 4;
    config.http.worker_count = 1;
    let sink = build_sink(&config).unwrap();

    let started = std::time::Instant::now();
    for i in 0..100 {
        let line = format!("{{\"sequence\":{i}}}\n");
        assert!(sink.as_sink().write(line.as_bytes()).is_ok());
    }
    assert!(started.elapsed() < Duration::from_secs(2));

    tokio::time::timeout(Duration::from_secs(5), sink.close_and_wait())
        .await
        .expect("close should finish promptly");

    if let BuiltSink::Http(http) = &sink {
        assert!(http.is_closed());
    }
}

#[tokio::test]
async fn file_sink_survives_rotation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.log");
    let rotated = dir.path().join("audit.log.1");

    let mut config = OutputConfig::default();
    config.file.path = path.display().to_string();
    let sink = build_sink(&config).unwrap();
    let writer = sink.as_sink();

    writer.write(b"{\"sequence\":1}\n").unwrap();
    std::fs::rename(&path, &rotated).unwrap();
    writer.write(b"{\"sequence\":2}\n").unwrap();

    writer.reopen().unwrap();
    writer.write(b"{\"sequence\":3}\n").unwrap();
    sink.close_and_wait().await;

    let old = std::fs::read_to_string(&rotated).unwrap();
    let new = std::fs::read_to_string(&path).unwrap();
    assert_eq!(old, "{\"sequence\":1}\n{\"sequence\":2}\n");
    assert_eq!(new, "{\"sequence\":3}\n");
}
