//! Prometheus exporter behaviour as seen by a scraper.
//!
//! A global recorder can only be installed once per process, so exactly one test here
//! installs successfully; the others fail validation before reaching `install()`.

use std::time::Duration;

use auditpost_core::config::MetricsConfig;
use auditpost_core::metrics::{
    HTTP_SINK_LATENCY_SECONDS, LABEL_FILTER_TIER, MARSHALLER_FILTER_DURATION_SECONDS,
    MARSHALLER_MESSAGES_FILTERED_TOTAL,
};
use auditpost_daemon::metrics_server;
use serial_test::serial;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const SCRAPE_PORT: u16 = 19102;

fn metrics_config(listen_addr: &str, port: u16, endpoint: &str) -> MetricsConfig {
    MetricsConfig {
        enabled: true,
        listen_addr: listen_addr.to_owned(),
        port,
        endpoint: endpoint.to_owned(),
    }
}

async fn scrape(port: u16) -> String {
    let mut stream = None;
    for _ in 0..100 {
        if let Ok(s) = TcpStream::connect(("127.0.0.1", port)).await {
            stream = Some(s);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let mut stream = stream.expect("metrics listener should accept connections");

    stream
        .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn scrape_exposes_auditpost_metrics_with_custom_buckets() {
    let config = metrics_config("127.0.0.1", SCRAPE_PORT, "/metrics");
    metrics_server::install_metrics_recorder(&config).expect("recorder should install");

    metrics::counter!(MARSHALLER_MESSAGES_FILTERED_TOTAL, LABEL_FILTER_TIER => "syscall")
        .increment(2);
    metrics::histogram!(MARSHALLER_FILTER_DURATION_SECONDS).record(0.000_02);
    metrics::histogram!(HTTP_SINK_LATENCY_SECONDS).record(0.2);

    let body = scrape(SCRAPE_PORT).await;
    assert!(body.starts_with("HTTP/1.1 200"), "unexpected response: {body}");

    // describe_all() descriptions are rendered as HELP lines
    let help =
        "# HELP auditpost_marshaller_messages_filtered_total Total number of completed events";
    assert!(body.contains(help));
    assert!(body.contains("auditpost_marshaller_messages_filtered_total{tier=\"syscall\"} 2"));

    // filter latency uses the microsecond buckets, not the exporter defaults
    assert!(body.contains("auditpost_marshaller_filter_duration_seconds_bucket{le=\"0.001\"} 1"));
    assert!(!body.contains("auditpost_marshaller_filter_duration_seconds_bucket{le=\"2.5\"}"));

    // http latency has no 2.5s bucket, unlike the defaults
    assert!(body.contains("auditpost_http_sink_latency_seconds_bucket{le=\"0.25\"} 1"));
    assert!(!body.contains("auditpost_http_sink_latency_seconds_bucket{le=\"2.5\"}"));
}

#[test]
#[serial]
fn rejects_unparseable_listen_address() {
    let err = metrics_server::install_metrics_recorder(&metrics_config(
        "metrics.local",
        SCRAPE_PORT + 1,
        "/metrics",
    ))
    .unwrap_err();
    assert!(err.to_string().contains("invalid metrics listen address"));
}

#[test]
#[serial]
fn rejects_endpoint_other_than_metrics() {
    let err = metrics_server::install_metrics_recorder(&metrics_config(
        "127.0.0.1",
        SCRAPE_PORT + 1,
        "/prometheus",
    ))
    .unwrap_err();
    assert!(err.to_string().contains("/prometheus"));
}
