//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `auditpost_`
//! - 모듈명: `marshaller_`, `writer_`, `http_sink_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(auditpost_core::metrics::MARSHALLER_MESSAGES_FILTERED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// HTTP 상태 코드 레이블 키
pub const LABEL_STATUS_CODE: &str = "status_code";

/// 필터 단계 레이블 키 (syscall, rule_key)
pub const LABEL_FILTER_TIER: &str = "tier";

// ─── Marshaller 메트릭 ──────────────────────────────────────────────

/// Marshaller: 필터로 버려진 이벤트 수 (counter)
pub const MARSHALLER_MESSAGES_FILTERED_TOTAL: &str =
    "auditpost_marshaller_messages_filtered_total";

/// Marshaller: 필터 판정 지연 시간 (histogram, 초)
pub const MARSHALLER_FILTER_DURATION_SECONDS: &str =
    "auditpost_marshaller_filter_duration_seconds";

/// Marshaller: 출력으로 보낸 이벤트 수 (counter)
pub const MARSHALLER_EVENTS_WRITTEN_TOTAL: &str = "auditpost_marshaller_events_written_total";

/// Marshaller: 관심 범위 밖이라 무시한 레코드 수 (counter)
pub const MARSHALLER_RECORDS_IGNORED_TOTAL: &str = "auditpost_marshaller_records_ignored_total";

/// Marshaller: 재조립 대기 중인 그룹 수 (gauge)
pub const MARSHALLER_PENDING_GROUPS: &str = "auditpost_marshaller_pending_groups";

/// Marshaller: 역순으로 늦게 도착한 시퀀스 수 (counter)
pub const MARSHALLER_SEQUENCES_OUT_OF_ORDER_TOTAL: &str =
    "auditpost_marshaller_sequences_out_of_order_total";

/// Marshaller: 허용 윈도우를 벗어나 유실로 간주된 시퀀스 수 (counter)
pub const MARSHALLER_SEQUENCES_LOST_TOTAL: &str = "auditpost_marshaller_sequences_lost_total";

// ─── Writer 메트릭 ─────────────────────────────────────────────────

/// Writer: 재시도 횟수 (counter)
pub const WRITER_RETRIES_TOTAL: &str = "auditpost_writer_retries_total";

// ─── HTTP Sink 메트릭 ──────────────────────────────────────────────

/// HTTP Sink: 큐에 들어온 전체 메시지 수 (counter)
pub const HTTP_SINK_MESSAGES_TOTAL: &str = "auditpost_http_sink_messages_total";

/// HTTP Sink: 큐가 가득 차 드롭된 메시지 수 (counter)
pub const HTTP_SINK_MESSAGES_DROPPED_TOTAL: &str = "auditpost_http_sink_messages_dropped_total";

/// HTTP Sink: 요청 실패 수 (counter)
pub const HTTP_SINK_REQUEST_ERRORS_TOTAL: &str = "auditpost_http_sink_request_errors_total";

/// HTTP Sink: 상태 코드별 응답 수 (counter, label: status_code)
pub const HTTP_SINK_RESPONSES_TOTAL: &str = "auditpost_http_sink_responses_total";

/// HTTP Sink: 큐 진입부터 응답까지 지연 시간 (histogram, 초)
pub const HTTP_SINK_LATENCY_SECONDS: &str = "auditpost_http_sink_latency_seconds";

/// HTTP Sink: 회로 차단기가 거부한 요청 수 (counter)
pub const HTTP_SINK_BREAKER_REJECTED_TOTAL: &str = "auditpost_http_sink_breaker_rejected_total";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 입력에서 읽은 레코드 수 (counter)
pub const DAEMON_RECORDS_RECEIVED_TOTAL: &str = "auditpost_daemon_records_received_total";

/// Daemon: 디코딩 실패한 입력 줄 수 (counter)
pub const DAEMON_RECORD_DECODE_ERRORS_TOTAL: &str = "auditpost_daemon_record_decode_errors_total";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 필터 판정 지연 시간 히스토그램 버킷 (초)
///
/// 1us ~ 10ms 범위
pub const FILTER_DURATION_BUCKETS: [f64; 8] =
    [0.000_001, 0.000_005, 0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.01];

/// HTTP 전송 지연 시간 히스토그램 버킷 (초)
pub const HTTP_LATENCY_BUCKETS: [f64; 9] = [0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0, 10.0];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Marshaller
    describe_counter!(
        MARSHALLER_MESSAGES_FILTERED_TOTAL,
        "Total number of completed events dropped by filter rules"
    );
    describe_histogram!(
        MARSHALLER_FILTER_DURATION_SECONDS,
        "Time to evaluate filter rules for one event in seconds"
    );
    describe_counter!(
        MARSHALLER_EVENTS_WRITTEN_TOTAL,
        "Total number of completed events handed to the output"
    );
    describe_counter!(
        MARSHALLER_RECORDS_IGNORED_TOTAL,
        "Total number of records outside the configured event type range"
    );
    describe_gauge!(
        MARSHALLER_PENDING_GROUPS,
        "Number of events currently awaiting completion"
    );
    describe_counter!(
        MARSHALLER_SEQUENCES_OUT_OF_ORDER_TOTAL,
        "Total number of sequence numbers that arrived late"
    );
    describe_counter!(
        MARSHALLER_SEQUENCES_LOST_TOTAL,
        "Total number of sequence numbers presumed lost"
    );

    // Writer
    describe_counter!(WRITER_RETRIES_TOTAL, "Total number of output write retries");

    // HTTP Sink
    describe_counter!(
        HTTP_SINK_MESSAGES_TOTAL,
        "Total number of messages offered to the HTTP sink"
    );
    describe_counter!(
        HTTP_SINK_MESSAGES_DROPPED_TOTAL,
        "Total number of messages dropped because the queue was full"
    );
    describe_counter!(
        HTTP_SINK_REQUEST_ERRORS_TOTAL,
        "Total number of HTTP requests that failed before a response"
    );
    describe_counter!(
        HTTP_SINK_RESPONSES_TOTAL,
        "HTTP responses received, by status code"
    );
    describe_histogram!(
        HTTP_SINK_LATENCY_SECONDS,
        "Time from enqueue to response in seconds"
    );
    describe_counter!(
        HTTP_SINK_BREAKER_REJECTED_TOTAL,
        "Total number of requests rejected by the open circuit breaker"
    );

    // Daemon
    describe_counter!(
        DAEMON_RECORDS_RECEIVED_TOTAL,
        "Total number of raw audit records read from input"
    );
    describe_counter!(
        DAEMON_RECORD_DECODE_ERRORS_TOTAL,
        "Total number of input lines that could not be decoded"
    );
}
