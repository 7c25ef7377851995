//! 메트릭 이름 및 설명
//!
//! 모든 크레이트는 이 상수를 `metrics::counter!()`, `metrics::gauge!()`와
//! 함께 사용합니다. 명명 규칙: `firehose_` 접두사, 카운터는 `_total` 접미사,
//! 게이지는 접미사 없음.
//!
//! ```ignore
//! metrics::counter!(firehose_core::metrics::ENVELOPES_RECEIVED_TOTAL).increment(1);
//! ```

/// 이벤트 타입 레이블 키
pub const LABEL_EVENT_TYPE: &str = "event_type";

/// 전송 프로토콜 레이블 키 (tcp, udp)
pub const LABEL_PROTOCOL: &str = "protocol";

/// 라우터에 전달된 엔벨로프 수 (counter)
pub const ENVELOPES_RECEIVED_TOTAL: &str = "firehose_envelopes_received_total";

/// 선택되지 않은 타입의 엔벨로프 수 (counter)
pub const ENVELOPES_UNSELECTED_TOTAL: &str = "firehose_envelopes_unselected_total";

/// 테넌트 필터 규칙에 의해 거부된 이벤트 수 (counter)
pub const EVENTS_FILTERED_TOTAL: &str = "firehose_events_filtered_total";

/// shipper에 전달된 이벤트 수 (counter, label: event_type)
pub const EVENTS_SHIPPED_TOTAL: &str = "firehose_events_shipped_total";

/// 수집 서버로 전송된 syslog 패킷 수 (counter, label: protocol)
pub const PACKETS_SENT_TOTAL: &str = "firehose_packets_sent_total";

/// 큐가 가득 차거나 닫혀 버려진 syslog 패킷 수 (counter)
pub const PACKETS_DROPPED_TOTAL: &str = "firehose_packets_dropped_total";

/// 실패하거나 타임아웃된 syslog 쓰기 수 (counter, label: protocol)
pub const TRANSPORT_ERRORS_TOTAL: &str = "firehose_transport_errors_total";

/// 캡처 파일에 복제된 라인 수 (counter)
pub const CAPTURE_LINES_WRITTEN_TOTAL: &str = "firehose_capture_lines_written_total";

/// 캡처 쓰기 실패 수 (counter)
pub const CAPTURE_ERRORS_TOTAL: &str = "firehose_capture_errors_total";

/// 열려 있는 조직별 캡처 writer 수 (gauge)
pub const CAPTURE_WRITERS_OPEN: &str = "firehose_capture_writers_open";

/// 발행된 통계 이벤트 수 (counter)
pub const STATS_EVENTS_EMITTED_TOTAL: &str = "firehose_stats_events_emitted_total";

/// 데몬 가동 시간, 초 단위 (gauge)
pub const DAEMON_UPTIME_SECONDS: &str = "firehose_daemon_uptime_seconds";

/// 모든 메트릭의 HELP 텍스트를 등록합니다.
///
/// 전역 recorder 설치 후 한 번 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(
        ENVELOPES_RECEIVED_TOTAL,
        "Total number of envelopes handed to the event router"
    );
    describe_counter!(
        ENVELOPES_UNSELECTED_TOTAL,
        "Envelopes discarded because their type is not selected"
    );
    describe_counter!(
        EVENTS_FILTERED_TOTAL,
        "Events rejected by tenant filter rules"
    );
    describe_counter!(
        EVENTS_SHIPPED_TOTAL,
        "Events handed to the syslog shipper, by event type"
    );
    describe_counter!(
        PACKETS_SENT_TOTAL,
        "Syslog packets written to the collector"
    );
    describe_counter!(
        PACKETS_DROPPED_TOTAL,
        "Syslog packets dropped before reaching the transport"
    );
    describe_counter!(
        TRANSPORT_ERRORS_TOTAL,
        "Syslog writes that failed or timed out"
    );
    describe_counter!(
        CAPTURE_LINES_WRITTEN_TOTAL,
        "Lines mirrored into per-organization capture files"
    );
    describe_counter!(CAPTURE_ERRORS_TOTAL, "Capture file write failures");
    describe_gauge!(
        CAPTURE_WRITERS_OPEN,
        "Number of open per-organization capture writers"
    );
    describe_counter!(
        STATS_EVENTS_EMITTED_TOTAL,
        "Synthetic statistics events emitted"
    );
    describe_gauge!(DAEMON_UPTIME_SECONDS, "Daemon uptime in seconds");
}
