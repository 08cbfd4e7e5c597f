//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 크레이트는 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `logpost_`
//! - 컴포넌트: `collector_`, `seal_`, `buffer_`, `transport_`, `intake_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use logpost_core::metrics as m;
//!
//! metrics::counter!(m::BUFFER_EVICTED_TOTAL).increment(evicted);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 소스 이름 레이블 키
pub const LABEL_SOURCE: &str = "source";

/// 드롭 사유 레이블 키 (backpressure, processor, filter)
pub const LABEL_REASON: &str = "reason";

/// 결과 레이블 키 (success, transient, permanent)
pub const LABEL_RESULT: &str = "result";

/// 알고리즘 레이블 키
pub const LABEL_ALGORITHM: &str = "algorithm";

// ─── Collector ──────────────────────────────────────────────────────

/// 소스에서 수집된 이벤트 수
pub const COLLECTOR_EVENTS_COLLECTED_TOTAL: &str = "logpost_collector_events_collected_total";

/// 프로세서 체인을 통과한 이벤트 수
pub const COLLECTOR_EVENTS_PROCESSED_TOTAL: &str = "logpost_collector_events_processed_total";

/// 드롭된 이벤트 수 (reason 레이블)
pub const COLLECTOR_EVENTS_DROPPED_TOTAL: &str = "logpost_collector_events_dropped_total";

/// 필터가 드롭한 이벤트 수
pub const COLLECTOR_FILTERED_TOTAL: &str = "logpost_collector_filtered_total";

/// 소스 열기 실패 횟수
pub const COLLECTOR_SOURCE_ERRORS_TOTAL: &str = "logpost_collector_source_errors_total";

/// 소스 큐 현재 길이
pub const COLLECTOR_SOURCE_QUEUE_DEPTH: &str = "logpost_collector_source_queue_depth";

// ─── Seal ───────────────────────────────────────────────────────────

/// 봉인된 배치 수
pub const SEAL_BATCHES_SEALED_TOTAL: &str = "logpost_seal_batches_sealed_total";

/// 봉인 실패로 폐기된 배치 수
pub const SEAL_FAILURES_TOTAL: &str = "logpost_seal_failures_total";

/// 봉인 소요 시간
pub const SEAL_DURATION_SECONDS: &str = "logpost_seal_duration_seconds";

// ─── Buffer ─────────────────────────────────────────────────────────

/// 버퍼에 적재된 봉투 수
pub const BUFFER_ENQUEUED_TOTAL: &str = "logpost_buffer_enqueued_total";

/// 전송 대기 봉투 수 (Pending + InFlight)
pub const BUFFER_BACKLOG: &str = "logpost_buffer_backlog";

/// 보존 정책으로 만료된 봉투 수
pub const BUFFER_EVICTED_TOTAL: &str = "logpost_buffer_evicted_total";

/// 재시작/임대 만료로 Pending 복귀한 봉투 수
pub const BUFFER_RECLAIMED_TOTAL: &str = "logpost_buffer_reclaimed_total";

/// 디코딩할 수 없어 격리(삭제)된 봉투 수
pub const BUFFER_CORRUPT_TOTAL: &str = "logpost_buffer_corrupt_total";

// ─── Transport ──────────────────────────────────────────────────────

/// 전송 시도 수 (result 레이블)
pub const TRANSPORT_ATTEMPTS_TOTAL: &str = "logpost_transport_attempts_total";

/// 전송 완료 봉투 수
pub const TRANSPORT_DELIVERED_TOTAL: &str = "logpost_transport_delivered_total";

/// 영구 실패로 만료된 봉투 수
pub const TRANSPORT_EXPIRED_TOTAL: &str = "logpost_transport_expired_total";

/// 요청 지연 시간
pub const TRANSPORT_REQUEST_DURATION_SECONDS: &str = "logpost_transport_request_duration_seconds";

/// 서킷 브레이커 상태 (0 closed, 1 half-open, 2 open)
pub const TRANSPORT_BREAKER_STATE: &str = "logpost_transport_breaker_state";

// ─── Intake ─────────────────────────────────────────────────────────

/// 수락된 배치 수
pub const INTAKE_BATCHES_ACCEPTED_TOTAL: &str = "logpost_intake_batches_accepted_total";

/// 중복으로 건너뛴 배치 수
pub const INTAKE_BATCHES_DUPLICATE_TOTAL: &str = "logpost_intake_batches_duplicate_total";

/// 거부된 배치 수 (reason 레이블)
pub const INTAKE_BATCHES_REJECTED_TOTAL: &str = "logpost_intake_batches_rejected_total";

/// 저장된 레코드 수
pub const INTAKE_RECORDS_STORED_TOTAL: &str = "logpost_intake_records_stored_total";

// ─── Daemon ─────────────────────────────────────────────────────────

/// 데몬 가동 시간
pub const DAEMON_UPTIME_SECONDS: &str = "logpost_daemon_uptime_seconds";

/// 등록된 플러그인 수
pub const DAEMON_PLUGINS_REGISTERED: &str = "logpost_daemon_plugins_registered";

/// 빌드 정보 (version 레이블, 값은 항상 1)
pub const DAEMON_BUILD_INFO: &str = "logpost_daemon_build_info";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Collector
    describe_counter!(
        COLLECTOR_EVENTS_COLLECTED_TOTAL,
        "Events read from all configured sources"
    );
    describe_counter!(
        COLLECTOR_EVENTS_PROCESSED_TOTAL,
        "Events that passed the processor chain"
    );
    describe_counter!(
        COLLECTOR_EVENTS_DROPPED_TOTAL,
        "Events dropped by backpressure or processor errors"
    );
    describe_counter!(
        COLLECTOR_FILTERED_TOTAL,
        "Events dropped by filter processors"
    );
    describe_counter!(
        COLLECTOR_SOURCE_ERRORS_TOTAL,
        "Failures to open or read a source origin"
    );
    describe_gauge!(
        COLLECTOR_SOURCE_QUEUE_DEPTH,
        "Current number of events waiting in a source queue"
    );

    // Seal
    describe_counter!(SEAL_BATCHES_SEALED_TOTAL, "Batches sealed into envelopes");
    describe_counter!(
        SEAL_FAILURES_TOTAL,
        "Batches discarded because sealing failed"
    );
    describe_histogram!(SEAL_DURATION_SECONDS, "Time to seal one batch in seconds");

    // Buffer
    describe_counter!(BUFFER_ENQUEUED_TOTAL, "Envelopes appended to the durable buffer");
    describe_gauge!(
        BUFFER_BACKLOG,
        "Envelopes waiting for delivery (pending and in-flight)"
    );
    describe_counter!(
        BUFFER_EVICTED_TOTAL,
        "Envelopes expired by the retention policy (data loss)"
    );
    describe_counter!(
        BUFFER_RECLAIMED_TOTAL,
        "In-flight envelopes returned to pending after restart or lease expiry"
    );
    describe_counter!(
        BUFFER_CORRUPT_TOTAL,
        "Stored envelopes that failed to decode and were removed (data loss)"
    );

    // Transport
    describe_counter!(TRANSPORT_ATTEMPTS_TOTAL, "Delivery attempts by result");
    describe_counter!(
        TRANSPORT_DELIVERED_TOTAL,
        "Envelopes acknowledged by the intake"
    );
    describe_counter!(
        TRANSPORT_EXPIRED_TOTAL,
        "Envelopes expired after a permanent delivery failure"
    );
    describe_histogram!(
        TRANSPORT_REQUEST_DURATION_SECONDS,
        "Intake request latency in seconds"
    );
    describe_gauge!(
        TRANSPORT_BREAKER_STATE,
        "Circuit breaker state (0 closed, 1 half-open, 2 open)"
    );

    // Intake
    describe_counter!(INTAKE_BATCHES_ACCEPTED_TOTAL, "Batches verified and persisted");
    describe_counter!(
        INTAKE_BATCHES_DUPLICATE_TOTAL,
        "Batches skipped as duplicates of an earlier delivery"
    );
    describe_counter!(INTAKE_BATCHES_REJECTED_TOTAL, "Batches rejected by reason");
    describe_counter!(INTAKE_RECORDS_STORED_TOTAL, "Log records persisted by the intake");

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "Daemon uptime in seconds");
    describe_gauge!(DAEMON_PLUGINS_REGISTERED, "Number of registered plugins");
    describe_gauge!(DAEMON_BUILD_INFO, "Build information");
}
