//! 통합 테스트 -- 소스에서 내구성 버퍼까지의 전체 흐름 검증
//!
//! 파일 소스 → 프로세서 체인 → 봉인 → 버퍼 적재 후, 버퍼의 봉투를 unseal하여
//! 레코드 내용과 순서를 확인합니다.

use std::path::Path;
use std::time::Duration;

use logpost_core::config::{
    BackpressureConfig, BatchConfig, FileSourceConfig, FilterConfig, LogpostConfig, MatchRule,
    ProcessorConfig, SourceConfig, SourceKind, StartAt,
};
use logpost_core::event::LogBatch;
use logpost_core::pipeline::Pipeline;
use logpost_log_pipeline::CollectorPipelineBuilder;
use logpost_seal::{
    AeadKey, Algorithm, ClientKeyMaterial, PublicKeyLookup, SecretKey, VerificationKey, unseal,
};
use logpost_spool::{BufferedEnvelope, DurableBuffer};

struct Single(VerificationKey);

impl PublicKeyLookup for Single {
    fn lookup(&self, client_id: &str, algorithm: Algorithm) -> Option<VerificationKey> {
        (client_id == "edge-01" && algorithm == self.0.algorithm()).then(|| self.0.clone())
    }
}

fn file_source(path: &Path) -> SourceConfig {
    SourceConfig {
        name: "app".to_owned(),
        backpressure: BackpressureConfig::default(),
        kind: SourceKind::File(FileSourceConfig {
            include: vec![path.display().to_string()],
            start_at: StartAt::Beginning,
            poll_interval_ms: 10,
            ..FileSourceConfig::default()
        }),
    }
}

fn config(data_dir: &Path, source: SourceConfig, processors: Vec<ProcessorConfig>) -> LogpostConfig {
    let mut config = LogpostConfig::default();
    config.general.data_dir = data_dir.display().to_string();
    config.sealing.client_id = "edge-01".to_owned();
    config.collector.sources = vec![source];
    config.collector.processors = processors;
    config
}

async fn wait_for_entries(buffer: &DurableBuffer, n: usize) -> Vec<BufferedEnvelope> {
    for _ in 0..500 {
        let stats = buffer.stats().await.unwrap();
        if stats.pending as usize >= n {
            return buffer.peek_ready(n).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("buffer did not receive {n} entries in time");
}

fn bodies(batch: &LogBatch) -> Vec<&str> {
    batch.records.iter().map(|r| r.body.as_str()).collect()
}

/// 세 이벤트가 send_batch_size=3 배치 하나로 원래 순서대로 봉인된다
#[tokio::test]
async fn test_three_events_become_one_sealed_batch() {
    // Given
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("app.log");
    std::fs::write(&log, "A\nB\nC\n").unwrap();

    let key = AeadKey::generate();
    let lookup = Single(VerificationKey::Aead(key.clone()));
    let buffer = DurableBuffer::open(dir.path().join("buffer.db"), Duration::from_secs(30))
        .await
        .unwrap();
    let mut pipeline = CollectorPipelineBuilder::new()
        .config(&config(
            dir.path(),
            file_source(&log),
            vec![ProcessorConfig::Batch(BatchConfig {
                send_batch_size: 3,
                timeout_ms: 60_000,
            })],
        ))
        .buffer(buffer.clone())
        .keys(ClientKeyMaterial::new("edge-01", SecretKey::Aead(key)))
        .build()
        .unwrap();

    // When
    pipeline.start().await.unwrap();
    let entries = wait_for_entries(&buffer, 1).await;
    pipeline.stop().await.unwrap();

    // Then
    assert_eq!(entries.len(), 1);
    let batch = unseal(&entries[0].envelope, &lookup).unwrap();
    assert_eq!(bodies(&batch), vec!["A", "B", "C"]);
    assert_eq!(batch.records[0].resource["source.name"], "app");
    // wait_for_entries가 임대했으므로 InFlight 상태로 남아 있음
    let stats = buffer.stats().await.unwrap();
    assert_eq!(stats.in_flight, 1);
    assert_eq!(stats.backlog(), 1);
    assert_eq!(pipeline.sealed_batches(), 1);
}

/// include 필터와 일치하지 않는 이벤트는 배치에 들어가지 않는다
#[tokio::test]
async fn test_include_filter_drops_non_matching_events() {
    // Given
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("app.log");
    std::fs::write(&log, "boot ok\ndisk error\nall fine\nnet error\n").unwrap();

    let key = AeadKey::generate();
    let lookup = Single(VerificationKey::Aead(key.clone()));
    let buffer = DurableBuffer::open(dir.path().join("buffer.db"), Duration::from_secs(30))
        .await
        .unwrap();
    let mut pipeline = CollectorPipelineBuilder::new()
        .config(&config(
            dir.path(),
            file_source(&log),
            vec![
                ProcessorConfig::Filter(FilterConfig {
                    include: vec![MatchRule {
                        pattern: ".*error.*".to_owned(),
                        attribute: None,
                    }],
                    exclude: vec![],
                }),
                ProcessorConfig::Batch(BatchConfig {
                    send_batch_size: 2,
                    timeout_ms: 60_000,
                }),
            ],
        ))
        .buffer(buffer.clone())
        .keys(ClientKeyMaterial::new("edge-01", SecretKey::Aead(key)))
        .build()
        .unwrap();

    // When
    pipeline.start().await.unwrap();
    let entries = wait_for_entries(&buffer, 1).await;
    pipeline.stop().await.unwrap();

    // Then
    let batch = unseal(&entries[0].envelope, &lookup).unwrap();
    assert_eq!(bodies(&batch), vec!["disk error", "net error"]);
}

/// 종료 시 부분 배치가 한 번 플러시된다
#[tokio::test]
async fn test_partial_batch_is_flushed_on_stop() {
    // Given: 배치 크기보다 적은 이벤트
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("app.log");
    std::fs::write(&log, "one\ntwo\n").unwrap();

    let buffer = DurableBuffer::open(dir.path().join("buffer.db"), Duration::from_secs(30))
        .await
        .unwrap();
    let key = AeadKey::generate();
    let lookup = Single(VerificationKey::Aead(key.clone()));
    let mut pipeline = CollectorPipelineBuilder::new()
        .config(&config(
            dir.path(),
            file_source(&log),
            vec![ProcessorConfig::Batch(BatchConfig {
                send_batch_size: 100,
                timeout_ms: 60_000,
            })],
        ))
        .buffer(buffer.clone())
        .keys(ClientKeyMaterial::new("edge-01", SecretKey::Aead(key)))
        .build()
        .unwrap();

    // When
    pipeline.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    pipeline.stop().await.unwrap();

    // Then
    let entries = buffer.peek_ready(10).await.unwrap();
    assert_eq!(entries.len(), 1);
    let batch = unseal(&entries[0].envelope, &lookup).unwrap();
    assert_eq!(bodies(&batch), vec!["one", "two"]);
}

/// 실패한 소스가 있어도 파이프라인은 Degraded로 계속 동작한다
#[tokio::test]
async fn test_unavailable_source_degrades_health() {
    let dir = tempfile::tempdir().unwrap();
    let buffer = DurableBuffer::open(dir.path().join("buffer.db"), Duration::from_secs(30))
        .await
        .unwrap();
    let source = SourceConfig {
        name: "bad-udp".to_owned(),
        backpressure: BackpressureConfig::default(),
        kind: SourceKind::SyslogUdp(logpost_core::config::SyslogUdpSourceConfig {
            bind_addr: "256.0.0.1:514".to_owned(),
            ..Default::default()
        }),
    };
    let mut pipeline = CollectorPipelineBuilder::new()
        .config(&config(dir.path(), source, vec![]))
        .buffer(buffer)
        .keys(ClientKeyMaterial::new(
            "edge-01",
            SecretKey::Aead(AeadKey::generate()),
        ))
        .build()
        .unwrap();

    pipeline.start().await.unwrap();
    let mut degraded = false;
    for _ in 0..200 {
        if matches!(
            pipeline.health_check().await,
            logpost_core::pipeline::HealthStatus::Degraded(_)
        ) {
            degraded = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    pipeline.stop().await.unwrap();
    assert!(degraded);
}
