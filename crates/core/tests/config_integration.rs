//! logpost.toml 통합 설정 테스트
//!
//! - logpost.toml.example 파싱/검증 테스트
//! - 부분 설정 (일부 섹션만) 로딩 테스트
//! - 환경변수 우선순위 테스트
//! - 빈 파일 / 잘못된 형식 에러 테스트

use logpost_core::config::{
    BackpressurePolicy, EnrichActionKind, EnrichTarget, LogpostConfig, ProcessorConfig,
    SourceKind, StartAt, TransformOp,
};
use logpost_core::error::{ConfigError, LogpostError};

const EXAMPLE: &str = include_str!("../../../logpost.toml.example");

fn with_env<T>(key: &str, value: &str, f: impl FnOnce() -> T) -> T {
    let original = std::env::var(key).ok();
    // SAFETY: #[serial] 테스트에서만 호출되어 환경변수 조작이 직렬화됩니다.
    unsafe {
        std::env::set_var(key, value);
    }
    let result = f();
    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var(key, val),
            None => std::env::remove_var(key),
        }
    }
    result
}

// =============================================================================
// logpost.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_and_validates() {
    let config = LogpostConfig::parse(EXAMPLE).expect("example config should parse");
    config
        .validate()
        .expect("example config should pass validation");

    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.general.data_dir, "/var/lib/logpost");
    assert_eq!(config.sealing.client_id, "edge-01");
    assert!(!config.intake.enabled);
}

#[test]
fn example_config_declares_sources_in_order() {
    let config = LogpostConfig::parse(EXAMPLE).expect("should parse");
    let names: Vec<(&str, &str)> = config
        .collector
        .sources
        .iter()
        .map(|s| (s.name.as_str(), s.kind.type_name()))
        .collect();
    assert_eq!(
        names,
        vec![
            ("system", "file"),
            ("syslog-udp", "syslog_udp"),
            ("journal", "journald")
        ]
    );

    let file = &config.collector.sources[0];
    assert_eq!(file.backpressure.policy, BackpressurePolicy::Block);
    assert_eq!(file.backpressure.block_timeout_ms, 200);
    match &file.kind {
        SourceKind::File(f) => {
            assert_eq!(f.include.len(), 2);
            assert_eq!(f.start_at, StartAt::End);
            assert_eq!(f.exclude_filename_pattern.as_deref(), Some("\\.gz$"));
        }
        other => panic!("expected file source, got {}", other.type_name()),
    }
}

#[test]
fn example_config_processor_chain_ends_with_batch() {
    let config = LogpostConfig::parse(EXAMPLE).expect("should parse");
    let processors = &config.collector.processors;
    assert_eq!(processors.len(), 4);

    match &processors[0] {
        ProcessorConfig::Enrich(enrich) => {
            assert_eq!(enrich.target, EnrichTarget::Resource);
            assert_eq!(enrich.actions[0].action, EnrichActionKind::Insert);
            assert_eq!(enrich.actions[1].action, EnrichActionKind::Upsert);
        }
        other => panic!("unexpected processor {other:?}"),
    }
    match &processors[2] {
        ProcessorConfig::Transform(t) => {
            assert!(matches!(t.operations[0], TransformOp::Mask { .. }));
        }
        other => panic!("unexpected processor {other:?}"),
    }
    match &processors[3] {
        ProcessorConfig::Batch(batch) => {
            assert_eq!(batch.send_batch_size, 100);
            assert_eq!(batch.timeout_ms, 5000);
        }
        other => panic!("unexpected processor {other:?}"),
    }
}

#[test]
fn example_config_matches_code_defaults() {
    let from_file = LogpostConfig::parse(EXAMPLE).expect("should parse");
    let from_code = LogpostConfig::default();

    assert_eq!(from_file.general.pid_file, from_code.general.pid_file);
    assert_eq!(from_file.buffer.max_entries, from_code.buffer.max_entries);
    assert_eq!(from_file.buffer.max_age_secs, from_code.buffer.max_age_secs);
    assert_eq!(from_file.buffer.lease_secs, from_code.buffer.lease_secs);
    assert_eq!(
        from_file.transport.retry_base_delay_ms,
        from_code.transport.retry_base_delay_ms
    );
    assert_eq!(
        from_file.transport.retry_max_delay_ms,
        from_code.transport.retry_max_delay_ms
    );
    assert_eq!(
        from_file.transport.retry_max_count,
        from_code.transport.retry_max_count
    );
    assert_eq!(
        from_file.intake.max_body_bytes,
        from_code.intake.max_body_bytes
    );
    assert_eq!(from_file.metrics.port, from_code.metrics.port);
}

// =============================================================================
// 부분 설정 로딩 테스트
// =============================================================================

#[test]
fn partial_config_intake_only() {
    let toml = r#"
[collector]
enabled = false

[transport]
enabled = false

[intake]
enabled = true
bind_addr = "127.0.0.1:9000"

[[intake.clients]]
client_id = "edge-01"
token = "secret"
"#;
    let config = LogpostConfig::parse(toml).expect("should parse");
    config.validate().expect("should validate");

    assert!(config.intake.enabled);
    assert_eq!(config.intake.clients[0].client_id, "edge-01");
    assert_eq!(config.general.log_level, "info");
}

#[test]
fn collector_without_client_id_fails_validation() {
    let toml = r#"
[[collector.sources]]
name = "app"
type = "file"
include = ["/tmp/app.log"]
"#;
    let config = LogpostConfig::parse(toml).expect("should parse");
    let err = config.validate().unwrap_err();
    assert!(matches!(
        err,
        LogpostError::Config(ConfigError::InvalidValue { ref field, .. }) if field == "sealing.client_id"
    ));
}

#[test]
fn unknown_source_type_is_parse_error() {
    let toml = r#"
[[collector.sources]]
name = "x"
type = "kafka"
"#;
    assert!(matches!(
        LogpostConfig::parse(toml).unwrap_err(),
        LogpostError::Config(ConfigError::ParseFailed { .. })
    ));
}

// =============================================================================
// 환경변수 우선순위 테스트
// =============================================================================

#[test]
#[serial_test::serial]
fn env_override_takes_precedence_over_file() {
    let endpoint = with_env(
        "LOGPOST_TRANSPORT_ENDPOINT",
        "https://other.example.com/v1/logs",
        || {
            let mut config = LogpostConfig::parse(EXAMPLE).expect("should parse");
            config.apply_env_overrides();
            config.transport.endpoint
        },
    );
    assert_eq!(endpoint, "https://other.example.com/v1/logs");
}

#[test]
#[serial_test::serial]
fn env_override_bool_field() {
    let enabled = with_env("LOGPOST_INTAKE_ENABLED", "true", || {
        let mut config = LogpostConfig::parse("").expect("should parse");
        config.apply_env_overrides();
        config.intake.enabled
    });
    assert!(enabled);
}

#[test]
#[serial_test::serial]
fn env_override_missing_var_keeps_file_value() {
    // SAFETY: #[serial]로 직렬화
    unsafe {
        std::env::remove_var("LOGPOST_SEALING_CLIENT_ID");
    }
    let mut config = LogpostConfig::parse(EXAMPLE).expect("should parse");
    config.apply_env_overrides();
    assert_eq!(config.sealing.client_id, "edge-01");
}

// =============================================================================
// 빈 파일 / 잘못된 형식
// =============================================================================

#[test]
fn empty_string_parses_with_defaults() {
    let config = LogpostConfig::parse("").expect("should parse");
    assert_eq!(config.general.log_format, "json");
    assert!(config.collector.sources.is_empty());
}

#[test]
fn malformed_toml_returns_parse_error() {
    assert!(matches!(
        LogpostConfig::parse("[invalid toml").unwrap_err(),
        LogpostError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[test]
fn wrong_type_for_numeric_field() {
    let toml = r#"
[buffer]
max_entries = "many"
"#;
    assert!(matches!(
        LogpostConfig::parse(toml).unwrap_err(),
        LogpostError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[tokio::test]
async fn from_file_nonexistent_returns_file_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let result = LogpostConfig::from_file(dir.path().join("missing.toml")).await;
    assert!(matches!(
        result.unwrap_err(),
        LogpostError::Config(ConfigError::FileNotFound { .. })
    ));
}

#[tokio::test]
#[serial_test::serial]
async fn load_example_config_from_disk() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../logpost.toml.example");
    let config = LogpostConfig::load(path).await.expect("example should load");
    assert_eq!(config.collector.sources.len(), 3);
}

// =============================================================================
// 직렬화 라운드트립 테스트
// =============================================================================

#[test]
fn default_config_serialize_roundtrip() {
    let mut original = LogpostConfig::default();
    original.sealing.client_id = "edge-01".to_owned();
    let toml_str = toml::to_string_pretty(&original).expect("should serialize");
    let parsed = LogpostConfig::parse(&toml_str).expect("should reparse");
    parsed.validate().expect("reparsed should validate");

    assert_eq!(original.transport.endpoint, parsed.transport.endpoint);
    assert_eq!(original.buffer.lease_secs, parsed.buffer.lease_secs);
}
