//! 설정 관리 -- logpost.toml 파싱 및 런타임 설정
//!
//! [`LogpostConfig`]는 수집기, 봉인, 버퍼, 전송, 인테이크 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`LOGPOST_TRANSPORT_ENDPOINT=https://...` 형식)
//! 3. 설정 파일 (`logpost.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), logpost_core::error::LogpostError> {
//! use logpost_core::config::LogpostConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드 + 검증
//! let config = LogpostConfig::load("logpost.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = LogpostConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, LogpostError};

/// 지원하는 봉인 알고리즘 식별자 (서명 전용)
pub const ALGORITHM_ED25519: &str = "ed25519";
/// 지원하는 봉인 알고리즘 식별자 (AEAD)
pub const ALGORITHM_XCHACHA20POLY1305: &str = "xchacha20poly1305";

/// Logpost 통합 설정
///
/// `logpost.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 컴포넌트는 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogpostConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 수집기 (소스 + 프로세서 체인) 설정
    #[serde(default)]
    pub collector: CollectorConfig,
    /// 봉인 엔진 설정
    #[serde(default)]
    pub sealing: SealingConfig,
    /// 내구성 버퍼 설정
    #[serde(default)]
    pub buffer: BufferConfig,
    /// 전송 클라이언트 설정
    #[serde(default)]
    pub transport: TransportConfig,
    /// 원격 인테이크 설정
    #[serde(default)]
    pub intake: IntakeConfig,
    /// 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl LogpostConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용한 뒤 검증합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LogpostError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드, 검증 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, LogpostError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LogpostError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                LogpostError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, LogpostError> {
        toml::from_str(toml_str).map_err(|e| {
            LogpostError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `LOGPOST_{SECTION}_{FIELD}`
    /// 소스/프로세서 목록은 구조가 복잡하므로 파일에서만 설정합니다.
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "LOGPOST_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LOGPOST_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.data_dir, "LOGPOST_GENERAL_DATA_DIR");
        override_string(&mut self.general.pid_file, "LOGPOST_GENERAL_PID_FILE");

        // Collector
        override_bool(&mut self.collector.enabled, "LOGPOST_COLLECTOR_ENABLED");
        override_usize(
            &mut self.collector.channel_capacity,
            "LOGPOST_COLLECTOR_CHANNEL_CAPACITY",
        );

        // Sealing
        override_string(&mut self.sealing.client_id, "LOGPOST_SEALING_CLIENT_ID");
        override_string(&mut self.sealing.algorithm, "LOGPOST_SEALING_ALGORITHM");
        override_string(
            &mut self.sealing.signing_key_path,
            "LOGPOST_SEALING_SIGNING_KEY_PATH",
        );
        override_string(
            &mut self.sealing.encryption_key_path,
            "LOGPOST_SEALING_ENCRYPTION_KEY_PATH",
        );
        override_bool(&mut self.sealing.compression, "LOGPOST_SEALING_COMPRESSION");

        // Buffer
        override_string(&mut self.buffer.path, "LOGPOST_BUFFER_PATH");
        override_u64(&mut self.buffer.max_entries, "LOGPOST_BUFFER_MAX_ENTRIES");
        override_u64(&mut self.buffer.max_age_secs, "LOGPOST_BUFFER_MAX_AGE_SECS");

        // Transport
        override_bool(&mut self.transport.enabled, "LOGPOST_TRANSPORT_ENABLED");
        override_string(&mut self.transport.endpoint, "LOGPOST_TRANSPORT_ENDPOINT");
        override_string(
            &mut self.transport.bearer_token,
            "LOGPOST_TRANSPORT_BEARER_TOKEN",
        );
        override_u64(
            &mut self.transport.timeout_secs,
            "LOGPOST_TRANSPORT_TIMEOUT_SECS",
        );
        override_u32(
            &mut self.transport.retry_max_count,
            "LOGPOST_TRANSPORT_RETRY_MAX_COUNT",
        );

        // Intake
        override_bool(&mut self.intake.enabled, "LOGPOST_INTAKE_ENABLED");
        override_string(&mut self.intake.bind_addr, "LOGPOST_INTAKE_BIND_ADDR");
        override_string(
            &mut self.intake.database_path,
            "LOGPOST_INTAKE_DATABASE_PATH",
        );
        override_string(&mut self.intake.keys_dir, "LOGPOST_INTAKE_KEYS_DIR");

        // Metrics
        override_bool(&mut self.metrics.enabled, "LOGPOST_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "LOGPOST_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "LOGPOST_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LogpostError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.collector.enabled {
            self.validate_collector()?;
        }

        if self.collector.enabled || self.transport.enabled {
            if self.buffer.max_entries == 0 {
                return Err(invalid("buffer.max_entries", "must be greater than 0"));
            }
            if self.buffer.lease_secs == 0 {
                return Err(invalid("buffer.lease_secs", "must be greater than 0"));
            }
        }

        if self.transport.enabled {
            let endpoint = self.transport.endpoint.as_str();
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(invalid(
                    "transport.endpoint",
                    "must be an http:// or https:// URL",
                ));
            }
            if self.transport.timeout_secs == 0 {
                return Err(invalid("transport.timeout_secs", "must be greater than 0"));
            }
            if self.transport.drain_batch_size == 0 {
                return Err(invalid(
                    "transport.drain_batch_size",
                    "must be greater than 0",
                ));
            }
            if self.transport.retry_base_delay_ms > self.transport.retry_max_delay_ms {
                return Err(invalid(
                    "transport.retry_base_delay_ms",
                    "must not exceed retry_max_delay_ms",
                ));
            }
            let attempt_window_ms = self
                .transport
                .timeout_secs
                .saturating_mul(1000)
                .saturating_add(self.transport.retry_max_delay_ms);
            if self.buffer.lease_secs.saturating_mul(1000) <= attempt_window_ms {
                return Err(invalid(
                    "buffer.lease_secs",
                    format!(
                        "must exceed transport.timeout_secs + retry_max_delay_ms ({attempt_window_ms} ms)"
                    ),
                ));
            }
        }

        if self.intake.enabled {
            if self.intake.bind_addr.is_empty() {
                return Err(invalid("intake.bind_addr", "must not be empty"));
            }
            if self.intake.clients.is_empty() {
                return Err(invalid(
                    "intake.clients",
                    "at least one client must be registered",
                ));
            }
            for (idx, client) in self.intake.clients.iter().enumerate() {
                if client.client_id.is_empty() || client.token.is_empty() {
                    return Err(invalid(
                        &format!("intake.clients[{idx}]"),
                        "client_id and token must not be empty",
                    ));
                }
            }
        }

        Ok(())
    }

    fn validate_collector(&self) -> Result<(), LogpostError> {
        if self.collector.channel_capacity == 0 {
            return Err(invalid(
                "collector.channel_capacity",
                "must be greater than 0",
            ));
        }

        if self.sealing.client_id.is_empty() {
            return Err(invalid(
                "sealing.client_id",
                "must not be empty when the collector is enabled",
            ));
        }

        let valid_algorithms = [ALGORITHM_ED25519, ALGORITHM_XCHACHA20POLY1305];
        if !valid_algorithms.contains(&self.sealing.algorithm.as_str()) {
            return Err(invalid(
                "sealing.algorithm",
                format!("must be one of: {}", valid_algorithms.join(", ")),
            ));
        }

        let mut names = std::collections::HashSet::new();
        for (idx, source) in self.collector.sources.iter().enumerate() {
            if source.name.is_empty() {
                return Err(invalid(
                    &format!("collector.sources[{idx}].name"),
                    "must not be empty",
                ));
            }
            if !names.insert(source.name.as_str()) {
                return Err(invalid(
                    &format!("collector.sources[{idx}].name"),
                    format!("duplicate source name '{}'", source.name),
                ));
            }
            if source.backpressure.capacity == 0 {
                return Err(invalid(
                    &format!("collector.sources[{idx}].backpressure.capacity"),
                    "must be greater than 0",
                ));
            }
            if let SourceKind::File(file) = &source.kind {
                if file.include.is_empty() {
                    return Err(invalid(
                        &format!("collector.sources[{idx}].include"),
                        "must list at least one path",
                    ));
                }
                if let Some(pattern) = &file.exclude_filename_pattern {
                    check_regex(&format!("collector.sources[{idx}].exclude_filename_pattern"), pattern)?;
                }
            }
        }

        let last = self.collector.processors.len().saturating_sub(1);
        for (idx, processor) in self.collector.processors.iter().enumerate() {
            let field = format!("collector.processors[{idx}]");
            match processor {
                ProcessorConfig::Batch(batch) => {
                    if idx != last {
                        return Err(invalid(&field, "batch must be the last processor"));
                    }
                    if batch.send_batch_size == 0 {
                        return Err(invalid(
                            &format!("{field}.send_batch_size"),
                            "must be greater than 0",
                        ));
                    }
                    if batch.timeout_ms == 0 {
                        return Err(invalid(
                            &format!("{field}.timeout_ms"),
                            "must be greater than 0",
                        ));
                    }
                }
                ProcessorConfig::Filter(filter) => {
                    for rule in filter.include.iter().chain(filter.exclude.iter()) {
                        check_regex(&format!("{field}.pattern"), &rule.pattern)?;
                    }
                }
                ProcessorConfig::Transform(transform) => {
                    for op in &transform.operations {
                        match op {
                            TransformOp::Mask { pattern, .. } | TransformOp::Extract { pattern } => {
                                check_regex(&format!("{field}.pattern"), pattern)?;
                            }
                            TransformOp::Rename { .. } => {}
                        }
                    }
                }
                ProcessorConfig::Enrich(enrich) => {
                    for action in &enrich.actions {
                        let needs_value = !matches!(action.action, EnrichActionKind::Delete);
                        if needs_value && action.value.is_none() {
                            return Err(invalid(
                                &format!("{field}.actions.{}", action.key),
                                "value is required unless action = \"delete\"",
                            ));
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// 내구성 버퍼 DB 경로를 결정합니다.
    ///
    /// `buffer.path`가 비어 있으면 `general.data_dir/buffer.db`를 사용합니다.
    pub fn buffer_path(&self) -> PathBuf {
        if self.buffer.path.is_empty() {
            Path::new(&self.general.data_dir).join("buffer.db")
        } else {
            PathBuf::from(&self.buffer.path)
        }
    }

    /// 인테이크 레코드 DB 경로를 결정합니다.
    pub fn intake_database_path(&self) -> PathBuf {
        if self.intake.database_path.is_empty() {
            Path::new(&self.general.data_dir).join("intake.db")
        } else {
            PathBuf::from(&self.intake.database_path)
        }
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> LogpostError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

fn check_regex(field: &str, pattern: &str) -> Result<(), LogpostError> {
    regex::Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| invalid(field, format!("invalid regex '{pattern}': {e}")))
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 데이터 디렉토리 (오프셋, 커서, 버퍼 DB)
    pub data_dir: String,
    /// PID 파일 경로 (빈 문자열이면 사용하지 않음)
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            data_dir: "/var/lib/logpost".to_owned(),
            pid_file: "/var/run/logpost.pid".to_owned(),
        }
    }
}

/// 수집기 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 소스 → 프로세서 체인 공유 채널 용량
    pub channel_capacity: usize,
    /// 소스 열기 실패 시 재시도 간격 (초)
    pub source_retry_interval_secs: u64,
    /// 수집 소스 정의
    pub sources: Vec<SourceConfig>,
    /// 프로세서 체인 (설정 순서대로 적용)
    pub processors: Vec<ProcessorConfig>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel_capacity: 10_000,
            source_retry_interval_secs: 5,
            sources: Vec::new(),
            processors: Vec::new(),
        }
    }
}

/// 소스 정의
///
/// ```toml
/// [[collector.sources]]
/// name = "syslog-file"
/// type = "file"
/// include = ["/var/log/syslog"]
/// backpressure = { capacity = 1000, policy = "block", block_timeout_ms = 200 }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// 소스 이름 (LogEvent.source_name, 메트릭 레이블)
    pub name: String,
    /// 소스별 백프레셔 정책
    #[serde(default)]
    pub backpressure: BackpressureConfig,
    /// 소스 유형별 설정
    #[serde(flatten)]
    pub kind: SourceKind,
}

/// 소스 유형
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceKind {
    /// 파일 tail (로테이션 감지)
    File(FileSourceConfig),
    /// UDP syslog
    SyslogUdp(SyslogUdpSourceConfig),
    /// TCP syslog (newline framing)
    SyslogTcp(SyslogTcpSourceConfig),
    /// systemd journal
    Journald(JournaldSourceConfig),
    /// Docker 컨테이너 로그 스트림
    Docker(DockerSourceConfig),
    /// HTTP ingest 엔드포인트
    Http(HttpSourceConfig),
}

impl SourceKind {
    /// 소스 유형 이름을 반환합니다.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::SyslogUdp(_) => "syslog_udp",
            Self::SyslogTcp(_) => "syslog_tcp",
            Self::Journald(_) => "journald",
            Self::Docker(_) => "docker",
            Self::Http(_) => "http",
        }
    }
}

/// 파일 읽기 시작 위치 (오프셋이 저장되지 않은 파일에만 적용)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartAt {
    /// 파일 처음부터
    Beginning,
    /// 파일 끝부터 (새로 추가된 라인만)
    #[default]
    End,
}

/// 파일 소스 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSourceConfig {
    /// 감시할 파일 경로 목록
    pub include: Vec<String>,
    /// 제외할 파일 이름 패턴 (정규식, 파일 이름에만 적용)
    pub exclude_filename_pattern: Option<String>,
    /// 처음 보는 파일의 읽기 시작 위치
    pub start_at: StartAt,
    /// 파일 상태 체크 주기 (밀리초)
    pub poll_interval_ms: u64,
    /// 최대 라인 길이 (바이트, 초과분은 잘림)
    pub max_line_bytes: usize,
}

impl Default for FileSourceConfig {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude_filename_pattern: None,
            start_at: StartAt::End,
            poll_interval_ms: 500,
            max_line_bytes: 64 * 1024,
        }
    }
}

/// UDP syslog 소스 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyslogUdpSourceConfig {
    /// 바인드 주소
    pub bind_addr: String,
    /// 최대 데이터그램 크기 (바이트)
    pub max_message_size: usize,
}

impl Default for SyslogUdpSourceConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:514".to_owned(),
            max_message_size: 65_535,
        }
    }
}

/// TCP syslog 소스 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyslogTcpSourceConfig {
    /// 바인드 주소
    pub bind_addr: String,
    /// 최대 동시 연결 수
    pub max_connections: usize,
    /// 연결 유휴 타임아웃 (초)
    pub idle_timeout_secs: u64,
    /// 최대 메시지(라인) 크기 (바이트)
    pub max_message_size: usize,
}

impl Default for SyslogTcpSourceConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:601".to_owned(),
            max_connections: 256,
            idle_timeout_secs: 300,
            max_message_size: 64 * 1024,
        }
    }
}

/// journald 소스 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JournaldSourceConfig {
    /// 필터할 systemd 유닛 (비어 있으면 전체)
    pub units: Vec<String>,
    /// 저널 디렉토리 (None이면 시스템 기본값)
    pub directory: Option<String>,
    /// `journalctl` 실행 파일 경로
    pub journalctl_path: Option<String>,
}

/// Docker 소스 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerSourceConfig {
    /// 따라갈 컨테이너 이름/ID
    pub containers: Vec<String>,
    /// Docker 소켓 경로 (None이면 로컬 기본값)
    pub socket: Option<String>,
}

/// HTTP ingest 소스 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSourceConfig {
    /// 바인드 주소
    pub bind_addr: String,
    /// 최대 요청 본문 크기 (바이트)
    pub max_body_bytes: usize,
}

impl Default for HttpSourceConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:4318".to_owned(),
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// 백프레셔 정책
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// 큐가 가득 차면 가장 오래된 이벤트를 드롭
    #[default]
    DropOldest,
    /// 큐에 자리가 날 때까지 최대 `block_timeout_ms` 대기 후 드롭
    Block,
}

/// 소스별 백프레셔 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackpressureConfig {
    /// 소스 큐 용량
    pub capacity: usize,
    /// 정책
    pub policy: BackpressurePolicy,
    /// `block` 정책의 최대 대기 시간 (밀리초)
    pub block_timeout_ms: u64,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            capacity: 1_000,
            policy: BackpressurePolicy::DropOldest,
            block_timeout_ms: 200,
        }
    }
}

/// 프로세서 정의
///
/// ```toml
/// [[collector.processors]]
/// type = "filter"
/// include = [{ pattern = ".*error.*" }]
///
/// [[collector.processors]]
/// type = "batch"
/// send_batch_size = 100
/// timeout_ms = 5000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessorConfig {
    /// 속성 추가/갱신/삭제
    Enrich(EnrichConfig),
    /// 정규식 기반 포함/제외
    Filter(FilterConfig),
    /// 이름 변경, 마스킹, 추출
    Transform(TransformConfig),
    /// 크기/시간 기준 배치
    Batch(BatchConfig),
}

/// Enrich 대상 맵
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichTarget {
    /// `LogEvent.attributes`
    #[default]
    Attributes,
    /// `LogEvent.resource`
    Resource,
}

/// Enrich 동작
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichActionKind {
    /// 키가 없을 때만 추가
    Insert,
    /// 키가 있을 때만 갱신
    Update,
    /// 항상 설정
    #[default]
    Upsert,
    /// 키 삭제
    Delete,
}

/// 단일 Enrich 항목
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichAction {
    /// 속성 키
    pub key: String,
    /// 값 (`${VAR}` 환경변수 확장 지원)
    #[serde(default)]
    pub value: Option<String>,
    /// 동작
    #[serde(default)]
    pub action: EnrichActionKind,
}

/// Enrich 프로세서 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    /// 대상 맵
    pub target: EnrichTarget,
    /// 적용할 동작 목록 (순서대로)
    pub actions: Vec<EnrichAction>,
}

/// 필터 매치 규칙
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRule {
    /// 정규식
    pub pattern: String,
    /// 매치 대상 속성 키 (None이면 body)
    #[serde(default)]
    pub attribute: Option<String>,
}

/// Filter 프로세서 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// 포함 규칙 (하나 이상이면 include 모드)
    pub include: Vec<MatchRule>,
    /// 제외 규칙 (포함 규칙보다 먼저 평가)
    pub exclude: Vec<MatchRule>,
}

/// Transform 연산
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TransformOp {
    /// 속성 키 이름 변경
    Rename { from: String, to: String },
    /// body에서 정규식 매치를 치환
    Mask {
        pattern: String,
        #[serde(default = "default_mask")]
        replacement: String,
    },
    /// body에서 이름 있는 캡처 그룹을 속성으로 추출
    Extract { pattern: String },
}

fn default_mask() -> String {
    "****".to_owned()
}

/// Transform 프로세서 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// 연산 목록 (순서대로)
    pub operations: Vec<TransformOp>,
}

/// Batch 프로세서 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// 배치 크기 트리거
    pub send_batch_size: usize,
    /// 시간 트리거 (밀리초)
    pub timeout_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            send_batch_size: 100,
            timeout_ms: 5_000,
        }
    }
}

/// 봉인 엔진 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SealingConfig {
    /// 클라이언트 식별자 (인테이크에 등록된 ID)
    pub client_id: String,
    /// 알고리즘 (`xchacha20poly1305`, `ed25519`)
    pub algorithm: String,
    /// ed25519 서명 키 파일 경로
    pub signing_key_path: String,
    /// XChaCha20-Poly1305 대칭 키 파일 경로
    pub encryption_key_path: String,
    /// 봉인 전 gzip 압축 여부
    pub compression: bool,
}

impl Default for SealingConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            algorithm: ALGORITHM_XCHACHA20POLY1305.to_owned(),
            signing_key_path: "/etc/logpost/client.key".to_owned(),
            encryption_key_path: "/etc/logpost/client.aead".to_owned(),
            compression: true,
        }
    }
}

/// 내구성 버퍼 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// SQLite 파일 경로 (빈 문자열이면 `data_dir/buffer.db`)
    pub path: String,
    /// 최대 보관 엔트리 수 (초과 시 오래된 것부터 만료)
    pub max_entries: u64,
    /// 최대 보관 기간 (초)
    pub max_age_secs: u64,
    /// InFlight 임대 기간 (초)
    ///
    /// 전송 클라이언트는 매 시도 전에 임대를 갱신하므로, 한 번의 전송
    /// (`timeout_secs`)과 한 번의 백오프 대기(`retry_max_delay_ms`)보다 길어야 합니다.
    pub lease_secs: u64,
    /// 만료 검사 주기 (초)
    pub evict_interval_secs: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            max_entries: 100_000,
            max_age_secs: 7 * 24 * 3600,
            lease_secs: 600,
            evict_interval_secs: 60,
        }
    }
}

/// 전송 클라이언트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 인테이크 엔드포인트 URL
    pub endpoint: String,
    /// Bearer 토큰
    pub bearer_token: String,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
    /// 엔트리당 최대 재시도 횟수 (한 drain 사이클 내)
    pub retry_max_count: u32,
    /// 백오프 기본 지연 (밀리초)
    pub retry_base_delay_ms: u64,
    /// 백오프 최대 지연 (밀리초)
    pub retry_max_delay_ms: u64,
    /// 한 번에 가져올 엔트리 수
    pub drain_batch_size: usize,
    /// 버퍼가 비었을 때 폴링 간격 (밀리초)
    pub poll_interval_ms: u64,
    /// 서킷 브레이커 개방 임계값 (연속 일시 실패 수)
    pub breaker_failure_threshold: u32,
    /// 서킷 브레이커 냉각 시간 (초)
    pub breaker_cooldown_secs: u64,
    /// 종료 시 최종 전송 유예 시간 (초)
    pub shutdown_grace_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "http://127.0.0.1:8080/v1/logs".to_owned(),
            bearer_token: String::new(),
            timeout_secs: 30,
            retry_max_count: 5,
            retry_base_delay_ms: 10_000,
            retry_max_delay_ms: 300_000,
            drain_batch_size: 50,
            poll_interval_ms: 1_000,
            breaker_failure_threshold: 5,
            breaker_cooldown_secs: 30,
            shutdown_grace_secs: 10,
        }
    }
}

/// 인테이크에 등록된 클라이언트
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeClient {
    /// 클라이언트 ID
    pub client_id: String,
    /// Bearer 토큰
    pub token: String,
}

/// 원격 인테이크 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// HTTP 바인드 주소
    pub bind_addr: String,
    /// 레코드 저장 SQLite 경로 (빈 문자열이면 `data_dir/intake.db`)
    pub database_path: String,
    /// 클라이언트 키 디렉토리 (`<client_id>.pub`, `<client_id>.aead`)
    pub keys_dir: String,
    /// 등록된 클라이언트 (토큰 → 신원)
    pub clients: Vec<IntakeClient>,
    /// 최대 요청 본문 크기 (바이트)
    pub max_body_bytes: usize,
    /// 배치당 최대 레코드 수
    pub max_records_per_batch: usize,
    /// 레코드 body 최대 길이 (바이트)
    pub max_body_len: usize,
    /// 속성 키/값 최대 길이 (바이트)
    pub max_attribute_len: usize,
    /// 레코드당 최대 속성 수
    pub max_attributes: usize,
    /// 디버그용 비봉인(`application/json`) 배치 허용
    pub allow_plaintext: bool,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_addr: "0.0.0.0:8080".to_owned(),
            database_path: String::new(),
            keys_dir: "/etc/logpost/keys".to_owned(),
            clients: Vec::new(),
            max_body_bytes: 10 * 1024 * 1024,
            max_records_per_batch: 10_000,
            max_body_len: 64 * 1024,
            max_attribute_len: 4_096,
            max_attributes: 128,
            allow_plaintext: false,
        }
    }
}

/// 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 리슨 주소
    pub listen_addr: String,
    /// 포트
    pub port: u16,
    /// 엔드포인트 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    override_parsed(target, env_key, "bool");
}

fn override_usize(target: &mut usize, env_key: &str) {
    override_parsed(target, env_key, "usize");
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key, "u16");
}

fn override_u32(target: &mut u32, env_key: &str) {
    override_parsed(target, env_key, "u32");
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key, "u64");
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str, type_name: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                expected = type_name,
                "failed to parse env var, ignoring"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn collector_config() -> LogpostConfig {
        let mut config = LogpostConfig::default();
        config.sealing.client_id = "client-a".to_owned();
        config
    }

    #[test]
    fn default_config_has_sane_values() {
        let config = LogpostConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.sealing.algorithm, ALGORITHM_XCHACHA20POLY1305);
        assert!(config.sealing.compression);
        assert_eq!(config.transport.timeout_secs, 30);
        assert_eq!(config.transport.retry_max_count, 5);
        assert_eq!(config.collector.channel_capacity, 10_000);
        assert!(!config.intake.enabled);
    }

    #[test]
    fn default_config_requires_client_id_for_collector() {
        // Given: 기본 설정 (수집기 활성, client_id 없음)
        let config = LogpostConfig::default();

        // When / Then: client_id 누락으로 검증 실패
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sealing.client_id"));

        collector_config().validate().unwrap();
    }

    #[test]
    fn parse_empty_toml_uses_defaults() {
        let config = LogpostConfig::parse("").unwrap();
        assert_eq!(config.general.log_format, "json");
        assert!(config.collector.sources.is_empty());
    }

    #[test]
    fn parse_sources_and_processors() {
        let toml = r#"
[sealing]
client_id = "edge-01"
algorithm = "ed25519"

[[collector.sources]]
name = "app"
type = "file"
include = ["/var/log/app.log"]
start_at = "beginning"
backpressure = { capacity = 50, policy = "block", block_timeout_ms = 10 }

[[collector.sources]]
name = "syslog"
type = "syslog_udp"
bind_addr = "127.0.0.1:5514"

[[collector.processors]]
type = "enrich"
target = "resource"
actions = [{ key = "host", value = "${HOSTNAME}", action = "insert" }]

[[collector.processors]]
type = "filter"
include = [{ pattern = ".*error.*" }]

[[collector.processors]]
type = "transform"
operations = [{ op = "mask", pattern = "\\d{4}" }]

[[collector.processors]]
type = "batch"
send_batch_size = 3
timeout_ms = 250
"#;
        let config = LogpostConfig::parse(toml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.collector.sources.len(), 2);
        let app = &config.collector.sources[0];
        assert_eq!(app.backpressure.policy, BackpressurePolicy::Block);
        assert_eq!(app.backpressure.capacity, 50);
        match &app.kind {
            SourceKind::File(file) => {
                assert_eq!(file.start_at, StartAt::Beginning);
                assert_eq!(file.poll_interval_ms, 500);
            }
            other => panic!("unexpected source kind: {}", other.type_name()),
        }
        assert_eq!(config.collector.sources[1].kind.type_name(), "syslog_udp");

        assert_eq!(config.collector.processors.len(), 4);
        match &config.collector.processors[2] {
            ProcessorConfig::Transform(t) => match &t.operations[0] {
                TransformOp::Mask { replacement, .. } => assert_eq!(replacement, "****"),
                other => panic!("unexpected op: {other:?}"),
            },
            other => panic!("unexpected processor: {other:?}"),
        }
        match &config.collector.processors[3] {
            ProcessorConfig::Batch(b) => assert_eq!(b.send_batch_size, 3),
            other => panic!("unexpected processor: {other:?}"),
        }
    }

    #[test]
    fn parse_invalid_toml_returns_error() {
        let err = LogpostConfig::parse("invalid = [[[toml").unwrap_err();
        assert!(matches!(
            err,
            LogpostError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_unknown_algorithm() {
        let mut config = collector_config();
        config.sealing.algorithm = "rot13".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sealing.algorithm"));
    }

    #[test]
    fn validate_rejects_batch_before_other_processors() {
        let mut config = collector_config();
        config.collector.processors = vec![
            ProcessorConfig::Batch(BatchConfig::default()),
            ProcessorConfig::Filter(FilterConfig::default()),
        ];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("last processor"));
    }

    #[test]
    fn validate_rejects_bad_filter_regex() {
        let mut config = collector_config();
        config.collector.processors = vec![ProcessorConfig::Filter(FilterConfig {
            include: vec![MatchRule {
                pattern: "(unclosed".to_owned(),
                attribute: None,
            }],
            exclude: Vec::new(),
        })];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("invalid regex"));
    }

    #[test]
    fn validate_rejects_lease_shorter_than_attempt_window() {
        // Given: 전송 한 번 + 백오프 한 번보다 짧은 임대
        let mut config = collector_config();
        config.transport.timeout_secs = 30;
        config.transport.retry_max_delay_ms = 60_000;
        config.buffer.lease_secs = 90;

        // When / Then
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("buffer.lease_secs"), "{err}");

        config.buffer.lease_secs = 91;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn default_lease_covers_default_attempt_window() {
        let config = LogpostConfig::default();
        let window_ms = config.transport.timeout_secs * 1000 + config.transport.retry_max_delay_ms;
        assert!(config.buffer.lease_secs * 1000 > window_ms);
    }

    #[test]
    fn validate_rejects_non_http_endpoint() {
        let mut config = collector_config();
        config.transport.endpoint = "ftp://example.com".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("transport.endpoint"));
    }

    #[test]
    fn validate_rejects_enabled_intake_without_clients() {
        let mut config = collector_config();
        config.intake.enabled = true;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("intake.clients"));
    }

    #[test]
    fn validate_rejects_duplicate_source_names() {
        let mut config = collector_config();
        let source = SourceConfig {
            name: "dup".to_owned(),
            backpressure: BackpressureConfig::default(),
            kind: SourceKind::SyslogUdp(SyslogUdpSourceConfig::default()),
        };
        config.collector.sources = vec![source.clone(), source];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn buffer_path_falls_back_to_data_dir() {
        let mut config = LogpostConfig::default();
        config.general.data_dir = "/tmp/lp".to_owned();
        assert_eq!(config.buffer_path(), PathBuf::from("/tmp/lp/buffer.db"));
        config.buffer.path = "/srv/buf.db".to_owned();
        assert_eq!(config.buffer_path(), PathBuf::from("/srv/buf.db"));
    }

    #[test]
    #[serial]
    fn env_override_applies_transport_fields() {
        let mut config = LogpostConfig::default();
        // SAFETY: serial 테스트로 환경변수 동시 접근이 없습니다.
        unsafe {
            std::env::set_var("LOGPOST_TRANSPORT_ENDPOINT", "https://intake.example/v1/logs");
            std::env::set_var("LOGPOST_TRANSPORT_RETRY_MAX_COUNT", "9");
        }
        config.apply_env_overrides();
        assert_eq!(config.transport.endpoint, "https://intake.example/v1/logs");
        assert_eq!(config.transport.retry_max_count, 9);
        unsafe {
            std::env::remove_var("LOGPOST_TRANSPORT_ENDPOINT");
            std::env::remove_var("LOGPOST_TRANSPORT_RETRY_MAX_COUNT");
        }
    }

    #[test]
    #[serial]
    fn env_override_invalid_number_keeps_original() {
        let mut val: u64 = 30;
        // SAFETY: serial 테스트로 환경변수 동시 접근이 없습니다.
        unsafe { std::env::set_var("TEST_LOGPOST_U64_BAD", "thirty") };
        override_u64(&mut val, "TEST_LOGPOST_U64_BAD");
        assert_eq!(val, 30);
        unsafe { std::env::remove_var("TEST_LOGPOST_U64_BAD") };
    }

    #[test]
    fn config_serialize_roundtrip() {
        let mut config = collector_config();
        config.collector.sources.push(SourceConfig {
            name: "journal".to_owned(),
            backpressure: BackpressureConfig::default(),
            kind: SourceKind::Journald(JournaldSourceConfig::default()),
        });
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = LogpostConfig::parse(&toml_str).unwrap();
        assert_eq!(parsed.sealing.client_id, "client-a");
        assert_eq!(parsed.collector.sources[0].kind.type_name(), "journald");
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let err = LogpostConfig::from_file("/nonexistent/logpost.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LogpostError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
