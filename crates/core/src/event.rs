//! 로그 이벤트와 배치 와이어 스키마
//!
//! - [`LogEvent`]: 소스가 생성하는 관측 단위. 방출 후에는 변경하지 않습니다.
//! - [`LogRecord`] / [`LogBatch`]: 봉인 전/검증 후의 평문 배치 스키마.
//!
//! 속성 맵은 `BTreeMap`을 사용하므로 직렬화 결과의 키 순서가 항상 같습니다.
//! 봉인 엔진의 정규(canonical) 직렬화가 이 성질에 의존합니다.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// 수집기 플러그인 이름
pub const MODULE_COLLECTOR: &str = "collector";
/// 전송 클라이언트 플러그인 이름
pub const MODULE_TRANSPORT: &str = "transport";
/// 원격 인테이크 플러그인 이름
pub const MODULE_INTAKE: &str = "intake";

/// `LogRecord.resource`에 기록되는 소스 이름 키
pub const RESOURCE_SOURCE_NAME: &str = "source.name";
/// trace_id로 승격되는 속성 키
pub const ATTR_TRACE_ID: &str = "trace_id";
/// span_id로 승격되는 속성 키
pub const ATTR_SPAN_ID: &str = "span_id";

/// 관측된 로그 한 건
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    /// 관측 시각 (UTC)
    pub timestamp: DateTime<Utc>,
    /// 소스 이름
    pub source_name: String,
    /// 자유 형식 심각도 (없을 수 있음)
    pub level: Option<String>,
    /// 본문
    pub body: String,
    /// 속성
    pub attributes: BTreeMap<String, String>,
    /// 리소스 속성 (호스트, 서비스 등 정적 메타데이터)
    pub resource: BTreeMap<String, String>,
}

impl LogEvent {
    /// 현재 시각으로 새 이벤트를 생성합니다.
    pub fn new(source_name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            source_name: source_name.into(),
            level: None,
            body: body.into(),
            attributes: BTreeMap::new(),
            resource: BTreeMap::new(),
        }
    }

    /// 관측 시각을 지정합니다.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// 심각도를 지정합니다.
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    /// 속성을 추가합니다.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// 와이어 레코드로 변환합니다.
    ///
    /// `trace_id`/`span_id` 속성은 전용 필드로 승격되고,
    /// 소스 이름은 `resource["source.name"]`에 (없을 때만) 기록됩니다.
    pub fn to_record(&self) -> LogRecord {
        let mut attributes = self.attributes.clone();
        let trace_id = attributes.remove(ATTR_TRACE_ID);
        let span_id = attributes.remove(ATTR_SPAN_ID);

        let mut resource = self.resource.clone();
        resource
            .entry(RESOURCE_SOURCE_NAME.to_owned())
            .or_insert_with(|| self.source_name.clone());

        let severity = self.level.clone().unwrap_or_default();
        LogRecord {
            timestamp: self.timestamp.timestamp_millis(),
            severity_num: severity_number(&severity),
            severity,
            body: self.body.clone(),
            attributes,
            resource,
            trace_id,
            span_id,
        }
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LogEvent[{}] source={} level={}",
            self.timestamp.to_rfc3339(),
            self.source_name,
            self.level.as_deref().unwrap_or("-"),
        )
    }
}

/// 평문 배치의 레코드
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// epoch 밀리초
    pub timestamp: i64,
    /// 심각도 텍스트
    pub severity: String,
    /// OpenTelemetry 심각도 번호 (0 = 미지정)
    #[serde(default)]
    pub severity_num: i32,
    /// 본문
    pub body: String,
    /// 속성
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// 리소스 속성
    #[serde(default)]
    pub resource: BTreeMap<String, String>,
    /// trace ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// span ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
}

impl LogRecord {
    /// 레코드 시각을 UTC로 반환합니다. 범위를 벗어나면 `None`.
    pub fn time(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

/// 평문 배치
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogBatch {
    /// 방출 순서대로 정렬된 레코드
    pub records: Vec<LogRecord>,
}

impl LogBatch {
    /// 이벤트 목록에서 배치를 만듭니다 (순서 유지).
    pub fn from_events(events: &[LogEvent]) -> Self {
        Self {
            records: events.iter().map(LogEvent::to_record).collect(),
        }
    }

    /// 레코드 수
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// 비어 있는지 여부
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// 심각도 텍스트를 OpenTelemetry 심각도 번호로 매핑합니다.
///
/// syslog 이름(emerg, crit, notice 등)도 받아들이며, 알 수 없으면 0을 반환합니다.
pub fn severity_number(level: &str) -> i32 {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => 1,
        "debug" => 5,
        "info" | "informational" => 9,
        "notice" => 10,
        "warn" | "warning" => 13,
        "error" | "err" => 17,
        "crit" | "critical" => 19,
        "alert" => 20,
        "fatal" | "emerg" | "emergency" | "panic" => 21,
        _ => 0,
    }
}
