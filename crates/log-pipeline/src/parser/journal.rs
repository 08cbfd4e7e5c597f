//! journald JSON 엔트리 파서
//!
//! `journalctl --output=json`이 한 줄에 하나씩 출력하는 엔트리를 [`LogEvent`]로 변환합니다.
//!
//! | journald 필드 | LogEvent |
//! |---|---|
//! | `MESSAGE` | `body` (바이트 배열 형태도 허용) |
//! | `PRIORITY` | `level` (syslog severity 이름) |
//! | `__REALTIME_TIMESTAMP` | `timestamp` (마이크로초) |
//! | `_SYSTEMD_UNIT`, `_HOSTNAME`, `SYSLOG_IDENTIFIER`, `_PID` | 속성 |

use chrono::{DateTime, Utc};
use serde_json::Value;

use logpost_core::event::LogEvent;

use super::syslog::{ATTR_APPNAME, ATTR_HOSTNAME, ATTR_PROCID, severity_name};
use crate::error::CollectorError;

/// systemd 유닛 속성 키
pub const ATTR_UNIT: &str = "journald.unit";

/// 파싱된 journald 엔트리
#[derive(Debug, Clone)]
pub struct JournalEntry {
    /// 변환된 이벤트
    pub event: LogEvent,
    /// 재시작 시 이어 읽을 위치 (`__CURSOR`)
    pub cursor: Option<String>,
}

/// journald JSON 한 줄을 이벤트로 변환합니다.
pub fn parse_entry(source_name: &str, line: &str) -> Result<JournalEntry, CollectorError> {
    let entry: Value = serde_json::from_str(line).map_err(|e| CollectorError::Parse {
        format: "journal",
        reason: e.to_string(),
    })?;
    let Some(fields) = entry.as_object() else {
        return Err(CollectorError::Parse {
            format: "journal",
            reason: "entry is not a JSON object".to_owned(),
        });
    };

    let body = fields.get("MESSAGE").map(message_text).unwrap_or_default();
    let mut event = LogEvent::new(source_name, body);

    if let Some(level) = fields
        .get("PRIORITY")
        .and_then(Value::as_str)
        .and_then(|p| p.parse::<u8>().ok())
        .and_then(severity_name)
    {
        event = event.with_level(level);
    }

    if let Some(ts) = fields
        .get("__REALTIME_TIMESTAMP")
        .and_then(Value::as_str)
        .and_then(|us| us.parse::<i64>().ok())
        .and_then(DateTime::<Utc>::from_timestamp_micros)
    {
        event = event.with_timestamp(ts);
    }

    for (field, attr) in [
        ("_SYSTEMD_UNIT", ATTR_UNIT),
        ("_HOSTNAME", ATTR_HOSTNAME),
        ("SYSLOG_IDENTIFIER", ATTR_APPNAME),
        ("_PID", ATTR_PROCID),
    ] {
        if let Some(value) = fields.get(field).and_then(Value::as_str) {
            event.attributes.insert(attr.to_owned(), value.to_owned());
        }
    }

    let cursor = fields
        .get("__CURSOR")
        .and_then(Value::as_str)
        .map(str::to_owned);
    Ok(JournalEntry { event, cursor })
}

/// 비 UTF-8 메시지는 journald가 바이트 배열로 출력합니다.
fn message_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(bytes) => {
            let raw: Vec<u8> = bytes
                .iter()
                .filter_map(Value::as_u64)
                .filter_map(|b| u8::try_from(b).ok())
                .collect();
            String::from_utf8_lossy(&raw).into_owned()
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_core_fields() {
        let line = r#"{"__CURSOR":"s=abc","__REALTIME_TIMESTAMP":"1700000000123456","PRIORITY":"3","_SYSTEMD_UNIT":"sshd.service","_HOSTNAME":"edge","SYSLOG_IDENTIFIER":"sshd","_PID":"811","MESSAGE":"Failed password"}"#;
        let entry = parse_entry("journal", line).unwrap();
        assert_eq!(entry.cursor.as_deref(), Some("s=abc"));
        let event = entry.event;
        assert_eq!(event.body, "Failed password");
        assert_eq!(event.level.as_deref(), Some("err"));
        assert_eq!(event.timestamp.timestamp_millis(), 1_700_000_000_123);
        assert_eq!(event.attributes[ATTR_UNIT], "sshd.service");
        assert_eq!(event.attributes[ATTR_APPNAME], "sshd");
        assert_eq!(event.attributes[ATTR_PROCID], "811");
    }

    #[test]
    fn byte_array_message_is_decoded() {
        let entry = parse_entry("journal", r#"{"MESSAGE":[104,105]}"#).unwrap();
        assert!(entry.cursor.is_none());
        let event = entry.event;
        assert_eq!(event.body, "hi");
        assert!(event.level.is_none());
    }

    #[test]
    fn invalid_entries_are_rejected() {
        assert!(parse_entry("journal", "not json").is_err());
        assert!(parse_entry("journal", "[1,2]").is_err());
    }
}
