//! Syslog 라인 파서 (RFC 5424, RFC 3164 best-effort)
//!
//! ```text
//! <PRI>1 TIMESTAMP HOSTNAME APP-NAME PROCID MSGID STRUCTURED-DATA MSG   (RFC 5424)
//! <PRI>MMM DD HH:MM:SS HOSTNAME TAG: MSG                              (RFC 3164)
//! ```
//!
//! PRI는 `level`(syslog severity 이름)과 `syslog.facility` 속성으로 디코딩됩니다.
//! 파싱에 실패한 라인은 [`SyslogParser::to_event`]가 원문 그대로 본문에 담습니다.

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};

use logpost_core::event::LogEvent;

use crate::error::CollectorError;

/// RFC 5424에서 유효한 최대 PRI 값
/// facility 최댓값 23 * 8 + severity 최댓값 7 = 191
const MAX_SYSLOG_PRI: u8 = 191;

/// facility 속성 키
pub const ATTR_FACILITY: &str = "syslog.facility";
/// 호스트 이름 속성 키
pub const ATTR_HOSTNAME: &str = "syslog.hostname";
/// 앱 이름 (RFC 3164 TAG) 속성 키
pub const ATTR_APPNAME: &str = "syslog.appname";
/// 프로세스 ID 속성 키
pub const ATTR_PROCID: &str = "syslog.procid";
/// 메시지 ID 속성 키
pub const ATTR_MSGID: &str = "syslog.msgid";

const SEVERITY_NAMES: [&str; 8] = [
    "emerg", "alert", "crit", "err", "warning", "notice", "info", "debug",
];

const FACILITY_NAMES: [&str; 24] = [
    "kern", "user", "mail", "daemon", "auth", "syslog", "lpr", "news", "uucp", "cron",
    "authpriv", "ftp", "ntp", "security", "console", "solaris-cron", "local0", "local1",
    "local2", "local3", "local4", "local5", "local6", "local7",
];

/// Syslog 파서
#[derive(Debug, Clone)]
pub struct SyslogParser {
    /// 최대 허용 입력 크기 (바이트)
    max_input_size: usize,
}

struct Parsed {
    timestamp: Option<DateTime<Utc>>,
    message: String,
    fields: Vec<(String, String)>,
}

impl SyslogParser {
    /// 기본 설정으로 새 파서를 생성합니다.
    pub fn new() -> Self {
        Self {
            max_input_size: 64 * 1024,
        }
    }

    /// 최대 입력 크기를 설정합니다.
    pub fn with_max_input_size(mut self, size: usize) -> Self {
        self.max_input_size = size;
        self
    }

    /// PRI 값에서 facility와 severity를 분리합니다.
    ///
    /// PRI = facility * 8 + severity
    fn decode_pri(pri: u8) -> (u8, u8) {
        (pri / 8, pri % 8)
    }

    /// syslog 라인을 이벤트로 파싱합니다.
    pub fn parse(&self, source_name: &str, raw: &[u8]) -> Result<LogEvent, CollectorError> {
        if raw.len() > self.max_input_size {
            return Err(parse_error(format!(
                "input too large: {} bytes (max: {})",
                raw.len(),
                self.max_input_size
            )));
        }

        let input = String::from_utf8_lossy(raw);
        let input = input.trim();
        if input.is_empty() {
            return Err(parse_error("empty input"));
        }

        let rest = input
            .strip_prefix('<')
            .ok_or_else(|| parse_error("missing PRI field (expected '<')"))?;
        let pri_end = rest
            .find('>')
            .ok_or_else(|| parse_error("unterminated PRI field"))?;
        let pri_str = &rest[..pri_end];
        let pri: u8 = pri_str
            .parse()
            .map_err(|_| parse_error(format!("invalid PRI value: '{pri_str}'")))?;
        if pri > MAX_SYSLOG_PRI {
            return Err(parse_error(format!(
                "PRI value {pri} out of valid range (0-{MAX_SYSLOG_PRI})"
            )));
        }

        let (facility, severity) = Self::decode_pri(pri);
        let remainder = &rest[pri_end + 1..];

        let parsed = if let Some(body) = remainder.strip_prefix("1 ") {
            Self::parse_rfc5424_body(body)?
        } else {
            Self::parse_rfc3164_body(remainder)
        };

        let mut event = LogEvent::new(source_name, parsed.message)
            .with_level(SEVERITY_NAMES[usize::from(severity)])
            .with_attribute(ATTR_FACILITY, FACILITY_NAMES[usize::from(facility)]);
        if let Some(timestamp) = parsed.timestamp {
            event = event.with_timestamp(timestamp);
        }
        event.attributes.extend(parsed.fields);
        Ok(event)
    }

    /// 파싱에 실패하면 원문 전체를 본문으로 하는 이벤트를 만듭니다.
    pub fn to_event(&self, source_name: &str, raw: &[u8]) -> LogEvent {
        self.parse(source_name, raw).unwrap_or_else(|e| {
            tracing::trace!(source = source_name, error = %e, "unparsed syslog line");
            LogEvent::new(
                source_name,
                String::from_utf8_lossy(raw).trim_end().to_owned(),
            )
        })
    }

    /// RFC 5424 메시지 본문을 파싱합니다.
    ///
    /// 형식: `TIMESTAMP HOSTNAME APP-NAME PROCID MSGID STRUCTURED-DATA MSG`
    fn parse_rfc5424_body(body: &str) -> Result<Parsed, CollectorError> {
        let parts: Vec<&str> = body.splitn(6, ' ').collect();
        if parts.len() < 6 {
            return Err(parse_error(format!(
                "RFC 5424 requires at least 6 fields after version, got {}",
                parts.len()
            )));
        }

        let timestamp = match nilvalue_to_empty(parts[0]) {
            "" => None,
            ts => Some(
                DateTime::parse_from_rfc3339(ts)
                    .map_err(|e| parse_error(format!("invalid RFC 3339 timestamp '{ts}': {e}")))?
                    .with_timezone(&Utc),
            ),
        };

        let mut fields = Vec::new();
        for (key, value) in [
            (ATTR_HOSTNAME, parts[1]),
            (ATTR_APPNAME, parts[2]),
            (ATTR_PROCID, parts[3]),
            (ATTR_MSGID, parts[4]),
        ] {
            let value = nilvalue_to_empty(value);
            if !value.is_empty() {
                fields.push((key.to_owned(), value.to_owned()));
            }
        }

        let sd_and_msg = parts[5];
        let message = if sd_and_msg.starts_with('[') {
            let (sd_part, msg_part) = split_sd_and_message(sd_and_msg);
            fields.extend(parse_structured_data(sd_part)?);
            msg_part.to_owned()
        } else if let Some(msg) = sd_and_msg.strip_prefix("- ") {
            msg.to_owned()
        } else if sd_and_msg == "-" {
            String::new()
        } else {
            sd_and_msg.to_owned()
        };

        Ok(Parsed {
            timestamp,
            message: strip_bom(&message).to_owned(),
            fields,
        })
    }

    /// RFC 3164 (BSD syslog) 메시지 본문을 최선 노력으로 파싱합니다.
    ///
    /// 형식: `MMM DD HH:MM:SS hostname tag: message`
    fn parse_rfc3164_body(body: &str) -> Parsed {
        // "Jan  5" 처럼 일(day)이 한 자리면 공백이 두 개
        let normalized = match body.get(3..5) {
            Some("  ") => format!("{} {}", &body[..3], &body[5..]),
            _ => body.to_owned(),
        };
        let parts: Vec<&str> = normalized.splitn(4, ' ').collect();

        let timestamp = if parts.len() >= 4 {
            parse_bsd_timestamp(&format!("{} {} {}", parts[0], parts[1], parts[2]))
        } else {
            None
        };

        let Some(timestamp) = timestamp else {
            return Parsed {
                timestamp: None,
                message: body.to_owned(),
                fields: Vec::new(),
            };
        };

        let mut fields = Vec::new();
        let remainder = parts[3];
        let message = match remainder.split_once(' ') {
            Some((hostname, tag_and_msg)) => {
                fields.push((ATTR_HOSTNAME.to_owned(), hostname.to_owned()));
                match tag_and_msg.split_once(':') {
                    Some((tag, msg)) if !tag.contains(' ') => {
                        let (app, pid) = split_tag(tag);
                        fields.push((ATTR_APPNAME.to_owned(), app.to_owned()));
                        if let Some(pid) = pid {
                            fields.push((ATTR_PROCID.to_owned(), pid.to_owned()));
                        }
                        msg.trim_start().to_owned()
                    }
                    _ => tag_and_msg.to_owned(),
                }
            }
            None => remainder.to_owned(),
        };

        Parsed {
            timestamp: Some(timestamp),
            message,
            fields,
        }
    }
}

impl Default for SyslogParser {
    fn default() -> Self {
        Self::new()
    }
}

/// syslog severity 번호(0-7)를 이름으로 변환합니다. 범위를 벗어나면 `None`.
pub fn severity_name(severity: u8) -> Option<&'static str> {
    SEVERITY_NAMES.get(usize::from(severity)).copied()
}

fn parse_error(reason: impl Into<String>) -> CollectorError {
    CollectorError::Parse {
        format: "syslog",
        reason: reason.into(),
    }
}

/// NILVALUE (`-`)를 빈 문자열로 변환합니다.
fn nilvalue_to_empty(value: &str) -> &str {
    if value == "-" { "" } else { value }
}

fn strip_bom(message: &str) -> &str {
    message.strip_prefix('\u{feff}').unwrap_or(message)
}

/// `sshd[1234]` → (`sshd`, `Some("1234")`)
fn split_tag(tag: &str) -> (&str, Option<&str>) {
    match tag.split_once('[') {
        Some((app, rest)) => (app, rest.strip_suffix(']')),
        None => (tag, None),
    }
}

/// BSD syslog 타임스탬프를 파싱합니다.
///
/// 형식: `MMM DD HH:MM:SS`. 연도 정보가 없으므로 현재 연도를 가정합니다.
fn parse_bsd_timestamp(timestamp: &str) -> Option<DateTime<Utc>> {
    let with_year = format!("{} {}", Utc::now().year(), timestamp);
    NaiveDateTime::parse_from_str(&with_year, "%Y %b %d %H:%M:%S")
        .ok()
        .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
}

/// Structured Data 부분과 메시지 부분을 분리합니다.
///
/// SD는 하나 이상의 `[...]` 블록으로 구성되며, 그 이후가 메시지입니다.
fn split_sd_and_message(input: &str) -> (&str, &str) {
    let mut depth = 0usize;
    let mut in_quote = false;
    let mut escaped = false;

    for (idx, ch) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quote => escaped = true,
            '"' => in_quote = !in_quote,
            '[' if !in_quote => depth += 1,
            ']' if !in_quote => {
                depth = depth.saturating_sub(1);
                let next = &input[idx + 1..];
                if depth == 0 && !next.starts_with('[') {
                    return (&input[..=idx], next.trim_start());
                }
            }
            _ => {}
        }
    }

    // 닫히지 않은 SD가 있으면 전체를 SD로 간주
    (input, "")
}

/// RFC 5424 Structured Data를 파싱합니다.
///
/// `[sd-id param="value"]`는 `syslog.sd.{sd-id}.{param}` 속성이 됩니다.
fn parse_structured_data(sd: &str) -> Result<Vec<(String, String)>, CollectorError> {
    let mut fields = Vec::new();
    let mut chars = sd.chars().peekable();

    while chars.peek().is_some() {
        if chars.next() != Some('[') {
            break;
        }

        let mut sd_id = String::new();
        while let Some(&ch) = chars.peek() {
            if ch == ']' || ch == ' ' {
                break;
            }
            sd_id.push(ch);
            chars.next();
        }
        if sd_id.is_empty() {
            return Err(parse_error("empty SD-ID in structured data"));
        }

        while let Some(&ch) = chars.peek() {
            if ch == ']' {
                chars.next();
                break;
            }
            if ch == ' ' {
                chars.next();
                continue;
            }

            let mut param_name = String::new();
            while let Some(&ch) = chars.peek() {
                if ch == '=' {
                    break;
                }
                param_name.push(ch);
                chars.next();
            }
            if chars.next() != Some('=') {
                break;
            }
            if chars.next() != Some('"') {
                return Err(parse_error("SD-PARAM value must be quoted"));
            }

            let mut param_value = String::new();
            let mut escaped = false;
            for ch in chars.by_ref() {
                if escaped {
                    param_value.push(ch);
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == '"' {
                    break;
                } else {
                    param_value.push(ch);
                }
            }

            fields.push((format!("syslog.sd.{sd_id}.{param_name}"), param_value));
        }
    }

    Ok(fields)
}
