//! 원천 레코드 파서
//!
//! 소스가 읽은 원시 라인을 [`LogEvent`](logpost_core::event::LogEvent)로 변환합니다.
//!
//! # 지원 형식
//! - Syslog RFC 5424 / RFC 3164 ([`SyslogParser`])
//! - journald JSON export ([`journal::parse_entry`])

pub mod journal;
pub mod syslog;

pub use syslog::SyslogParser;
