//! Enrich 프로세서 -- 정적 메타데이터 추가/갱신/삭제
//!
//! 값의 `${VAR}`는 생성 시점에 환경변수로 확장합니다. 변수가 없으면 `${VAR}` 문자열이
//! 그대로 남아 누락을 눈으로 확인할 수 있습니다.

use std::collections::BTreeMap;

use logpost_core::config::{EnrichActionKind, EnrichConfig, EnrichTarget};
use logpost_core::event::LogEvent;

use super::Processor;
use crate::error::CollectorError;

#[derive(Debug, Clone)]
struct Action {
    key: String,
    value: String,
    kind: EnrichActionKind,
}

/// Enrich 프로세서
#[derive(Debug, Clone)]
pub struct EnrichProcessor {
    target: EnrichTarget,
    actions: Vec<Action>,
}

impl EnrichProcessor {
    /// 설정에서 프로세서를 생성합니다.
    pub fn new(config: &EnrichConfig) -> Self {
        let actions = config
            .actions
            .iter()
            .map(|a| Action {
                key: a.key.clone(),
                value: a.value.as_deref().map(expand_env).unwrap_or_default(),
                kind: a.action,
            })
            .collect();
        Self {
            target: config.target,
            actions,
        }
    }
}

impl Processor for EnrichProcessor {
    fn name(&self) -> &'static str {
        "enrich"
    }

    fn apply(&self, mut event: LogEvent) -> Result<Option<LogEvent>, CollectorError> {
        let map: &mut BTreeMap<String, String> = match self.target {
            EnrichTarget::Attributes => &mut event.attributes,
            EnrichTarget::Resource => &mut event.resource,
        };
        for action in &self.actions {
            match action.kind {
                EnrichActionKind::Insert => {
                    map.entry(action.key.clone())
                        .or_insert_with(|| action.value.clone());
                }
                EnrichActionKind::Update => {
                    if let Some(existing) = map.get_mut(&action.key) {
                        existing.clone_from(&action.value);
                    }
                }
                EnrichActionKind::Upsert => {
                    map.insert(action.key.clone(), action.value.clone());
                }
                EnrichActionKind::Delete => {
                    map.remove(&action.key);
                }
            }
        }
        Ok(Some(event))
    }
}

/// `${VAR}`를 환경변수 값으로 치환합니다. 없는 변수는 원문 그대로 둡니다.
pub fn expand_env(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) if is_var_name(&after[..end]) => {
                let name = &after[..end];
                match std::env::var(name) {
                    Ok(v) => out.push_str(&v),
                    Err(_) => out.push_str(&rest[start..start + end + 3]),
                }
                rest = &after[end + 1..];
            }
            _ => {
                out.push_str("${");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn is_var_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
