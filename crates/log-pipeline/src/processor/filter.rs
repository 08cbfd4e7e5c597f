//! Filter 프로세서 -- 정규식 기반 포함/제외
//!
//! 평가 순서:
//! 1. 제외 규칙 중 하나라도 매치하면 드롭
//! 2. 포함 규칙이 있으면 하나 이상 매치해야 통과
//!
//! 드롭은 로그 증폭을 막기 위해 로그로 남기지 않고 메트릭으로만 집계합니다.

use regex::Regex;

use logpost_core::config::{FilterConfig, MatchRule};
use logpost_core::event::LogEvent;
use logpost_core::metrics as m;

use super::Processor;
use crate::error::CollectorError;

/// 컴파일된 매치 규칙
#[derive(Debug, Clone)]
struct CompiledRule {
    regex: Regex,
    attribute: Option<String>,
}

impl CompiledRule {
    fn compile(rule: &MatchRule) -> Result<Self, CollectorError> {
        Ok(Self {
            regex: Regex::new(&rule.pattern)?,
            attribute: rule.attribute.clone(),
        })
    }

    /// 대상 속성이 없으면 매치하지 않은 것으로 봅니다.
    fn matches(&self, event: &LogEvent) -> bool {
        match &self.attribute {
            None => self.regex.is_match(&event.body),
            Some(key) => event
                .attributes
                .get(key)
                .is_some_and(|value| self.regex.is_match(value)),
        }
    }
}

/// Filter 프로세서
#[derive(Debug, Clone)]
pub struct FilterProcessor {
    include: Vec<CompiledRule>,
    exclude: Vec<CompiledRule>,
}

impl FilterProcessor {
    /// 설정의 정규식을 컴파일합니다.
    pub fn new(config: &FilterConfig) -> Result<Self, CollectorError> {
        Ok(Self {
            include: config
                .include
                .iter()
                .map(CompiledRule::compile)
                .collect::<Result<_, _>>()?,
            exclude: config
                .exclude
                .iter()
                .map(CompiledRule::compile)
                .collect::<Result<_, _>>()?,
        })
    }

    /// 이벤트 통과 여부
    pub fn keeps(&self, event: &LogEvent) -> bool {
        if self.exclude.iter().any(|r| r.matches(event)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|r| r.matches(event))
    }
}

impl Processor for FilterProcessor {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn apply(&self, event: LogEvent) -> Result<Option<LogEvent>, CollectorError> {
        if self.keeps(&event) {
            Ok(Some(event))
        } else {
            metrics::counter!(
                m::COLLECTOR_FILTERED_TOTAL,
                m::LABEL_SOURCE => event.source_name
            )
            .increment(1);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(pattern: &str, attribute: Option<&str>) -> MatchRule {
        MatchRule {
            pattern: pattern.to_owned(),
            attribute: attribute.map(str::to_owned),
        }
    }

    #[test]
    fn include_mode_drops_non_matching() {
        // Given: body에 "error"가 있어야 통과
        let filter = FilterProcessor::new(&FilterConfig {
            include: vec![rule(".*error.*", None)],
            exclude: vec![],
        })
        .unwrap();

        // When
        let kept = filter.apply(LogEvent::new("app", "disk error")).unwrap();
        let dropped = filter.apply(LogEvent::new("app", "all good")).unwrap();

        // Then
        assert_eq!(kept.unwrap().body, "disk error");
        assert!(dropped.is_none());
    }

    #[test]
    fn exclude_wins_over_include() {
        let filter = FilterProcessor::new(&FilterConfig {
            include: vec![rule("error", None)],
            exclude: vec![rule("^healthcheck", None)],
        })
        .unwrap();
        assert!(!filter.keeps(&LogEvent::new("app", "healthcheck error")));
        assert!(filter.keeps(&LogEvent::new("app", "db error")));
    }

    #[test]
    fn attribute_rule_needs_present_attribute() {
        let filter = FilterProcessor::new(&FilterConfig {
            include: vec![rule("^prod$", Some("env"))],
            exclude: vec![],
        })
        .unwrap();
        assert!(filter.keeps(&LogEvent::new("app", "x").with_attribute("env", "prod")));
        assert!(!filter.keeps(&LogEvent::new("app", "x").with_attribute("env", "dev")));
        assert!(!filter.keeps(&LogEvent::new("app", "x")));
    }

    #[test]
    fn empty_filter_keeps_everything() {
        let filter = FilterProcessor::new(&FilterConfig::default()).unwrap();
        assert!(filter.keeps(&LogEvent::new("app", "anything")));
    }

    #[test]
    fn invalid_regex_fails_construction() {
        let result = FilterProcessor::new(&FilterConfig {
            include: vec![rule("[unclosed", None)],
            exclude: vec![],
        });
        assert!(matches!(result, Err(CollectorError::Regex(_))));
    }
}
