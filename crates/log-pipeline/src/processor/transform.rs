//! Transform 프로세서 -- 속성 이름 변경, body 마스킹, 필드 추출
//!
//! - `rename`: 속성 키를 바꿉니다. 원래 키가 없으면 아무것도 하지 않습니다.
//! - `mask`: body에서 정규식 매치를 치환합니다.
//! - `extract`: body에 이름 있는 캡처 그룹을 적용해 매치된 그룹을 속성으로 복사합니다.
//!   매치하지 않으면 이벤트를 그대로 둡니다.

use regex::Regex;

use logpost_core::config::{TransformConfig, TransformOp};
use logpost_core::event::LogEvent;

use super::Processor;
use crate::error::CollectorError;

#[derive(Debug, Clone)]
enum Operation {
    Rename { from: String, to: String },
    Mask { regex: Regex, replacement: String },
    Extract { regex: Regex },
}

/// Transform 프로세서
#[derive(Debug, Clone)]
pub struct TransformProcessor {
    operations: Vec<Operation>,
}

impl TransformProcessor {
    /// 설정의 정규식을 컴파일합니다.
    pub fn new(config: &TransformConfig) -> Result<Self, CollectorError> {
        let operations = config
            .operations
            .iter()
            .map(|op| {
                Ok(match op {
                    TransformOp::Rename { from, to } => Operation::Rename {
                        from: from.clone(),
                        to: to.clone(),
                    },
                    TransformOp::Mask {
                        pattern,
                        replacement,
                    } => Operation::Mask {
                        regex: Regex::new(pattern)?,
                        replacement: replacement.clone(),
                    },
                    TransformOp::Extract { pattern } => {
                        let regex = Regex::new(pattern)?;
                        if regex.capture_names().flatten().next().is_none() {
                            return Err(CollectorError::Config {
                                field: "transform.extract.pattern".to_owned(),
                                reason: format!("'{pattern}' has no named capture group"),
                            });
                        }
                        Operation::Extract { regex }
                    }
                })
            })
            .collect::<Result<_, CollectorError>>()?;
        Ok(Self { operations })
    }
}

impl Processor for TransformProcessor {
    fn name(&self) -> &'static str {
        "transform"
    }

    fn apply(&self, mut event: LogEvent) -> Result<Option<LogEvent>, CollectorError> {
        for op in &self.operations {
            match op {
                Operation::Rename { from, to } => {
                    if let Some(value) = event.attributes.remove(from) {
                        event.attributes.insert(to.clone(), value);
                    }
                }
                Operation::Mask { regex, replacement } => {
                    if regex.is_match(&event.body) {
                        event.body = regex
                            .replace_all(&event.body, replacement.as_str())
                            .into_owned();
                    }
                }
                Operation::Extract { regex } => {
                    let Some(caps) = regex.captures(&event.body) else {
                        continue;
                    };
                    for name in regex.capture_names().flatten() {
                        if let Some(m) = caps.name(name) {
                            event
                                .attributes
                                .insert(name.to_owned(), m.as_str().to_owned());
                        }
                    }
                }
            }
        }
        Ok(Some(event))
    }
}
