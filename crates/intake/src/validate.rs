//! 배치 스키마 검증
//!
//! 검증을 통과하지 못한 배치는 한 레코드도 저장하지 않습니다.

use std::collections::BTreeMap;

use logpost_core::config::IntakeConfig;
use logpost_core::event::LogBatch;

use crate::error::IntakeError;

/// 필드 길이/개수 제한
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaLimits {
    /// 배치당 최대 레코드 수
    pub max_records: usize,
    /// body 최대 바이트
    pub max_body_len: usize,
    /// 속성 키/값, severity 최대 바이트
    pub max_attribute_len: usize,
    /// 레코드당 최대 속성 수 (attributes, resource 각각)
    pub max_attributes: usize,
}

impl SchemaLimits {
    /// 인테이크 설정에서 제한 값을 가져옵니다.
    pub fn from_config(config: &IntakeConfig) -> Self {
        Self {
            max_records: config.max_records_per_batch,
            max_body_len: config.max_body_len,
            max_attribute_len: config.max_attribute_len,
            max_attributes: config.max_attributes,
        }
    }
}

impl Default for SchemaLimits {
    fn default() -> Self {
        Self::from_config(&IntakeConfig::default())
    }
}

/// 배치가 스키마 제한을 지키는지 검사합니다.
pub fn validate_batch(batch: &LogBatch, limits: &SchemaLimits) -> Result<(), IntakeError> {
    if batch.is_empty() {
        return Err(IntakeError::validation("records", "batch has no records"));
    }
    if batch.len() > limits.max_records {
        return Err(IntakeError::validation(
            "records",
            format!("{} records exceed limit of {}", batch.len(), limits.max_records),
        ));
    }

    for (i, record) in batch.records.iter().enumerate() {
        if record.timestamp <= 0 {
            return Err(IntakeError::validation(
                format!("records[{i}].timestamp"),
                "must be a positive epoch millisecond value",
            ));
        }
        if record.time().is_none() {
            return Err(IntakeError::validation(
                format!("records[{i}].timestamp"),
                "out of range",
            ));
        }
        check_len(&format!("records[{i}].severity"), &record.severity, limits.max_attribute_len)?;
        check_len(&format!("records[{i}].body"), &record.body, limits.max_body_len)?;
        check_map(&format!("records[{i}].attributes"), &record.attributes, limits)?;
        check_map(&format!("records[{i}].resource"), &record.resource, limits)?;
        if let Some(trace_id) = &record.trace_id {
            check_len(&format!("records[{i}].trace_id"), trace_id, limits.max_attribute_len)?;
        }
        if let Some(span_id) = &record.span_id {
            check_len(&format!("records[{i}].span_id"), span_id, limits.max_attribute_len)?;
        }
    }
    Ok(())
}

fn check_len(field: &str, value: &str, max: usize) -> Result<(), IntakeError> {
    if value.len() > max {
        return Err(IntakeError::validation(
            field,
            format!("{} bytes exceed limit of {max}", value.len()),
        ));
    }
    Ok(())
}

fn check_map(
    field: &str,
    map: &BTreeMap<String, String>,
    limits: &SchemaLimits,
) -> Result<(), IntakeError> {
    if map.len() > limits.max_attributes {
        return Err(IntakeError::validation(
            field,
            format!("{} entries exceed limit of {}", map.len(), limits.max_attributes),
        ));
    }
    for (key, value) in map {
        if key.is_empty() {
            return Err(IntakeError::validation(field, "empty key"));
        }
        check_len(&format!("{field}.{key}"), key, limits.max_attribute_len)?;
        check_len(&format!("{field}.{key}"), value, limits.max_attribute_len)?;
    }
    Ok(())
}
