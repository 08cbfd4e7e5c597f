//! 저장 완료 배치 알림
//!
//! 분석 서브시스템은 인테이크의 의존성이 아니라 [`IntakeSink`] 구현으로 연결됩니다.
//! 싱크는 커밋이 끝난 배치만 받으며, 중복 배치는 다시 전달되지 않습니다.

use std::sync::Mutex;

use tracing::info;

use logpost_core::event::LogBatch;

/// 저장 완료 배치를 받는 외부 협력자
pub trait IntakeSink: Send + Sync {
    /// 배치가 커밋된 직후 호출됩니다. 요청 처리 경로에서 실행되므로 빨리 반환해야 합니다.
    fn on_persisted(&self, client_id: &str, batch: &LogBatch);
}

/// 배치 요약을 로그로 남기는 기본 싱크
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl IntakeSink for TracingSink {
    fn on_persisted(&self, client_id: &str, batch: &LogBatch) {
        let max_severity = batch.records.iter().map(|r| r.severity_num).max().unwrap_or(0);
        let first_ts = batch.records.iter().map(|r| r.timestamp).min().unwrap_or(0);
        let last_ts = batch.records.iter().map(|r| r.timestamp).max().unwrap_or(0);
        info!(
            client_id,
            records = batch.len(),
            max_severity,
            first_ts,
            last_ts,
            "batch persisted"
        );
    }
}

/// 전달받은 배치를 모아 두는 싱크 (테스트/진단용)
#[derive(Debug, Default)]
pub struct CollectingSink {
    batches: Mutex<Vec<(String, LogBatch)>>,
}

impl CollectingSink {
    /// 지금까지 받은 배치
    pub fn batches(&self) -> Vec<(String, LogBatch)> {
        self.batches.lock().map(|b| b.clone()).unwrap_or_default()
    }
}

impl IntakeSink for CollectingSink {
    fn on_persisted(&self, client_id: &str, batch: &LogBatch) {
        if let Ok(mut batches) = self.batches.lock() {
            batches.push((client_id.to_owned(), batch.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logpost_core::event::LogEvent;

    #[test]
    fn collecting_sink_records_deliveries() {
        let sink = CollectingSink::default();
        let batch = LogBatch::from_events(&[LogEvent::new("app", "hello")]);

        sink.on_persisted("edge-01", &batch);
        TracingSink.on_persisted("edge-01", &batch);

        let seen = sink.batches();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "edge-01");
        assert_eq!(seen[0].1, batch);
    }
}
