#![no_main]

use libfuzzer_sys::fuzz_target;
use logpost_core::event::LogBatch;
use logpost_intake::{SchemaLimits, validate_batch};

fuzz_target!(|data: &[u8]| {
    // 평문 배치 경로: 역직렬화 후 스키마 검증
    let Ok(batch) = serde_json::from_slice::<LogBatch>(data) else {
        return;
    };
    let limits = SchemaLimits::default();
    let _ = validate_batch(&batch, &limits);
});
