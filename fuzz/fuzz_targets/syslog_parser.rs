#![no_main]

use libfuzzer_sys::fuzz_target;
use logpost_log_pipeline::SyslogParser;

fuzz_target!(|data: &[u8]| {
    let parser = SyslogParser::new();

    // 크래시나 패닉 없이 Ok 또는 Err을 반환해야 한다
    let _ = parser.parse("fuzz", data);

    // 실패 시 대체 이벤트는 항상 만들어져야 한다
    let _ = parser.to_event("fuzz", data);
});
