#![no_main]

use libfuzzer_sys::fuzz_target;
use logpost_log_pipeline::parser::journal::parse_entry;

fuzz_target!(|data: &[u8]| {
    if let Ok(line) = std::str::from_utf8(data) {
        let _ = parse_entry("fuzz", line);
    }
});
