#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(line) = std::str::from_utf8(data) {
        if let Ok(record) = serde_json::from_str::<dirsync::LogRecord>(line) {
            let filter = dirsync::LogFilter::new(None, Some("2000-01-01T00:00:00Z"), None)
                .expect("static bound parses");
            let _ = filter.matches(&record);
            let _ = dirsync::eventlog::format_record(&record);
        }
    }
});
