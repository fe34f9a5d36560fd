#![no_main]

use std::path::Path;

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(content) = std::str::from_utf8(data) {
        // Fuzz TOML config parsing - this should never panic
        if let Ok((config, _warnings)) =
            dirsync::config::parse_with_warnings(content, Path::new("fuzz.toml"))
        {
            let _ = config.mirror.resolve();
        }
    }
});
