#![no_main]

use std::path::Path;

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary kernel buffers must never panic
    for record in dirsync::fslisten::codec::decode(data).flatten() {
        let _ = record.kind();
        let _ = record.path_under(Path::new("/hot"));
    }
});
