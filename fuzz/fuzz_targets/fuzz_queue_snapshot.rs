#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Fuzz state file parsing - this should never panic
    let _ = serde_json::from_slice::<Vec<dirsync::ChangeEvent>>(data);
});
