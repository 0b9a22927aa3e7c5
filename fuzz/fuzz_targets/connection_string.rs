//! Fuzz connection string parsing.
//!
//! Parsing must never panic, and anything it accepts must survive validation
//! without panicking either.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pooled_datasource::Config;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(config) = Config::from_connection_string(s) {
            let _ = config.validate();
            let _ = format!("{config:?}");
        }
    }
});
