// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fuzz SubpiperConfig TOML parsing and validation.
//!
//! 1. `parse_toml` never panics on arbitrary input.
//! 2. Parsed configs validate without panicking and warnings display.
//! 3. Serializing back to TOML and re-parsing is lossless.
#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(config) = subpiper_config::parse_toml(s) else {
        return;
    };

    if let Ok(warnings) = subpiper_config::validate_config(&config) {
        for w in &warnings {
            let _ = w.to_string();
        }
    }
    let _ = config.decode_policy();

    if let Ok(text) = toml::to_string(&config)
        && let Ok(rt) = subpiper_config::parse_toml(&text)
    {
        assert_eq!(config, rt, "TOML round-trip must be lossless");
    }
});
