// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fuzz terminator stripping and UTF-8 decoding of raw pipe lines.
#![no_main]
use libfuzzer_sys::fuzz_target;
use subpiper_pump::{DecodePolicy, DecodedLine, decode_line, strip_terminator};

fuzz_target!(|data: &[u8]| {
    let body = strip_terminator(data);
    assert!(body.len() <= data.len());
    if data.ends_with(b"\n") {
        assert!(body.len() < data.len());
    }

    match decode_line(body, DecodePolicy::Replace) {
        DecodedLine::Clean(s) => assert_eq!(s.as_bytes(), body),
        DecodedLine::Repaired(s) => assert!(s.contains('\u{FFFD}')),
        DecodedLine::Dropped => panic!("replace policy never drops"),
    }

    let skipped = matches!(decode_line(body, DecodePolicy::Skip), DecodedLine::Dropped);
    assert_eq!(skipped, std::str::from_utf8(body).is_err());
});
