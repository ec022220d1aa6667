#![no_main]
use libfuzzer_sys::fuzz_target;
use lunacov::instrument::{instrument_source, InstrumentOptions};

fuzz_target!(|data: &[u8]| {
    // Whatever parses must instrument into something that parses again:
    // instrument_source re-parses its own output and reports a
    // SyntaxValidationFailed error when it does not.
    let Ok(source) = std::str::from_utf8(data) else { return };
    if let Err(err) = instrument_source("/fuzz/input.lua", source, &InstrumentOptions::default()) {
        assert_ne!(err.kind(), "syntax_validation_failed", "{err}");
    }
});
