#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must never panic the lexer or the multiline scanner.
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = lunacov::lexer::lex_with_comments(s);
        let _ = lunacov::analyzer::multiline::MultilineMap::scan(s);
    }
});
