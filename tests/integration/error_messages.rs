//! Snapshot tests for error message formatting.
//!
//! Uses insta inline snapshots; run `cargo insta review` after changing a message.

use insta::assert_snapshot;
use lunacov::analyzer::{analyze, AnalyzeOptions};
use lunacov::diagnostics::CoverageError;
use lunacov::instrument::{instrument_source, InstrumentOptions};
use lunacov::{CoverageConfig, CoverageStore, TrackOptions};

#[test]
fn parse_error_names_file_line_and_column() {
    let err = analyze("/app/m.lua", "local x = 1\nlocal = 2\n", &AnalyzeOptions::default()).unwrap_err();
    let CoverageError::Parse { line, column, .. } = &err else { panic!("expected parse error, got {err:?}") };
    assert_eq!(*line, 2);
    assert!(*column >= 1);
    assert!(err.to_string().starts_with(&format!("parse error in /app/m.lua:2:{column}: ")));
}

#[test]
fn size_limit_error() {
    let options = AnalyzeOptions { max_file_size: 8, ..Default::default() };
    let err = analyze("/app/big.lua", "local value = 1\n", &options).unwrap_err();
    assert_snapshot!(err.to_string(), @"/app/big.lua: 16 bytes exceeds the 8 byte limit");
}

#[test]
fn vendored_file_error() {
    let err = analyze("/app/vendor/lib.lua", "x = 1", &AnalyzeOptions::default()).unwrap_err();
    assert_snapshot!(err.to_string(), @"validation error in analyze: /app/vendor/lib.lua is a vendored file");
}

#[test]
fn store_validation_errors() {
    let mut store = CoverageStore::new();
    let err = store.track_line("", 1, TrackOptions::default()).unwrap_err();
    assert_snapshot!(err.to_string(), @"validation error in track_line: path must be a non-empty string");
    let err = store.mark_line_covered("/app/a.lua", 0).unwrap_err();
    assert_snapshot!(err.to_string(), @"validation error in mark_line_covered: line numbers start at 1");
    let err = store.track_block("/app/a.lua", 0, false).unwrap_err();
    assert_snapshot!(err.to_string(), @"validation error in track_block: ids start at 1");
}

#[test]
fn unknown_ids_name_the_known_count() {
    let mut store = CoverageStore::new();
    let map = analyze("/app/a.lua", "if x then y() end\n", &AnalyzeOptions::default()).unwrap();
    store.initialize_file("/app/a.lua", std::sync::Arc::new(map)).unwrap();
    let err = store.track_condition("/app/a.lua", 5, true).unwrap_err();
    assert_snapshot!(err.to_string(), @"validation error in track_condition: id 5 is not in the code map (1 known)");
}

#[test]
fn config_errors() {
    let err = CoverageConfig::from_toml_str("enabled = \"yes\"").unwrap_err();
    assert_eq!(err.kind(), "validation");
    assert!(err.to_string().starts_with("validation error in load_config: "));

    let config = CoverageConfig { include_patterns: vec!["src/[".to_string()], ..Default::default() };
    let err = config.path_filter().unwrap_err();
    assert!(err.to_string().starts_with("validation error in compile_pattern: invalid pattern 'src/[': "));
}

#[test]
fn syntax_validation_failure_shows_the_line() {
    let err = CoverageError::syntax_validation("/app/m.lua", 3, "unexpected 'end'", "  end end");
    assert_snapshot!(err.to_string(), @r"
    instrumented output for /app/m.lua does not parse (line 3: unexpected 'end')
      |   end end
    ");
}

#[test]
fn instrumenting_an_empty_key_is_rejected() {
    let err = instrument_source("", "x = 1", &InstrumentOptions::default()).unwrap_err();
    assert_snapshot!(err.to_string(), @"validation error in instrument: path must not be empty");
}
