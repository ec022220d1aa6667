pub mod span;
pub mod line_index;
pub mod content_hash;
pub mod diagnostics;
pub mod lexer;
pub mod parser;
pub mod visit;
pub mod path;
pub mod config;
pub mod analyzer;
pub mod store;
pub mod context;
pub mod host;
pub mod tracker;
pub mod instrument;
pub mod interceptor;
pub mod report;
pub mod validation;
pub mod session;

pub use analyzer::{analyze, analyze_file, AnalyzeOptions, CodeMap};
pub use config::{CoverageConfig, Mode};
pub use diagnostics::CoverageError;
pub use host::{ModuleHost, RuntimeHost, TraceHost};
pub use instrument::{instrument_file, instrument_source, InstrumentOptions, Instrumented};
pub use report::ReportData;
pub use session::CoverageSession;
pub use store::{CoverageStore, LineState, TrackOptions};

use std::path::Path;

/// Instrument `file` and re-parse the result, keyed by its normalized path.
/// Used by `lunacov check` to catch rewrites that break the syntax.
pub fn check_file(file: &Path, options: &InstrumentOptions) -> Result<Instrumented, CoverageError> {
    let key = path::PathNormalizer::new().normalize_path(file);
    instrument_file(file, &key, options)
}
