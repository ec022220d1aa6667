//! Source instrumentation.
//!
//! `instrument_source` parses a file, builds its code map and splices
//! tracking calls into the text (see `rewrite`). The result is re-parsed
//! before it is returned: output that does not parse is an engine bug and
//! surfaces as `SyntaxValidationFailed` with the offending line.

mod rewrite;
pub mod runtime;

use std::path::{Path, PathBuf};

use tracing::debug;

pub use rewrite::{lua_string, preamble};

use crate::analyzer::{self, CodeMap};
use crate::config::CoverageConfig;
use crate::diagnostics::CoverageError;
use crate::lexer::{self, Token};
use crate::parser::{self, Parser, DEFAULT_MAX_DEPTH};
use crate::span::Spanned;

#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentOptions {
    pub track_blocks: bool,
    pub track_conditions: bool,
    pub track_functions: bool,
    /// Bind the tracking functions once in the preamble.
    pub static_imports: bool,
    pub runtime_module: String,
    pub max_file_size: u64,
    pub max_parse_depth: usize,
}

impl Default for InstrumentOptions {
    fn default() -> Self {
        Self::from(&CoverageConfig::default())
    }
}

impl From<&CoverageConfig> for InstrumentOptions {
    fn from(config: &CoverageConfig) -> Self {
        Self {
            track_blocks: config.track_blocks,
            track_conditions: config.track_conditions,
            track_functions: config.track_functions,
            static_imports: config.static_imports,
            runtime_module: config.runtime_module.clone(),
            max_file_size: config.max_file_size,
            max_parse_depth: config.max_parse_depth,
        }
    }
}

/// Rewritten source plus the code map of the original.
#[derive(Debug, Clone)]
pub struct Instrumented {
    pub source: String,
    pub code_map: CodeMap,
}

/// Instrument `content`, recording events under the file key `key`.
pub fn instrument_source(key: &str, content: &str, options: &InstrumentOptions) -> Result<Instrumented, CoverageError> {
    if key.is_empty() {
        return Err(CoverageError::validation("instrument", "path must not be empty"));
    }
    if content.len() as u64 > options.max_file_size {
        return Err(CoverageError::size_limit(key, content.len() as u64, options.max_file_size));
    }
    let max_depth = if options.max_parse_depth == 0 { DEFAULT_MAX_DEPTH } else { options.max_parse_depth };
    let tokens = lexer::lex_with_comments(content).map_err(|e| e.with_path(key))?;
    let code_tokens: Vec<Spanned<Token>> = tokens.iter().filter(|t| t.node != Token::Comment).cloned().collect();
    let chunk = Parser::new_with_path(&code_tokens, content, key.to_string())
        .with_max_depth(max_depth)
        .parse_chunk()?;
    let code_map = analyzer::analyze_parsed(key, content, &chunk, &tokens);

    let source = rewrite::rewrite(key, content, &chunk, &code_map, options);
    validate_output(key, &source, max_depth)?;
    debug!(
        path = key,
        bytes_in = content.len(),
        bytes_out = source.len(),
        "instrumented"
    );
    Ok(Instrumented { source, code_map })
}

/// Read and instrument a file. `key` is the normalized path events are recorded under.
pub fn instrument_file(path: &Path, key: &str, options: &InstrumentOptions) -> Result<Instrumented, CoverageError> {
    let content = analyzer::read_source(path, options.max_file_size)?;
    instrument_source(key, &content, options)
}

/// Where `key` lands under `out_dir`: the key's path with its root stripped.
pub fn output_path(out_dir: &Path, key: &str) -> PathBuf {
    let relative = key.trim_start_matches('/').replacen(':', "", 1);
    out_dir.join(relative)
}

/// Write rewritten source under `out_dir`, creating directories as needed.
pub fn write_instrumented(out_dir: &Path, key: &str, source: &str) -> Result<PathBuf, CoverageError> {
    let target = output_path(out_dir, key);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CoverageError::io(parent.display().to_string(), e))?;
    }
    std::fs::write(&target, source).map_err(|e| CoverageError::io(target.display().to_string(), e))?;
    Ok(target)
}

/// Every wrap adds call nesting, so the output gets a roomier depth limit.
fn validate_output(key: &str, source: &str, max_depth: usize) -> Result<(), CoverageError> {
    match parser::parse(key, source, max_depth.saturating_mul(4)) {
        Ok(_) => Ok(()),
        Err(CoverageError::Parse { line, msg, .. }) => {
            let line_content = source.lines().nth(line.saturating_sub(1) as usize).unwrap_or_default();
            Err(CoverageError::syntax_validation(key, line, msg, line_content))
        }
        Err(other) => Err(other),
    }
}
