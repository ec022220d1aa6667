//! Static analysis: source text to `CodeMap`.

pub mod blocks;
pub mod code_map;
pub mod conditions;
pub mod functions;
pub mod heuristic;
pub mod lines;
pub mod multiline;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, trace, warn};

pub use code_map::{
    BlockInfo, BlockKind, CodeMap, ConditionInfo, ConditionKind, FunctionInfo, FunctionKind, LineInfo, LineKind,
};

use crate::config::{is_vendor_path, CoverageConfig};
use crate::content_hash;
use crate::diagnostics::CoverageError;
use crate::lexer::{self, Token};
use crate::line_index::LineIndex;
use crate::parser::ast::{Block, Chunk};
use crate::parser::{Parser, DEFAULT_MAX_DEPTH};
use crate::span::Spanned;
use multiline::MultilineMap;

#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub max_file_size: u64,
    pub max_parse_depth: usize,
    /// Reject paths under vendor/third-party trees.
    pub reject_vendor: bool,
    /// Expected failures are logged at debug instead of warn.
    pub test_mode: bool,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self::from(&CoverageConfig::default())
    }
}

impl From<&CoverageConfig> for AnalyzeOptions {
    fn from(config: &CoverageConfig) -> Self {
        Self {
            max_file_size: config.max_file_size,
            max_parse_depth: config.max_parse_depth,
            reject_vendor: config.exclude_vendor,
            test_mode: config.test_mode,
        }
    }
}

fn check_input(path: &str, size: u64, options: &AnalyzeOptions) -> Result<(), CoverageError> {
    if path.is_empty() {
        return Err(CoverageError::validation("analyze", "path must not be empty"));
    }
    if size > options.max_file_size {
        return Err(CoverageError::size_limit(path, size, options.max_file_size));
    }
    if options.reject_vendor && is_vendor_path(path) {
        return Err(CoverageError::validation("analyze", format!("{path} is a vendored file")));
    }
    Ok(())
}

/// Parse `content` and build its code map. Syntax errors are returned as
/// `CoverageError::Parse`; see `analyze_or_fallback` for the lenient form.
pub fn analyze(path: &str, content: &str, options: &AnalyzeOptions) -> Result<CodeMap, CoverageError> {
    check_input(path, content.len() as u64, options)?;
    let tokens = lexer::lex_with_comments(content).map_err(|e| e.with_path(path))?;
    let code_tokens: Vec<Spanned<Token>> = tokens.iter().filter(|t| t.node != Token::Comment).cloned().collect();
    let max_depth = if options.max_parse_depth == 0 { DEFAULT_MAX_DEPTH } else { options.max_parse_depth };
    let chunk = Parser::new_with_path(&code_tokens, content, path.to_string())
        .with_max_depth(max_depth)
        .parse_chunk()?;
    Ok(analyze_parsed(path, content, &chunk, &tokens))
}

/// Build a code map from an already parsed chunk. `tokens` must include comments.
pub fn analyze_parsed(path: &str, content: &str, chunk: &Chunk, tokens: &[Spanned<Token>]) -> CodeMap {
    let index = LineIndex::new(content);
    let scan = MultilineMap::scan(content);
    let lines = lines::classify_lines(chunk, tokens, &index, &scan);
    let functions = functions::collect_functions(chunk, &index);
    let (blocks, conditions) = blocks::collect_blocks(chunk, &index);
    debug!(
        path,
        lines = lines.len(),
        functions = functions.len(),
        blocks = blocks.len(),
        conditions = conditions.len(),
        "analyzed"
    );
    CodeMap {
        path: path.to_string(),
        content: content.to_string(),
        content_hash: content_hash::hash_hex(content),
        lines,
        functions,
        blocks,
        conditions,
        parsed: true,
        parse_error: None,
    }
}

/// Text-only code map: line heuristics and regex function detection.
/// Blocks and conditions need the AST and are left empty.
pub fn analyze_heuristic(path: &str, content: &str, parse_error: Option<String>) -> CodeMap {
    let index = LineIndex::new(content);
    let scan = MultilineMap::scan(content);
    CodeMap {
        path: path.to_string(),
        content: content.to_string(),
        content_hash: content_hash::hash_hex(content),
        lines: lines::classify_lines_heuristic(&scan, index.line_count()),
        functions: heuristic::detect_functions(&scan),
        blocks: Vec::new(),
        conditions: Vec::new(),
        parsed: false,
        parse_error,
    }
}

/// Like `analyze`, but a parse error degrades to a heuristic map instead of failing.
/// Size, I/O and validation errors still fail.
pub fn analyze_or_fallback(path: &str, content: &str, options: &AnalyzeOptions) -> Result<CodeMap, CoverageError> {
    match analyze(path, content, options) {
        Ok(map) => Ok(map),
        Err(err) if !err.is_fatal_for_file() => {
            if options.test_mode {
                debug!(path, error = %err, "parse failed, using heuristic classification");
            } else {
                warn!(path, error = %err, "parse failed, using heuristic classification");
            }
            Ok(analyze_heuristic(path, content, Some(err.to_string())))
        }
        Err(err) => Err(err),
    }
}

/// Read a source file, refusing files over the size limit before reading them.
pub fn read_source(path: &Path, max_file_size: u64) -> Result<String, CoverageError> {
    let display = path.display().to_string();
    let meta = std::fs::metadata(path).map_err(|e| CoverageError::io(display.clone(), e))?;
    if meta.len() > max_file_size {
        return Err(CoverageError::size_limit(display, meta.len(), max_file_size));
    }
    std::fs::read_to_string(path).map_err(|e| CoverageError::io(display, e))
}

/// Read and analyze a file, keyed by its display path.
pub fn analyze_file(path: &Path, options: &AnalyzeOptions) -> Result<CodeMap, CoverageError> {
    let content = read_source(path, options.max_file_size)?;
    analyze_or_fallback(&path.display().to_string(), &content, options)
}

/// Line range spanned by a block's statements.
pub(crate) fn body_line_range(index: &LineIndex, block: &Spanned<Block>) -> Option<(u32, u32)> {
    let first = block.node.stmts.first()?;
    let last = block.node.stmts.last()?;
    Some((
        index.line_of(first.span.start),
        index.line_of(last.span.end.saturating_sub(1).max(last.span.start)),
    ))
}

/// Code maps keyed by normalized path, rebuilt only when content changes.
#[derive(Debug, Default)]
pub struct CodeMapCache {
    entries: HashMap<String, Arc<CodeMap>>,
    hits: u64,
    misses: u64,
}

impl CodeMapCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<Arc<CodeMap>> {
        self.entries.get(path).cloned()
    }

    /// Cached map for `path` if its content hash matches, otherwise a fresh analysis.
    pub fn get_or_analyze(
        &mut self,
        path: &str,
        content: &str,
        options: &AnalyzeOptions,
    ) -> Result<Arc<CodeMap>, CoverageError> {
        let hash = content_hash::hash_hex(content);
        if let Some(map) = self.entries.get(path) {
            if map.content_hash == hash {
                self.hits += 1;
                return Ok(Arc::clone(map));
            }
        }
        self.misses += 1;
        trace!(path, "code map cache miss");
        let map = Arc::new(analyze_or_fallback(path, content, options)?);
        self.entries.insert(path.to_string(), Arc::clone(&map));
        Ok(map)
    }

    /// Read `file` and return its map under `key`.
    pub fn load(&mut self, key: &str, file: &Path, options: &AnalyzeOptions) -> Result<Arc<CodeMap>, CoverageError> {
        let content = read_source(file, options.max_file_size)?;
        self.get_or_analyze(key, &content, options)
    }

    /// Store a map built elsewhere, such as by the instrumenter.
    pub fn insert(&mut self, path: &str, map: Arc<CodeMap>) {
        self.entries.insert(path.to_string(), map);
    }

    pub fn maps(&self) -> impl Iterator<Item = (&String, &Arc<CodeMap>)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// (hits, misses)
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.hits = 0;
        self.misses = 0;
    }
}
