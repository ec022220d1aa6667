//! Executable-line classification.
//!
//! The AST tier marks statement starts (plus `elseif`/`until` headers) as
//! executable and uses token positions for the rest. Lines no token touches
//! fall through to `classify_line_simple`, which is also the whole story for
//! heuristic code maps.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use super::code_map::{LineInfo, LineKind};
use super::multiline::{LineScan, MultilineMap};
use crate::lexer::token::Token;
use crate::line_index::LineIndex;
use crate::parser::ast::{Chunk, Stmt};
use crate::span::{Span, Spanned};
use crate::visit::{walk_stmt, Visitor};

static WORD_OR_SYMBOL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*|\.\.|~=|==|\S").unwrap());

const STRUCTURAL_WORDS: &[&str] = &["end", "else", "do", "then", "repeat", ")", "}", "]", ",", ";"];

const CONTINUATION_TAILS: &[&str] = &[
    ",", "(", "{", "[", "=", "..", "+", "-", "*", "/", "%", "^", "<", ">", "&", "|", "~", "and", "or", "not",
];

/// Whether the code text consists only of block delimiters.
pub fn is_structural_text(code: &str) -> bool {
    let mut any = false;
    for m in WORD_OR_SYMBOL.find_iter(code) {
        if !STRUCTURAL_WORDS.contains(&m.as_str()) {
            return false;
        }
        any = true;
    }
    any
}

/// Whether a statement on this code line obviously continues onto the next.
pub fn ends_with_continuation(code: &str) -> bool {
    let trimmed = code.trim_end();
    let Some(last) = WORD_OR_SYMBOL.find_iter(trimmed).last() else {
        return false;
    };
    CONTINUATION_TAILS.contains(&last.as_str())
}

/// Text-only classification of a single line.
///
/// `continues_previous` is true when the previous code line ended mid-statement.
pub fn classify_line_simple(scan: &LineScan, continues_previous: bool) -> LineKind {
    let code = scan.code.trim();
    if scan.starts_inside.is_some() {
        return if code.is_empty() { LineKind::Multiline } else { LineKind::Continuation };
    }
    if code.is_empty() {
        return if scan.has_comment { LineKind::Comment } else { LineKind::Blank };
    }
    if is_structural_text(code) {
        return LineKind::Structural;
    }
    if continues_previous {
        return LineKind::Continuation;
    }
    LineKind::Code
}

/// Classify every line without an AST.
pub fn classify_lines_heuristic(scan: &MultilineMap, line_count: u32) -> Vec<LineInfo> {
    let mut lines = Vec::with_capacity(line_count as usize);
    let mut continues = false;
    let empty = LineScan::default();
    for line in 1..=line_count {
        let info = scan.line(line).unwrap_or(&empty);
        let kind = classify_line_simple(info, continues);
        if !info.code.trim().is_empty() {
            continues = ends_with_continuation(&info.code);
        }
        lines.push(LineInfo {
            line,
            executable: kind == LineKind::Code,
            in_multiline: info.starts_inside.is_some(),
            kind,
        });
    }
    lines
}

/// Collects executable lines from the AST, and the spans of `::label::`
/// statements, whose tokens count as structural.
struct ExecutableLines<'a> {
    index: &'a LineIndex,
    lines: BTreeSet<u32>,
    labels: Vec<Span>,
}

impl ExecutableLines<'_> {
    fn in_label(&self, offset: usize) -> bool {
        self.labels.iter().any(|span| span.start <= offset && offset < span.end)
    }
}

impl Visitor for ExecutableLines<'_> {
    fn visit_stmt(&mut self, stmt: &Spanned<Stmt>) {
        match &stmt.node {
            Stmt::Label(_) => self.labels.push(stmt.span),
            Stmt::Empty | Stmt::Do { .. } => {}
            Stmt::Repeat { until_kw, .. } => {
                self.lines.insert(self.index.line_of(until_kw.start));
            }
            Stmt::If { clauses, .. } => {
                for clause in clauses {
                    self.lines.insert(self.index.line_of(clause.keyword.start));
                }
            }
            _ => {
                self.lines.insert(self.index.line_of(stmt.span.start));
            }
        }
        walk_stmt(self, stmt);
    }
}

/// Per-line token facts.
#[derive(Debug, Clone, Copy, Default)]
struct TokenLine {
    has_code: bool,
    all_structural: bool,
}

/// AST-tier classification.
pub fn classify_lines(
    chunk: &Chunk,
    tokens: &[Spanned<Token>],
    index: &LineIndex,
    scan: &MultilineMap,
) -> Vec<LineInfo> {
    let line_count = index.line_count();
    let mut collector = ExecutableLines { index, lines: BTreeSet::new(), labels: Vec::new() };
    collector.visit_chunk(chunk);

    let mut token_lines = vec![TokenLine { has_code: false, all_structural: true }; line_count as usize];
    for tok in tokens {
        if tok.node == Token::Comment {
            continue;
        }
        let line = index.line_of(tok.span.start);
        if let Some(entry) = token_lines.get_mut((line - 1) as usize) {
            entry.has_code = true;
            entry.all_structural &= tok.node.is_structural() || collector.in_label(tok.span.start);
        }
    }

    let empty = LineScan::default();
    (1..=line_count)
        .map(|line| {
            let scan_line = scan.line(line).unwrap_or(&empty);
            let token_line = token_lines[(line - 1) as usize];
            let kind = if collector.lines.contains(&line) {
                LineKind::Code
            } else if token_line.has_code && token_line.all_structural {
                LineKind::Structural
            } else if token_line.has_code {
                LineKind::Continuation
            } else {
                match classify_line_simple(scan_line, false) {
                    LineKind::Code | LineKind::Structural => LineKind::Continuation,
                    other => other,
                }
            };
            LineInfo {
                line,
                executable: kind == LineKind::Code,
                in_multiline: scan_line.starts_inside.is_some(),
                kind,
            }
        })
        .collect()
}
