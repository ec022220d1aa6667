//! Source rewriting: tracking calls spliced into the original text.
//!
//! Every insertion is anchored at a byte offset of the original source and
//! none contains a newline, so line numbers survive the rewrite. Insertions
//! come in three ranks at any one offset: closing parens first (innermost
//! first), then entry calls, then opening wraps (outermost first).

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use super::InstrumentOptions;
use crate::analyzer::{BlockKind, CodeMap};
use crate::line_index::LineIndex;
use crate::parser::ast::{Chunk, Expr, Stmt};
use crate::span::Spanned;
use crate::visit::{walk_stmt, Visitor};

/// Local names bound by the preamble.
pub const RT: &str = "__lc_rt";
pub const FILE: &str = "__lc_file";
const LINE: &str = "__lc_l";
const HEADER: &str = "__lc_h";
const BLOCK: &str = "__lc_b";
const COND: &str = "__lc_c";
const FUNC: &str = "__lc_fn";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Rank {
    Close = 0,
    Entry = 1,
    Open = 2,
}

#[derive(Debug, Clone)]
struct Insertion {
    offset: usize,
    rank: Rank,
    depth: usize,
    text: String,
}

impl Insertion {
    fn order(&self, other: &Self) -> Ordering {
        self.offset.cmp(&other.offset).then(self.rank.cmp(&other.rank)).then(match self.rank {
            Rank::Close => other.depth.cmp(&self.depth),
            Rank::Entry => Ordering::Equal,
            Rank::Open => self.depth.cmp(&other.depth),
        })
    }
}

/// How tracking functions are reached from rewritten code.
struct Callee<'a> {
    options: &'a InstrumentOptions,
}

impl Callee<'_> {
    /// `__lc_l(` in static-import mode, `require("rt").line(` otherwise.
    fn call(&self, local: &str, field: &str) -> String {
        if self.options.static_imports {
            format!("{local}(")
        } else {
            format!("require({}).{field}(", lua_string(&self.options.runtime_module))
        }
    }
}

/// Line-1 prefix binding the runtime and file key.
pub fn preamble(key: &str, options: &InstrumentOptions) -> String {
    let file = lua_string(key);
    if options.static_imports {
        format!(
            "local {RT} = require({module}); local {LINE}, {HEADER}, {BLOCK}, {COND}, {FUNC}, {FILE} = \
             {RT}.line, {RT}.header, {RT}.block, {RT}.cond, {RT}.func, {file}; ",
            module = lua_string(&options.runtime_module),
        )
    } else {
        format!("local {FILE} = {file}; ")
    }
}

/// Quote `s` as a Lua short string.
pub fn lua_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            c if c.is_control() => out.push_str(&format!("\\{}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

pub fn rewrite(key: &str, content: &str, chunk: &Chunk, map: &CodeMap, options: &InstrumentOptions) -> String {
    let index = LineIndex::new(content);
    let callee = Callee { options };
    let mut inserts = Vec::new();

    if options.track_functions {
        for func in &map.functions {
            if let Some(offset) = func.entry_offset {
                inserts.push(Insertion {
                    offset,
                    rank: Rank::Entry,
                    depth: 0,
                    text: format!(" {}{FILE}, {});", callee.call(FUNC, "func"), func.id),
                });
            }
        }
    }
    if options.track_blocks {
        for block in &map.blocks {
            if let Some(offset) = block.entry_offset {
                inserts.push(Insertion {
                    offset,
                    rank: Rank::Entry,
                    depth: 0,
                    text: format!(" {}{FILE}, {}); ", callee.call(BLOCK, "block"), block.id),
                });
            }
        }
    }
    if options.track_conditions {
        for cond in &map.conditions {
            let mut depth = 1;
            let mut parent = cond.parent_id;
            while let Some(id) = parent {
                depth += 1;
                parent = map.condition(id).and_then(|c| c.parent_id);
            }
            inserts.push(Insertion {
                offset: cond.span.start,
                rank: Rank::Open,
                depth,
                text: format!("{}{FILE}, {}, ", callee.call(COND, "cond"), cond.id),
            });
            inserts.push(Insertion { offset: cond.span.end, rank: Rank::Close, depth, text: ")".to_string() });
        }
    }

    let if_blocks = map
        .blocks
        .iter()
        .filter(|b| b.kind == BlockKind::If)
        .map(|b| (b.span.start, b.id))
        .collect();
    let mut statements = StatementHooks {
        index: &index,
        callee: &callee,
        if_blocks,
        claimed: HashSet::new(),
        inserts: &mut inserts,
    };
    statements.visit_chunk(chunk);

    inserts.sort_by(Insertion::order);
    splice(key, content, &inserts, options)
}

fn splice(key: &str, content: &str, inserts: &[Insertion], options: &InstrumentOptions) -> String {
    let extra: usize = inserts.iter().map(|i| i.text.len() + 1).sum();
    let mut out = String::with_capacity(content.len() + extra + 256);
    out.push_str(&preamble(key, options));

    // A shebang line is dropped in favour of the preamble; the line break stays.
    let mut cursor = if content.starts_with('#') { content.find('\n').unwrap_or(content.len()) } else { 0 };
    for insert in inserts {
        if insert.offset < cursor {
            continue;
        }
        out.push_str(&content[cursor..insert.offset]);
        cursor = insert.offset;
        let joins_word = out.chars().last().is_some_and(is_ident_char)
            && insert.text.chars().next().is_some_and(is_ident_char);
        if joins_word {
            out.push(' ');
        }
        out.push_str(&insert.text);
    }
    out.push_str(&content[cursor..]);
    out
}

/// Line calls and header wraps, which need the statement structure.
struct StatementHooks<'a, 'o> {
    index: &'a LineIndex,
    callee: &'a Callee<'o>,
    if_blocks: HashMap<usize, usize>,
    claimed: HashSet<u32>,
    inserts: &'a mut Vec<Insertion>,
}

impl StatementHooks<'_, '_> {
    /// Claim `offset`'s line; `None` if an earlier statement already records it.
    fn claim(&mut self, offset: usize) -> Option<u32> {
        let line = self.index.line_of(offset);
        self.claimed.insert(line).then_some(line)
    }

    fn line_call(&mut self, offset: usize) {
        if let Some(line) = self.claim(offset) {
            self.inserts.push(Insertion {
                offset,
                rank: Rank::Entry,
                depth: 0,
                text: format!("{}{FILE}, {line}); ", self.callee.call(LINE, "line")),
            });
        }
    }

    /// Wrap `expr` so evaluating it records the header line and optional block.
    fn header(&mut self, keyword: usize, expr: &Spanned<Expr>, block: Option<usize>) {
        let line = self.claim(keyword);
        let block = block.filter(|_| self.callee.options.track_blocks);
        if line.is_none() && block.is_none() {
            return;
        }
        let nil = |v: Option<String>| v.unwrap_or_else(|| "nil".to_string());
        self.inserts.push(Insertion {
            offset: expr.span.start,
            rank: Rank::Open,
            depth: 0,
            text: format!(
                "{}{FILE}, {}, {}, ",
                self.callee.call(HEADER, "header"),
                nil(line.map(|l| l.to_string())),
                nil(block.map(|b| b.to_string())),
            ),
        });
        self.inserts.push(Insertion { offset: expr.span.end, rank: Rank::Close, depth: 0, text: ")".to_string() });
    }
}

impl Visitor for StatementHooks<'_, '_> {
    fn visit_stmt(&mut self, stmt: &Spanned<Stmt>) {
        match &stmt.node {
            Stmt::Empty | Stmt::Label(_) | Stmt::Do { .. } => {}
            Stmt::If { clauses, else_clause, .. } => {
                // Clause by clause, so a statement sharing a line with a later
                // `elseif` claims that line first.
                let if_block = self.if_blocks.get(&stmt.span.start).copied();
                for (i, clause) in clauses.iter().enumerate() {
                    let block = if i == 0 { if_block } else { None };
                    self.header(clause.keyword.start, &clause.condition, block);
                    self.visit_expr(&clause.condition);
                    self.visit_block(&clause.block);
                }
                if let Some(else_clause) = else_clause {
                    self.visit_block(&else_clause.block);
                }
                return;
            }
            Stmt::While { condition, .. } => self.header(stmt.span.start, condition, None),
            Stmt::Repeat { until_kw, condition, body, .. } => {
                // The body's lines come first in source order.
                self.visit_block(body);
                self.header(until_kw.start, condition, None);
                self.visit_expr(condition);
                return;
            }
            Stmt::NumericFor { start, .. } => self.header(stmt.span.start, start, None),
            Stmt::GenericFor { exprs, .. } => {
                if let Some(first) = exprs.first() {
                    self.header(stmt.span.start, first, None);
                }
            }
            _ => self.line_call(stmt.span.start),
        }
        walk_stmt(self, stmt);
    }
}
