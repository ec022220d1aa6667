use super::body_line_range;
use super::code_map::{BlockInfo, BlockKind, ConditionInfo};
use super::conditions::ConditionExtractor;
use crate::line_index::LineIndex;
use crate::parser::ast::{Block, Chunk, Stmt};
use crate::span::{Span, Spanned};
use crate::visit::{walk_stmt, Visitor};

/// Collect control-structure blocks and the conditions guarding them.
///
/// Blocks are pushed on a stack as their opening keyword is reached; the
/// block on top at push time becomes the parent. `then`/`elseif`/`else`
/// branches are siblings under their `if` block.
pub fn collect_blocks(chunk: &Chunk, index: &LineIndex) -> (Vec<BlockInfo>, Vec<ConditionInfo>) {
    let mut collector = BlockCollector {
        index,
        blocks: Vec::new(),
        stack: Vec::new(),
        conditions: ConditionExtractor::new(index),
    };
    collector.visit_chunk(chunk);
    (collector.blocks, collector.conditions.finish())
}

struct BlockCollector<'a> {
    index: &'a LineIndex,
    blocks: Vec<BlockInfo>,
    stack: Vec<usize>,
    conditions: ConditionExtractor<'a>,
}

impl BlockCollector<'_> {
    fn push(
        &mut self,
        kind: BlockKind,
        span: Span,
        end_offset: usize,
        entry_offset: Option<usize>,
        body_lines: Option<(u32, u32)>,
    ) -> usize {
        let id = self.blocks.len() + 1;
        self.blocks.push(BlockInfo {
            id,
            kind,
            start_line: self.index.line_of(span.start),
            end_line: self.index.line_of(end_offset),
            parent_id: self.stack.last().copied(),
            condition_ids: Vec::new(),
            span,
            entry_offset,
            body_lines,
        });
        self.stack.push(id);
        id
    }

    fn pop(&mut self) {
        self.stack.pop();
    }

    fn body(&self, block: &Spanned<Block>) -> Option<(u32, u32)> {
        body_line_range(self.index, block)
    }
}

impl Visitor for BlockCollector<'_> {
    fn visit_stmt(&mut self, stmt: &Spanned<Stmt>) {
        match &stmt.node {
            Stmt::If { clauses, else_clause, end_kw } => {
                let header_line = self.index.line_of(stmt.span.start);
                let if_id = self.push(BlockKind::If, stmt.span, end_kw.start, None, Some((header_line, header_line)));
                for (i, clause) in clauses.iter().enumerate() {
                    let root = self.conditions.extract(&clause.condition, None);
                    self.blocks[if_id - 1].condition_ids.push(root);
                    self.visit_expr(&clause.condition);

                    let boundary = clauses
                        .get(i + 1)
                        .map(|next| next.keyword.start)
                        .or(else_clause.as_ref().map(|e| e.else_kw.start))
                        .unwrap_or(end_kw.start);
                    let kind = if i == 0 { BlockKind::Then } else { BlockKind::ElseIf };
                    let branch = self.push(
                        kind,
                        Span::new(clause.keyword.start, boundary),
                        boundary,
                        Some(clause.then_kw.end),
                        self.body(&clause.block),
                    );
                    self.blocks[branch - 1].condition_ids.push(root);
                    self.visit_block(&clause.block);
                    self.pop();
                }
                if let Some(else_clause) = else_clause {
                    self.push(
                        BlockKind::Else,
                        Span::new(else_clause.else_kw.start, end_kw.start),
                        end_kw.start,
                        Some(else_clause.else_kw.end),
                        self.body(&else_clause.block),
                    );
                    self.visit_block(&else_clause.block);
                    self.pop();
                }
                self.pop();
            }
            Stmt::While { condition, do_kw, body, end_kw } => {
                let root = self.conditions.extract(condition, None);
                self.visit_expr(condition);
                let id = self.push(BlockKind::While, stmt.span, end_kw.start, Some(do_kw.end), self.body(body));
                self.blocks[id - 1].condition_ids.push(root);
                self.visit_block(body);
                self.pop();
            }
            Stmt::Repeat { repeat_kw, body, condition, .. } => {
                let end = condition.span.end.saturating_sub(1).max(condition.span.start);
                let id = self.push(BlockKind::Repeat, stmt.span, end, Some(repeat_kw.end), self.body(body));
                self.visit_block(body);
                let root = self.conditions.extract(condition, None);
                self.blocks[id - 1].condition_ids.push(root);
                self.visit_expr(condition);
                self.pop();
            }
            Stmt::NumericFor { start, limit, step, do_kw, body, end_kw, .. } => {
                self.visit_expr(start);
                self.visit_expr(limit);
                if let Some(step) = step {
                    self.visit_expr(step);
                }
                self.push(BlockKind::For, stmt.span, end_kw.start, Some(do_kw.end), self.body(body));
                self.visit_block(body);
                self.pop();
            }
            Stmt::GenericFor { exprs, do_kw, body, end_kw, .. } => {
                for expr in exprs {
                    self.visit_expr(expr);
                }
                self.push(BlockKind::For, stmt.span, end_kw.start, Some(do_kw.end), self.body(body));
                self.visit_block(body);
                self.pop();
            }
            Stmt::Do { do_kw, body, end_kw } => {
                self.push(BlockKind::Do, stmt.span, end_kw.start, Some(do_kw.end), self.body(body));
                self.visit_block(body);
                self.pop();
            }
            _ => walk_stmt(self, stmt),
        }
    }
}
