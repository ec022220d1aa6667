use super::code_map::{ConditionInfo, ConditionKind};
use crate::line_index::LineIndex;
use crate::parser::ast::{BinOp, Expr, UnOp};
use crate::span::Spanned;

/// Decomposes guard expressions into a condition tree.
///
/// `and`/`or`/`not` are compound; everything else (comparisons included)
/// is a leaf. Parentheses are transparent. Ids are assigned in pre-order
/// starting at 1, so a parent's id is always lower than its components'.
pub struct ConditionExtractor<'a> {
    index: &'a LineIndex,
    conditions: Vec<ConditionInfo>,
}

impl<'a> ConditionExtractor<'a> {
    pub fn new(index: &'a LineIndex) -> Self {
        Self { index, conditions: Vec::new() }
    }

    /// Record `expr` and its components; returns the root id.
    pub fn extract(&mut self, expr: &Spanned<Expr>, parent_id: Option<usize>) -> usize {
        let expr = Expr::unparen(expr);
        let id = self.conditions.len() + 1;
        let (kind, operator) = classify(&expr.node);
        let is_compound = matches!(kind, ConditionKind::And | ConditionKind::Or | ConditionKind::Not);
        let end = expr.span.end.saturating_sub(1).max(expr.span.start);
        self.conditions.push(ConditionInfo {
            id,
            kind,
            is_compound,
            operator,
            parent_id,
            component_ids: Vec::new(),
            start_line: self.index.line_of(expr.span.start),
            end_line: self.index.line_of(end),
            span: expr.span,
        });

        let components = match &expr.node {
            Expr::BinOp { op: BinOp::And | BinOp::Or, lhs, rhs } => {
                vec![self.extract(lhs, Some(id)), self.extract(rhs, Some(id))]
            }
            Expr::UnaryOp { op: UnOp::Not, operand } => vec![self.extract(operand, Some(id))],
            _ => Vec::new(),
        };
        self.conditions[id - 1].component_ids = components;
        id
    }

    pub fn finish(self) -> Vec<ConditionInfo> {
        self.conditions
    }
}

fn classify(expr: &Expr) -> (ConditionKind, Option<String>) {
    match expr {
        Expr::BinOp { op: BinOp::And, .. } => (ConditionKind::And, Some("and".to_string())),
        Expr::BinOp { op: BinOp::Or, .. } => (ConditionKind::Or, Some("or".to_string())),
        Expr::UnaryOp { op: UnOp::Not, .. } => (ConditionKind::Not, Some("not".to_string())),
        Expr::BinOp { op, .. } if op.is_comparison() => (ConditionKind::Comparison, Some(op.as_str().to_string())),
        Expr::Nil | Expr::True | Expr::False | Expr::Number(_) | Expr::Str(_) => (ConditionKind::Literal, None),
        Expr::Name(_) => (ConditionKind::Identifier, None),
        Expr::Call { .. } | Expr::MethodCall { .. } => (ConditionKind::Call, None),
        Expr::Index { .. } | Expr::Field { .. } => (ConditionKind::Index, None),
        _ => (ConditionKind::Other, None),
    }
}
