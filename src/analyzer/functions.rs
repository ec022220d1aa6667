use super::body_line_range;
use super::code_map::{FunctionInfo, FunctionKind};
use crate::line_index::LineIndex;
use crate::parser::ast::{Chunk, Expr, FunctionBody, Stmt, TableField};
use crate::span::{Span, Spanned};
use crate::visit::{walk_expr, walk_function, walk_stmt, Visitor};

/// Collect every function definition in source order. Ids start at 1.
pub fn collect_functions(chunk: &Chunk, index: &LineIndex) -> Vec<FunctionInfo> {
    let mut collector = FunctionCollector { index, functions: Vec::new() };
    collector.visit_chunk(chunk);
    collector.functions
}

struct FunctionCollector<'a> {
    index: &'a LineIndex,
    functions: Vec<FunctionInfo>,
}

impl FunctionCollector<'_> {
    fn record(&mut self, func: &FunctionBody, span: Span, name: Option<String>, kind: FunctionKind) {
        let id = self.functions.len() + 1;
        let start_line = self.index.line_of(span.start);
        self.functions.push(FunctionInfo {
            id,
            name: name.unwrap_or_else(|| format!("<anonymous:{start_line}>")),
            kind,
            start_line,
            end_line: self.index.line_of(func.end_kw.start),
            params: func.params.iter().map(|p| p.node.clone()).collect(),
            is_vararg: func.is_vararg,
            span,
            entry_offset: Some(func.params_close.end),
            body_lines: body_line_range(self.index, &func.body),
        });
        walk_function(self, func, span);
    }

    /// Visit a value that may be a function bound to `name`.
    fn visit_bound_value(&mut self, value: &Spanned<Expr>, name: Option<String>, kind: FunctionKind) {
        match &value.node {
            Expr::Function(func) => self.record(func, value.span, name, kind),
            _ => self.visit_expr(value),
        }
    }
}

/// Dotted rendering of an assignment target, e.g. `M.util.parse`.
fn target_name(expr: &Spanned<Expr>) -> Option<String> {
    match &expr.node {
        Expr::Name(name) => Some(name.clone()),
        Expr::Field { object, name } => Some(format!("{}.{}", target_name(object)?, name.node)),
        Expr::Index { object, key } => {
            let key = match &key.node {
                Expr::Str(s) => s.trim_matches(|c| c == '"' || c == '\'').to_string(),
                Expr::Number(n) => n.clone(),
                _ => "?".to_string(),
            };
            Some(format!("{}[{}]", target_name(object)?, key))
        }
        _ => None,
    }
}

impl Visitor for FunctionCollector<'_> {
    fn visit_stmt(&mut self, stmt: &Spanned<Stmt>) {
        match &stmt.node {
            Stmt::Function { name, func } => {
                let kind = if name.method.is_some() {
                    FunctionKind::Method
                } else if name.path.len() > 1 {
                    FunctionKind::Module
                } else {
                    FunctionKind::Global
                };
                self.record(&func.node, func.span, Some(name.full_name()), kind);
            }
            Stmt::LocalFunction { name, func } => {
                self.record(&func.node, func.span, Some(name.node.clone()), FunctionKind::Local);
            }
            Stmt::Local { names, values } => {
                for (i, value) in values.iter().enumerate() {
                    let name = names.get(i).map(|n| n.name.node.clone());
                    let kind = if name.is_some() { FunctionKind::Local } else { FunctionKind::Anonymous };
                    self.visit_bound_value(value, name, kind);
                }
            }
            Stmt::Assign { targets, values } => {
                for target in targets {
                    self.visit_expr(target);
                }
                for (i, value) in values.iter().enumerate() {
                    let (name, kind) = match targets.get(i) {
                        Some(t) if matches!(t.node, Expr::Name(_)) => (target_name(t), FunctionKind::Global),
                        Some(t) => match target_name(t) {
                            Some(name) => (Some(name), FunctionKind::Module),
                            None => (None, FunctionKind::Anonymous),
                        },
                        None => (None, FunctionKind::Anonymous),
                    };
                    self.visit_bound_value(value, name, kind);
                }
            }
            _ => walk_stmt(self, stmt),
        }
    }

    fn visit_expr(&mut self, expr: &Spanned<Expr>) {
        match &expr.node {
            Expr::Table(fields) => {
                for field in fields {
                    match field {
                        TableField::Named { name, value } => {
                            self.visit_bound_value(value, Some(name.node.clone()), FunctionKind::Module);
                        }
                        TableField::Keyed { key, value } => {
                            self.visit_expr(key);
                            self.visit_expr(value);
                        }
                        TableField::Positional(value) => self.visit_expr(value),
                    }
                }
            }
            _ => walk_expr(self, expr),
        }
    }

    fn visit_function(&mut self, func: &FunctionBody, span: Span) {
        self.record(func, span, None, FunctionKind::Anonymous);
    }
}
