//! AST visitor infrastructure
//!
//! `Visitor` is a read-only traversal over the Lua AST. Default implementations
//! recurse into all children; override only the methods you need and call the
//! matching `walk_*` function to continue the default recursion.
//!
//! ```rust
//! use lunacov::visit::{Visitor, walk_expr};
//! use lunacov::parser::ast::Expr;
//! use lunacov::span::Spanned;
//! use std::collections::HashSet;
//!
//! struct NameCollector {
//!     names: HashSet<String>,
//! }
//!
//! impl Visitor for NameCollector {
//!     fn visit_expr(&mut self, expr: &Spanned<Expr>) {
//!         if let Expr::Name(name) = &expr.node {
//!             self.names.insert(name.clone());
//!         }
//!         walk_expr(self, expr);
//!     }
//! }
//! ```

use crate::parser::ast::*;
use crate::span::{Span, Spanned};

pub trait Visitor: Sized {
    fn visit_chunk(&mut self, chunk: &Chunk) {
        walk_chunk(self, chunk);
    }

    fn visit_block(&mut self, block: &Spanned<Block>) {
        walk_block(self, block);
    }

    fn visit_stmt(&mut self, stmt: &Spanned<Stmt>) {
        walk_stmt(self, stmt);
    }

    /// Any function body: statement definitions and anonymous function expressions.
    /// `span` covers `function` through `end`.
    fn visit_function(&mut self, func: &FunctionBody, span: Span) {
        walk_function(self, func, span);
    }

    fn visit_expr(&mut self, expr: &Spanned<Expr>) {
        walk_expr(self, expr);
    }
}

pub fn walk_chunk<V: Visitor>(v: &mut V, chunk: &Chunk) {
    v.visit_block(&chunk.block);
}

pub fn walk_block<V: Visitor>(v: &mut V, block: &Spanned<Block>) {
    for stmt in &block.node.stmts {
        v.visit_stmt(stmt);
    }
}

pub fn walk_function<V: Visitor>(v: &mut V, func: &FunctionBody, _span: Span) {
    v.visit_block(&func.body);
}

pub fn walk_stmt<V: Visitor>(v: &mut V, stmt: &Spanned<Stmt>) {
    match &stmt.node {
        Stmt::Empty | Stmt::Break | Stmt::Goto(_) | Stmt::Label(_) => {}
        Stmt::Local { values, .. } => {
            for value in values {
                v.visit_expr(value);
            }
        }
        Stmt::Assign { targets, values } => {
            for target in targets {
                v.visit_expr(target);
            }
            for value in values {
                v.visit_expr(value);
            }
        }
        Stmt::Call(call) => v.visit_expr(call),
        Stmt::Do { body, .. } => v.visit_block(body),
        Stmt::While { condition, body, .. } => {
            v.visit_expr(condition);
            v.visit_block(body);
        }
        Stmt::Repeat { body, condition, .. } => {
            v.visit_block(body);
            v.visit_expr(condition);
        }
        Stmt::If { clauses, else_clause, .. } => {
            for clause in clauses {
                v.visit_expr(&clause.condition);
                v.visit_block(&clause.block);
            }
            if let Some(else_clause) = else_clause {
                v.visit_block(&else_clause.block);
            }
        }
        Stmt::NumericFor { start, limit, step, body, .. } => {
            v.visit_expr(start);
            v.visit_expr(limit);
            if let Some(step) = step {
                v.visit_expr(step);
            }
            v.visit_block(body);
        }
        Stmt::GenericFor { exprs, body, .. } => {
            for expr in exprs {
                v.visit_expr(expr);
            }
            v.visit_block(body);
        }
        Stmt::Function { func, .. } | Stmt::LocalFunction { func, .. } => {
            v.visit_function(&func.node, func.span);
        }
        Stmt::Return(values) => {
            for value in values {
                v.visit_expr(value);
            }
        }
    }
}

pub fn walk_expr<V: Visitor>(v: &mut V, expr: &Spanned<Expr>) {
    match &expr.node {
        Expr::Nil
        | Expr::True
        | Expr::False
        | Expr::Number(_)
        | Expr::Str(_)
        | Expr::Vararg
        | Expr::Name(_) => {}
        Expr::Function(func) => v.visit_function(func, expr.span),
        Expr::Table(fields) => {
            for field in fields {
                match field {
                    TableField::Keyed { key, value } => {
                        v.visit_expr(key);
                        v.visit_expr(value);
                    }
                    TableField::Named { value, .. } | TableField::Positional(value) => v.visit_expr(value),
                }
            }
        }
        Expr::BinOp { lhs, rhs, .. } => {
            v.visit_expr(lhs);
            v.visit_expr(rhs);
        }
        Expr::UnaryOp { operand, .. } => v.visit_expr(operand),
        Expr::Index { object, key } => {
            v.visit_expr(object);
            v.visit_expr(key);
        }
        Expr::Field { object, .. } => v.visit_expr(object),
        Expr::Call { func, args } => {
            v.visit_expr(func);
            for arg in args {
                v.visit_expr(arg);
            }
        }
        Expr::MethodCall { object, args, .. } => {
            v.visit_expr(object);
            for arg in args {
                v.visit_expr(arg);
            }
        }
        Expr::Paren(inner) => v.visit_expr(inner),
    }
}
