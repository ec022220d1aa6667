pub mod ast;

use crate::diagnostics::CoverageError;
use crate::lexer::{self, token::Token};
use crate::span::{Span, Spanned};
use ast::*;

/// Nesting limit used when the caller does not configure one.
pub const DEFAULT_MAX_DEPTH: usize = 200;

/// Binding power for the operand of a unary operator. Only `^` binds tighter.
const UNARY_BP: u8 = 22;

/// Lex and parse a complete Lua chunk.
pub fn parse(path: &str, source: &str, max_depth: usize) -> Result<Chunk, CoverageError> {
    let tokens = lexer::lex(source).map_err(|e| e.with_path(path))?;
    let mut parser = Parser::new_with_path(&tokens, source, path.to_string()).with_max_depth(max_depth);
    parser.parse_chunk()
}

pub struct Parser<'a> {
    tokens: &'a [Spanned<Token>],
    source: &'a str,
    path: String,
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new_with_path(tokens: &'a [Spanned<Token>], source: &'a str, path: String) -> Self {
        Self { tokens, source, path, pos: 0, depth: 0, max_depth: DEFAULT_MAX_DEPTH }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    fn peek(&self) -> Option<&Spanned<Token>> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<Token> {
        self.tokens.get(self.pos).map(|t| t.node)
    }

    fn peek_kind_at(&self, offset: usize) -> Option<Token> {
        self.tokens.get(self.pos + offset).map(|t| t.node)
    }

    fn check(&self, expected: Token) -> bool {
        self.peek_kind() == Some(expected)
    }

    fn advance(&mut self) -> Option<Span> {
        let tok = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(tok.span)
    }

    fn eat(&mut self, expected: Token) -> Option<Span> {
        if self.check(expected) { self.advance() } else { None }
    }

    fn prev_end(&self) -> usize {
        if self.pos == 0 {
            self.tokens.first().map(|t| t.span.start).unwrap_or(0)
        } else {
            self.tokens[self.pos - 1].span.end
        }
    }

    fn eof_span(&self) -> Span {
        Span::new(self.source.len(), self.source.len())
    }

    fn error(&self, msg: impl Into<String>, span: Span) -> CoverageError {
        CoverageError::parse(self.path.clone(), self.source, msg, span)
    }

    fn error_near(&self, what: &str) -> CoverageError {
        match self.peek() {
            Some(tok) => self.error(format!("{what} near {}", self.describe(tok)), tok.span),
            None => self.error(format!("{what} near <eof>"), self.eof_span()),
        }
    }

    fn describe(&self, tok: &Spanned<Token>) -> String {
        match tok.node {
            Token::Name | Token::Number | Token::String => {
                format!("'{}'", &self.source[tok.span.start..tok.span.end])
            }
            other => other.to_string(),
        }
    }

    fn expect(&mut self, expected: Token) -> Result<Span, CoverageError> {
        match self.eat(expected) {
            Some(span) => Ok(span),
            None => Err(self.error_near(&format!("{expected} expected"))),
        }
    }

    /// Expect the closing token of a construct opened at `open`, mentioning it in the error.
    fn expect_match(&mut self, expected: Token, opener: Token, open: Span) -> Result<Span, CoverageError> {
        match self.eat(expected) {
            Some(span) => Ok(span),
            None => {
                let (line, _) = crate::line_index::LineIndex::new(self.source).line_col(open.start);
                Err(self.error_near(&format!("{expected} expected (to close {opener} at line {line})")))
            }
        }
    }

    fn expect_name(&mut self) -> Result<Spanned<String>, CoverageError> {
        match self.peek() {
            Some(tok) if tok.node == Token::Name => {
                let span = tok.span;
                self.pos += 1;
                Ok(Spanned::new(self.source[span.start..span.end].to_string(), span))
            }
            _ => Err(self.error_near("<name> expected")),
        }
    }

    fn enter(&mut self) -> Result<(), CoverageError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(self.error_near("chunk has too many syntax levels"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn parse_chunk(&mut self) -> Result<Chunk, CoverageError> {
        let block = self.parse_block()?;
        if self.peek().is_some() {
            return Err(self.error_near("'<eof>' expected"));
        }
        Ok(Chunk { block })
    }

    fn block_follow(&self) -> bool {
        matches!(
            self.peek_kind(),
            None | Some(Token::Else) | Some(Token::ElseIf) | Some(Token::End) | Some(Token::Until)
        )
    }

    fn parse_block(&mut self) -> Result<Spanned<Block>, CoverageError> {
        self.enter()?;
        let start = self.prev_end();
        let mut stmts = Vec::new();
        while !self.block_follow() {
            if self.check(Token::Return) {
                stmts.push(self.parse_return()?);
                break;
            }
            stmts.push(self.parse_stmt()?);
        }
        self.leave();
        let span = match (stmts.first(), stmts.last()) {
            (Some(first), Some(last)) => Span::new(first.span.start, last.span.end),
            _ => Span::new(start, start),
        };
        Ok(Spanned::new(Block { stmts }, span))
    }

    fn parse_return(&mut self) -> Result<Spanned<Stmt>, CoverageError> {
        let start = self.expect(Token::Return)?.start;
        let values = if self.block_follow() || self.check(Token::Semicolon) {
            Vec::new()
        } else {
            self.parse_expr_list()?
        };
        self.eat(Token::Semicolon);
        Ok(Spanned::new(Stmt::Return(values), Span::new(start, self.prev_end())))
    }

    fn parse_stmt(&mut self) -> Result<Spanned<Stmt>, CoverageError> {
        let Some(tok) = self.peek() else {
            return Err(self.error_near("statement expected"));
        };
        let (start, kind) = (tok.span.start, tok.node);
        let stmt = match kind {
            Token::Semicolon => {
                self.advance();
                Stmt::Empty
            }
            Token::If => self.parse_if()?,
            Token::While => self.parse_while()?,
            Token::Do => {
                let do_kw = self.expect(Token::Do)?;
                let body = self.parse_block()?;
                let end_kw = self.expect_match(Token::End, Token::Do, do_kw)?;
                Stmt::Do { do_kw, body, end_kw }
            }
            Token::For => self.parse_for()?,
            Token::Repeat => {
                let repeat_kw = self.expect(Token::Repeat)?;
                let body = self.parse_block()?;
                let until_kw = self.expect_match(Token::Until, Token::Repeat, repeat_kw)?;
                let condition = self.parse_expr(0)?;
                Stmt::Repeat { repeat_kw, body, until_kw, condition }
            }
            Token::Function => self.parse_function_stmt()?,
            Token::Local => {
                self.advance();
                if self.check(Token::Function) {
                    let fn_kw = self.expect(Token::Function)?;
                    let name = self.expect_name()?;
                    let func = self.parse_function_body(fn_kw)?;
                    Stmt::LocalFunction { name, func }
                } else {
                    self.parse_local()?
                }
            }
            Token::ColonColon => {
                self.advance();
                let name = self.expect_name()?;
                self.expect(Token::ColonColon)?;
                Stmt::Label(name)
            }
            Token::Break => {
                self.advance();
                Stmt::Break
            }
            Token::Goto => {
                self.advance();
                Stmt::Goto(self.expect_name()?)
            }
            _ => self.parse_expr_stmt()?,
        };
        Ok(Spanned::new(stmt, Span::new(start, self.prev_end())))
    }

    fn parse_if(&mut self) -> Result<Stmt, CoverageError> {
        let if_kw = self.expect(Token::If)?;
        let mut clauses = Vec::new();
        let mut keyword = if_kw;
        loop {
            let condition = self.parse_expr(0)?;
            let then_kw = self.expect(Token::Then)?;
            let block = self.parse_block()?;
            clauses.push(IfClause { keyword, condition, then_kw, block });
            match self.eat(Token::ElseIf) {
                Some(span) => keyword = span,
                None => break,
            }
        }
        let else_clause = match self.eat(Token::Else) {
            Some(else_kw) => Some(ElseClause { else_kw, block: self.parse_block()? }),
            None => None,
        };
        let end_kw = self.expect_match(Token::End, Token::If, if_kw)?;
        Ok(Stmt::If { clauses, else_clause, end_kw })
    }

    fn parse_while(&mut self) -> Result<Stmt, CoverageError> {
        let while_kw = self.expect(Token::While)?;
        let condition = self.parse_expr(0)?;
        let do_kw = self.expect(Token::Do)?;
        let body = self.parse_block()?;
        let end_kw = self.expect_match(Token::End, Token::While, while_kw)?;
        Ok(Stmt::While { condition, do_kw, body, end_kw })
    }

    fn parse_for(&mut self) -> Result<Stmt, CoverageError> {
        let for_kw = self.expect(Token::For)?;
        let first = self.expect_name()?;
        if self.eat(Token::Eq).is_some() {
            let start = self.parse_expr(0)?;
            self.expect(Token::Comma)?;
            let limit = self.parse_expr(0)?;
            let step = if self.eat(Token::Comma).is_some() { Some(self.parse_expr(0)?) } else { None };
            let do_kw = self.expect(Token::Do)?;
            let body = self.parse_block()?;
            let end_kw = self.expect_match(Token::End, Token::For, for_kw)?;
            return Ok(Stmt::NumericFor { var: first, start, limit, step, do_kw, body, end_kw });
        }

        let mut names = vec![first];
        while self.eat(Token::Comma).is_some() {
            names.push(self.expect_name()?);
        }
        if !self.check(Token::In) {
            return Err(self.error_near("'=' or 'in' expected"));
        }
        self.advance();
        let exprs = self.parse_expr_list()?;
        let do_kw = self.expect(Token::Do)?;
        let body = self.parse_block()?;
        let end_kw = self.expect_match(Token::End, Token::For, for_kw)?;
        Ok(Stmt::GenericFor { names, exprs, do_kw, body, end_kw })
    }

    fn parse_function_stmt(&mut self) -> Result<Stmt, CoverageError> {
        let fn_kw = self.expect(Token::Function)?;
        let mut path = vec![self.expect_name()?];
        while self.eat(Token::Dot).is_some() {
            path.push(self.expect_name()?);
        }
        let method = if self.eat(Token::Colon).is_some() { Some(self.expect_name()?) } else { None };
        let func = self.parse_function_body(fn_kw)?;
        Ok(Stmt::Function { name: FuncName { path, method }, func })
    }

    fn parse_function_body(&mut self, fn_kw: Span) -> Result<Spanned<FunctionBody>, CoverageError> {
        self.expect(Token::LParen)?;
        let mut params = Vec::new();
        let mut is_vararg = false;
        if !self.check(Token::RParen) {
            loop {
                if self.eat(Token::Ellipsis).is_some() {
                    is_vararg = true;
                    break;
                }
                params.push(self.expect_name()?);
                if self.eat(Token::Comma).is_none() {
                    break;
                }
            }
        }
        let params_close = self.expect(Token::RParen)?;
        let body = self.parse_block()?;
        let end_kw = self.expect_match(Token::End, Token::Function, fn_kw)?;
        Ok(Spanned::new(
            FunctionBody { params, is_vararg, params_close, body, end_kw },
            Span::new(fn_kw.start, end_kw.end),
        ))
    }

    fn parse_local(&mut self) -> Result<Stmt, CoverageError> {
        let mut names = Vec::new();
        loop {
            let name = self.expect_name()?;
            let attrib = if self.eat(Token::Lt).is_some() {
                let attrib = self.expect_name()?;
                if attrib.node != "const" && attrib.node != "close" {
                    return Err(self.error(format!("unknown attribute '{}'", attrib.node), attrib.span));
                }
                self.expect(Token::Gt)?;
                Some(attrib)
            } else {
                None
            };
            names.push(LocalName { name, attrib });
            if self.eat(Token::Comma).is_none() {
                break;
            }
        }
        let values = if self.eat(Token::Eq).is_some() { self.parse_expr_list()? } else { Vec::new() };
        Ok(Stmt::Local { names, values })
    }

    fn parse_expr_stmt(&mut self) -> Result<Stmt, CoverageError> {
        let first = self.parse_suffixed_expr()?;
        if self.check(Token::Eq) || self.check(Token::Comma) {
            let mut targets = vec![first];
            while self.eat(Token::Comma).is_some() {
                targets.push(self.parse_suffixed_expr()?);
            }
            for target in &targets {
                if !matches!(target.node, Expr::Name(_) | Expr::Index { .. } | Expr::Field { .. }) {
                    return Err(self.error("syntax error: cannot assign to this expression", target.span));
                }
            }
            self.expect(Token::Eq)?;
            let values = self.parse_expr_list()?;
            return Ok(Stmt::Assign { targets, values });
        }
        if !first.node.is_call() {
            return Err(self.error_near("syntax error"));
        }
        Ok(Stmt::Call(first))
    }

    fn parse_expr_list(&mut self) -> Result<Vec<Spanned<Expr>>, CoverageError> {
        let mut exprs = vec![self.parse_expr(0)?];
        while self.eat(Token::Comma).is_some() {
            exprs.push(self.parse_expr(0)?);
        }
        Ok(exprs)
    }

    fn parse_expr(&mut self, min_bp: u8) -> Result<Spanned<Expr>, CoverageError> {
        self.enter()?;
        let mut lhs = match self.peek_kind().and_then(unary_op) {
            Some(op) => {
                let start = self.advance().map(|s| s.start).unwrap_or(0);
                let operand = self.parse_expr(UNARY_BP)?;
                let span = Span::new(start, operand.span.end);
                Spanned::new(Expr::UnaryOp { op, operand: Box::new(operand) }, span)
            }
            None => self.parse_simple_expr()?,
        };

        loop {
            let Some(op) = self.peek_kind().and_then(binary_op) else { break };
            let (lbp, rbp) = infix_binding_power(op);
            if lbp < min_bp {
                break;
            }
            self.advance();
            let rhs = self.parse_expr(rbp)?;
            let span = Span::new(lhs.span.start, rhs.span.end);
            lhs = Spanned::new(Expr::BinOp { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }, span);
        }

        self.leave();
        Ok(lhs)
    }

    fn parse_simple_expr(&mut self) -> Result<Spanned<Expr>, CoverageError> {
        let Some(tok) = self.peek() else {
            return Err(self.error_near("unexpected symbol"));
        };
        let (span, kind) = (tok.span, tok.node);
        let source = self.source;
        let text = &source[span.start..span.end];
        let expr = match kind {
            Token::Nil => Expr::Nil,
            Token::True => Expr::True,
            Token::False => Expr::False,
            Token::Ellipsis => Expr::Vararg,
            Token::Number => Expr::Number(text.to_string()),
            Token::String | Token::LongString => Expr::Str(text.to_string()),
            Token::LBrace => return self.parse_table(),
            Token::Function => {
                let fn_kw = self.expect(Token::Function)?;
                let body = self.parse_function_body(fn_kw)?;
                return Ok(Spanned::new(Expr::Function(Box::new(body.node)), body.span));
            }
            _ => return self.parse_suffixed_expr(),
        };
        self.advance();
        Ok(Spanned::new(expr, span))
    }

    fn parse_primary_expr(&mut self) -> Result<Spanned<Expr>, CoverageError> {
        match self.peek_kind() {
            Some(Token::Name) => {
                let name = self.expect_name()?;
                Ok(Spanned::new(Expr::Name(name.node), name.span))
            }
            Some(Token::LParen) => {
                let open = self.expect(Token::LParen)?;
                let inner = self.parse_expr(0)?;
                let close = self.expect_match(Token::RParen, Token::LParen, open)?;
                Ok(Spanned::new(Expr::Paren(Box::new(inner)), Span::new(open.start, close.end)))
            }
            _ => Err(self.error_near("unexpected symbol")),
        }
    }

    fn parse_suffixed_expr(&mut self) -> Result<Spanned<Expr>, CoverageError> {
        self.enter()?;
        let mut expr = self.parse_primary_expr()?;
        loop {
            let start = expr.span.start;
            match self.peek_kind() {
                Some(Token::Dot) => {
                    self.advance();
                    let name = self.expect_name()?;
                    let span = Span::new(start, name.span.end);
                    expr = Spanned::new(Expr::Field { object: Box::new(expr), name }, span);
                }
                Some(Token::LBracket) => {
                    let open = self.expect(Token::LBracket)?;
                    let key = self.parse_expr(0)?;
                    let close = self.expect_match(Token::RBracket, Token::LBracket, open)?;
                    let span = Span::new(start, close.end);
                    expr = Spanned::new(Expr::Index { object: Box::new(expr), key: Box::new(key) }, span);
                }
                Some(Token::Colon) => {
                    self.advance();
                    let method = self.expect_name()?;
                    let args = self.parse_call_args()?;
                    let span = Span::new(start, self.prev_end());
                    expr = Spanned::new(Expr::MethodCall { object: Box::new(expr), method, args }, span);
                }
                Some(Token::LParen) | Some(Token::String) | Some(Token::LongString) | Some(Token::LBrace) => {
                    let args = self.parse_call_args()?;
                    let span = Span::new(start, self.prev_end());
                    expr = Spanned::new(Expr::Call { func: Box::new(expr), args }, span);
                }
                _ => break,
            }
        }
        self.leave();
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> Result<Vec<Spanned<Expr>>, CoverageError> {
        match self.peek_kind() {
            Some(Token::String) | Some(Token::LongString) => {
                let span = self.advance().unwrap_or_default();
                let text = self.source[span.start..span.end].to_string();
                Ok(vec![Spanned::new(Expr::Str(text), span)])
            }
            Some(Token::LBrace) => Ok(vec![self.parse_table()?]),
            Some(Token::LParen) => {
                let open = self.expect(Token::LParen)?;
                let args = if self.check(Token::RParen) { Vec::new() } else { self.parse_expr_list()? };
                self.expect_match(Token::RParen, Token::LParen, open)?;
                Ok(args)
            }
            _ => Err(self.error_near("function arguments expected")),
        }
    }

    fn parse_table(&mut self) -> Result<Spanned<Expr>, CoverageError> {
        let open = self.expect(Token::LBrace)?;
        let mut fields = Vec::new();
        while !self.check(Token::RBrace) {
            let field = match self.peek_kind() {
                Some(Token::LBracket) => {
                    let key_open = self.expect(Token::LBracket)?;
                    let key = self.parse_expr(0)?;
                    self.expect_match(Token::RBracket, Token::LBracket, key_open)?;
                    self.expect(Token::Eq)?;
                    TableField::Keyed { key, value: self.parse_expr(0)? }
                }
                Some(Token::Name) if self.peek_kind_at(1) == Some(Token::Eq) => {
                    let name = self.expect_name()?;
                    self.expect(Token::Eq)?;
                    TableField::Named { name, value: self.parse_expr(0)? }
                }
                _ => TableField::Positional(self.parse_expr(0)?),
            };
            fields.push(field);
            if self.eat(Token::Comma).is_none() && self.eat(Token::Semicolon).is_none() {
                break;
            }
        }
        let close = self.expect_match(Token::RBrace, Token::LBrace, open)?;
        Ok(Spanned::new(Expr::Table(fields), Span::new(open.start, close.end)))
    }
}

fn unary_op(tok: Token) -> Option<UnOp> {
    match tok {
        Token::Not => Some(UnOp::Not),
        Token::Minus => Some(UnOp::Neg),
        Token::Hash => Some(UnOp::Len),
        Token::Tilde => Some(UnOp::BNot),
        _ => None,
    }
}

fn binary_op(tok: Token) -> Option<BinOp> {
    let op = match tok {
        Token::Or => BinOp::Or,
        Token::And => BinOp::And,
        Token::Lt => BinOp::Lt,
        Token::Gt => BinOp::Gt,
        Token::LtEq => BinOp::LtEq,
        Token::GtEq => BinOp::GtEq,
        Token::TildeEq => BinOp::Neq,
        Token::EqEq => BinOp::Eq,
        Token::Pipe => BinOp::BOr,
        Token::Tilde => BinOp::BXor,
        Token::Amp => BinOp::BAnd,
        Token::Shl => BinOp::Shl,
        Token::Shr => BinOp::Shr,
        Token::DotDot => BinOp::Concat,
        Token::Plus => BinOp::Add,
        Token::Minus => BinOp::Sub,
        Token::Star => BinOp::Mul,
        Token::Slash => BinOp::Div,
        Token::SlashSlash => BinOp::IDiv,
        Token::Percent => BinOp::Mod,
        Token::Caret => BinOp::Pow,
        _ => return None,
    };
    Some(op)
}

/// (left, right) binding power. Left-associative levels bind `(2L, 2L+1)`,
/// right-associative ones (`..`, `^`) bind `(2L+1, 2L)`.
fn infix_binding_power(op: BinOp) -> (u8, u8) {
    match op {
        BinOp::Or => (2, 3),
        BinOp::And => (4, 5),
        BinOp::Lt | BinOp::Gt | BinOp::LtEq | BinOp::GtEq | BinOp::Neq | BinOp::Eq => (6, 7),
        BinOp::BOr => (8, 9),
        BinOp::BXor => (10, 11),
        BinOp::BAnd => (12, 13),
        BinOp::Shl | BinOp::Shr => (14, 15),
        BinOp::Concat => (17, 16),
        BinOp::Add | BinOp::Sub => (18, 19),
        BinOp::Mul | BinOp::Div | BinOp::IDiv | BinOp::Mod => (20, 21),
        BinOp::Pow => (25, 24),
    }
}
