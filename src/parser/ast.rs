use crate::span::{Span, Spanned};

/// A parsed Lua chunk (file).
#[derive(Debug, Clone)]
pub struct Chunk {
    pub block: Spanned<Block>,
}

#[derive(Debug, Clone, Default)]
pub struct Block {
    pub stmts: Vec<Spanned<Stmt>>,
}

#[derive(Debug, Clone)]
pub struct IfClause {
    /// Span of the `if` / `elseif` keyword.
    pub keyword: Span,
    pub condition: Spanned<Expr>,
    /// Span of the `then` keyword.
    pub then_kw: Span,
    pub block: Spanned<Block>,
}

#[derive(Debug, Clone)]
pub struct ElseClause {
    pub else_kw: Span,
    pub block: Spanned<Block>,
}

#[derive(Debug, Clone)]
pub struct FuncName {
    /// Dotted path: `a.b.c` in `function a.b.c()`.
    pub path: Vec<Spanned<String>>,
    /// Method part: `m` in `function a.b:m()`.
    pub method: Option<Spanned<String>>,
}

impl FuncName {
    pub fn full_name(&self) -> String {
        let mut name = self.path.iter().map(|s| s.node.as_str()).collect::<Vec<_>>().join(".");
        if let Some(method) = &self.method {
            name.push(':');
            name.push_str(&method.node);
        }
        name
    }
}

/// `function (params) body end`. The span covers `function` through `end`.
#[derive(Debug, Clone)]
pub struct FunctionBody {
    pub params: Vec<Spanned<String>>,
    pub is_vararg: bool,
    /// Span of the `)` closing the parameter list.
    pub params_close: Span,
    pub body: Spanned<Block>,
    pub end_kw: Span,
}

#[derive(Debug, Clone)]
pub struct LocalName {
    pub name: Spanned<String>,
    /// `<const>` / `<close>` attribute.
    pub attrib: Option<Spanned<String>>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    /// `;`
    Empty,
    Local {
        names: Vec<LocalName>,
        values: Vec<Spanned<Expr>>,
    },
    Assign {
        targets: Vec<Spanned<Expr>>,
        values: Vec<Spanned<Expr>>,
    },
    /// A function or method call used as a statement.
    Call(Spanned<Expr>),
    Do {
        do_kw: Span,
        body: Spanned<Block>,
        end_kw: Span,
    },
    While {
        condition: Spanned<Expr>,
        do_kw: Span,
        body: Spanned<Block>,
        end_kw: Span,
    },
    Repeat {
        repeat_kw: Span,
        body: Spanned<Block>,
        until_kw: Span,
        condition: Spanned<Expr>,
    },
    If {
        clauses: Vec<IfClause>,
        else_clause: Option<ElseClause>,
        end_kw: Span,
    },
    NumericFor {
        var: Spanned<String>,
        start: Spanned<Expr>,
        limit: Spanned<Expr>,
        step: Option<Spanned<Expr>>,
        do_kw: Span,
        body: Spanned<Block>,
        end_kw: Span,
    },
    GenericFor {
        names: Vec<Spanned<String>>,
        exprs: Vec<Spanned<Expr>>,
        do_kw: Span,
        body: Spanned<Block>,
        end_kw: Span,
    },
    Function {
        name: FuncName,
        func: Spanned<FunctionBody>,
    },
    LocalFunction {
        name: Spanned<String>,
        func: Spanned<FunctionBody>,
    },
    Return(Vec<Spanned<Expr>>),
    Break,
    Goto(Spanned<String>),
    Label(Spanned<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Neq,
    Eq,
    BOr,
    BXor,
    BAnd,
    Shl,
    Shr,
    Concat,
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Pow,
}

impl BinOp {
    pub fn is_comparison(&self) -> bool {
        matches!(self, BinOp::Lt | BinOp::Gt | BinOp::LtEq | BinOp::GtEq | BinOp::Neq | BinOp::Eq)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BinOp::Or => "or",
            BinOp::And => "and",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::LtEq => "<=",
            BinOp::GtEq => ">=",
            BinOp::Neq => "~=",
            BinOp::Eq => "==",
            BinOp::BOr => "|",
            BinOp::BXor => "~",
            BinOp::BAnd => "&",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Concat => "..",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::IDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "^",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Not,
    Neg,
    Len,
    BNot,
}

impl UnOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnOp::Not => "not",
            UnOp::Neg => "-",
            UnOp::Len => "#",
            UnOp::BNot => "~",
        }
    }
}

#[derive(Debug, Clone)]
pub enum TableField {
    /// `[key] = value`
    Keyed { key: Spanned<Expr>, value: Spanned<Expr> },
    /// `name = value`
    Named { name: Spanned<String>, value: Spanned<Expr> },
    /// Positional `value`
    Positional(Spanned<Expr>),
}

#[derive(Debug, Clone)]
pub enum Expr {
    Nil,
    True,
    False,
    Number(String),
    Str(String),
    Vararg,
    Function(Box<FunctionBody>),
    Table(Vec<TableField>),
    BinOp {
        op: BinOp,
        lhs: Box<Spanned<Expr>>,
        rhs: Box<Spanned<Expr>>,
    },
    UnaryOp {
        op: UnOp,
        operand: Box<Spanned<Expr>>,
    },
    Name(String),
    Index {
        object: Box<Spanned<Expr>>,
        key: Box<Spanned<Expr>>,
    },
    Field {
        object: Box<Spanned<Expr>>,
        name: Spanned<String>,
    },
    Call {
        func: Box<Spanned<Expr>>,
        args: Vec<Spanned<Expr>>,
    },
    MethodCall {
        object: Box<Spanned<Expr>>,
        method: Spanned<String>,
        args: Vec<Spanned<Expr>>,
    },
    Paren(Box<Spanned<Expr>>),
}

impl Expr {
    pub fn is_call(&self) -> bool {
        matches!(self, Expr::Call { .. } | Expr::MethodCall { .. })
    }

    /// Strip any number of enclosing parentheses.
    pub fn unparen(expr: &Spanned<Expr>) -> &Spanned<Expr> {
        let mut current = expr;
        while let Expr::Paren(inner) = &current.node {
            current = inner;
        }
        current
    }
}
