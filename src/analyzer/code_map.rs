use serde::{Deserialize, Serialize};

use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    /// Starts a statement or evaluates a header expression.
    Code,
    Blank,
    Comment,
    /// Only block delimiters: `end`, `else`, `do`, `then`, closing brackets.
    Structural,
    /// Part of a statement that started on an earlier line.
    Continuation,
    /// Inside a long string or long comment opened on an earlier line.
    Multiline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineInfo {
    pub line: u32,
    pub executable: bool,
    pub in_multiline: bool,
    pub kind: LineKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    Global,
    Local,
    Method,
    Module,
    Anonymous,
}

impl FunctionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionKind::Global => "global",
            FunctionKind::Local => "local",
            FunctionKind::Method => "method",
            FunctionKind::Module => "module",
            FunctionKind::Anonymous => "anonymous",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub id: usize,
    pub name: String,
    pub kind: FunctionKind,
    pub start_line: u32,
    pub end_line: u32,
    pub params: Vec<String>,
    pub is_vararg: bool,
    /// `function` through `end`.
    pub span: Span,
    /// Offset just past the parameter list's `)`, where entry is recorded.
    /// `None` for heuristic maps.
    pub entry_offset: Option<usize>,
    /// First and last line of the body statements, if the body is non-empty.
    pub body_lines: Option<(u32, u32)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    If,
    Then,
    ElseIf,
    Else,
    For,
    While,
    Repeat,
    Do,
}

impl BlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::If => "if",
            BlockKind::Then => "then",
            BlockKind::ElseIf => "elseif",
            BlockKind::Else => "else",
            BlockKind::For => "for",
            BlockKind::While => "while",
            BlockKind::Repeat => "repeat",
            BlockKind::Do => "do",
        }
    }

    /// Branch blocks live under an `if` block.
    pub fn is_branch(&self) -> bool {
        matches!(self, BlockKind::Then | BlockKind::ElseIf | BlockKind::Else)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub id: usize,
    pub kind: BlockKind,
    pub start_line: u32,
    pub end_line: u32,
    pub parent_id: Option<usize>,
    /// Root conditions guarding this block.
    pub condition_ids: Vec<usize>,
    pub span: Span,
    /// Where the instrumenter records entry: just past `then`/`else`/`do`/`repeat`.
    /// `None` for `if` blocks, which are recorded by their header.
    pub entry_offset: Option<usize>,
    /// Lines whose execution implies the block ran.
    pub body_lines: Option<(u32, u32)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    And,
    Or,
    Not,
    Comparison,
    Literal,
    Identifier,
    Call,
    Index,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionInfo {
    pub id: usize,
    pub kind: ConditionKind,
    pub is_compound: bool,
    pub operator: Option<String>,
    pub parent_id: Option<usize>,
    pub component_ids: Vec<usize>,
    pub start_line: u32,
    pub end_line: u32,
    pub span: Span,
}

/// Static structure of one source file. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeMap {
    pub path: String,
    #[serde(skip)]
    pub content: String,
    /// Hex SHA-256 of `content`.
    pub content_hash: String,
    pub lines: Vec<LineInfo>,
    pub functions: Vec<FunctionInfo>,
    pub blocks: Vec<BlockInfo>,
    pub conditions: Vec<ConditionInfo>,
    /// False when built by the textual fallback after a parse failure.
    pub parsed: bool,
    pub parse_error: Option<String>,
}

impl CodeMap {
    pub fn line_count(&self) -> u32 {
        self.lines.len() as u32
    }

    pub fn line(&self, line: u32) -> Option<&LineInfo> {
        if line == 0 {
            return None;
        }
        self.lines.get((line - 1) as usize)
    }

    pub fn is_executable(&self, line: u32) -> bool {
        self.line(line).is_some_and(|l| l.executable)
    }

    pub fn executable_lines(&self) -> impl Iterator<Item = u32> + '_ {
        self.lines.iter().filter(|l| l.executable).map(|l| l.line)
    }

    pub fn executable_line_count(&self) -> usize {
        self.lines.iter().filter(|l| l.executable).count()
    }

    /// Executable count when structural lines are promoted.
    pub fn executable_line_count_with(&self, control_flow_keywords_executable: bool) -> usize {
        self.lines
            .iter()
            .filter(|l| l.executable || (control_flow_keywords_executable && l.kind == LineKind::Structural))
            .count()
    }

    pub fn function(&self, id: usize) -> Option<&FunctionInfo> {
        self.functions.get(id.checked_sub(1)?)
    }

    pub fn block(&self, id: usize) -> Option<&BlockInfo> {
        self.blocks.get(id.checked_sub(1)?)
    }

    pub fn condition(&self, id: usize) -> Option<&ConditionInfo> {
        self.conditions.get(id.checked_sub(1)?)
    }

    /// Innermost block whose line range contains `line`.
    pub fn innermost_block_at(&self, line: u32) -> Option<&BlockInfo> {
        self.blocks
            .iter()
            .filter(|b| b.start_line <= line && line <= b.end_line)
            .min_by_key(|b| (b.end_line - b.start_line, std::cmp::Reverse(b.id)))
    }

    /// Innermost function whose line range contains `line`.
    pub fn innermost_function_at(&self, line: u32) -> Option<&FunctionInfo> {
        self.functions
            .iter()
            .filter(|f| f.start_line <= line && line <= f.end_line)
            .min_by_key(|f| (f.end_line - f.start_line, std::cmp::Reverse(f.id)))
    }

    /// Text of a 1-based line without its newline.
    pub fn line_text(&self, line: u32) -> Option<&str> {
        self.content.lines().nth(line.checked_sub(1)? as usize)
    }
}
