#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

/// Token-level input, so the fuzzer spends its time on grammar rather than
/// on getting past the lexer.
#[derive(Arbitrary, Debug)]
enum FuzzToken {
    Name,
    Number,
    Str,
    LongStr,
    If,
    Then,
    ElseIf,
    Else,
    End,
    While,
    Do,
    Repeat,
    Until,
    For,
    In,
    Function,
    Local,
    Return,
    Break,
    Goto,
    Label,
    And,
    Or,
    Not,
    Eq,
    EqEq,
    Plus,
    Concat,
    Comma,
    Dot,
    Colon,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Ellipsis,
    Newline,
}

impl FuzzToken {
    fn text(&self) -> &'static str {
        match self {
            FuzzToken::Name => "x",
            FuzzToken::Number => "42",
            FuzzToken::Str => "\"s\"",
            FuzzToken::LongStr => "[[a\nb]]",
            FuzzToken::If => "if",
            FuzzToken::Then => "then",
            FuzzToken::ElseIf => "elseif",
            FuzzToken::Else => "else",
            FuzzToken::End => "end",
            FuzzToken::While => "while",
            FuzzToken::Do => "do",
            FuzzToken::Repeat => "repeat",
            FuzzToken::Until => "until",
            FuzzToken::For => "for",
            FuzzToken::In => "in",
            FuzzToken::Function => "function",
            FuzzToken::Local => "local",
            FuzzToken::Return => "return",
            FuzzToken::Break => "break",
            FuzzToken::Goto => "goto",
            FuzzToken::Label => "::l::",
            FuzzToken::And => "and",
            FuzzToken::Or => "or",
            FuzzToken::Not => "not",
            FuzzToken::Eq => "=",
            FuzzToken::EqEq => "==",
            FuzzToken::Plus => "+",
            FuzzToken::Concat => "..",
            FuzzToken::Comma => ",",
            FuzzToken::Dot => ".",
            FuzzToken::Colon => ":",
            FuzzToken::LParen => "(",
            FuzzToken::RParen => ")",
            FuzzToken::LBrace => "{",
            FuzzToken::RBrace => "}",
            FuzzToken::LBracket => "[",
            FuzzToken::RBracket => "]",
            FuzzToken::Ellipsis => "...",
            FuzzToken::Newline => "\n",
        }
    }
}

#[derive(Arbitrary, Debug)]
struct FuzzTokens {
    tokens: Vec<FuzzToken>,
}

fuzz_target!(|input: FuzzTokens| {
    let source: Vec<&str> = input.tokens.iter().map(FuzzToken::text).collect();
    let source = source.join(" ");
    // Parsing and the analysis built on it must never panic.
    if lunacov::parser::parse("fuzz.lua", &source, lunacov::parser::DEFAULT_MAX_DEPTH).is_ok() {
        let _ = lunacov::analyze("fuzz.lua", &source, &lunacov::AnalyzeOptions::default());
    } else {
        let _ = lunacov::analyzer::analyze_heuristic("fuzz.lua", &source, None);
    }
});
