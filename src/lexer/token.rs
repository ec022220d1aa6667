use logos::{Lexer, Logos};

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\x0B\x0C]+")]
pub enum Token {
    // Keywords
    #[token("and")]
    And,
    #[token("break")]
    Break,
    #[token("do")]
    Do,
    #[token("else")]
    Else,
    #[token("elseif")]
    ElseIf,
    #[token("end")]
    End,
    #[token("false")]
    False,
    #[token("for")]
    For,
    #[token("function")]
    Function,
    #[token("goto")]
    Goto,
    #[token("if")]
    If,
    #[token("in")]
    In,
    #[token("local")]
    Local,
    #[token("nil")]
    Nil,
    #[token("not")]
    Not,
    #[token("or")]
    Or,
    #[token("repeat")]
    Repeat,
    #[token("return")]
    Return,
    #[token("then")]
    Then,
    #[token("true")]
    True,
    #[token("until")]
    Until,
    #[token("while")]
    While,

    // Literals
    #[regex(r"0[xX]([0-9a-fA-F]+(\.[0-9a-fA-F]*)?|\.[0-9a-fA-F]+)([pP][+-]?[0-9]+)?")]
    #[regex(r"([0-9]+(\.[0-9]*)?|\.[0-9]+)([eE][+-]?[0-9]+)?")]
    Number,

    #[regex(r#""([^"\\\r\n]|\\z[ \t\r\n\x0B\x0C]*|\\(.|\r\n|\n))*""#)]
    #[regex(r#"'([^'\\\r\n]|\\z[ \t\r\n\x0B\x0C]*|\\(.|\r\n|\n))*'"#)]
    String,

    /// `[[ ... ]]` or `[==[ ... ]==]`, possibly spanning lines.
    #[regex(r"\[=*\[", lex_long_string)]
    LongString,

    // Identifiers
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Name,

    // Operators
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("//")]
    SlashSlash,
    #[token("%")]
    Percent,
    #[token("^")]
    Caret,
    #[token("#")]
    Hash,
    #[token("&")]
    Amp,
    #[token("~")]
    Tilde,
    #[token("|")]
    Pipe,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token("==")]
    EqEq,
    #[token("~=")]
    TildeEq,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("=")]
    Eq,

    // Punctuation
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("::")]
    ColonColon,
    #[token(";")]
    Semicolon,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("..")]
    DotDot,
    #[token("...")]
    Ellipsis,

    /// Line comment or `--[[ ... ]]` long comment.
    #[token("--", lex_comment)]
    Comment,
}

/// Level of a long bracket opener at the start of `s` (`[[` → 0, `[==[` → 2).
pub fn long_bracket_level(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    if bytes.first() != Some(&b'[') {
        return None;
    }
    let mut level = 0;
    while bytes.get(level + 1) == Some(&b'=') {
        level += 1;
    }
    if bytes.get(level + 1) == Some(&b'[') {
        Some(level)
    } else {
        None
    }
}

/// Offset just past the long bracket closer of `level` within `s`, if any.
pub fn find_long_bracket_close(s: &str, level: usize) -> Option<usize> {
    let closer = format!("]{}]", "=".repeat(level));
    s.find(&closer).map(|pos| pos + closer.len())
}

fn lex_long_string(lex: &mut Lexer<Token>) -> bool {
    let level = lex.slice().len() - 2;
    match find_long_bracket_close(lex.remainder(), level) {
        Some(len) => {
            lex.bump(len);
            true
        }
        None => false,
    }
}

fn lex_comment(lex: &mut Lexer<Token>) -> bool {
    let rest = lex.remainder();
    if let Some(level) = long_bracket_level(rest) {
        let opener = level + 2;
        return match find_long_bracket_close(&rest[opener..], level) {
            Some(len) => {
                lex.bump(opener + len);
                true
            }
            None => false,
        };
    }
    let len = rest.find('\n').unwrap_or(rest.len());
    lex.bump(len);
    true
}

/// Returns true if the given string is a Lua keyword.
pub fn is_keyword(s: &str) -> bool {
    matches!(s, "and" | "break" | "do" | "else" | "elseif" | "end" | "false" | "for"
        | "function" | "goto" | "if" | "in" | "local" | "nil" | "not" | "or"
        | "repeat" | "return" | "then" | "true" | "until" | "while")
}

impl Token {
    /// Tokens that only delimit blocks and never produce code on their own line.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Token::End
                | Token::Else
                | Token::Do
                | Token::Repeat
                | Token::Then
                | Token::RParen
                | Token::RBrace
                | Token::RBracket
                | Token::Comma
                | Token::Semicolon
        )
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Token::And => "'and'",
            Token::Break => "'break'",
            Token::Do => "'do'",
            Token::Else => "'else'",
            Token::ElseIf => "'elseif'",
            Token::End => "'end'",
            Token::False => "'false'",
            Token::For => "'for'",
            Token::Function => "'function'",
            Token::Goto => "'goto'",
            Token::If => "'if'",
            Token::In => "'in'",
            Token::Local => "'local'",
            Token::Nil => "'nil'",
            Token::Not => "'not'",
            Token::Or => "'or'",
            Token::Repeat => "'repeat'",
            Token::Return => "'return'",
            Token::Then => "'then'",
            Token::True => "'true'",
            Token::Until => "'until'",
            Token::While => "'while'",
            Token::Number => "number",
            Token::String | Token::LongString => "string",
            Token::Name => "name",
            Token::Plus => "'+'",
            Token::Minus => "'-'",
            Token::Star => "'*'",
            Token::Slash => "'/'",
            Token::SlashSlash => "'//'",
            Token::Percent => "'%'",
            Token::Caret => "'^'",
            Token::Hash => "'#'",
            Token::Amp => "'&'",
            Token::Tilde => "'~'",
            Token::Pipe => "'|'",
            Token::Shl => "'<<'",
            Token::Shr => "'>>'",
            Token::EqEq => "'=='",
            Token::TildeEq => "'~='",
            Token::LtEq => "'<='",
            Token::GtEq => "'>='",
            Token::Lt => "'<'",
            Token::Gt => "'>'",
            Token::Eq => "'='",
            Token::LParen => "'('",
            Token::RParen => "')'",
            Token::LBrace => "'{'",
            Token::RBrace => "'}'",
            Token::LBracket => "'['",
            Token::RBracket => "']'",
            Token::ColonColon => "'::'",
            Token::Semicolon => "';'",
            Token::Colon => "':'",
            Token::Comma => "','",
            Token::Dot => "'.'",
            Token::DotDot => "'..'",
            Token::Ellipsis => "'...'",
            Token::Comment => "comment",
        };
        f.write_str(text)
    }
}
