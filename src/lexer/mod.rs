pub mod token;
pub use token::{is_keyword, Token};

use crate::diagnostics::CoverageError;
use crate::span::{Span, Spanned};
use logos::Logos;

/// Lex Lua source into spanned tokens, dropping comments.
pub fn lex(source: &str) -> Result<Vec<Spanned<Token>>, CoverageError> {
    let mut tokens = lex_with_comments(source)?;
    tokens.retain(|t| !matches!(t.node, Token::Comment));
    Ok(tokens)
}

/// Lex Lua source keeping comment tokens. A leading `#` line (shebang) is skipped.
pub fn lex_with_comments(source: &str) -> Result<Vec<Spanned<Token>>, CoverageError> {
    let mut tokens = Vec::new();
    let mut lexer = Token::lexer(source);

    if source.starts_with('#') {
        lexer.bump(source.find('\n').unwrap_or(source.len()));
    }

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        match result {
            Ok(tok) => tokens.push(Spanned::new(tok, Span::new(span.start, span.end))),
            Err(()) => {
                let text = &source[span.start..span.end];
                let msg = if text.starts_with('[') || text.starts_with("--") {
                    "unfinished long string or comment".to_string()
                } else if text.starts_with('"') || text.starts_with('\'') {
                    "unfinished string".to_string()
                } else {
                    format!("unexpected symbol near '{}'", text.chars().next().unwrap_or(' '))
                };
                return Err(CoverageError::parse("", source, msg, Span::new(span.start, span.end)));
            }
        }
    }

    Ok(tokens)
}
