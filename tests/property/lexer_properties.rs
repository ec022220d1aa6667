// Property tests for the lexer and parser front end.
//
// These check invariants over generated input rather than fixed examples:
// no panics, deterministic output, well-formed spans, and a parse depth
// guard that turns pathological nesting into an error.

use lunacov::lexer::{is_keyword, lex, lex_with_comments, Token};
use lunacov::parser::{parse, DEFAULT_MAX_DEPTH};
use proptest::prelude::*;

// =============================================================================
// Safety and determinism
// =============================================================================

#[test]
fn prop_lexer_never_panics() {
    proptest!(|(source in "\\PC{0,1000}")| {
        let _ = lex(&source);
        let _ = lex_with_comments(&source);
    });
}

#[test]
fn prop_lexing_is_deterministic() {
    proptest!(|(source in "\\PC{0,500}")| {
        let first = lex(&source);
        let second = lex(&source);
        prop_assert_eq!(first.is_ok(), second.is_ok());
        if let (Ok(a), Ok(b)) = (first, second) {
            prop_assert_eq!(a, b);
        }
    });
}

#[test]
fn empty_input_is_valid() {
    assert_eq!(lex("").unwrap().len(), 0);
    assert_eq!(lex("   \n\t\n").unwrap().len(), 0);
}

// =============================================================================
// Spans
// =============================================================================

#[test]
fn prop_spans_are_ordered_and_in_bounds() {
    proptest!(|(source in "\\PC{0,500}")| {
        if let Ok(tokens) = lex_with_comments(&source) {
            for pair in tokens.windows(2) {
                prop_assert!(pair[0].span.end <= pair[1].span.start);
            }
            for token in &tokens {
                prop_assert!(token.span.start < token.span.end);
                prop_assert!(token.span.end <= source.len());
                prop_assert!(source.is_char_boundary(token.span.start));
                prop_assert!(source.is_char_boundary(token.span.end));
            }
        }
    });
}

// =============================================================================
// Token classes
// =============================================================================

fn arb_name() -> impl Strategy<Value = String> {
    "[a-zA-Z_][a-zA-Z0-9_]{0,12}".prop_filter("keywords are not names", |s| !is_keyword(s))
}

#[test]
fn prop_identifiers_lex_as_one_name() {
    proptest!(|(name in arb_name())| {
        let tokens = lex(&name).unwrap();
        prop_assert_eq!(tokens.len(), 1);
        prop_assert_eq!(tokens[0].node, Token::Name);
    });
}

#[test]
fn prop_numbers_lex_as_one_number() {
    proptest!(|(n in 0u64..1_000_000, frac in 0u32..1000, hex in any::<bool>())| {
        let text = if hex { format!("0x{n:X}") } else { format!("{n}.{frac}e-3") };
        let tokens = lex(&text).unwrap();
        prop_assert_eq!(tokens.len(), 1);
        prop_assert_eq!(tokens[0].node, Token::Number);
    });
}

#[test]
fn prop_long_strings_keep_their_lines() {
    proptest!(|(level in 0usize..4, body in "[a-z \n]{0,40}")| {
        let eq = "=".repeat(level);
        let text = format!("x = [{eq}[{body}]{eq}]");
        let tokens = lex(&text).unwrap();
        prop_assert_eq!(tokens.last().map(|t| t.node), Some(Token::LongString));
        prop_assert_eq!(tokens.last().map(|t| t.span.end), Some(text.len()));
    });
}

#[test]
fn comments_are_dropped_by_lex_only() {
    let src = "x = 1 -- trailing\n--[[ long\ncomment ]] y = 2";
    let with = lex_with_comments(src).unwrap();
    let without = lex(src).unwrap();
    assert_eq!(with.iter().filter(|t| t.node == Token::Comment).count(), 2);
    assert!(without.iter().all(|t| t.node != Token::Comment));
    assert_eq!(without.len(), 6);
}

#[test]
fn unterminated_long_brackets_are_errors() {
    assert!(lex("x = [[never closed").is_err());
    assert!(lex("--[==[ open").is_err());
}

// =============================================================================
// Parser robustness
// =============================================================================

fn arb_fragment() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop::sample::select(vec![
            "if", "then", "else", "elseif", "end", "while", "do", "repeat", "until", "for", "in", "function",
            "local", "return", "x", "y", "1", "=", ",", "(", ")", "{", "}", "and", "or", "not", "==", "..", ";",
            ":", ".", "[", "]", "\n",
        ]),
        0..40,
    )
    .prop_map(|parts| parts.join(" "))
}

#[test]
fn prop_parser_never_panics_on_token_soup() {
    proptest!(|(source in arb_fragment())| {
        let _ = parse("soup.lua", &source, DEFAULT_MAX_DEPTH);
    });
}

#[test]
fn deep_nesting_is_an_error_not_a_crash() {
    let depth = 5_000;
    let source = format!("x = {}1{}", "(".repeat(depth), ")".repeat(depth));
    let err = parse("deep.lua", &source, DEFAULT_MAX_DEPTH).unwrap_err();
    assert_eq!(err.kind(), "parse");

    let blocks = format!("{}{}", "do ".repeat(depth), "end ".repeat(depth));
    assert!(parse("deep.lua", &blocks, DEFAULT_MAX_DEPTH).is_err());
}
