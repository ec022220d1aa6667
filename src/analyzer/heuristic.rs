//! Text-only function detection for files the parser rejects.

use std::sync::LazyLock;

use regex::Regex;

use super::code_map::{FunctionInfo, FunctionKind};
use super::multiline::MultilineMap;
use crate::span::Span;

static LOCAL_FUNCTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*local\s+function\s+([A-Za-z_]\w*)\s*\(([^)]*)\)").unwrap());
static NAMED_FUNCTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*function\s+([A-Za-z_][\w.:]*)\s*\(([^)]*)\)").unwrap());
static LOCAL_ASSIGNED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*local\s+([A-Za-z_]\w*)\s*=\s*function\s*\(([^)]*)\)").unwrap());
static ASSIGNED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Za-z_][\w.]*)\s*=\s*function\s*\(([^)]*)\)").unwrap());
static ANONYMOUS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bfunction\s*\(([^)]*)\)").unwrap());
static BLOCK_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(function|if|do|repeat|until|end)\b").unwrap());

/// Detect functions line by line from comment- and string-free code text.
/// End lines come from counting block keywords forward from the definition.
pub fn detect_functions(scan: &MultilineMap) -> Vec<FunctionInfo> {
    let mut functions = Vec::new();
    for line in 1..=scan.line_count() {
        let Some(info) = scan.line(line) else { continue };
        let code = &info.code;
        let found = if let Some(c) = LOCAL_FUNCTION.captures(code) {
            Some((Some(c[1].to_string()), FunctionKind::Local, c[2].to_string()))
        } else if let Some(c) = NAMED_FUNCTION.captures(code) {
            let name = c[1].to_string();
            let kind = if name.contains(':') {
                FunctionKind::Method
            } else if name.contains('.') {
                FunctionKind::Module
            } else {
                FunctionKind::Global
            };
            Some((Some(name), kind, c[2].to_string()))
        } else if let Some(c) = LOCAL_ASSIGNED.captures(code) {
            Some((Some(c[1].to_string()), FunctionKind::Local, c[2].to_string()))
        } else if let Some(c) = ASSIGNED.captures(code) {
            let name = c[1].to_string();
            let kind = if name.contains('.') { FunctionKind::Module } else { FunctionKind::Global };
            Some((Some(name), kind, c[2].to_string()))
        } else {
            ANONYMOUS.captures(code).map(|c| (None, FunctionKind::Anonymous, c[1].to_string()))
        };

        let Some((name, kind, raw_params)) = found else { continue };
        let (params, is_vararg) = split_params(&raw_params);
        let end_line = find_end_line(scan, line).unwrap_or(line);
        functions.push(FunctionInfo {
            id: functions.len() + 1,
            name: name.unwrap_or_else(|| format!("<anonymous:{line}>")),
            kind,
            start_line: line,
            end_line,
            params,
            is_vararg,
            span: Span::dummy(),
            entry_offset: None,
            body_lines: (end_line > line + 1).then(|| (line + 1, end_line - 1)),
        });
    }
    functions
}

fn split_params(raw: &str) -> (Vec<String>, bool) {
    let mut params = Vec::new();
    let mut is_vararg = false;
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if part == "..." {
            is_vararg = true;
        } else {
            params.push(part.to_string());
        }
    }
    (params, is_vararg)
}

/// Scan forward from the `function` keyword on `start` for its matching `end`.
fn find_end_line(scan: &MultilineMap, start: u32) -> Option<u32> {
    let mut depth = 0usize;
    for line in start..=scan.line_count() {
        let code = &scan.line(line)?.code;
        let mut words = BLOCK_WORD.find_iter(code).peekable();
        if line == start {
            // Skip anything before the first `function` keyword on the definition line.
            while words.peek().is_some_and(|m| m.as_str() != "function") {
                words.next();
            }
        }
        for word in words {
            match word.as_str() {
                "function" | "if" | "do" | "repeat" => depth += 1,
                "end" | "until" => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Some(line);
                    }
                }
                _ => {}
            }
        }
    }
    None
}
