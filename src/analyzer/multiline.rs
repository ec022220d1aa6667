//! Long string / long comment detection.
//!
//! One forward scan over the text records every long bracket region and, per
//! line, whether the line starts inside one. The same scan backs both the
//! path-based entry point and the in-memory one used by the line classifier.

use std::path::Path;

use crate::diagnostics::CoverageError;
use crate::lexer::token::long_bracket_level;
use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    LongString,
    LongComment,
    /// A short string continued with a trailing `\`.
    ShortString,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub kind: RegionKind,
    pub span: Span,
    pub start_line: u32,
    pub end_line: u32,
}

/// Per-line result of the scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineScan {
    /// Set when the line begins inside a region opened on an earlier line.
    pub starts_inside: Option<RegionKind>,
    /// Code outside strings and comments. Strings are reduced to `""`.
    pub code: String,
    pub has_comment: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Code,
    LineComment,
    Long { kind: RegionKind, level: usize, start: usize, start_line: u32 },
    Short { quote: char, start: usize, start_line: u32 },
}

#[derive(Debug, Clone, Default)]
pub struct MultilineMap {
    regions: Vec<Region>,
    lines: Vec<LineScan>,
}

impl MultilineMap {
    pub fn scan(content: &str) -> Self {
        let mut regions = Vec::new();
        let mut lines = Vec::new();
        let mut current = LineScan::default();
        let mut state = State::Code;
        let mut line_no: u32 = 1;
        let bytes = content.as_bytes();
        let mut i = 0;

        if content.starts_with('#') {
            current.has_comment = true;
            i = content.find('\n').unwrap_or(content.len());
        }

        while i < content.len() {
            let Some(ch) = content[i..].chars().next() else { break };
            let width = ch.len_utf8();

            if ch == '\n' {
                let next_state = match state {
                    State::LineComment => State::Code,
                    State::Short { .. } if !ends_with_escape(&content[..i]) => State::Code,
                    other => other,
                };
                if next_state == State::Code {
                    if let State::Short { start, start_line, .. } = state {
                        push_region(&mut regions, RegionKind::ShortString, start, i, start_line, line_no);
                    }
                }
                state = next_state;
                lines.push(std::mem::take(&mut current));
                line_no += 1;
                current.starts_inside = match state {
                    State::Long { kind, .. } => Some(kind),
                    State::Short { .. } => Some(RegionKind::ShortString),
                    _ => None,
                };
                i += 1;
                continue;
            }

            match state {
                State::Code => {
                    if content[i..].starts_with("--") {
                        current.has_comment = true;
                        match long_bracket_level(&content[i + 2..]) {
                            Some(level) => {
                                state = State::Long { kind: RegionKind::LongComment, level, start: i, start_line: line_no };
                                i += 2 + level + 2;
                            }
                            None => {
                                state = State::LineComment;
                                i += 2;
                            }
                        }
                        continue;
                    }
                    if ch == '[' {
                        if let Some(level) = long_bracket_level(&content[i..]) {
                            current.code.push_str("\"\"");
                            state = State::Long { kind: RegionKind::LongString, level, start: i, start_line: line_no };
                            i += level + 2;
                            continue;
                        }
                    }
                    if ch == '"' || ch == '\'' {
                        current.code.push_str("\"\"");
                        state = State::Short { quote: ch, start: i, start_line: line_no };
                        i += 1;
                        continue;
                    }
                    current.code.push(ch);
                    i += width;
                }
                State::LineComment => i += width,
                State::Long { kind, level, start, start_line } => {
                    if ch == ']' && closes_long_bracket(&bytes[i..], level) {
                        let end = i + level + 2;
                        push_region(&mut regions, kind, start, end, start_line, line_no);
                        state = State::Code;
                        i = end;
                    } else {
                        i += width;
                    }
                }
                State::Short { quote, start, start_line } => {
                    if ch == '\\' {
                        // Escaped newlines are handled by the newline branch.
                        let next = content[i + 1..].chars().next();
                        i += 1 + match next {
                            Some('\n') | None => 0,
                            Some(c) => c.len_utf8(),
                        };
                    } else if ch == quote {
                        if start_line != line_no {
                            push_region(&mut regions, RegionKind::ShortString, start, i + 1, start_line, line_no);
                        }
                        state = State::Code;
                        i += 1;
                    } else {
                        i += width;
                    }
                }
            }
        }

        if let State::Long { kind, start, start_line, .. } = state {
            push_region(&mut regions, kind, start, content.len(), start_line, line_no);
        }
        if !content.is_empty() && !content.ends_with('\n') {
            lines.push(current);
        }

        Self { regions, lines }
    }

    /// Read and scan a file.
    pub fn from_file(path: &Path) -> Result<Self, CoverageError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoverageError::io(path.display().to_string(), e))?;
        Ok(Self::scan(&content))
    }

    pub fn line(&self, line: u32) -> Option<&LineScan> {
        self.lines.get(line.checked_sub(1)? as usize)
    }

    pub fn line_count(&self) -> u32 {
        self.lines.len() as u32
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Whether `line` starts inside a long string or comment.
    pub fn is_in_multiline(&self, line: u32) -> bool {
        self.line(line).is_some_and(|l| l.starts_inside.is_some())
    }

    /// Region kind covering a byte offset, if any.
    pub fn status_at(&self, offset: usize) -> Option<RegionKind> {
        let idx = self.regions.partition_point(|r| r.span.start <= offset);
        let region = self.regions.get(idx.checked_sub(1)?)?;
        (offset < region.span.end).then_some(region.kind)
    }
}

/// In-memory entry point: does `line` of `content` start inside a long string or comment?
pub fn is_line_in_multiline(content: &str, line: u32) -> bool {
    MultilineMap::scan(content).is_in_multiline(line)
}

/// Path entry point for the same check.
pub fn is_file_line_in_multiline(path: &Path, line: u32) -> Result<bool, CoverageError> {
    Ok(MultilineMap::from_file(path)?.is_in_multiline(line))
}

fn push_region(regions: &mut Vec<Region>, kind: RegionKind, start: usize, end: usize, start_line: u32, end_line: u32) {
    regions.push(Region { kind, span: Span::new(start, end), start_line, end_line });
}

fn closes_long_bracket(bytes: &[u8], level: usize) -> bool {
    bytes.len() >= level + 2
        && bytes[0] == b']'
        && bytes[1..=level].iter().all(|b| *b == b'=')
        && bytes[level + 1] == b']'
}

/// Whether the text ends in an odd number of backslashes.
fn ends_with_escape(text: &str) -> bool {
    text.bytes().rev().take_while(|b| *b == b'\\').count() % 2 == 1
}
