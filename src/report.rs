//! Report data assembly.
//!
//! `assemble` is a read-only walk over the store producing a plain nested
//! structure that formatters consume. Only active files are included.
//! Percentages are ratios of summed counts, never averages of percentages,
//! and are `0.0` when there is nothing executable.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::analyzer::{BlockKind, ConditionKind, FunctionKind};
use crate::diagnostics::CoverageError;
use crate::store::{ConditionState, CoverageStore, FileCoverageState, ItemState, LineState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineReport {
    pub state: LineState,
    pub execution_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionReport {
    pub id: usize,
    pub name: String,
    pub kind: FunctionKind,
    pub start_line: u32,
    pub end_line: u32,
    pub executed: bool,
    pub covered: bool,
    pub execution_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockReport {
    pub id: usize,
    pub kind: BlockKind,
    pub start_line: u32,
    pub end_line: u32,
    pub parent_id: Option<usize>,
    pub executed: bool,
    pub covered: bool,
    pub execution_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionReport {
    pub id: usize,
    pub kind: ConditionKind,
    pub start_line: u32,
    pub end_line: u32,
    pub parent_id: Option<usize>,
    pub executed: bool,
    pub executed_true: bool,
    pub executed_false: bool,
    pub execution_count: u64,
}

/// Per-file counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileSummary {
    pub total_lines: u32,
    pub executable_lines: u32,
    pub executed_lines: u32,
    pub covered_lines: u32,
    pub line_coverage_pct: f64,
    pub total_functions: u32,
    pub executed_functions: u32,
    pub covered_functions: u32,
    pub total_blocks: u32,
    pub executed_blocks: u32,
    pub covered_blocks: u32,
    pub total_conditions: u32,
    /// Conditions seen evaluating to both true and false.
    pub covered_conditions: u32,
    pub analyzed: bool,
    /// Lines were classified from text alone because the file did not parse.
    /// `analysis_error` then holds the parse error.
    pub heuristic: bool,
    pub analysis_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileReport {
    pub path: String,
    pub lines: BTreeMap<u32, LineReport>,
    pub functions: Vec<FunctionReport>,
    pub blocks: Vec<BlockReport>,
    pub conditions: Vec<ConditionReport>,
    pub summary: FileSummary,
}

/// Totals across every reported file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_files: u64,
    pub analyzed_files: u64,
    pub total_lines: u64,
    pub executable_lines: u64,
    pub executed_lines: u64,
    pub covered_lines: u64,
    pub overall_pct: f64,
    pub total_functions: u64,
    pub executed_functions: u64,
    pub covered_functions: u64,
    pub total_blocks: u64,
    pub executed_blocks: u64,
    pub covered_blocks: u64,
    pub total_conditions: u64,
    pub covered_conditions: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportData {
    pub files: BTreeMap<String, FileReport>,
    pub summary: ReportSummary,
    /// Whether `end`/`else`-style lines were counted as executable.
    pub control_flow_keywords_executable: bool,
}

/// `part / whole * 100`, or `0.0` when `whole` is zero.
pub fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 { 0.0 } else { part as f64 / whole as f64 * 100.0 }
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

pub fn assemble(store: &CoverageStore) -> ReportData {
    let cfk = store.control_flow_keywords_executable();
    let files: BTreeMap<String, FileReport> = store
        .files()
        .filter(|f| f.active)
        .map(|f| (f.path.clone(), file_report(f, cfk)))
        .collect();
    let summary = ReportSummary::from_files(files.values().map(|f| &f.summary));
    ReportData { files, summary, control_flow_keywords_executable: cfk }
}

fn file_report(state: &FileCoverageState, cfk: bool) -> FileReport {
    let executable = state.executable_lines(cfk);
    let executed = executable.iter().filter(|&&l| state.was_line_executed(l)).count();
    let covered = executable.iter().filter(|&&l| state.was_line_covered(l)).count();

    let total_lines = state.known_line_count();
    let lines = (1..=total_lines)
        .map(|line| {
            let report = LineReport {
                state: state.line_state(line, cfk),
                execution_count: state.line_execution_count(line),
            };
            (line, report)
        })
        .collect();

    let (functions, blocks, conditions): (Vec<FunctionReport>, Vec<BlockReport>, Vec<ConditionReport>) =
        match &state.code_map {
            Some(map) => (
                map.functions
                    .iter()
                    .map(|f| {
                        let ItemState { executed, covered, execution_count } = state.function(f.id);
                        FunctionReport {
                            id: f.id,
                            name: f.name.clone(),
                            kind: f.kind,
                            start_line: f.start_line,
                            end_line: f.end_line,
                            executed,
                            covered,
                            execution_count,
                        }
                    })
                    .collect(),
                map.blocks
                    .iter()
                    .map(|b| {
                        let ItemState { executed, covered, execution_count } = state.block(b.id);
                        BlockReport {
                            id: b.id,
                            kind: b.kind,
                            start_line: b.start_line,
                            end_line: b.end_line,
                            parent_id: b.parent_id,
                            executed,
                            covered,
                            execution_count,
                        }
                    })
                    .collect(),
                map.conditions
                    .iter()
                    .map(|c| {
                        let ConditionState { executed, executed_true, executed_false, execution_count } =
                            state.condition(c.id);
                        ConditionReport {
                            id: c.id,
                            kind: c.kind,
                            start_line: c.start_line,
                            end_line: c.end_line,
                            parent_id: c.parent_id,
                            executed,
                            executed_true,
                            executed_false,
                            execution_count,
                        }
                    })
                    .collect(),
            ),
            None => (Vec::new(), Vec::new(), Vec::new()),
        };

    let executable_lines = count(executable.len());
    let covered_lines = count(covered);
    let summary = FileSummary {
        total_lines,
        executable_lines,
        executed_lines: count(executed),
        covered_lines,
        line_coverage_pct: percent(u64::from(covered_lines), u64::from(executable_lines)),
        total_functions: count(functions.len()),
        executed_functions: count(functions.iter().filter(|f| f.executed).count()),
        covered_functions: count(functions.iter().filter(|f| f.covered).count()),
        total_blocks: count(blocks.len()),
        executed_blocks: count(blocks.iter().filter(|b| b.executed).count()),
        covered_blocks: count(blocks.iter().filter(|b| b.covered).count()),
        total_conditions: count(conditions.len()),
        covered_conditions: count(
            conditions.iter().filter(|c| c.executed_true && c.executed_false).count(),
        ),
        analyzed: state.is_analyzed(),
        heuristic: state.code_map.as_ref().is_some_and(|map| !map.parsed),
        analysis_error: state
            .analysis_error
            .clone()
            .or_else(|| state.code_map.as_ref().and_then(|map| map.parse_error.clone())),
    };

    FileReport { path: state.path.clone(), lines, functions, blocks, conditions, summary }
}

impl ReportSummary {
    /// Totals are summed in `u64`, so no number of files can overflow them.
    pub fn from_files<'a>(files: impl IntoIterator<Item = &'a FileSummary>) -> Self {
        let mut total = ReportSummary::default();
        for file in files {
            total.total_files += 1;
            total.analyzed_files += u64::from(file.analyzed);
            total.total_lines += u64::from(file.total_lines);
            total.executable_lines += u64::from(file.executable_lines);
            total.executed_lines += u64::from(file.executed_lines);
            total.covered_lines += u64::from(file.covered_lines);
            total.total_functions += u64::from(file.total_functions);
            total.executed_functions += u64::from(file.executed_functions);
            total.covered_functions += u64::from(file.covered_functions);
            total.total_blocks += u64::from(file.total_blocks);
            total.executed_blocks += u64::from(file.executed_blocks);
            total.covered_blocks += u64::from(file.covered_blocks);
            total.total_conditions += u64::from(file.total_conditions);
            total.covered_conditions += u64::from(file.covered_conditions);
        }
        total.overall_pct = percent(total.covered_lines, total.executable_lines);
        total
    }
}

impl ReportData {
    pub fn file(&self, path: &str) -> Option<&FileReport> {
        self.files.get(path)
    }

    pub fn to_json(&self) -> Result<String, CoverageError> {
        serde_json::to_string_pretty(self).map_err(|e| CoverageError::runtime("report", e.to_string()))
    }

    /// Plain-text table: one row per file, then the total.
    pub fn summary_table(&self) -> String {
        let mut out = String::new();
        for (path, file) in &self.files {
            let s = &file.summary;
            if s.analyzed {
                let _ = writeln!(
                    out,
                    "{:<40} {:>5.1}%  ({}/{} lines covered, {} executed){}",
                    path,
                    s.line_coverage_pct,
                    s.covered_lines,
                    s.executable_lines,
                    s.executed_lines,
                    if s.heuristic { ", heuristic" } else { "" },
                );
            } else {
                let reason = s.analysis_error.as_deref().unwrap_or("no code map");
                let _ = writeln!(out, "{path:<40} unanalyzed ({reason})");
            }
        }
        let t = &self.summary;
        let _ = writeln!(
            out,
            "{:<40} {:>5.1}%  ({}/{} lines, {}/{} functions, {}/{} blocks, {}/{} conditions)",
            "Total",
            t.overall_pct,
            t.covered_lines,
            t.executable_lines,
            t.covered_functions,
            t.total_functions,
            t.covered_blocks,
            t.total_blocks,
            t.covered_conditions,
            t.total_conditions,
        );
        out
    }
}
