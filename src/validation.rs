//! Consistency checks over assembled reports.
//!
//! Every check returns a list of issues rather than a verdict; callers decide
//! what is fatal. Statistical findings are informational.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::analyzer::CodeMap;
use crate::report::{percent, ReportData};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// A summary total differs from the sum over files.
    TotalMismatch,
    /// `covered <= executed <= executable` does not hold.
    CountOrder,
    ImpossiblePercentage,
    /// The report disagrees with the static analysis of the file.
    StaticMismatch,
    MissingCodeMap,
    MissingFile,
    Outlier,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub path: Option<String>,
    pub message: String,
}

impl ValidationIssue {
    fn new(kind: IssueKind, severity: Severity, path: Option<&str>, message: impl Into<String>) -> Self {
        Self { kind, severity, path: path.map(str::to_string), message: message.into() }
    }
}

/// Summary totals against per-file sums, and the count ordering within each file.
pub fn validate_structure(report: &ReportData) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let files = report.files.values().map(|f| &f.summary);

    let sums = [
        ("total_files", report.files.len() as u64, report.summary.total_files),
        ("total_lines", files.clone().map(|s| u64::from(s.total_lines)).sum::<u64>(), report.summary.total_lines),
        (
            "executable_lines",
            files.clone().map(|s| u64::from(s.executable_lines)).sum::<u64>(),
            report.summary.executable_lines,
        ),
        (
            "executed_lines",
            files.clone().map(|s| u64::from(s.executed_lines)).sum::<u64>(),
            report.summary.executed_lines,
        ),
        (
            "covered_lines",
            files.clone().map(|s| u64::from(s.covered_lines)).sum::<u64>(),
            report.summary.covered_lines,
        ),
        (
            "total_functions",
            files.clone().map(|s| u64::from(s.total_functions)).sum::<u64>(),
            report.summary.total_functions,
        ),
        (
            "total_blocks",
            files.clone().map(|s| u64::from(s.total_blocks)).sum::<u64>(),
            report.summary.total_blocks,
        ),
        (
            "total_conditions",
            files.clone().map(|s| u64::from(s.total_conditions)).sum::<u64>(),
            report.summary.total_conditions,
        ),
    ];
    for (name, summed, claimed) in sums {
        if summed != claimed {
            issues.push(ValidationIssue::new(
                IssueKind::TotalMismatch,
                Severity::Error,
                None,
                format!("summary {name} is {claimed} but files sum to {summed}"),
            ));
        }
    }

    for (path, file) in &report.files {
        let s = &file.summary;
        if s.covered_lines > s.executed_lines {
            issues.push(ValidationIssue::new(
                IssueKind::CountOrder,
                Severity::Error,
                Some(path.as_str()),
                format!("{} covered lines exceed {} executed lines", s.covered_lines, s.executed_lines),
            ));
        }
        if s.executed_lines > s.executable_lines {
            issues.push(ValidationIssue::new(
                IssueKind::CountOrder,
                Severity::Error,
                Some(path.as_str()),
                format!("{} executed lines exceed {} executable lines", s.executed_lines, s.executable_lines),
            ));
        }
        if s.executable_lines > s.total_lines {
            issues.push(ValidationIssue::new(
                IssueKind::CountOrder,
                Severity::Error,
                Some(path.as_str()),
                format!("{} executable lines exceed {} total lines", s.executable_lines, s.total_lines),
            ));
        }
        for (label, covered, executed, total) in [
            ("functions", s.covered_functions, s.executed_functions, s.total_functions),
            ("blocks", s.covered_blocks, s.executed_blocks, s.total_blocks),
        ] {
            if covered > executed || executed > total {
                issues.push(ValidationIssue::new(
                    IssueKind::CountOrder,
                    Severity::Error,
                    Some(path.as_str()),
                    format!("{label}: {covered} covered, {executed} executed, {total} total"),
                ));
            }
        }
        if s.covered_conditions > s.total_conditions {
            issues.push(ValidationIssue::new(
                IssueKind::CountOrder,
                Severity::Error,
                Some(path.as_str()),
                format!("{} covered conditions exceed {} conditions", s.covered_conditions, s.total_conditions),
            ));
        }
    }
    issues
}

/// Re-derive line counts from the code maps and compare with the report.
///
/// Files the report marks as unanalyzed are expected to have no map; any
/// other file without one is flagged.
pub fn cross_check_with_static_analysis(
    report: &ReportData,
    code_maps: &BTreeMap<String, Arc<CodeMap>>,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    for (path, file) in &report.files {
        let Some(map) = code_maps.get(path) else {
            if file.summary.analyzed {
                issues.push(ValidationIssue::new(
                    IssueKind::MissingCodeMap,
                    Severity::Warning,
                    Some(path.as_str()),
                    "reported as analyzed but no code map is available",
                ));
            }
            continue;
        };
        let expected = map.executable_line_count_with(report.control_flow_keywords_executable);
        if expected != file.summary.executable_lines as usize {
            issues.push(ValidationIssue::new(
                IssueKind::StaticMismatch,
                Severity::Warning,
                Some(path.as_str()),
                format!("report claims {} executable lines, analysis finds {expected}", file.summary.executable_lines),
            ));
        }
        if map.line_count() != file.summary.total_lines {
            issues.push(ValidationIssue::new(
                IssueKind::StaticMismatch,
                Severity::Warning,
                Some(path.as_str()),
                format!("report claims {} lines, file has {}", file.summary.total_lines, map.line_count()),
            ));
        }
        let structure = [
            ("functions", map.functions.len(), file.summary.total_functions),
            ("blocks", map.blocks.len(), file.summary.total_blocks),
            ("conditions", map.conditions.len(), file.summary.total_conditions),
        ];
        for (label, expected, claimed) in structure {
            if expected != claimed as usize {
                issues.push(ValidationIssue::new(
                    IssueKind::StaticMismatch,
                    Severity::Warning,
                    Some(path.as_str()),
                    format!("report claims {claimed} {label}, analysis finds {expected}"),
                ));
            }
        }
    }
    issues
}

/// Percentages outside 0..=100, NaN, or not matching their own counts.
pub fn check_percentages(report: &ReportData) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let mut check = |path: Option<&str>, pct: f64, covered: u64, executable: u64| {
        if !pct.is_finite() || !(0.0..=100.0).contains(&pct) {
            issues.push(ValidationIssue::new(
                IssueKind::ImpossiblePercentage,
                Severity::Error,
                path,
                format!("coverage percentage {pct} is out of range"),
            ));
        } else if (pct - percent(covered, executable)).abs() > 0.01 {
            issues.push(ValidationIssue::new(
                IssueKind::ImpossiblePercentage,
                Severity::Error,
                path,
                format!("coverage percentage {pct:.2} does not match {covered}/{executable}"),
            ));
        }
    };
    for (path, file) in &report.files {
        let s = &file.summary;
        check(Some(path.as_str()), s.line_coverage_pct, u64::from(s.covered_lines), u64::from(s.executable_lines));
    }
    let t = &report.summary;
    check(None, t.overall_pct, t.covered_lines, t.executable_lines);
    issues
}

/// Reported files that no longer exist on disk.
pub fn check_missing_files(report: &ReportData) -> Vec<ValidationIssue> {
    report
        .files
        .keys()
        .filter(|path| !Path::new(path.as_str()).exists())
        .map(|path| ValidationIssue::new(IssueKind::MissingFile, Severity::Warning, Some(path.as_str()), "file no longer exists"))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outlier {
    pub path: String,
    pub pct: f64,
    /// Signed distance from the mean in standard deviations.
    pub deviations: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoverageStatistics {
    /// Files with at least one executable line.
    pub files: usize,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub outliers: Vec<Outlier>,
}

impl CoverageStatistics {
    pub fn issues(&self) -> Vec<ValidationIssue> {
        self.outliers
            .iter()
            .map(|o| {
                ValidationIssue::new(
                    IssueKind::Outlier,
                    Severity::Info,
                    Some(o.path.as_str()),
                    format!("{:.1}% is {:.1} standard deviations from the mean {:.1}%", o.pct, o.deviations, self.mean),
                )
            })
            .collect()
    }
}

pub const DEFAULT_OUTLIER_THRESHOLD: f64 = 2.0;

/// Mean, median and population standard deviation of per-file line coverage.
/// Files more than `threshold` deviations from the mean are outliers.
pub fn analyze_statistics(report: &ReportData, threshold: f64) -> CoverageStatistics {
    let samples: Vec<(&str, f64)> = report
        .files
        .iter()
        .filter(|(_, f)| f.summary.executable_lines > 0)
        .map(|(path, f)| (path.as_str(), f.summary.line_coverage_pct))
        .collect();
    if samples.is_empty() {
        return CoverageStatistics::default();
    }

    let n = samples.len() as f64;
    let mean = samples.iter().map(|(_, p)| p).sum::<f64>() / n;
    let variance = samples.iter().map(|(_, p)| (p - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    let mut sorted: Vec<f64> = samples.iter().map(|(_, p)| *p).collect();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 { (sorted[mid - 1] + sorted[mid]) / 2.0 } else { sorted[mid] };

    let outliers = if std_dev > 0.0 {
        samples
            .iter()
            .map(|&(path, pct)| (path, pct, (pct - mean) / std_dev))
            .filter(|(_, _, dev)| dev.abs() > threshold)
            .map(|(path, pct, deviations)| Outlier { path: path.to_string(), pct, deviations })
            .collect()
    } else {
        Vec::new()
    };

    CoverageStatistics { files: samples.len(), mean, median, std_dev, outliers }
}

/// Every check at once.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub structure: Vec<ValidationIssue>,
    pub static_analysis: Vec<ValidationIssue>,
    pub percentages: Vec<ValidationIssue>,
    pub missing_files: Vec<ValidationIssue>,
    pub statistics: CoverageStatistics,
}

impl ValidationReport {
    pub fn issues(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.structure.iter().chain(&self.static_analysis).chain(&self.percentages).chain(&self.missing_files)
    }

    /// No error-severity findings.
    pub fn is_valid(&self) -> bool {
        self.issues().all(|i| i.severity < Severity::Error)
    }
}

pub fn validate_report(report: &ReportData, code_maps: &BTreeMap<String, Arc<CodeMap>>) -> ValidationReport {
    ValidationReport {
        structure: validate_structure(report),
        static_analysis: cross_check_with_static_analysis(report, code_maps),
        percentages: check_percentages(report),
        missing_files: check_missing_files(report),
        statistics: analyze_statistics(report, DEFAULT_OUTLIER_THRESHOLD),
    }
}
