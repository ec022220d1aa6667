//! Coverage data store: per-file execution and validation state.
//!
//! Every observer (debug hook, instrumentation runtime, assertions) mutates
//! coverage only through the operations here. State is keyed by normalized
//! path and created lazily on first touch.
//!
//! Executability of a tracked line is resolved from an explicit override,
//! then the file's code map, then a text-only classification. The last tier
//! reads the file once, the first time a line event arrives for a path that
//! has no code map.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::analyzer::lines::classify_lines_heuristic;
use crate::analyzer::multiline::MultilineMap;
use crate::analyzer::{read_source, BlockKind, CodeMap, LineInfo, LineKind};
use crate::diagnostics::CoverageError;
use crate::line_index::LineIndex;
use crate::path::PathNormalizer;

const DEFAULT_SOURCE_SIZE_LIMIT: u64 = 1_048_576;

/// Extra facts supplied with a line event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackOptions {
    /// The line was validated by an assertion.
    pub is_covered: bool,
    /// Overrides the code map's classification for this line.
    pub is_executable: Option<bool>,
}

impl TrackOptions {
    pub fn covered() -> Self {
        Self { is_covered: true, ..Self::default() }
    }
}

/// Four-state line model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineState {
    NonExecutable,
    NotExecuted,
    Executed,
    Covered,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ItemState {
    pub executed: bool,
    pub covered: bool,
    pub execution_count: u64,
}

impl ItemState {
    fn hit(&mut self, covered: bool) {
        self.executed = true;
        self.execution_count += 1;
        self.covered |= covered;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConditionState {
    pub executed: bool,
    pub executed_true: bool,
    pub executed_false: bool,
    pub execution_count: u64,
}

impl ConditionState {
    /// Both outcomes have been observed.
    pub fn is_covered(&self) -> bool {
        self.executed_true && self.executed_false
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileCoverageState {
    pub path: String,
    pub code_map: Option<Arc<CodeMap>>,
    pub discovered: bool,
    pub active: bool,
    /// Why analysis failed, if it did. Such files are reported as unanalyzed.
    pub analysis_error: Option<String>,
    line_counts: BTreeMap<u32, u64>,
    line_covered: BTreeSet<u32>,
    executable_overrides: BTreeMap<u32, bool>,
    /// Text-only line classes for a file observed without a code map.
    text_lines: Option<Vec<LineInfo>>,
    text_scanned: bool,
    functions: BTreeMap<usize, ItemState>,
    blocks: BTreeMap<usize, ItemState>,
    conditions: BTreeMap<usize, ConditionState>,
}

impl FileCoverageState {
    fn new(path: String, code_map: Option<Arc<CodeMap>>) -> Self {
        Self {
            path,
            code_map,
            discovered: false,
            active: false,
            analysis_error: None,
            line_counts: BTreeMap::new(),
            line_covered: BTreeSet::new(),
            executable_overrides: BTreeMap::new(),
            text_lines: None,
            text_scanned: false,
            functions: BTreeMap::new(),
            blocks: BTreeMap::new(),
            conditions: BTreeMap::new(),
        }
    }

    pub fn is_analyzed(&self) -> bool {
        self.code_map.is_some() && self.analysis_error.is_none()
    }

    pub fn line_execution_count(&self, line: u32) -> u64 {
        self.line_counts.get(&line).copied().unwrap_or(0)
    }

    pub fn was_line_executed(&self, line: u32) -> bool {
        self.line_execution_count(line) > 0
    }

    pub fn was_line_covered(&self, line: u32) -> bool {
        self.line_covered.contains(&line)
    }

    /// Resolve executability: explicit override, then code map, then the
    /// text-only classes. A line none of them knows counts as executable.
    pub fn is_line_executable(&self, line: u32, control_flow_keywords_executable: bool) -> bool {
        if let Some(&explicit) = self.executable_overrides.get(&line) {
            return explicit;
        }
        let counts = |info: &LineInfo| {
            info.executable || (control_flow_keywords_executable && info.kind == LineKind::Structural)
        };
        match (&self.code_map, &self.text_lines) {
            (Some(map), _) => map.line(line).is_some_and(counts),
            (None, Some(lines)) => line
                .checked_sub(1)
                .and_then(|idx| lines.get(idx as usize))
                .is_none_or(counts),
            (None, None) => true,
        }
    }

    /// Line count known for the file: the code map's, else the larger of the
    /// text scan and the highest observed line.
    pub fn known_line_count(&self) -> u32 {
        if let Some(map) = &self.code_map {
            return map.line_count();
        }
        let observed = self.line_counts.keys().next_back().copied().unwrap_or(0);
        let scanned = self.text_lines.as_ref().map_or(0, |lines| u32::try_from(lines.len()).unwrap_or(u32::MAX));
        observed.max(scanned)
    }

    /// Every line counted as executable for this file.
    pub fn executable_lines(&self, control_flow_keywords_executable: bool) -> BTreeSet<u32> {
        let mut lines: BTreeSet<u32> = match &self.code_map {
            Some(map) => (1..=map.line_count())
                .filter(|&l| self.is_line_executable(l, control_flow_keywords_executable))
                .collect(),
            None => self
                .line_counts
                .keys()
                .copied()
                .filter(|&l| self.is_line_executable(l, control_flow_keywords_executable))
                .collect(),
        };
        for (&line, &explicit) in &self.executable_overrides {
            if explicit {
                lines.insert(line);
            } else {
                lines.remove(&line);
            }
        }
        lines
    }

    pub fn line_state(&self, line: u32, control_flow_keywords_executable: bool) -> LineState {
        if !self.is_line_executable(line, control_flow_keywords_executable) {
            LineState::NonExecutable
        } else if self.was_line_covered(line) {
            LineState::Covered
        } else if self.was_line_executed(line) {
            LineState::Executed
        } else {
            LineState::NotExecuted
        }
    }

    /// Observed lines and their counts, in line order.
    pub fn line_counts(&self) -> impl Iterator<Item = (u32, u64)> + '_ {
        self.line_counts.iter().map(|(&l, &c)| (l, c))
    }

    pub fn covered_lines(&self) -> impl Iterator<Item = u32> + '_ {
        self.line_covered.iter().copied()
    }

    pub fn function(&self, id: usize) -> ItemState {
        self.functions.get(&id).copied().unwrap_or_default()
    }

    pub fn block(&self, id: usize) -> ItemState {
        self.blocks.get(&id).copied().unwrap_or_default()
    }

    pub fn condition(&self, id: usize) -> ConditionState {
        self.conditions.get(&id).copied().unwrap_or_default()
    }

    /// Classify the file from its text the first time it is seen without a
    /// code map. Unreadable or oversized files stay unclassified.
    fn scan_text_once(&mut self, size_limit: u64) {
        if self.code_map.is_some() || self.text_scanned {
            return;
        }
        self.text_scanned = true;
        match read_source(Path::new(&self.path), size_limit) {
            Ok(content) => {
                let scan = MultilineMap::scan(&content);
                self.text_lines = Some(classify_lines_heuristic(&scan, LineIndex::new(&content).line_count()));
                trace!(path = %self.path, "classified lines from text");
            }
            Err(err) => trace!(path = %self.path, error = %err, "no text classification"),
        }
    }

    fn hit_line(&mut self, line: u32) {
        *self.line_counts.entry(line).or_insert(0) += 1;
    }

    /// Propagate a covered line to the executed function and blocks around it.
    fn cover_enclosing(&mut self, line: u32) {
        let Some(map) = self.code_map.clone() else { return };
        if let Some(func) = map.innermost_function_at(line) {
            if let Some(state) = self.functions.get_mut(&func.id).filter(|s| s.executed) {
                state.covered = true;
            }
        }
        for block in &map.blocks {
            let Some((first, last)) = block.body_lines else { continue };
            if first <= line && line <= last {
                if let Some(state) = self.blocks.get_mut(&block.id).filter(|s| s.executed) {
                    state.covered = true;
                }
            }
        }
    }

    /// Whether any executable line in `first..=last` executed; returns the
    /// count of the first one found.
    fn range_hit(&self, first: u32, last: u32, cfk: bool) -> Option<u64> {
        self.line_counts
            .range(first..=last)
            .find(|&(&line, &count)| count > 0 && self.is_line_executable(line, cfk))
            .map(|(_, &count)| count)
    }
}

/// Central table of per-file coverage state.
#[derive(Debug)]
pub struct CoverageStore {
    files: HashMap<String, FileCoverageState>,
    normalizer: PathNormalizer,
    control_flow_keywords_executable: bool,
    source_size_limit: u64,
}

impl Default for CoverageStore {
    fn default() -> Self {
        Self {
            files: HashMap::new(),
            normalizer: PathNormalizer::default(),
            control_flow_keywords_executable: false,
            source_size_limit: DEFAULT_SOURCE_SIZE_LIMIT,
        }
    }
}

fn check_path(operation: &'static str, path: &str) -> Result<(), CoverageError> {
    if path.trim().is_empty() {
        return Err(CoverageError::validation(operation, "path must be a non-empty string"));
    }
    Ok(())
}

fn check_line(operation: &'static str, line: u32) -> Result<(), CoverageError> {
    if line == 0 {
        return Err(CoverageError::validation(operation, "line numbers start at 1"));
    }
    Ok(())
}

impl CoverageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_normalizer(normalizer: PathNormalizer) -> Self {
        Self { normalizer, ..Self::default() }
    }

    pub fn set_control_flow_keywords_executable(&mut self, enabled: bool) {
        self.control_flow_keywords_executable = enabled;
    }

    /// Largest file the text-only tier will read.
    pub fn set_source_size_limit(&mut self, limit: u64) {
        self.source_size_limit = limit;
    }

    pub fn control_flow_keywords_executable(&self) -> bool {
        self.control_flow_keywords_executable
    }

    pub fn normalizer(&self) -> &PathNormalizer {
        &self.normalizer
    }

    pub fn normalize(&self, path: &str) -> String {
        self.normalizer.normalize(path)
    }

    fn entry(&mut self, path: &str) -> &mut FileCoverageState {
        let key = self.normalizer.normalize(path);
        self.files.entry(key).or_insert_with_key(|key| {
            trace!(path = %key, "tracking new file");
            FileCoverageState::new(key.clone(), None)
        })
    }

    /// Attach a code map to `path`. A file that already has one is left untouched.
    pub fn initialize_file(&mut self, path: &str, code_map: Arc<CodeMap>) -> Result<(), CoverageError> {
        check_path("initialize_file", path)?;
        let state = self.entry(path);
        if state.code_map.is_none() {
            state.code_map = Some(code_map);
            state.discovered = true;
        }
        Ok(())
    }

    /// Record a file whose analysis failed so reports can list it as unanalyzed.
    pub fn record_analysis_failure(&mut self, path: &str, error: &CoverageError) -> Result<(), CoverageError> {
        check_path("record_analysis_failure", path)?;
        let state = self.entry(path);
        state.discovered = true;
        state.analysis_error = Some(error.to_string());
        Ok(())
    }

    /// Include `path` in reports.
    pub fn activate_file(&mut self, path: &str) -> Result<(), CoverageError> {
        check_path("activate_file", path)?;
        let state = self.entry(path);
        state.discovered = true;
        state.active = true;
        Ok(())
    }

    pub fn track_line(&mut self, path: &str, line: u32, options: TrackOptions) -> Result<(), CoverageError> {
        check_path("track_line", path)?;
        check_line("track_line", line)?;
        let limit = self.source_size_limit;
        let state = self.entry(path);
        state.scan_text_once(limit);
        state.hit_line(line);
        if let Some(explicit) = options.is_executable {
            state.executable_overrides.insert(line, explicit);
        }
        if options.is_covered {
            state.line_covered.insert(line);
            state.cover_enclosing(line);
        }
        Ok(())
    }

    /// Promote a line to covered, counting it as executed if it was not.
    pub fn mark_line_covered(&mut self, path: &str, line: u32) -> Result<(), CoverageError> {
        check_path("mark_line_covered", path)?;
        check_line("mark_line_covered", line)?;
        let limit = self.source_size_limit;
        let state = self.entry(path);
        state.scan_text_once(limit);
        if !state.was_line_executed(line) {
            state.hit_line(line);
        }
        state.line_covered.insert(line);
        state.cover_enclosing(line);
        Ok(())
    }

    pub fn track_function(&mut self, path: &str, id: usize, covered: bool) -> Result<(), CoverageError> {
        check_path("track_function", path)?;
        let state = self.entry(path);
        check_id("track_function", id, state.code_map.as_ref().map(|m| m.functions.len()))?;
        state.functions.entry(id).or_default().hit(covered);
        Ok(())
    }

    pub fn track_block(&mut self, path: &str, id: usize, covered: bool) -> Result<(), CoverageError> {
        check_path("track_block", path)?;
        let state = self.entry(path);
        check_id("track_block", id, state.code_map.as_ref().map(|m| m.blocks.len()))?;
        state.blocks.entry(id).or_default().hit(covered);
        Ok(())
    }

    pub fn track_condition(&mut self, path: &str, id: usize, outcome: bool) -> Result<(), CoverageError> {
        check_path("track_condition", path)?;
        let state = self.entry(path);
        check_id("track_condition", id, state.code_map.as_ref().map(|m| m.conditions.len()))?;
        let cond = state.conditions.entry(id).or_default();
        cond.executed = true;
        cond.execution_count += 1;
        if outcome {
            cond.executed_true = true;
        } else {
            cond.executed_false = true;
        }
        Ok(())
    }

    pub fn was_line_executed(&self, path: &str, line: u32) -> bool {
        self.file(path).is_some_and(|f| f.was_line_executed(line))
    }

    pub fn was_line_covered(&self, path: &str, line: u32) -> bool {
        self.file(path).is_some_and(|f| f.was_line_covered(line))
    }

    pub fn file(&self, path: &str) -> Option<&FileCoverageState> {
        self.files.get(&self.normalizer.normalize(path))
    }

    /// Lookup by an already normalized key.
    pub fn has_file(&self, key: &str) -> bool {
        self.files.contains_key(key)
    }

    pub fn files(&self) -> impl Iterator<Item = &FileCoverageState> {
        self.files.values()
    }

    pub fn get_active_files(&self) -> BTreeSet<String> {
        self.files.values().filter(|f| f.active).map(|f| f.path.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn reset(&mut self) {
        self.files.clear();
    }

    /// Fill in state the observer could not see directly.
    ///
    /// With `derive_structure`, block and function execution is inferred from
    /// executed body lines (debug-hook mode has no entry events). Structural
    /// lines are promoted to executed when keyword lines count as executable
    /// and the block around them ran. Finally, covered lines propagate to the
    /// functions and blocks enclosing them.
    pub fn finalize(&mut self, derive_structure: bool) {
        let cfk = self.control_flow_keywords_executable;
        for state in self.files.values_mut() {
            let Some(map) = state.code_map.clone() else { continue };
            if derive_structure {
                for block in &map.blocks {
                    if state.block(block.id).executed {
                        continue;
                    }
                    let hit = match (block.kind, block.body_lines) {
                        (BlockKind::If, _) => {
                            let count = state.line_execution_count(block.start_line);
                            (count > 0).then_some(count)
                        }
                        (_, Some((first, last))) => state.range_hit(first, last, cfk),
                        (_, None) => None,
                    };
                    if let Some(count) = hit {
                        let entry = state.blocks.entry(block.id).or_default();
                        entry.executed = true;
                        entry.execution_count = count;
                    }
                }
                for func in &map.functions {
                    if state.function(func.id).executed {
                        continue;
                    }
                    if let Some(count) = func.body_lines.and_then(|(first, last)| state.range_hit(first, last, cfk)) {
                        let entry = state.functions.entry(func.id).or_default();
                        entry.executed = true;
                        entry.execution_count = count;
                    }
                }
            }

            if cfk {
                let structural: Vec<u32> = map
                    .lines
                    .iter()
                    .filter(|l| l.kind == LineKind::Structural && !state.was_line_executed(l.line))
                    .map(|l| l.line)
                    .collect();
                for line in structural {
                    let owner = map
                        .blocks
                        .iter()
                        .filter(|b| !b.kind.is_branch() && b.start_line <= line && line <= b.end_line)
                        .min_by_key(|b| (b.end_line - b.start_line, std::cmp::Reverse(b.id)));
                    let ran = match owner {
                        Some(block) => state.block(block.id).executed,
                        None => match map.innermost_function_at(line) {
                            Some(func) => state.function(func.id).executed,
                            None => state.line_counts.values().any(|&c| c > 0),
                        },
                    };
                    if ran {
                        state.hit_line(line);
                    }
                }
            }

            let covered: Vec<u32> = state.line_covered.iter().copied().collect();
            for line in covered {
                state.cover_enclosing(line);
            }
        }
    }
}

fn check_id(operation: &'static str, id: usize, known: Option<usize>) -> Result<(), CoverageError> {
    if id == 0 {
        return Err(CoverageError::validation(operation, "ids start at 1"));
    }
    if let Some(known) = known {
        if id > known {
            return Err(CoverageError::validation(operation, format!("id {id} is not in the code map ({known} known)")));
        }
    }
    Ok(())
}
