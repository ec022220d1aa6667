use std::path::Path;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::diagnostics::CoverageError;

/// Paths the engine never tracks: its own Lua-side files.
const ENGINE_PATTERNS: &[&str] = &["*/lunacov/*", "*/lunacov.lua", "lunacov/*"];

/// Third-party install trees, skipped when `exclude_vendor` is set.
const VENDOR_PATTERNS: &[&str] = &["*/vendor/*", "*/lua_modules/*", "*/.luarocks/*", "*/third_party/*"];

static VENDOR_GLOBS: LazyLock<Vec<glob::Pattern>> = LazyLock::new(|| {
    VENDOR_PATTERNS.iter().filter_map(|p| glob::Pattern::new(p).ok()).collect()
});

/// Whether a normalized path lies in a third-party install tree.
pub fn is_vendor_path(path: &str) -> bool {
    VENDOR_GLOBS.iter().any(|p| p.matches(path))
}

/// Coverage engine configuration. Missing keys take their defaults and
/// unknown keys are ignored, so a partial table is always accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageConfig {
    pub enabled: bool,
    /// Rewrite sources instead of sampling line events.
    pub use_instrumentation: bool,
    pub track_blocks: bool,
    pub track_conditions: bool,
    pub track_functions: bool,
    /// Empty means "everything not excluded".
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    /// Test framework modules and paths that must never be instrumented.
    pub framework_patterns: Vec<String>,
    pub exclude_vendor: bool,
    pub max_file_size: u64,
    /// Count `end`/`else`/`do`/`repeat`-only lines as executable.
    pub control_flow_keywords_executable: bool,
    pub max_require_depth: usize,
    /// `package.path`-style search templates for the require interceptor.
    pub module_path: String,
    /// Bind tracking functions once per module instead of per call.
    pub static_imports: bool,
    pub runtime_module: String,
    pub max_parse_depth: usize,
    /// Set by the test runner. Downgrades expected per-file failures to debug logs.
    pub test_mode: bool,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            use_instrumentation: false,
            track_blocks: true,
            track_conditions: true,
            track_functions: true,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            framework_patterns: Vec::new(),
            exclude_vendor: true,
            max_file_size: 1_048_576,
            control_flow_keywords_executable: false,
            max_require_depth: 32,
            module_path: "./?.lua;./?/init.lua".to_string(),
            static_imports: true,
            runtime_module: "lunacov.runtime".to_string(),
            max_parse_depth: crate::parser::DEFAULT_MAX_DEPTH,
            test_mode: false,
        }
    }
}

/// How the session observes execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    DebugHook,
    Instrumentation,
}

impl CoverageConfig {
    /// Parse TOML, either a bare table or one nested under `[coverage]`.
    pub fn from_toml_str(content: &str) -> Result<Self, CoverageError> {
        let table: toml::Table = toml::from_str(content)
            .map_err(|e| CoverageError::validation("load_config", e.to_string()))?;
        let value = match table.get("coverage") {
            Some(toml::Value::Table(section)) => toml::Value::Table(section.clone()),
            _ => toml::Value::Table(table),
        };
        value
            .try_into()
            .map_err(|e: toml::de::Error| CoverageError::validation("load_config", e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, CoverageError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoverageError::io(path.display().to_string(), e))?;
        Self::from_toml_str(&content)
    }

    pub fn mode(&self) -> Mode {
        if self.use_instrumentation { Mode::Instrumentation } else { Mode::DebugHook }
    }

    /// Compile the include/exclude/framework patterns. Invalid globs are a
    /// validation error naming the offending pattern.
    pub fn path_filter(&self) -> Result<PathFilter, CoverageError> {
        let engine = compile(ENGINE_PATTERNS.iter().copied())?;
        let mut exclude = engine.clone();
        if self.exclude_vendor {
            exclude.extend(compile(VENDOR_PATTERNS.iter().copied())?);
        }
        exclude.extend(compile(self.exclude_patterns.iter().map(String::as_str))?);

        let engine_root = self
            .runtime_module
            .split('.')
            .next()
            .unwrap_or_default()
            .to_string();

        Ok(PathFilter {
            include: compile(self.include_patterns.iter().map(String::as_str))?,
            exclude,
            framework: compile(self.framework_patterns.iter().map(String::as_str))?,
            engine,
            engine_root,
            runtime_module: self.runtime_module.clone(),
        })
    }
}

fn compile<'a>(patterns: impl Iterator<Item = &'a str>) -> Result<Vec<glob::Pattern>, CoverageError> {
    patterns
        .map(|p| {
            glob::Pattern::new(p)
                .map_err(|e| CoverageError::validation("compile_pattern", format!("invalid pattern '{p}': {e}")))
        })
        .collect()
}

/// Compiled inclusion rules shared by the tracker and the interceptor.
#[derive(Debug, Clone)]
pub struct PathFilter {
    include: Vec<glob::Pattern>,
    exclude: Vec<glob::Pattern>,
    framework: Vec<glob::Pattern>,
    engine: Vec<glob::Pattern>,
    engine_root: String,
    runtime_module: String,
}

impl PathFilter {
    /// Whether a normalized path belongs to the engine itself.
    pub fn is_engine_file(&self, path: &str) -> bool {
        self.engine.iter().any(|p| p.matches(path))
    }

    /// Whether a normalized file path should be tracked and reported.
    pub fn should_track(&self, path: &str) -> bool {
        if path.is_empty() || self.exclude.iter().chain(&self.framework).any(|p| p.matches(path)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|p| p.matches(path))
    }

    /// Whether a `require` name must bypass the interceptor entirely.
    pub fn is_excluded_module(&self, name: &str) -> bool {
        if name == self.runtime_module
            || name == self.engine_root
            || name.starts_with(&format!("{}.", self.engine_root))
        {
            return true;
        }
        self.framework.iter().chain(&self.exclude).any(|p| p.matches(name))
    }
}
