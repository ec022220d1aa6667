#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::LazyLock;

use lunacov::diagnostics::CoverageError;
use lunacov::host::{chunk_file, LineHook, ModuleHost, TraceHost};
use lunacov::instrument::runtime::TrackingRuntime;
use lunacov::interceptor::ModuleInterceptor;
use lunacov::CoverageConfig;
use regex::Regex;

static REQUIRE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"require\s*\(?\s*"([\w.]+)"\s*\)?"#).unwrap());
static TRACK_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__lc_(l|fn|b|c|h)\(__lc_file, (\d+|nil)(?:, (\d+|nil))?").unwrap());

/// A scripted stand-in for a Lua VM.
///
/// Line events are fired by hand. Loading rewritten source "runs" it by
/// replaying every tracking call in text order (conditions report `true`)
/// and resolving the `require("...")` calls it contains through the
/// installed interceptor, so nested and cyclic loads behave like the real
/// thing.
#[derive(Default)]
pub struct FakeHost {
    hook: RefCell<Option<LineHook>>,
    interceptor: RefCell<Option<Rc<ModuleInterceptor>>>,
    runtime: RefCell<Option<TrackingRuntime>>,
    require_hooked: Cell<bool>,
    pub hook_installs: Cell<u32>,
    pub hook_removals: Cell<u32>,
    pub require_restores: Cell<u32>,
    /// `original:<name>` or `instrumented:<name>`, in load order.
    pub loads: RefCell<Vec<String>>,
    /// Source handed to `load_source`, by module name.
    pub sources: RefCell<Vec<(String, String)>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind what a real host would capture when wiring `require` and the
    /// runtime module.
    pub fn bind(&self, interceptor: Rc<ModuleInterceptor>, runtime: TrackingRuntime) {
        *self.interceptor.borrow_mut() = Some(interceptor);
        *self.runtime.borrow_mut() = Some(runtime);
    }

    pub fn has_line_hook(&self) -> bool {
        self.hook.borrow().is_some()
    }

    pub fn is_require_hooked(&self) -> bool {
        self.require_hooked.get()
    }

    /// Deliver one line event, as the VM's debug hook would.
    pub fn fire(&self, source: &str, line: u32) {
        if let Some(hook) = self.hook.borrow_mut().as_mut() {
            hook(source, line);
        }
    }

    /// Fire `@path` line events for each line in order.
    pub fn run_lines(&self, path: &Path, lines: &[u32]) {
        let source = format!("@{}", path.display());
        for &line in lines {
            self.fire(&source, line);
        }
    }

    /// The global `require`.
    pub fn require(&self, name: &str) -> Result<String, CoverageError> {
        let interceptor = self.interceptor.borrow().clone();
        match interceptor {
            Some(interceptor) if self.require_hooked.get() => interceptor.load(self, name),
            _ => self.load_original(name),
        }
    }

    pub fn loads(&self) -> Vec<String> {
        self.loads.borrow().clone()
    }

    pub fn source_of(&self, name: &str) -> Option<String> {
        self.sources.borrow().iter().find(|(n, _)| n == name).map(|(_, s)| s.clone())
    }

    fn execute(&self, chunk_name: &str, source: &str) -> Result<(), CoverageError> {
        let file = chunk_file(chunk_name).unwrap_or(chunk_name).to_string();
        let runtime = self.runtime.borrow().clone();
        let mut events: Vec<(usize, Event)> = Vec::new();
        for caps in TRACK_CALL.captures_iter(source) {
            let at = caps.get(0).map(|m| m.start()).unwrap_or(0);
            let first = caps[2].parse::<u64>().ok();
            let second = caps.get(3).and_then(|m| m.as_str().parse::<u64>().ok());
            events.push((at, Event::Track(caps[1].to_string(), first, second)));
        }
        for caps in REQUIRE.captures_iter(source) {
            let at = caps.get(0).map(|m| m.start()).unwrap_or(0);
            events.push((at, Event::Require(caps[1].to_string())));
        }
        events.sort_by_key(|(at, _)| *at);

        for (_, event) in events {
            match event {
                Event::Track(kind, first, second) => {
                    let Some(rt) = &runtime else { continue };
                    match (kind.as_str(), first) {
                        ("l", Some(line)) => rt.line(&file, line as u32),
                        ("fn", Some(id)) => rt.func(&file, id as usize),
                        ("b", Some(id)) => rt.block(&file, id as usize),
                        ("c", Some(id)) => {
                            rt.cond(&file, id as usize, true);
                        }
                        ("h", line) => rt.header(&file, line.map(|l| l as u32), second.map(|b| b as usize)),
                        _ => {}
                    }
                }
                Event::Require(name) => {
                    if name != CoverageConfig::default().runtime_module {
                        self.require(&name)?;
                    }
                }
            }
        }
        Ok(())
    }
}

enum Event {
    Track(String, Option<u64>, Option<u64>),
    Require(String),
}

impl TraceHost for FakeHost {
    fn install_line_hook(&self, hook: LineHook) -> Result<(), CoverageError> {
        self.hook_installs.set(self.hook_installs.get() + 1);
        *self.hook.borrow_mut() = Some(hook);
        Ok(())
    }

    fn remove_line_hook(&self) -> Result<(), CoverageError> {
        self.hook_removals.set(self.hook_removals.get() + 1);
        self.hook.borrow_mut().take();
        Ok(())
    }
}

impl ModuleHost for FakeHost {
    type Module = String;

    fn load_original(&self, name: &str) -> Result<String, CoverageError> {
        self.loads.borrow_mut().push(format!("original:{name}"));
        Ok(format!("original:{name}"))
    }

    fn load_source(&self, name: &str, chunk_name: &str, source: &str) -> Result<String, CoverageError> {
        self.loads.borrow_mut().push(format!("instrumented:{name}"));
        self.sources.borrow_mut().push((name.to_string(), source.to_string()));
        self.execute(chunk_name, source)?;
        Ok(format!("instrumented:{name}"))
    }

    fn install_require_hook(&self) -> Result<(), CoverageError> {
        self.require_hooked.set(true);
        Ok(())
    }

    fn restore_require(&self) -> Result<(), CoverageError> {
        self.require_restores.set(self.require_restores.get() + 1);
        self.require_hooked.set(false);
        Ok(())
    }
}

/// A temporary project directory with Lua files written into it.
pub struct Project {
    pub dir: tempfile::TempDir,
}

impl Project {
    pub fn new(files: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, content).unwrap();
        }
        Self { dir }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Normalized key for `name`, as the store records it.
    pub fn key(&self, name: &str) -> String {
        self.path(name).to_string_lossy().replace('\\', "/")
    }

    pub fn root(&self) -> String {
        self.dir.path().to_string_lossy().to_string()
    }

    /// Config for a session over this project: vendor exclusion off so temp
    /// paths are never mistaken for install trees, and the module path
    /// pointed at the project root.
    pub fn config(&self) -> CoverageConfig {
        let root = self.root();
        CoverageConfig {
            exclude_vendor: false,
            module_path: format!("{root}/?.lua;{root}/?/init.lua"),
            test_mode: true,
            ..CoverageConfig::default()
        }
    }
}
