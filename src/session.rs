//! The coverage session: one per observed program.
//!
//! `start` installs either the line hook or the require interceptor on the
//! host, `stop` removes it again and finalizes the collected data. Queries
//! and report assembly work whether or not the session is running.

use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::analyzer::{AnalyzeOptions, CodeMap};
use crate::config::{CoverageConfig, Mode};
use crate::context::CoverageContext;
use crate::diagnostics::CoverageError;
use crate::host::RuntimeHost;
use crate::instrument::runtime::TrackingRuntime;
use crate::instrument::InstrumentOptions;
use crate::interceptor::ModuleInterceptor;
use crate::path::PathNormalizer;
use crate::report::{self, ReportData};
use crate::store::CoverageStore;
use crate::tracker::DebugHookTracker;
use crate::validation::{self, ValidationReport};

#[derive(Debug)]
pub struct CoverageSession {
    config: CoverageConfig,
    ctx: CoverageContext,
    tracker: DebugHookTracker,
    interceptor: Rc<ModuleInterceptor>,
    runtime: TrackingRuntime,
    active: bool,
}

impl CoverageSession {
    /// Build a session resolving relative paths against the process's
    /// working directory.
    pub fn new(config: CoverageConfig) -> Result<Self, CoverageError> {
        Self::with_normalizer(config, PathNormalizer::new())
    }

    /// Build a session resolving relative paths against `cwd`.
    pub fn with_cwd(config: CoverageConfig, cwd: &str) -> Result<Self, CoverageError> {
        Self::with_normalizer(config, PathNormalizer::with_cwd(cwd))
    }

    fn with_normalizer(config: CoverageConfig, normalizer: PathNormalizer) -> Result<Self, CoverageError> {
        if config.max_require_depth == 0 {
            return Err(CoverageError::validation("init", "max_require_depth must be at least 1"));
        }
        if config.max_file_size == 0 {
            return Err(CoverageError::validation("init", "max_file_size must be positive"));
        }
        let filter = config.path_filter()?;
        let mut store = CoverageStore::with_normalizer(normalizer);
        store.set_control_flow_keywords_executable(config.control_flow_keywords_executable);
        store.set_source_size_limit(config.max_file_size);
        let ctx = CoverageContext::new(store, filter, AnalyzeOptions::from(&config));
        let interceptor = Rc::new(ModuleInterceptor::new(
            ctx.clone(),
            InstrumentOptions::from(&config),
            &config.module_path,
            config.max_require_depth,
        ));
        Ok(Self {
            tracker: DebugHookTracker::new(ctx.clone()),
            runtime: TrackingRuntime::new(ctx.clone()),
            interceptor,
            ctx,
            config,
            active: false,
        })
    }

    pub fn config(&self) -> &CoverageConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        self.config.mode()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn context(&self) -> &CoverageContext {
        &self.ctx
    }

    /// What the host binds as the runtime module in instrumentation mode.
    pub fn runtime(&self) -> &TrackingRuntime {
        &self.runtime
    }

    /// What the host's replacement `require` calls into. Shared, so the host
    /// can keep it inside the function it installs.
    pub fn interceptor(&self) -> Rc<ModuleInterceptor> {
        Rc::clone(&self.interceptor)
    }

    /// Install the observer for the configured mode. A disabled session or
    /// one that is already running is left as is.
    pub fn start<H: RuntimeHost + ?Sized>(&mut self, host: &H) -> Result<(), CoverageError> {
        if !self.config.enabled {
            debug!("coverage disabled, not starting");
            return Ok(());
        }
        if self.active {
            return Ok(());
        }
        match self.mode() {
            Mode::DebugHook => self.tracker.start(host)?,
            Mode::Instrumentation => self.interceptor.hook(host)?,
        }
        self.active = true;
        info!(mode = ?self.mode(), "coverage started");
        Ok(())
    }

    /// Remove whatever `start` installed and finalize the data. Never fails;
    /// calling it on a session that never started touches nothing.
    pub fn stop<H: RuntimeHost + ?Sized>(&mut self, host: &H) {
        if !self.active {
            return;
        }
        self.tracker.stop(host);
        if let Err(err) = self.interceptor.unhook(host) {
            warn!(error = %err, "restoring the original require failed");
        }
        self.active = false;

        let derive_structure = self.mode() == Mode::DebugHook;
        match self.ctx.store.try_borrow_mut() {
            Ok(mut store) => store.finalize(derive_structure),
            Err(_) => warn!("coverage store busy during stop; data left unfinalized"),
        }
        info!("coverage stopped");
    }

    /// Drop all collected coverage. Code maps and rewritten modules are kept.
    pub fn reset(&mut self) {
        match self.ctx.store.try_borrow_mut() {
            Ok(mut store) => store.reset(),
            Err(_) => warn!("coverage store busy; reset skipped"),
        }
    }

    /// `reset` plus the code map cache and the interceptor's record of
    /// rewritten modules.
    pub fn full_reset(&mut self) {
        self.reset();
        match self.ctx.cache.try_borrow_mut() {
            Ok(mut cache) => cache.clear(),
            Err(_) => warn!("code map cache busy; not cleared"),
        }
        self.interceptor.clear();
    }

    /// Explicitly include `path` in reports, analyzing it now.
    ///
    /// Include and exclude patterns do not apply to an explicit request, but
    /// the engine's own files are always refused.
    pub fn track_file(&self, path: &str) -> Result<(), CoverageError> {
        if path.trim().is_empty() {
            return Err(CoverageError::validation("track_file", "path must be a non-empty string"));
        }
        let key = self.ctx.normalize(path);
        if self.ctx.filter.is_engine_file(&key) {
            return Err(CoverageError::validation("track_file", format!("{key} belongs to the coverage engine")));
        }
        self.ctx.discover(&key).map(|_| ())
    }

    pub fn was_line_executed(&self, path: &str, line: u32) -> bool {
        self.ctx.store.try_borrow().is_ok_and(|store| store.was_line_executed(path, line))
    }

    pub fn was_line_covered(&self, path: &str, line: u32) -> bool {
        self.ctx.store.try_borrow().is_ok_and(|store| store.was_line_covered(path, line))
    }

    /// What an assertion library calls to promote its line to covered.
    pub fn mark_line_covered(&self, path: &str, line: u32) -> Result<(), CoverageError> {
        let mut store = self
            .ctx
            .store
            .try_borrow_mut()
            .map_err(|_| CoverageError::runtime("mark_line_covered", "coverage store is busy"))?;
        store.mark_line_covered(path, line)
    }

    pub fn get_report_data(&self) -> Result<ReportData, CoverageError> {
        let store = self
            .ctx
            .store
            .try_borrow()
            .map_err(|_| CoverageError::runtime("get_report_data", "coverage store is busy"))?;
        Ok(report::assemble(&store))
    }

    /// Code maps of every file the store knows, keyed by normalized path.
    pub fn code_maps(&self) -> BTreeMap<String, Arc<CodeMap>> {
        let Ok(store) = self.ctx.store.try_borrow() else { return BTreeMap::new() };
        store
            .files()
            .filter_map(|f| f.code_map.as_ref().map(|m| (f.path.clone(), Arc::clone(m))))
            .collect()
    }

    /// Assemble the report and run every validation check on it.
    pub fn validate(&self) -> Result<ValidationReport, CoverageError> {
        let report = self.get_report_data()?;
        Ok(validation::validate_report(&report, &self.code_maps()))
    }
}
