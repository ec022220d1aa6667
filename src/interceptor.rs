//! `require` interception for instrumentation mode.
//!
//! Each module is resolved, rewritten and loaded at most once per path. Names
//! already being loaded further up the stack, excluded names and anything
//! past the depth bound go straight to the host's original loader.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::context::CoverageContext;
use crate::diagnostics::CoverageError;
use crate::host::{chunk_name_for, ModuleHost};
use crate::instrument::{instrument_file, InstrumentOptions};

#[derive(Debug, Default)]
struct InterceptorState {
    hooked: bool,
    depth: usize,
    peak_depth: usize,
    currently_loading: HashSet<String>,
    /// Normalized path to rewritten source.
    already_instrumented: HashMap<String, Arc<str>>,
    /// Names seen to be excluded, so the filter runs once per name.
    excluded: HashSet<String>,
}

#[derive(Debug)]
pub struct ModuleInterceptor {
    ctx: CoverageContext,
    options: InstrumentOptions,
    module_path: String,
    max_depth: usize,
    state: RefCell<InterceptorState>,
}

/// Removes `name` from the loading set and unwinds the depth on every exit path.
struct LoadingGuard<'a> {
    state: &'a RefCell<InterceptorState>,
    name: String,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.currently_loading.remove(&self.name);
        state.depth = state.depth.saturating_sub(1);
    }
}

impl ModuleInterceptor {
    pub fn new(ctx: CoverageContext, options: InstrumentOptions, module_path: &str, max_depth: usize) -> Self {
        Self {
            ctx,
            options,
            module_path: module_path.to_string(),
            max_depth,
            state: RefCell::new(InterceptorState::default()),
        }
    }

    pub fn is_hooked(&self) -> bool {
        self.state.borrow().hooked
    }

    /// Deepest nesting of intercepted loads seen so far.
    pub fn peak_depth(&self) -> usize {
        self.state.borrow().peak_depth
    }

    pub fn is_instrumented(&self, path: &str) -> bool {
        self.state.borrow().already_instrumented.contains_key(&self.ctx.normalize(path))
    }

    pub fn instrumented_count(&self) -> usize {
        self.state.borrow().already_instrumented.len()
    }

    pub fn hook<H: ModuleHost + ?Sized>(&self, host: &H) -> Result<(), CoverageError> {
        if self.is_hooked() {
            return Ok(());
        }
        host.install_require_hook()?;
        self.state.borrow_mut().hooked = true;
        debug!("require hook installed");
        Ok(())
    }

    /// Restore the original `require`. A no-op when never hooked.
    pub fn unhook<H: ModuleHost + ?Sized>(&self, host: &H) -> Result<(), CoverageError> {
        if !self.is_hooked() {
            return Ok(());
        }
        let restored = host.restore_require();
        let mut state = self.state.borrow_mut();
        state.hooked = false;
        state.currently_loading.clear();
        state.depth = 0;
        drop(state);
        debug!("require hook removed");
        restored
    }

    /// Forget which files were rewritten, so the next load rewrites them again.
    pub fn clear(&self) {
        let mut state = self.state.borrow_mut();
        state.already_instrumented.clear();
        state.excluded.clear();
    }

    /// Entry point for the host's replacement `require`.
    pub fn load<H: ModuleHost + ?Sized>(&self, host: &H, name: &str) -> Result<H::Module, CoverageError> {
        if name.is_empty() {
            return Err(CoverageError::validation("require", "module name must not be empty"));
        }
        if self.is_excluded(name) {
            trace!(module = name, "excluded module");
            return host.load_original(name);
        }
        {
            let state = self.state.borrow();
            if state.depth >= self.max_depth {
                debug!(module = name, depth = state.depth, "require depth limit reached");
                drop(state);
                return host.load_original(name);
            }
            if state.currently_loading.contains(name) {
                trace!(module = name, "require cycle, using original loader");
                drop(state);
                return host.load_original(name);
            }
        }

        let _guard = {
            let mut state = self.state.borrow_mut();
            state.currently_loading.insert(name.to_string());
            state.depth += 1;
            state.peak_depth = state.peak_depth.max(state.depth);
            LoadingGuard { state: &self.state, name: name.to_string() }
        };

        let Some(file) = self.resolve(name) else {
            trace!(module = name, "not found on module path");
            return host.load_original(name);
        };
        let key = self.ctx.normalize(&file.to_string_lossy());
        if !self.ctx.wants(&key) {
            self.state.borrow_mut().excluded.insert(name.to_string());
            return host.load_original(name);
        }

        let cached = self.state.borrow().already_instrumented.get(&key).cloned();
        let source = match cached {
            Some(source) => source,
            None => match self.prepare(&file, &key) {
                Ok(source) => source,
                Err(err) => {
                    self.ctx.log_failure(&key, &err);
                    if let Ok(mut store) = self.ctx.store.try_borrow_mut() {
                        if let Err(record_err) = store.record_analysis_failure(&key, &err) {
                            warn!(path = %key, error = %record_err, "could not record analysis failure");
                        } else if let Err(activate_err) = store.activate_file(&key) {
                            warn!(path = %key, error = %activate_err, "could not activate file");
                        }
                    }
                    return host.load_original(name);
                }
            },
        };

        host.load_source(name, &chunk_name_for(&key), &source)
    }

    /// Instrument `file`, register its code map and cache the rewrite.
    fn prepare(&self, file: &Path, key: &str) -> Result<Arc<str>, CoverageError> {
        let instrumented = instrument_file(file, key, &self.options)?;
        let map = Arc::new(instrumented.code_map);
        if let Ok(mut cache) = self.ctx.cache.try_borrow_mut() {
            cache.insert(key, Arc::clone(&map));
        }
        self.ctx.register(key, map)?;
        let source: Arc<str> = Arc::from(instrumented.source);
        self.state.borrow_mut().already_instrumented.insert(key.to_string(), Arc::clone(&source));
        debug!(module = key, "module instrumented");
        Ok(source)
    }

    fn is_excluded(&self, name: &str) -> bool {
        if self.state.borrow().excluded.contains(name) {
            return true;
        }
        if self.ctx.filter.is_excluded_module(name) {
            self.state.borrow_mut().excluded.insert(name.to_string());
            return true;
        }
        false
    }

    /// Search the module path templates with plain existence checks.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        resolve_module(&self.module_path, name)
    }
}

/// Find `name` on a `package.path`-style template list (`;`-separated, `?`
/// replaced by the name with dots turned into slashes).
pub fn resolve_module(module_path: &str, name: &str) -> Option<PathBuf> {
    let relative = name.replace('.', "/");
    module_path
        .split(';')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|template| PathBuf::from(template.replace('?', &relative)))
        .find(|candidate| candidate.is_file())
}
