//! Handles shared by the observers of one coverage session.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::analyzer::{AnalyzeOptions, CodeMap, CodeMapCache};
use crate::config::PathFilter;
use crate::diagnostics::CoverageError;
use crate::path::PathNormalizer;
use crate::store::CoverageStore;

/// Cheap to clone; every clone points at the same store and cache.
///
/// The store is reached with `try_borrow_mut`: an event that arrives while
/// the store is already borrowed further up the stack is dropped instead of
/// panicking.
#[derive(Debug, Clone)]
pub struct CoverageContext {
    pub store: Rc<RefCell<CoverageStore>>,
    pub cache: Rc<RefCell<CodeMapCache>>,
    pub filter: Rc<PathFilter>,
    pub normalizer: PathNormalizer,
    pub analyze: AnalyzeOptions,
}

impl CoverageContext {
    pub fn new(store: CoverageStore, filter: PathFilter, analyze: AnalyzeOptions) -> Self {
        let normalizer = store.normalizer().clone();
        Self {
            store: Rc::new(RefCell::new(store)),
            cache: Rc::new(RefCell::new(CodeMapCache::new())),
            filter: Rc::new(filter),
            normalizer,
            analyze,
        }
    }

    pub fn normalize(&self, path: &str) -> String {
        self.normalizer.normalize(path)
    }

    /// Whether a normalized path is tracked at all.
    pub fn wants(&self, key: &str) -> bool {
        !self.filter.is_engine_file(key) && self.filter.should_track(key)
    }

    /// Analyze the file at `key` (a normalized path) and make it active.
    ///
    /// A failure is recorded on the store so the file is reported as
    /// unanalyzed, then returned.
    pub fn discover(&self, key: &str) -> Result<Arc<CodeMap>, CoverageError> {
        let loaded = match self.cache.try_borrow_mut() {
            Ok(mut cache) => cache.load(key, Path::new(key), &self.analyze),
            Err(_) => Err(CoverageError::runtime("discover", "code map cache is busy")),
        };
        match loaded {
            Ok(map) => {
                self.register(key, Arc::clone(&map))?;
                Ok(map)
            }
            Err(err) => {
                self.log_failure(key, &err);
                if let Ok(mut store) = self.store.try_borrow_mut() {
                    store.record_analysis_failure(key, &err)?;
                    store.activate_file(key)?;
                }
                Err(err)
            }
        }
    }

    /// Attach an already built code map and make the file active.
    pub fn register(&self, key: &str, map: Arc<CodeMap>) -> Result<(), CoverageError> {
        let mut store = self
            .store
            .try_borrow_mut()
            .map_err(|_| CoverageError::runtime("register", "coverage store is busy"))?;
        store.initialize_file(key, map)?;
        store.activate_file(key)
    }

    /// After a reset the store forgets files that are still running. Put a
    /// known file back before recording into it, from the cache when it still
    /// holds the map and from disk when a full reset emptied it.
    pub fn reattach(&self, store: &mut CoverageStore, key: &str) {
        if store.has_file(key) {
            return;
        }
        let map = match self.cache.try_borrow_mut() {
            Ok(mut cache) => match cache.get(key) {
                Some(map) => Ok(map),
                None => cache.load(key, Path::new(key), &self.analyze),
            },
            Err(_) => return,
        };
        match map.and_then(|map| store.initialize_file(key, map)).and_then(|()| store.activate_file(key)) {
            Ok(()) => trace!(path = key, "file reattached after reset"),
            Err(err) => trace!(path = key, error = %err, "file not reattached"),
        }
    }

    /// Per-file failures are expected in test runs; keep them out of warn output there.
    pub fn log_failure(&self, key: &str, err: &CoverageError) {
        if self.analyze.test_mode {
            debug!(path = key, error = %err, "file excluded from tracking");
        } else {
            warn!(path = key, error = %err, "file excluded from tracking");
        }
    }
}
