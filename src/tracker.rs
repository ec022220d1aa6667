//! Debug-hook observation: one callback per executed line.

use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, trace, warn};

use crate::context::CoverageContext;
use crate::diagnostics::CoverageError;
use crate::host::{chunk_file, TraceHost};
use crate::store::TrackOptions;

/// Installs and removes the line hook. Stopping an inactive tracker is a no-op.
#[derive(Debug)]
pub struct DebugHookTracker {
    ctx: CoverageContext,
    active: bool,
}

impl DebugHookTracker {
    pub fn new(ctx: CoverageContext) -> Self {
        Self { ctx, active: false }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn start<H: TraceHost + ?Sized>(&mut self, host: &H) -> Result<(), CoverageError> {
        if self.active {
            return Ok(());
        }
        let mut recorder = LineRecorder::new(self.ctx.clone());
        host.install_line_hook(Box::new(move |source, line| recorder.on_line(source, line)))?;
        self.active = true;
        debug!("line hook installed");
        Ok(())
    }

    /// Never fails: a host error while removing the hook is logged.
    pub fn stop<H: TraceHost + ?Sized>(&mut self, host: &H) {
        if !self.active {
            return;
        }
        if let Err(err) = host.remove_line_hook() {
            warn!(error = %err, "removing the line hook failed");
        }
        self.active = false;
        debug!("line hook removed");
    }
}

/// The state behind the installed hook.
///
/// Chunk sources are resolved once: the first event for a chunk normalizes
/// its path, applies the filters and analyzes the file; later events are a
/// single map lookup plus the store update.
pub struct LineRecorder {
    ctx: CoverageContext,
    chunks: HashMap<String, Option<Rc<str>>>,
}

impl LineRecorder {
    pub fn new(ctx: CoverageContext) -> Self {
        Self { ctx, chunks: HashMap::new() }
    }

    pub fn on_line(&mut self, source: &str, line: u32) {
        let key = match self.chunks.get(source) {
            Some(key) => key.clone(),
            None => {
                let key = self.resolve(source);
                self.chunks.insert(source.to_string(), key.clone());
                key
            }
        };
        let Some(key) = key else { return };
        let Ok(mut store) = self.ctx.store.try_borrow_mut() else {
            trace!(path = &*key, line, "store busy, line event dropped");
            return;
        };
        self.ctx.reattach(&mut store, &key);
        if let Err(err) = store.track_line(&key, line, TrackOptions::default()) {
            debug!(path = &*key, line, error = %err, "line event rejected");
        }
    }

    fn resolve(&self, source: &str) -> Option<Rc<str>> {
        let file = chunk_file(source)?;
        let key = self.ctx.normalize(file);
        if !self.ctx.wants(&key) {
            trace!(path = %key, "chunk not tracked");
            return None;
        }
        self.ctx.discover(&key).ok()?;
        Some(Rc::from(key))
    }
}
