//! The Rust side of the tracking table that rewritten modules `require`.
//!
//! A host exposes these methods as the `line`, `header`, `block`, `cond` and
//! `func` fields of the runtime module. Events arriving while the store is
//! borrowed higher up the stack are dropped; invalid ids are logged and
//! never raised into the program under test.

use tracing::{debug, trace};

use crate::context::CoverageContext;
use crate::diagnostics::CoverageError;
use crate::store::{CoverageStore, TrackOptions};

#[derive(Debug, Clone)]
pub struct TrackingRuntime {
    ctx: CoverageContext,
}

impl TrackingRuntime {
    pub fn new(ctx: CoverageContext) -> Self {
        Self { ctx }
    }

    fn with_store(
        &self,
        event: &'static str,
        file: &str,
        f: impl FnOnce(&mut CoverageStore) -> Result<(), CoverageError>,
    ) {
        let Ok(mut store) = self.ctx.store.try_borrow_mut() else {
            trace!(event, "store busy, event dropped");
            return;
        };
        self.ctx.reattach(&mut store, file);
        if let Err(err) = f(&mut store) {
            debug!(event, error = %err, "tracking call rejected");
        }
    }

    /// `__lc_l(file, line)`
    pub fn line(&self, file: &str, line: u32) {
        self.with_store("line", file, |store| store.track_line(file, line, TrackOptions::default()));
    }

    /// `__lc_h(file, line, block, ...)`: a control-structure header was evaluated.
    /// The wrapped values pass through untouched on the Lua side.
    pub fn header(&self, file: &str, line: Option<u32>, block: Option<usize>) {
        self.with_store("header", file, |store| {
            if let Some(line) = line {
                store.track_line(file, line, TrackOptions::default())?;
            }
            if let Some(block) = block {
                store.track_block(file, block, false)?;
            }
            Ok(())
        });
    }

    /// `__lc_b(file, block)`
    pub fn block(&self, file: &str, block: usize) {
        self.with_store("block", file, |store| store.track_block(file, block, false));
    }

    /// `__lc_c(file, cond, value)`: records the truthiness of `value`, which the
    /// Lua side returns unchanged. Returns `truthy` for hosts that forward it.
    pub fn cond(&self, file: &str, cond: usize, truthy: bool) -> bool {
        self.with_store("cond", file, |store| store.track_condition(file, cond, truthy));
        truthy
    }

    /// `__lc_fn(file, func)`
    pub fn func(&self, file: &str, func: usize) {
        self.with_store("func", file, |store| store.track_function(file, func, false));
    }

    /// What an assertion library calls for the line holding a passing assertion.
    pub fn mark_line_covered(&self, file: &str, line: u32) {
        self.with_store("mark_line_covered", file, |store| store.mark_line_covered(file, line));
    }
}
