//! The boundary between the engine and the Lua runtime that runs the code
//! under test.
//!
//! The engine never embeds an interpreter. A host binds these traits to its
//! VM: a debug hook for line events, and a `require` replacement that routes
//! module loads through [`crate::interceptor::ModuleInterceptor`]. Both
//! traits take `&self` because the host is re-entered while a module body
//! executes (a module may `require` another during its own load).
//!
//! ## Implementations
//!
//! - Embedding crates wire these to their Lua state.
//! - The integration tests use a scripted fake host.

use crate::diagnostics::CoverageError;

/// Called for every line event: `(chunk source, line)`. The chunk source is
/// Lua's `debug.getinfo(..).source` (`@path` for files).
pub type LineHook = Box<dyn FnMut(&str, u32)>;

pub trait TraceHost {
    /// Install the per-line trace callback, replacing any previous one.
    fn install_line_hook(&self, hook: LineHook) -> Result<(), CoverageError>;

    /// Remove the callback. Removing when nothing is installed must succeed.
    fn remove_line_hook(&self) -> Result<(), CoverageError>;
}

pub trait ModuleHost {
    /// Whatever `require` returns in the host: a handle to the module value.
    type Module;

    /// Load `name` with the runtime's own, unwrapped loader.
    fn load_original(&self, name: &str) -> Result<Self::Module, CoverageError>;

    /// Compile and run `source` as module `name`, naming the chunk `chunk_name`
    /// so line events and stack traces point at the original file.
    fn load_source(&self, name: &str, chunk_name: &str, source: &str) -> Result<Self::Module, CoverageError>;

    /// Replace the global `require` with one that calls back into the interceptor.
    fn install_require_hook(&self) -> Result<(), CoverageError>;

    /// Put the original `require` back.
    fn restore_require(&self) -> Result<(), CoverageError>;
}

/// A host that supports both observation strategies.
pub trait RuntimeHost: TraceHost + ModuleHost {}

impl<T: TraceHost + ModuleHost> RuntimeHost for T {}

/// File path named by a Lua chunk source, if it names one.
///
/// `@path` is a file; `=name` chunks and raw source strings are not.
pub fn chunk_file(source: &str) -> Option<&str> {
    source.strip_prefix('@').filter(|p| !p.is_empty())
}

/// Chunk name a rewritten file is loaded under.
pub fn chunk_name_for(path: &str) -> String {
    format!("@{path}")
}
