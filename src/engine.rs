//! The contract every embedded VM implements.
//!
//! An engine owns one JavaScript context. [`Engine::load`] extends its global
//! scope, [`Engine::run_react`] evaluates a snippet that must produce a string,
//! and [`Engine::clone_engine`] hands out an independent copy of the loaded
//! state without running the loaded sources again.

use thiserror::Error;

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum EngineError {
    /// The source failed to compile or threw while running.
    #[error("script failed: {0}")]
    ParseOrRuntime(String),

    #[error("expected string result, actual type is: {0}")]
    UnexpectedResultType(String),

    #[error("source of {0} bytes does not fit in a VM string")]
    SourceTooLarge(usize),

    #[error("VM could not produce a startup snapshot")]
    Snapshot,

    #[error("failed to spawn engine worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// The worker thread went away, usually after a fatal VM error.
    #[error("engine worker is gone")]
    WorkerGone,
}

pub trait Engine: Send {
    /// Returns a copy of the engine. Work done on the copy never shows up in
    /// `self` and vice versa.
    fn clone_engine(&self) -> Box<dyn Engine>;

    /// Runs `source` against the global scope. Whatever it evaluates to is
    /// thrown away, only the bindings it leaves behind matter.
    fn load(&mut self, source: &[u8]) -> Result<()>;

    /// Runs a rendering snippet and returns the string it evaluates to.
    fn run_react(&mut self, source: &str) -> Result<String>;
}

impl Clone for Box<dyn Engine> {
    fn clone(&self) -> Self {
        self.clone_engine()
    }
}
