// src/module/worker.rs

//! Worker hooks supplied by the concrete module type
//!
//! The four hooks are the extension points a module type plugs its real
//! behavior into: loading and calling an activator, tearing it down,
//! reacting to a revision swap, and releasing per-revision resources at
//! uninstall. All default to no-ops.
//!
//! Hooks return `anyhow::Result` so implementations can surface arbitrary
//! errors; a returned error that downcasts to the crate [`Error`] kind
//! propagates unchanged, anything else is wrapped as an activator error.
//!
//! [`Error`]: crate::Error

use crate::module::{Module, ModuleRevision, RevisionBuilder};

/// Extension points invoked during module state transitions
pub trait ModuleWorker: Send + Sync {
    /// Performs any work associated with starting a module, for example
    /// loading and calling start on an activator.
    ///
    /// Called while the state-change lock is held and the module is in
    /// the starting state.
    fn start_worker(&self, module: &Module) -> anyhow::Result<()> {
        let _ = module;
        Ok(())
    }

    /// Performs any work associated with stopping a module.
    ///
    /// Called while the state-change lock is held and the module is in
    /// the stopping state. The module settles to resolved whether or not
    /// this hook fails.
    fn stop_worker(&self, module: &Module) -> anyhow::Result<()> {
        let _ = module;
        Ok(())
    }

    /// Observes an update before the new revision is swapped in.
    fn update_worker(&self, module: &Module, builder: &RevisionBuilder) -> anyhow::Result<()> {
        let _ = (module, builder);
        Ok(())
    }

    /// Releases resources associated with a revision at uninstall time.
    /// Invoked once per retained revision.
    fn cleanup(&self, revision: &ModuleRevision) {
        let _ = revision;
    }
}

/// Worker with no behavior, for modules without an activator
#[derive(Debug, Default)]
pub struct NoopWorker;

impl ModuleWorker for NoopWorker {}
