// src/error.rs

//! Error types for the lifecycle core
//!
//! Every failure surfaces to the direct caller; nothing is recovered at
//! this layer. The one ordering exception is the stop path: a failing stop
//! worker still fires the `STOPPED` event and leaves the module `RESOLVED`,
//! and the worker's error is delivered to the caller after the event.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the lifecycle core
#[derive(Debug, Error)]
pub enum Error {
    /// The state-change lock could not be acquired: the wait timed out or
    /// the requested transition may not nest inside the transitions
    /// already in flight on the owning thread
    #[error("state change lock: {0}")]
    StateChange(String),

    /// Operation attempted on a module that has been uninstalled
    #[error("invalid module state: {0}")]
    IllegalState(String),

    /// The resolver failed, or it succeeded but left the module unresolved
    #[error("could not resolve module: {0}")]
    Resolve(String),

    /// A transient start was attempted while the module's start level is
    /// above the container's current start level
    #[error("cannot transiently start a module whose start level is not met: {0}")]
    StartTransient(String),

    /// A worker hook raised an error that is not a framework error
    #[error("error in module worker: {0}")]
    Activator(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Release was called without a matching acquire on the current thread
    #[error("current thread does not hold the state change lock for: {0}")]
    IllegalMonitor(String),

    /// Settings store failure
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Persisted record I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Maps a worker hook error onto the framework error model: framework
    /// errors propagate unchanged, anything else is wrapped as an
    /// activator error.
    pub(crate) fn from_worker(err: anyhow::Error) -> Error {
        match err.downcast::<Error>() {
            Ok(framework) => framework,
            Err(other) => Error::Activator(other.into()),
        }
    }
}
