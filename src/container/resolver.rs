// src/container/resolver.rs

//! Resolver gateway
//!
//! The resolver itself is an external collaborator; the core only
//! depends on this trait. On a successful resolve the container promotes
//! every module that was still installed to resolved and fires the
//! `Resolved` event for it, so the gateway contract holds: after success,
//! each resolved module's state is resolved or deeper.

use thiserror::Error;

use crate::module::Module;

/// Why a resolution attempt failed
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ResolutionError {
    message: String,
}

impl ResolutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Wires module capabilities and requirements, authorizing the
/// installed -> resolved transition
pub trait Resolver: Send + Sync {
    /// Resolves the given modules. `triggers` is true when the resolution
    /// was triggered by a start call rather than a batch resolve; the
    /// resolver may use it to prioritize lazy-activation work.
    ///
    /// The resolver may recursively call back into module state (for
    /// example to inspect fragment hosts); it must not attempt a state
    /// transition of its own.
    fn resolve(
        &self,
        modules: &[&Module],
        triggers: bool,
    ) -> std::result::Result<(), ResolutionError>;
}

/// Resolver that accepts every module without wiring anything. Useful
/// for containers whose modules have no requirements, and for tests.
#[derive(Debug, Default)]
pub struct AcceptAllResolver;

impl Resolver for AcceptAllResolver {
    fn resolve(
        &self,
        _modules: &[&Module],
        _triggers: bool,
    ) -> std::result::Result<(), ResolutionError> {
        Ok(())
    }
}
