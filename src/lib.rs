// src/lib.rs

//! Wharf Module Lifecycle Core
//!
//! The lifecycle subsystem of a modular-runtime container: it governs
//! each module's state transitions, enforces a single-writer discipline
//! on those transitions through a re-entrant, transition-typed lock, and
//! coordinates with an external resolver and a persistent settings store.
//!
//! # Architecture
//!
//! - State machine: installed -> resolved -> (lazy-)starting -> active ->
//!   stopping -> resolved -> uninstalled, driven by `Module`
//! - Single writer: every state write happens under the module's
//!   state-change lock; legal transition nesting is a const table
//! - Exactly-once events: `Starting`/`Stopping` fire inside the lock,
//!   everything else after release; a failing stop worker still produces
//!   its `Stopped` event
//! - Write-through settings: non-transient starts and stops persist the
//!   auto-start and activation-policy flags to SQLite
//!
//! The resolver, the event fan-out and the start-level scheduler are
//! external collaborators behind traits.

pub mod container;
mod error;
pub mod events;
pub mod module;
pub mod storage;

pub use container::{
    AcceptAllResolver, Container, ContainerBuilder, DEFAULT_START_LEVEL, ResolutionError, Resolver,
};
pub use error::{Error, Result};
pub use events::{EventSink, ListenerList, ModuleEvent, ModuleListener};
pub use module::{
    Capability, Module, ModuleRevision, ModuleRevisions, ModuleWorker, NoopWorker,
    RevisionBuilder, STATE_CHANGE_TIMEOUT, Settings, StartOptions, State, StateChangeLock,
    StopOptions, TransitionKind, TransitionSet,
};
pub use storage::{
    DataHook, MemorySettingsStore, ModuleRecord, PersistedSettings, SettingsStore,
    SqliteSettingsStore, Status,
};
