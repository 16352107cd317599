// src/module/mod.rs

//! Module lifecycle state machine
//!
//! A module is one installed unit in the container. Its state moves
//! through installed -> resolved -> starting -> active -> stopping ->
//! resolved -> uninstalled, with a lazy-starting detour when the module
//! declares the lazy activation policy. Every state write happens while
//! the module's state-change lock is held by the transitioning thread;
//! the state itself is an atomic published with release semantics so it
//! can be read without the lock.
//!
//! Key contracts:
//! - `Starting` and `Stopping` events fire while the lock is held; all
//!   other events fire after release.
//! - `LazyActivation` fires with the lock temporarily released so a
//!   synchronous listener can re-enter `start` and promote the module to
//!   active.
//! - A stop always fires `Stopped` and settles the state to resolved,
//!   even when the stop worker fails; the worker's error reaches the
//!   caller after the event.
//! - Once uninstalled, a module never leaves that state.

mod lock;
mod options;
mod revision;
mod worker;

pub use lock::{STATE_CHANGE_TIMEOUT, StateChangeLock, TransitionKind, TransitionSet};
pub use options::{Settings, StartOptions, StopOptions};
pub use revision::{
    ACTIVATION_POLICY_LAZY, CAPABILITY_ACTIVATION_POLICY, Capability, MODULE_DATA_NAMESPACE,
    ModuleRevision, ModuleRevisions, RevisionBuilder,
};
pub use worker::{ModuleWorker, NoopWorker};

use std::sync::Weak;
use std::sync::atomic::{AtomicI32, AtomicI64, AtomicU8, Ordering};

use parking_lot::Mutex;
use strum_macros::Display;
use tracing::{debug, warn};

use crate::container::Container;
use crate::error::{Error, Result};
use crate::events::ModuleEvent;

/// The possible states of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[repr(u8)]
pub enum State {
    /// Installed but not yet resolved
    Installed = 0,
    /// Resolved and able to be started
    Resolved = 1,
    /// Waiting for a lazy trigger to proceed with starting
    LazyStarting = 2,
    /// In the process of starting
    Starting = 3,
    /// Running
    Active = 4,
    /// In the process of stopping
    Stopping = 5,
    /// Uninstalled; may not be used
    Uninstalled = 6,
}

impl State {
    /// True for the states that make up the running set: starting,
    /// lazy-starting, active and stopping
    pub fn is_active_like(self) -> bool {
        matches!(
            self,
            State::Starting | State::LazyStarting | State::Active | State::Stopping
        )
    }

    /// True for the running set plus resolved
    pub fn is_resolved_like(self) -> bool {
        self == State::Resolved || self.is_active_like()
    }

    fn from_raw(raw: u8) -> State {
        match raw {
            0 => State::Installed,
            1 => State::Resolved,
            2 => State::LazyStarting,
            3 => State::Starting,
            4 => State::Active,
            5 => State::Stopping,
            _ => State::Uninstalled,
        }
    }
}

/// One installed unit managed by the container
pub struct Module {
    id: u64,
    location: String,
    state: AtomicU8,
    start_level: AtomicI32,
    last_modified: AtomicI64,
    lock: StateChangeLock,
    settings: Mutex<Settings>,
    revisions: ModuleRevisions,
    worker: Box<dyn ModuleWorker>,
    container: Weak<Container>,
}

impl Module {
    pub(crate) fn new(
        id: u64,
        location: String,
        initial: ModuleRevision,
        settings: Settings,
        start_level: i32,
        worker: Box<dyn ModuleWorker>,
        container: Weak<Container>,
    ) -> Self {
        Self {
            id,
            location,
            state: AtomicU8::new(State::Installed as u8),
            start_level: AtomicI32::new(start_level),
            last_modified: AtomicI64::new(chrono::Utc::now().timestamp_millis()),
            lock: StateChangeLock::new(),
            settings: Mutex::new(settings),
            revisions: ModuleRevisions::new(initial),
            worker,
            container,
        }
    }

    /// The container-unique module id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The location the module was installed from
    pub fn location(&self) -> &str {
        &self.location
    }

    /// The current state. Readable without the state-change lock; the
    /// value was the truth at some earlier instant.
    pub fn state(&self) -> State {
        State::from_raw(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: State) {
        debug!("module {} -> {}", self.id, state);
        self.state.store(state as u8, Ordering::Release);
    }

    /// The module's start level
    pub fn start_level(&self) -> i32 {
        self.start_level.load(Ordering::Acquire)
    }

    /// Sets the start level and writes it through to the settings store.
    /// The level must be positive.
    pub fn set_start_level(&self, level: i32) -> Result<()> {
        if level < 1 {
            return Err(Error::IllegalState(format!(
                "start level must be positive, got {level}"
            )));
        }
        self.start_level.store(level, Ordering::Release);
        let settings = *self.settings.lock();
        self.container()?.settings_store().persist(self, settings)
    }

    /// When the module was last installed, updated or uninstalled, in
    /// epoch milliseconds
    pub fn last_modified(&self) -> i64 {
        self.last_modified.load(Ordering::Acquire)
    }

    fn set_last_modified_now(&self) {
        self.last_modified
            .store(chrono::Utc::now().timestamp_millis(), Ordering::Release);
    }

    /// A copy of the persistent settings
    pub fn settings(&self) -> Settings {
        *self.settings.lock()
    }

    /// The revision history of this module
    pub fn revisions(&self) -> &ModuleRevisions {
        &self.revisions
    }

    /// The current revision, if any
    pub fn current_revision(&self) -> Option<std::sync::Arc<ModuleRevision>> {
        self.revisions.current()
    }

    fn container(&self) -> Result<std::sync::Arc<Container>> {
        self.container.upgrade().ok_or_else(|| {
            Error::IllegalState(format!("container for module {} has been dropped", self.id))
        })
    }

    fn check_valid(&self) -> Result<()> {
        if self.state() == State::Uninstalled {
            return Err(Error::IllegalState(format!(
                "module {} has been uninstalled",
                self.id
            )));
        }
        Ok(())
    }

    fn fire_event(&self, event: ModuleEvent) {
        debug!("module {} firing {}", self.id, event);
        match self.container.upgrade() {
            Some(container) => container.event_sink().fire(self, event),
            None => warn!("module {} dropped event {}: container is gone", self.id, event),
        }
    }

    fn is_lazy_activate(&self) -> bool {
        self.current_revision()
            .is_some_and(|revision| revision.has_lazy_activation_policy())
    }

    /// Starts this module.
    ///
    /// `LAZY_TRIGGER` must be combined with `TRANSIENT`. A lazy trigger
    /// from the thread that is already activating this module is a no-op.
    pub fn start(&self, options: StartOptions) -> Result<()> {
        if options.contains(StartOptions::LAZY_TRIGGER) && self.lock.holds(TransitionKind::Started)
        {
            // the current thread is activating this module; a trigger
            // during that activation has nothing to do
            return Ok(());
        }
        self.lock.acquire(TransitionKind::Started)?;
        let outcome = self.start_locked(options);
        // do_start may have failed to re-acquire after firing the lazy
        // activation event, in which case there is no hold to release
        let released = if self.lock.holds(TransitionKind::Started) {
            self.lock.release(TransitionKind::Started)
        } else {
            Ok(())
        };
        let event = outcome?;
        released?;
        if let Some(event) = event {
            self.fire_event(event);
        }
        Ok(())
    }

    fn start_locked(&self, options: StartOptions) -> Result<Option<ModuleEvent>> {
        self.check_valid()?;
        self.persist_start_options(options)?;
        let container = self.container()?;
        if self.start_level() > container.current_start_level() {
            if options.contains(StartOptions::TRANSIENT) {
                return Err(Error::StartTransient(format!(
                    "module {} has start level {}, container is at {}",
                    self.id,
                    self.start_level(),
                    container.current_start_level()
                )));
            }
            // not an error; the start-level scheduler will start the
            // module once the container level reaches it
            return Ok(None);
        }
        if self.state() == State::Active {
            return Ok(None);
        }
        if self.state() == State::Installed {
            container.resolve(&[self], true)?;
            if self.state() == State::Installed {
                return Err(Error::Resolve(format!(
                    "module {} was not resolved",
                    self.id
                )));
            }
        }
        self.do_start(options)
    }

    /// Fires an event with the lock yielded: releases the hold for
    /// `kind`, dispatches, and re-acquires. Other transitions may
    /// interleave in the window; the nesting rules still bar illegal
    /// overlaps once this thread re-acquires.
    fn fire_event_unlocked(&self, kind: TransitionKind, event: ModuleEvent) -> Result<()> {
        self.lock.release(kind)?;
        self.fire_event(event);
        self.lock.acquire(kind)
    }

    fn do_start(&self, options: StartOptions) -> Result<Option<ModuleEvent>> {
        if options.contains(StartOptions::LAZY_TRIGGER) {
            if self.state() != State::LazyStarting {
                // make sure we transition through the lazy starting state
                self.set_state(State::LazyStarting);
                // yielded so a synchronous listener may re-enter start on
                // this module
                self.fire_event_unlocked(TransitionKind::Started, ModuleEvent::LazyActivation)?;
                if self.state() == State::Active {
                    // a synchronous listener activated the module
                    return Ok(None);
                }
            }
        } else if self.settings().contains(Settings::USE_ACTIVATION_POLICY)
            && self.is_lazy_activate()
        {
            if self.state() == State::LazyStarting {
                // a synchronous listener started this module again with
                // the lazy option; nothing to do
                return Ok(None);
            }
            self.set_state(State::LazyStarting);
            return Ok(Some(ModuleEvent::LazyActivation));
        }

        self.set_state(State::Starting);
        // fired while holding the lock: listeners observe an in-flight
        // start
        self.fire_event(ModuleEvent::Starting);
        match self.worker.start_worker(self) {
            Ok(()) => {
                self.set_state(State::Active);
                Ok(Some(ModuleEvent::Started))
            }
            // state stays at starting; caller policy dictates whether to
            // drive a stop
            Err(err) => Err(Error::from_worker(err)),
        }
    }

    /// Stops this module.
    ///
    /// The `Stopped` event fires even when the stop worker fails; the
    /// worker's error is returned after the event.
    pub fn stop(&self, options: StopOptions) -> Result<()> {
        self.lock.acquire(TransitionKind::Stopped)?;
        let outcome = self.stop_locked(options);
        let released = self.lock.release(TransitionKind::Stopped);
        let (fired, worker_error) = outcome?;
        released?;
        if fired {
            self.fire_event(ModuleEvent::Stopped);
        }
        match worker_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn stop_locked(&self, options: StopOptions) -> Result<(bool, Option<Error>)> {
        self.check_valid()?;
        self.persist_stop_options(options)?;
        if !self.state().is_active_like() {
            return Ok((false, None));
        }
        let worker_error = self.do_stop().err();
        Ok((true, worker_error))
    }

    fn do_stop(&self) -> Result<()> {
        self.set_state(State::Stopping);
        self.fire_event(ModuleEvent::Stopping);
        let result = self
            .worker
            .stop_worker(self)
            .map_err(Error::from_worker);
        // the state settles on every exit path
        self.set_state(State::Resolved);
        result
    }

    /// Updates this module to the revision described by `builder`.
    ///
    /// An active module is transiently stopped first, and started again
    /// with its persisted activation policy after the `Updated` event;
    /// restart failures are logged, not propagated.
    pub fn update(&self, builder: RevisionBuilder) -> Result<()> {
        self.lock.acquire(TransitionKind::Updated)?;
        let outcome = self.update_locked(builder);
        let released = self.lock.release(TransitionKind::Updated);
        let was_active = outcome?;
        released?;
        self.fire_event(ModuleEvent::Updated);
        if was_active {
            if let Err(err) = self.start(StartOptions::TRANSIENT_RESUME) {
                warn!("failed to restart module {} after update: {err}", self.id);
            }
        }
        Ok(())
    }

    fn update_locked(&self, builder: RevisionBuilder) -> Result<bool> {
        self.check_valid()?;
        let was_active = self.state().is_active_like();
        if was_active {
            // nested transient stop; Stopped may nest inside Updated
            self.stop(StopOptions::TRANSIENT)?;
        }
        self.worker
            .update_worker(self, &builder)
            .map_err(Error::from_worker)?;
        self.revisions.add(builder.build());
        // the new revision has not been through the resolver
        if self.state() == State::Resolved {
            self.set_state(State::Installed);
        }
        self.set_last_modified_now();
        Ok(was_active)
    }

    /// Uninstalls this module. Terminal: the module never leaves the
    /// uninstalled state.
    pub fn uninstall(&self) -> Result<()> {
        self.lock.acquire(TransitionKind::Uninstalled)?;
        let outcome = self.uninstall_locked();
        let released = self.lock.release(TransitionKind::Uninstalled);
        outcome?;
        released?;
        self.fire_event(ModuleEvent::Uninstalled);
        Ok(())
    }

    fn uninstall_locked(&self) -> Result<()> {
        self.check_valid()?;
        if self.state().is_active_like() {
            self.stop(StopOptions::TRANSIENT)?;
        }
        for revision in self.revisions.all() {
            self.worker.cleanup(&revision);
        }
        *self.settings.lock() = Settings::empty();
        self.set_state(State::Uninstalled);
        self.set_last_modified_now();
        self.container()?.deregister(self)
    }

    /// Moves a resolved (or running, after a nested stop) module back to
    /// installed
    pub fn unresolve(&self) -> Result<()> {
        self.lock.acquire(TransitionKind::Unresolved)?;
        let outcome = self.unresolve_locked();
        let released = self.lock.release(TransitionKind::Unresolved);
        outcome?;
        released?;
        self.fire_event(ModuleEvent::Unresolved);
        Ok(())
    }

    fn unresolve_locked(&self) -> Result<()> {
        self.check_valid()?;
        if self.state().is_active_like() {
            self.stop(StopOptions::TRANSIENT)?;
        }
        self.set_state(State::Installed);
        Ok(())
    }

    /// Completes the resolver's state write: installed -> resolved.
    /// Returns true when the module was promoted. The `Resolved` kind is
    /// legal while a `Started` transition is in flight on this thread.
    pub(crate) fn promote_resolved(&self) -> Result<bool> {
        self.lock.acquire(TransitionKind::Resolved)?;
        let promoted = if self.state() == State::Installed {
            self.set_state(State::Resolved);
            true
        } else {
            false
        };
        self.lock.release(TransitionKind::Resolved)?;
        Ok(promoted)
    }

    fn persist_start_options(&self, options: StartOptions) -> Result<()> {
        if options.intersects(StartOptions::TRANSIENT_RESUME | StartOptions::LAZY_TRIGGER) {
            return Ok(());
        }
        let mut settings = self.settings.lock();
        // the activation policy setting always tracks the option
        if options.contains(StartOptions::USE_ACTIVATION_POLICY) {
            settings.insert(Settings::USE_ACTIVATION_POLICY);
        } else {
            settings.remove(Settings::USE_ACTIVATION_POLICY);
        }
        if options.contains(StartOptions::TRANSIENT) {
            return Ok(());
        }
        settings.insert(Settings::AUTO_START);
        let snapshot = *settings;
        drop(settings);
        self.container()?.settings_store().persist(self, snapshot)
    }

    fn persist_stop_options(&self, options: StopOptions) -> Result<()> {
        if options.contains(StopOptions::TRANSIENT) {
            return Ok(());
        }
        *self.settings.lock() = Settings::empty();
        self.container()?
            .settings_store()
            .persist(self, Settings::empty())
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("location", &self.location)
            .field("state", &self.state())
            .finish()
    }
}
