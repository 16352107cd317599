// src/module/lock.rs

//! Re-entrant state-transition lock
//!
//! Each module owns one `StateChangeLock`: a re-entrant timed mutex tagged
//! with the set of transition kinds currently in flight on the owning
//! thread. The kind set gates which higher-level operations may overlap on
//! the same module, while the mutex itself guarantees that only one thread
//! ever mutates module state.
//!
//! Legal nestings:
//! - `Resolved` may nest inside `Started` (the resolver completes its
//!   state write during a start call).
//! - `Stopped` may nest inside `Updated`, `Unresolved` or `Uninstalled`.
//! - `Started`, `Updated`, `Unresolved` and `Uninstalled` require an
//!   empty in-flight set.
//!
//! Any other nesting fails without entering the in-flight set. The
//! in-flight set is only read or written by the lock owner, so the mutex
//! that serializes state changes also guards the set.

use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use strum_macros::Display;

use crate::error::{Error, Result};

/// How long an acquire waits for a contended lock before giving up
pub const STATE_CHANGE_TIMEOUT: Duration = Duration::from_secs(5);

/// The kind of state transition a thread drives while holding the lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TransitionKind {
    /// A start operation is in flight
    Started,
    /// A stop operation is in flight
    Stopped,
    /// An update operation is in flight
    Updated,
    /// An unresolve operation is in flight
    Unresolved,
    /// An uninstall operation is in flight
    Uninstalled,
    /// A resolve state write is in flight
    Resolved,
}

impl TransitionKind {
    fn bit(self) -> TransitionSet {
        match self {
            TransitionKind::Started => TransitionSet::STARTED,
            TransitionKind::Stopped => TransitionSet::STOPPED,
            TransitionKind::Updated => TransitionSet::UPDATED,
            TransitionKind::Unresolved => TransitionSet::UNRESOLVED,
            TransitionKind::Uninstalled => TransitionSet::UNINSTALLED,
            TransitionKind::Resolved => TransitionSet::RESOLVED,
        }
    }
}

bitflags::bitflags! {
    /// Set of transition kinds in flight on a held lock
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TransitionSet: u8 {
        /// A start operation is in flight
        const STARTED = 1 << 0;
        /// A stop operation is in flight
        const STOPPED = 1 << 1;
        /// An update operation is in flight
        const UPDATED = 1 << 2;
        /// An unresolve operation is in flight
        const UNRESOLVED = 1 << 3;
        /// An uninstall operation is in flight
        const UNINSTALLED = 1 << 4;
        /// A resolve state write is in flight
        const RESOLVED = 1 << 5;
    }
}

/// Kinds that may already be in flight when `Resolved` is acquired
const VALID_RESOLVED_NESTING: TransitionSet = TransitionSet::STARTED;

/// Kinds that may already be in flight when `Stopped` is acquired
const VALID_STOPPED_NESTING: TransitionSet = TransitionSet::UPDATED
    .union(TransitionSet::UNRESOLVED)
    .union(TransitionSet::UNINSTALLED);

struct LockState {
    owner: Option<ThreadId>,
    holds: u32,
    in_flight: TransitionSet,
}

/// Re-entrant mutex carrying the set of in-flight transition kinds
pub struct StateChangeLock {
    state: Mutex<LockState>,
    available: Condvar,
}

impl StateChangeLock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockState {
                owner: None,
                holds: 0,
                in_flight: TransitionSet::empty(),
            }),
            available: Condvar::new(),
        }
    }

    /// Acquires the lock for the specified transition kind, waiting up to
    /// [`STATE_CHANGE_TIMEOUT`] for another thread to release it.
    ///
    /// On acquisition the in-flight set is consulted against the nesting
    /// table; an illegal nesting releases the hold and fails with a
    /// state-change error, as does a timed-out wait.
    pub fn acquire(&self, kind: TransitionKind) -> Result<()> {
        self.acquire_timeout(kind, STATE_CHANGE_TIMEOUT)
    }

    pub(crate) fn acquire_timeout(&self, kind: TransitionKind, timeout: Duration) -> Result<()> {
        let me = thread::current().id();
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();

        while state.owner.is_some_and(|owner| owner != me) {
            if self.available.wait_until(&mut state, deadline).timed_out()
                && state.owner.is_some_and(|owner| owner != me)
            {
                return Err(Error::StateChange(format!(
                    "timed out waiting to begin a {kind} transition"
                )));
            }
        }

        let legal = match kind {
            TransitionKind::Started
            | TransitionKind::Updated
            | TransitionKind::Uninstalled
            | TransitionKind::Unresolved => state.in_flight.is_empty(),
            TransitionKind::Resolved => VALID_RESOLVED_NESTING.contains(state.in_flight),
            TransitionKind::Stopped => VALID_STOPPED_NESTING.contains(state.in_flight),
        };
        if !legal {
            return Err(Error::StateChange(format!(
                "a {kind} transition may not begin while {:?} is in flight",
                state.in_flight
            )));
        }

        state.owner = Some(me);
        state.holds += 1;
        state.in_flight.insert(kind.bit());
        Ok(())
    }

    /// Releases one hold for the specified transition kind.
    ///
    /// Fails with an illegal-monitor error when the current thread is not
    /// the owner or the kind is not in flight.
    pub fn release(&self, kind: TransitionKind) -> Result<()> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.owner != Some(me) || !state.in_flight.contains(kind.bit()) {
            return Err(Error::IllegalMonitor(kind.to_string()));
        }
        state.in_flight.remove(kind.bit());
        state.holds -= 1;
        if state.holds == 0 {
            state.owner = None;
            self.available.notify_one();
        }
        Ok(())
    }

    /// True when the current thread owns the lock with the given kind in
    /// flight
    pub fn holds(&self, kind: TransitionKind) -> bool {
        let state = self.state.lock();
        state.owner == Some(thread::current().id()) && state.in_flight.contains(kind.bit())
    }

    /// True when the current thread owns the lock
    pub fn held_by_current_thread(&self) -> bool {
        self.state.lock().owner == Some(thread::current().id())
    }
}

impl Default for StateChangeLock {
    fn default() -> Self {
        Self::new()
    }
}
