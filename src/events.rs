// src/events.rs

//! Lifecycle event sink and synchronous listener dispatch
//!
//! State-transition events are published through an [`EventSink`]. The
//! container-facing contract: `Starting` and `Stopping` are fired while
//! the transitioning thread still holds the module's state-change lock
//! (listeners observe an in-flight transition), every other event is
//! fired after the lock is released. In particular `LazyActivation` is
//! fired without the lock so a synchronous listener is free to re-enter
//! `start` on the same module and promote it to active.
//!
//! Delivery is serialized per module because only the transitioning
//! thread fires, and it fires before yielding logical control of the
//! transition.

use std::sync::Arc;

use parking_lot::RwLock;
use strum_macros::Display;

use crate::module::Module;

/// State-transition events published for a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ModuleEvent {
    /// The module has been installed
    Installed,
    /// The module entered lazy starting and awaits a lazy trigger
    LazyActivation,
    /// The module has been resolved
    Resolved,
    /// The module has been started
    Started,
    /// The module is about to be activated
    Starting,
    /// The module has been stopped
    Stopped,
    /// The module is about to be deactivated
    Stopping,
    /// The module has been uninstalled
    Uninstalled,
    /// The module has been unresolved
    Unresolved,
    /// The module has been updated
    Updated,
}

/// Publishes state-transition events to external listeners
pub trait EventSink: Send + Sync {
    /// Dispatches the event synchronously on the calling thread
    fn fire(&self, module: &Module, event: ModuleEvent);
}

/// A registered lifecycle listener
pub trait ModuleListener: Send + Sync {
    fn module_changed(&self, module: &Module, event: ModuleEvent);
}

/// Synchronous dispatcher delivering events to listeners in registration
/// order
#[derive(Default)]
pub struct ListenerList {
    listeners: RwLock<Vec<Arc<dyn ModuleListener>>>,
}

impl ListenerList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn ModuleListener>) {
        self.listeners.write().push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }
}

impl EventSink for ListenerList {
    fn fire(&self, module: &Module, event: ModuleEvent) {
        // snapshot outside the registry lock: a listener may register
        // further listeners or re-enter the module during dispatch
        let snapshot: Vec<Arc<dyn ModuleListener>> = self.listeners.read().clone();
        for listener in snapshot {
            listener.module_changed(module, event);
        }
    }
}
