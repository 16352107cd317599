// src/container/mod.rs

//! Module registry and container-side services
//!
//! The container is the registry side of the lifecycle core: it assigns
//! module ids, tracks modules by id and location, carries the current
//! start level, and adapts the external resolver and settings store for
//! the modules it manages. Modules hold a weak handle back to their
//! container; no singletons.

mod resolver;

pub use resolver::{AcceptAllResolver, ResolutionError, Resolver};

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::events::{EventSink, ListenerList, ModuleEvent};
use crate::module::{Module, ModuleWorker, RevisionBuilder, Settings};
use crate::storage::{MemorySettingsStore, SettingsStore};

/// Initial start level for the container and for new modules
pub const DEFAULT_START_LEVEL: i32 = 1;

/// The module container
pub struct Container {
    modules: RwLock<HashMap<u64, Arc<Module>>>,
    by_location: RwLock<HashMap<String, u64>>,
    next_id: AtomicU64,
    start_level: AtomicI32,
    resolver: Box<dyn Resolver>,
    sink: Arc<dyn EventSink>,
    settings_store: Arc<dyn SettingsStore>,
}

/// Builder for a [`Container`]
///
/// Defaults: an accept-all resolver, an empty listener list, an
/// in-memory settings store, start level 1.
pub struct ContainerBuilder {
    resolver: Box<dyn Resolver>,
    sink: Arc<dyn EventSink>,
    settings_store: Arc<dyn SettingsStore>,
    start_level: i32,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self {
            resolver: Box::new(AcceptAllResolver),
            sink: Arc::new(ListenerList::new()),
            settings_store: Arc::new(MemorySettingsStore::new()),
            start_level: DEFAULT_START_LEVEL,
        }
    }

    pub fn with_resolver(mut self, resolver: impl Resolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = store;
        self
    }

    pub fn with_start_level(mut self, start_level: i32) -> Self {
        self.start_level = start_level;
        self
    }

    pub fn build(self) -> Arc<Container> {
        Arc::new(Container {
            modules: RwLock::new(HashMap::new()),
            by_location: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            start_level: AtomicI32::new(self.start_level),
            resolver: self.resolver,
            sink: self.sink,
            settings_store: self.settings_store,
        })
    }
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    /// Installs a module at the given location.
    ///
    /// Assigns the next module id, creates the module in the installed
    /// state with the built revision, restores any settings persisted for
    /// the location, and fires the `Installed` event. Installing a
    /// location that is already present returns the existing module.
    pub fn install(
        self: &Arc<Self>,
        location: &str,
        builder: RevisionBuilder,
        worker: Box<dyn ModuleWorker>,
    ) -> Result<Arc<Module>> {
        let module = {
            let mut by_location = self.by_location.write();
            if let Some(id) = by_location.get(location) {
                let existing = self.modules.read().get(id).cloned();
                if let Some(existing) = existing {
                    return Ok(existing);
                }
            }
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let persisted = self.settings_store.load(location)?;
            let (settings, start_level) = match persisted {
                Some(persisted) => (persisted.settings, persisted.start_level),
                None => (Settings::empty(), DEFAULT_START_LEVEL),
            };
            let module = Arc::new(Module::new(
                id,
                location.to_string(),
                builder.build(),
                settings,
                start_level,
                worker,
                Arc::downgrade(self),
            ));
            by_location.insert(location.to_string(), id);
            self.modules.write().insert(id, Arc::clone(&module));
            module
        };
        debug!("installed module {} at {location}", module.id());
        self.sink.fire(&module, ModuleEvent::Installed);
        Ok(module)
    }

    /// Looks up a module by id
    pub fn module(&self, id: u64) -> Option<Arc<Module>> {
        self.modules.read().get(&id).cloned()
    }

    /// Looks up a module by install location
    pub fn module_at(&self, location: &str) -> Option<Arc<Module>> {
        let id = *self.by_location.read().get(location)?;
        self.module(id)
    }

    /// All installed modules, in id order
    pub fn modules(&self) -> Vec<Arc<Module>> {
        let mut modules: Vec<_> = self.modules.read().values().cloned().collect();
        modules.sort_by_key(|m| m.id());
        modules
    }

    /// The container's current start level
    pub fn current_start_level(&self) -> i32 {
        self.start_level.load(Ordering::Acquire)
    }

    /// Sets the container's current start level. Driving the modules
    /// whose levels are crossed is the start-level scheduler's job, not
    /// the container's.
    pub fn set_current_start_level(&self, level: i32) {
        self.start_level.store(level, Ordering::Release);
    }

    /// Resolves the given modules through the external resolver, then
    /// completes the state write: every module still installed is
    /// promoted to resolved and a `Resolved` event fires for it.
    ///
    /// The `Resolved` lock kind may nest inside an in-flight `Started`,
    /// so this is safe to call from within a start on the same thread.
    pub fn resolve(&self, modules: &[&Module], triggers: bool) -> Result<()> {
        self.resolver
            .resolve(modules, triggers)
            .map_err(|err| Error::Resolve(err.to_string()))?;
        for module in modules {
            if module.promote_resolved()? {
                self.sink.fire(module, ModuleEvent::Resolved);
            }
        }
        Ok(())
    }

    pub(crate) fn event_sink(&self) -> &dyn EventSink {
        self.sink.as_ref()
    }

    pub(crate) fn settings_store(&self) -> &dyn SettingsStore {
        self.settings_store.as_ref()
    }

    /// Removes an uninstalled module from the registry and deletes its
    /// persisted settings
    pub(crate) fn deregister(&self, module: &Module) -> Result<()> {
        self.modules.write().remove(&module.id());
        self.by_location.write().remove(module.location());
        self.settings_store.remove(module.location())
    }
}
