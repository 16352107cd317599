// tests/common/mod.rs

//! Shared fixtures for the lifecycle integration tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use wharf::{
    Container, ContainerBuilder, ListenerList, Module, ModuleEvent, ModuleListener,
    ModuleRevision, ModuleWorker, MemorySettingsStore, ResolutionError, Resolver,
    RevisionBuilder,
};

/// Listener that records every event it sees, tagged by module id.
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<(u64, ModuleEvent)>>,
}

impl RecordingListener {
    pub fn events_for(&self, module_id: u64) -> Vec<ModuleEvent> {
        self.events
            .lock()
            .iter()
            .filter(|(id, _)| *id == module_id)
            .map(|(_, event)| *event)
            .collect()
    }
}

impl ModuleListener for RecordingListener {
    fn module_changed(&self, module: &Module, event: ModuleEvent) {
        self.events.lock().push((module.id(), event));
    }
}

/// Worker with call counters and switchable failures.
#[derive(Clone, Default)]
pub struct TestWorker {
    pub starts: Arc<AtomicUsize>,
    pub stops: Arc<AtomicUsize>,
    pub cleanups: Arc<AtomicUsize>,
    pub fail_start: Arc<AtomicBool>,
    pub fail_stop: Arc<AtomicBool>,
    pub start_delay_ms: Arc<AtomicU64>,
}

impl TestWorker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModuleWorker for TestWorker {
    fn start_worker(&self, _module: &Module) -> anyhow::Result<()> {
        let delay = self.start_delay_ms.load(Ordering::Relaxed);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        self.starts.fetch_add(1, Ordering::Relaxed);
        if self.fail_start.load(Ordering::Relaxed) {
            anyhow::bail!("activator refused to start");
        }
        Ok(())
    }

    fn stop_worker(&self, _module: &Module) -> anyhow::Result<()> {
        self.stops.fetch_add(1, Ordering::Relaxed);
        if self.fail_stop.load(Ordering::Relaxed) {
            anyhow::bail!("activator refused to stop");
        }
        Ok(())
    }

    fn cleanup(&self, _revision: &ModuleRevision) {
        self.cleanups.fetch_add(1, Ordering::Relaxed);
    }
}

/// Resolver that accepts everything and counts its calls.
#[derive(Clone, Default)]
pub struct CountingResolver {
    pub calls: Arc<AtomicUsize>,
}

impl Resolver for CountingResolver {
    fn resolve(
        &self,
        _modules: &[&Module],
        _triggers: bool,
    ) -> std::result::Result<(), ResolutionError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// A container wired with recording collaborators.
pub struct Fixture {
    pub container: Arc<Container>,
    pub sink: Arc<ListenerList>,
    pub listener: Arc<RecordingListener>,
    pub resolver: CountingResolver,
    pub store: Arc<MemorySettingsStore>,
}

pub fn fixture() -> Fixture {
    let listener = Arc::new(RecordingListener::default());
    let sink = Arc::new(ListenerList::new());
    sink.add_listener(Arc::clone(&listener) as Arc<dyn ModuleListener>);
    let resolver = CountingResolver::default();
    let store = Arc::new(MemorySettingsStore::new());
    let container = ContainerBuilder::new()
        .with_resolver(resolver.clone())
        .with_event_sink(Arc::clone(&sink) as Arc<dyn wharf::EventSink>)
        .with_settings_store(Arc::clone(&store) as Arc<dyn wharf::SettingsStore>)
        .build();
    Fixture {
        container,
        sink,
        listener,
        resolver,
        store,
    }
}

/// Installs a module backed by the given worker, with an eager revision.
pub fn install(fixture: &Fixture, location: &str, worker: TestWorker) -> Arc<Module> {
    fixture
        .container
        .install(
            location,
            RevisionBuilder::new("demo.module", "1.0.0"),
            Box::new(worker),
        )
        .unwrap()
}

/// Installs a module whose revision declares the lazy activation policy.
pub fn install_lazy(fixture: &Fixture, location: &str, worker: TestWorker) -> Arc<Module> {
    fixture
        .container
        .install(
            location,
            RevisionBuilder::new("demo.module", "1.0.0").with_lazy_activation(),
            Box::new(worker),
        )
        .unwrap()
}
