// src/module/revision.rs

//! Module revisions and capabilities
//!
//! A revision is an immutable snapshot of a module's manifest: symbolic
//! name, version string and declared capabilities. A module accumulates
//! revisions over its lifetime (one per install or update); the newest one
//! is the current revision. Old revisions are retained until uninstall
//! runs the worker's cleanup hook for each of them.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// Capability namespace carrying module metadata
pub const MODULE_DATA_NAMESPACE: &str = "module-data";

/// Attribute of [`MODULE_DATA_NAMESPACE`] declaring the activation policy
pub const CAPABILITY_ACTIVATION_POLICY: &str = "activation-policy";

/// Attribute value declaring the lazy activation policy
pub const ACTIVATION_POLICY_LAZY: &str = "lazy";

/// A capability declared by a module revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    namespace: String,
    attributes: HashMap<String, String>,
}

impl Capability {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            attributes: HashMap::new(),
        }
    }

    /// Adds an attribute to the capability
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// An immutable manifest snapshot of a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRevision {
    symbolic_name: String,
    version: String,
    capabilities: Vec<Capability>,
}

impl ModuleRevision {
    pub fn symbolic_name(&self) -> &str {
        &self.symbolic_name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the capabilities declared in the given namespace, in
    /// declaration order
    pub fn capabilities(&self, namespace: &str) -> Vec<&Capability> {
        self.capabilities
            .iter()
            .filter(|c| c.namespace() == namespace)
            .collect()
    }

    /// True when the revision declares the lazy activation policy: the
    /// first `module-data` capability carries `activation-policy = "lazy"`
    pub fn has_lazy_activation_policy(&self) -> bool {
        self.capabilities(MODULE_DATA_NAMESPACE)
            .first()
            .and_then(|c| c.attribute(CAPABILITY_ACTIVATION_POLICY))
            .is_some_and(|value| value == ACTIVATION_POLICY_LAZY)
    }
}

/// Builder for a new [`ModuleRevision`]
///
/// Passed to `Module::update`, which swaps the built revision in as the
/// new current revision.
#[derive(Debug, Clone)]
pub struct RevisionBuilder {
    symbolic_name: String,
    version: String,
    capabilities: Vec<Capability>,
}

impl RevisionBuilder {
    pub fn new(symbolic_name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            symbolic_name: symbolic_name.into(),
            version: version.into(),
            capabilities: Vec::new(),
        }
    }

    pub fn symbolic_name(&self) -> &str {
        &self.symbolic_name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Adds a capability declaration
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    /// Declares the lazy activation policy on the built revision
    pub fn with_lazy_activation(self) -> Self {
        let capability = Capability::new(MODULE_DATA_NAMESPACE)
            .with_attribute(CAPABILITY_ACTIVATION_POLICY, ACTIVATION_POLICY_LAZY);
        self.with_capability(capability)
    }

    pub fn build(self) -> ModuleRevision {
        ModuleRevision {
            symbolic_name: self.symbolic_name,
            version: self.version,
            capabilities: self.capabilities,
        }
    }
}

/// The ordered revision history of a module, newest first
#[derive(Debug, Default)]
pub struct ModuleRevisions {
    revisions: RwLock<Vec<Arc<ModuleRevision>>>,
}

impl ModuleRevisions {
    pub(crate) fn new(initial: ModuleRevision) -> Self {
        Self {
            revisions: RwLock::new(vec![Arc::new(initial)]),
        }
    }

    /// Returns the current (newest) revision, if any
    pub fn current(&self) -> Option<Arc<ModuleRevision>> {
        self.revisions.read().first().cloned()
    }

    /// Installs a new current revision, retaining the older ones
    pub(crate) fn add(&self, revision: ModuleRevision) {
        self.revisions.write().insert(0, Arc::new(revision));
    }

    /// All revisions, newest first
    pub fn all(&self) -> Vec<Arc<ModuleRevision>> {
        self.revisions.read().clone()
    }

    pub fn count(&self) -> usize {
        self.revisions.read().len()
    }
}
