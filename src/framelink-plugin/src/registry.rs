//! Name to factory lookup used by `open`.

use crate::driver::{Capabilities, Driver, DriverContext};
use crate::drivers;
use framelink_core::{DataKind, PluginError, PluginResult};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Static description of what a factory builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverDescriptor {
    pub name: String,
    pub kind: DataKind,
    pub capabilities: Capabilities,
    pub summary: String,
}

impl DriverDescriptor {
    pub fn new(
        name: impl Into<String>,
        kind: DataKind,
        capabilities: Capabilities,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            capabilities,
            summary: summary.into(),
        }
    }
}

/// Builds driver instances for one plugin name.
pub trait DriverFactory: Send + Sync {
    fn descriptor(&self) -> &DriverDescriptor;

    /// New, not yet opened, instance configured from `ctx.configuration`.
    fn create(&self, ctx: DriverContext) -> PluginResult<Box<dyn Driver>>;
}

/// Factory backed by a closure.
pub struct FnFactory<F> {
    descriptor: DriverDescriptor,
    create: F,
}

impl<F> FnFactory<F>
where
    F: Fn(DriverContext) -> PluginResult<Box<dyn Driver>> + Send + Sync,
{
    pub fn new(descriptor: DriverDescriptor, create: F) -> Self {
        Self { descriptor, create }
    }
}

impl<F> DriverFactory for FnFactory<F>
where
    F: Fn(DriverContext) -> PluginResult<Box<dyn Driver>> + Send + Sync,
{
    fn descriptor(&self) -> &DriverDescriptor {
        &self.descriptor
    }

    fn create(&self, ctx: DriverContext) -> PluginResult<Box<dyn Driver>> {
        (self.create)(ctx)
    }
}

#[derive(Clone, Default)]
pub struct DriverRegistry {
    factories: BTreeMap<String, Arc<dyn DriverFactory>>,
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every driver shipped with this crate.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for factory in drivers::builtin_factories() {
            // Names are distinct by construction.
            let _ = registry.register_arc(factory);
        }
        registry
    }

    pub fn register<F: DriverFactory + 'static>(&mut self, factory: F) -> PluginResult<()> {
        self.register_arc(Arc::new(factory))
    }

    pub fn register_fn<F>(&mut self, descriptor: DriverDescriptor, create: F) -> PluginResult<()>
    where
        F: Fn(DriverContext) -> PluginResult<Box<dyn Driver>> + Send + Sync + 'static,
    {
        self.register(FnFactory::new(descriptor, create))
    }

    fn register_arc(&mut self, factory: Arc<dyn DriverFactory>) -> PluginResult<()> {
        let name = factory.descriptor().name.clone();
        if name.is_empty() {
            return Err(PluginError::error("driver name must not be empty"));
        }
        if self.factories.contains_key(&name) {
            return Err(PluginError::error(format!(
                "driver '{name}' is already registered"
            )));
        }
        tracing::debug!(driver = %name, "registered driver");
        self.factories.insert(name, factory);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn DriverFactory>> {
        self.factories.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Descriptors sorted by name.
    pub fn descriptors(&self) -> Vec<DriverDescriptor> {
        self.factories
            .values()
            .map(|f| f.descriptor().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
