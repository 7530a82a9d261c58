//! The host object applications talk to.

use crate::driver::DriverContext;
use crate::handles::{lock_stream, Handle, HandleTable, Stream};
use crate::registry::{DriverDescriptor, DriverRegistry};
use framelink_core::{
    BufferPool, Clock, HostConfig, PluginError, PluginResult, StreamUuid, SystemClock,
};
use std::sync::Arc;

/// Owns the driver registry, the handle table and the clock every stream
/// runs on. All protocol operations go through it.
pub struct PluginHost {
    pub(crate) registry: DriverRegistry,
    pub(crate) table: HandleTable,
    pub(crate) clock: Arc<dyn Clock>,
    settings: HostConfig,
}

impl std::fmt::Debug for PluginHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHost")
            .field("registry", &self.registry)
            .field("open_streams", &self.table.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Default for PluginHost {
    fn default() -> Self {
        Self::new(DriverRegistry::with_builtin())
    }
}

impl PluginHost {
    pub fn new(registry: DriverRegistry) -> Self {
        Self::with_settings(registry, HostConfig::default(), Arc::new(SystemClock::new()))
    }

    pub fn with_settings(registry: DriverRegistry, settings: HostConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry,
            table: HandleTable::new(settings.max_streams.max(1)),
            clock,
            settings,
        }
    }

    /// Host on the built-in drivers driven by `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::with_settings(DriverRegistry::with_builtin(), HostConfig::default(), clock)
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    pub fn drivers(&self) -> Vec<DriverDescriptor> {
        self.registry.descriptors()
    }

    pub fn settings(&self) -> &HostConfig {
        &self.settings
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn open_handles(&self) -> Vec<Handle> {
        self.table.handles()
    }

    /// Opens a stream of `plugin_name`. Every call yields a new, independent
    /// instance.
    pub fn open(&self, plugin_name: &str, configuration: &str) -> PluginResult<Handle> {
        let result = self.open_stream(plugin_name, configuration);
        match &result {
            Ok(handle) => {
                tracing::debug!(%handle, plugin = plugin_name, "stream opened");
            }
            Err(err) => {
                tracing::warn!(plugin = plugin_name, error = %err, "stream open failed");
            }
        }
        result
    }

    fn open_stream(&self, plugin_name: &str, configuration: &str) -> PluginResult<Handle> {
        if configuration.contains('\0') {
            return Err(PluginError::open_failed("configuration contains a NUL byte"));
        }
        let factory = self
            .registry
            .resolve(plugin_name)
            .ok_or_else(|| PluginError::open_failed(format!("unknown plugin '{plugin_name}'")))?;

        let uuid = StreamUuid::new_v4();
        let pool = Arc::new(BufferPool::new(self.settings.max_free_buffers));
        let ctx = DriverContext {
            uuid,
            configuration: configuration.to_string(),
            pool: pool.clone(),
            clock: self.clock.clone(),
        };

        let driver = factory.create(ctx).map_err(into_open_failed)?;
        let mut stream = Stream::new(
            plugin_name.to_string(),
            uuid,
            configuration.to_string(),
            pool,
            driver,
        );
        stream.open().map_err(into_open_failed)?;

        self.table.insert(stream).map_err(|(err, mut rejected)| {
            if let Err(close_err) = rejected.close() {
                tracing::warn!(plugin = plugin_name, error = %close_err, "teardown of rejected stream failed");
            }
            err
        })
    }

    /// Closes `handle`. The handle is gone afterwards even when the driver's
    /// teardown fails.
    pub fn close(&self, handle: Handle) -> PluginResult<()> {
        let shared = self.table.remove(handle)?;
        let mut stream = lock_stream(&shared);
        match stream.close() {
            Ok(()) => {
                tracing::debug!(%handle, plugin = %stream.plugin, "stream closed");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(%handle, plugin = %stream.plugin, error = %err, "stream teardown failed");
                Err(PluginError::destroy_failed(err.to_string()))
            }
        }
    }
}

fn into_open_failed(err: PluginError) -> PluginError {
    match err {
        PluginError::OpenFailed { .. } => err,
        other => PluginError::open_failed(other.to_string()),
    }
}

impl Drop for PluginHost {
    fn drop(&mut self) {
        for (handle, shared) in self.table.drain() {
            let mut stream = lock_stream(&shared);
            if let Err(err) = stream.close() {
                tracing::warn!(%handle, error = %err, "stream teardown failed during host shutdown");
            }
        }
    }
}
