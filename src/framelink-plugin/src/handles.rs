//! Handle table: integer handles to live streams.
//!
//! The table lock is held only to insert, remove or clone out a stream; each
//! stream has its own mutex, so work on distinct handles never contends.

use crate::driver::Driver;
use framelink_core::{BufferPool, PluginError, PluginResult, StreamUuid};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// Opaque stream handle. Valid handles are never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(pub i32);

impl Handle {
    pub fn get(self) -> i32 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self.0 >= 0
    }

    pub(crate) fn not_found(self) -> PluginError {
        PluginError::InstanceNotFound {
            handle: i64::from(self.0),
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Created,
    Open,
    Closed,
}

/// A driver instance plus what the host keeps about it.
pub(crate) struct Stream {
    pub(crate) plugin: String,
    pub(crate) uuid: StreamUuid,
    pub(crate) configuration: String,
    pub(crate) pool: Arc<BufferPool>,
    pub(crate) state: StreamState,
    pub(crate) driver: Box<dyn Driver>,
}

impl Stream {
    pub(crate) fn new(
        plugin: String,
        uuid: StreamUuid,
        configuration: String,
        pool: Arc<BufferPool>,
        driver: Box<dyn Driver>,
    ) -> Self {
        Self {
            plugin,
            uuid,
            configuration,
            pool,
            state: StreamState::Created,
            driver,
        }
    }

    pub(crate) fn open(&mut self) -> PluginResult<()> {
        if self.state != StreamState::Created {
            return Err(PluginError::open_failed(format!(
                "stream is {:?}, cannot open",
                self.state
            )));
        }
        self.driver.open()?;
        self.state = StreamState::Open;
        Ok(())
    }

    /// Terminal. The state is `Closed` afterwards even if the driver fails.
    pub(crate) fn close(&mut self) -> PluginResult<()> {
        let previous = std::mem::replace(&mut self.state, StreamState::Closed);
        if previous == StreamState::Closed {
            return Ok(());
        }
        let result = self.driver.close();
        self.pool.clear();
        result
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("plugin", &self.plugin)
            .field("uuid", &self.uuid)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

pub(crate) type SharedStream = Arc<Mutex<Stream>>;

pub(crate) fn lock_stream(stream: &SharedStream) -> MutexGuard<'_, Stream> {
    stream.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct TableState {
    streams: HashMap<Handle, SharedStream>,
    next: i32,
}

#[derive(Debug)]
pub struct HandleTable {
    state: RwLock<TableState>,
    max_streams: usize,
}

impl HandleTable {
    pub fn new(max_streams: usize) -> Self {
        Self {
            state: RwLock::new(TableState::default()),
            max_streams,
        }
    }

    /// Stores `stream` under a fresh handle. A full table hands the stream
    /// back so the caller can tear it down.
    pub(crate) fn insert(&self, stream: Stream) -> Result<Handle, (PluginError, Stream)> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.streams.len() >= self.max_streams {
            let err = PluginError::open_failed(format!(
                "handle table full ({} streams)",
                self.max_streams
            ));
            return Err((err, stream));
        }

        // Terminates: fewer than i32::MAX + 1 handles can be live.
        let handle = loop {
            let candidate = Handle(state.next);
            state.next = if state.next == i32::MAX { 0 } else { state.next + 1 };
            if !state.streams.contains_key(&candidate) {
                break candidate;
            }
        };

        state
            .streams
            .insert(handle, Arc::new(Mutex::new(stream)));
        Ok(handle)
    }

    pub(crate) fn get(&self, handle: Handle) -> PluginResult<SharedStream> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state
            .streams
            .get(&handle)
            .cloned()
            .ok_or_else(|| handle.not_found())
    }

    pub(crate) fn remove(&self, handle: Handle) -> PluginResult<SharedStream> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state
            .streams
            .remove(&handle)
            .ok_or_else(|| handle.not_found())
    }

    /// Removes every entry, for host teardown.
    pub(crate) fn drain(&self) -> Vec<(Handle, SharedStream)> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let mut drained: Vec<_> = state.streams.drain().collect();
        drained.sort_by_key(|(handle, _)| *handle);
        drained
    }

    pub fn contains(&self, handle: Handle) -> bool {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.streams.contains_key(&handle)
    }

    /// Snapshot of the live handles, ascending.
    pub fn handles(&self) -> Vec<Handle> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut handles: Vec<_> = state.streams.keys().copied().collect();
        handles.sort();
        handles
    }

    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .streams
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_streams(&self) -> usize {
        self.max_streams
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Capabilities;
    use framelink_core::DataKind;

    struct Idle;

    impl Driver for Idle {
        fn kind(&self) -> DataKind {
            DataKind::Ancillary
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::default()
        }

        fn queue_depth(&mut self) -> PluginResult<u64> {
            Ok(0)
        }
    }

    fn stream() -> Stream {
        Stream::new(
            "idle".into(),
            StreamUuid::new_v4(),
            String::new(),
            Arc::new(BufferPool::default()),
            Box::new(Idle),
        )
    }

    #[test]
    fn handles_start_at_zero_and_increase() {
        let table = HandleTable::new(8);
        assert_eq!(table.insert(stream()).unwrap(), Handle(0));
        assert_eq!(table.insert(stream()).unwrap(), Handle(1));
        assert_eq!(table.handles(), vec![Handle(0), Handle(1)]);
    }

    #[test]
    fn removed_handle_is_not_found() {
        let table = HandleTable::new(8);
        let h = table.insert(stream()).unwrap();
        assert!(table.remove(h).is_ok());
        assert_eq!(
            table.remove(h).unwrap_err(),
            PluginError::InstanceNotFound { handle: 0 }
        );
        assert!(table.get(h).is_err());
        assert!(table.get(Handle(-5)).is_err());
    }

    #[test]
    fn wraps_around_and_skips_live_handles() {
        let table = HandleTable::new(8);
        let first = table.insert(stream()).unwrap();
        assert_eq!(first, Handle(0));
        table.state.write().unwrap().next = i32::MAX;

        assert_eq!(table.insert(stream()).unwrap(), Handle(i32::MAX));
        // 0 is still live, so the counter skips it after wrapping.
        assert_eq!(table.insert(stream()).unwrap(), Handle(1));
    }

    #[test]
    fn full_table_refuses_insert() {
        let table = HandleTable::new(1);
        table.insert(stream()).unwrap();
        let (err, rejected) = table.insert(stream()).unwrap_err();
        assert_eq!(err.return_code(), framelink_core::ReturnCode::OpenFailed);
        assert_eq!(rejected.plugin, "idle");
    }

    #[test]
    fn stream_lifecycle_is_one_way() {
        let mut s = stream();
        assert_eq!(s.state, StreamState::Created);
        s.open().unwrap();
        assert_eq!(s.state, StreamState::Open);
        assert!(s.open().is_err());
        s.close().unwrap();
        assert_eq!(s.state, StreamState::Closed);
        assert!(s.open().is_err());
    }

    #[test]
    fn handle_validity() {
        assert!(Handle(0).is_valid());
        assert!(!Handle(-198).is_valid());
    }
}
