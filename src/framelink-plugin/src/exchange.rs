//! Per-handle protocol operations.
//!
//! Every call looks the handle up, locks that stream alone and forwards to its
//! driver. Stale handles and streams caught mid-close report
//! `InstanceNotFound`; everything else is the driver's own result.

use crate::driver::Capabilities;
use crate::handles::{lock_stream, Handle, Stream, StreamState};
use crate::host::PluginHost;
use framelink_core::{
    BufferPool, DataKind, Frame, PluginError, PluginResult, PoolStats, StreamUuid,
};
use std::time::Duration;

/// What the host knows about one open stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub handle: Handle,
    pub plugin: String,
    pub uuid: StreamUuid,
    pub configuration: String,
    pub kind: DataKind,
    pub capabilities: Capabilities,
}

impl PluginHost {
    fn with_stream<T>(
        &self,
        handle: Handle,
        operation: &'static str,
        f: impl FnOnce(&mut Stream) -> PluginResult<T>,
    ) -> PluginResult<T> {
        let shared = self.table.get(handle)?;
        let mut stream = lock_stream(&shared);
        if stream.state != StreamState::Open {
            return Err(handle.not_found());
        }

        tracing::trace!(%handle, operation, "exchange");
        let result = f(&mut *stream);
        if let Err(err) = &result {
            if !err.is_transient() {
                tracing::debug!(%handle, operation, error = %err, "operation failed");
            }
        }
        result
    }

    /// `Ok` when a `read` would succeed right now.
    pub fn is_frame_ready(&self, handle: Handle) -> PluginResult<()> {
        self.with_stream(handle, "is_frame_ready", |stream| {
            stream
                .driver
                .as_readable()
                .ok_or_else(|| PluginError::unsupported("is_frame_ready"))?
                .is_frame_ready()
        })
    }

    /// Non-blocking read into `slot`. The slot is untouched on failure.
    pub fn read(&self, handle: Handle, slot: &mut Frame) -> PluginResult<()> {
        self.with_stream(handle, "read", |stream| {
            let frame = stream
                .driver
                .as_readable()
                .ok_or_else(|| PluginError::unsupported("read"))?
                .read()?;
            fill_slot(&stream.pool, stream.uuid, slot, frame)
        })
    }

    /// Like [`PluginHost::read`], but waits up to `timeout_ns` for a frame.
    pub fn read_timeout(&self, handle: Handle, slot: &mut Frame, timeout_ns: u64) -> PluginResult<()> {
        self.with_stream(handle, "read_timeout", |stream| {
            let frame = stream
                .driver
                .as_readable()
                .ok_or_else(|| PluginError::unsupported("read_timeout"))?
                .read_timeout(Duration::from_nanos(timeout_ns))?;
            fill_slot(&stream.pool, stream.uuid, slot, frame)
        })
    }

    pub fn write(&self, handle: Handle, frame: &Frame) -> PluginResult<()> {
        self.with_stream(handle, "write", |stream| {
            stream
                .driver
                .as_writable()
                .ok_or_else(|| PluginError::unsupported("write"))?
                .write(frame)
        })
    }

    /// Hands the slot's buffer back to the stream that issued it and empties
    /// the slot.
    pub fn free_frame(&self, handle: Handle, frame: &mut Frame) -> PluginResult<()> {
        self.with_stream(handle, "free_frame", |stream| {
            match frame.buffer_pool() {
                None => Err(PluginError::error("frame holds no buffer")),
                Some(id) if id != stream.pool.id() => Err(PluginError::error(format!(
                    "frame buffer was not issued by stream {handle}"
                ))),
                Some(_) => match frame.take_buffer() {
                    Some(buffer) => stream.pool.release(buffer),
                    None => Ok(()),
                },
            }
        })
    }

    pub fn seek(&self, handle: Handle, index: u64) -> PluginResult<()> {
        self.with_stream(handle, "seek", |stream| {
            stream
                .driver
                .as_seekable()
                .ok_or_else(|| PluginError::unsupported("seek"))?
                .seek(index)
        })
    }

    pub fn query_uuid(&self, handle: Handle) -> PluginResult<StreamUuid> {
        self.with_stream(handle, "query_uuid", |stream| Ok(stream.uuid))
    }

    /// Copies the configuration plus a NUL terminator into `buffer` and
    /// returns the configuration length.
    pub fn query_config(&self, handle: Handle, buffer: &mut [u8]) -> PluginResult<usize> {
        self.with_stream(handle, "query_config", |stream| {
            let bytes = stream.configuration.as_bytes();
            let required = bytes.len() + 1;
            if buffer.len() < required {
                return Err(PluginError::SmallBuffer {
                    required,
                    available: buffer.len(),
                });
            }
            buffer[..bytes.len()].copy_from_slice(bytes);
            buffer[bytes.len()] = 0;
            Ok(bytes.len())
        })
    }

    pub fn config(&self, handle: Handle) -> PluginResult<String> {
        self.with_stream(handle, "config", |stream| Ok(stream.configuration.clone()))
    }

    /// Units ready but not yet consumed.
    pub fn get_queue_depth(&self, handle: Handle) -> PluginResult<u64> {
        self.with_stream(handle, "get_queue_depth", |stream| stream.driver.queue_depth())
    }

    pub fn pool_stats(&self, handle: Handle) -> PluginResult<PoolStats> {
        self.with_stream(handle, "pool_stats", |stream| Ok(stream.pool.stats()))
    }

    pub fn stream_info(&self, handle: Handle) -> PluginResult<StreamInfo> {
        self.with_stream(handle, "stream_info", |stream| {
            Ok(StreamInfo {
                handle,
                plugin: stream.plugin.clone(),
                uuid: stream.uuid,
                configuration: stream.configuration.clone(),
                kind: stream.driver.kind(),
                capabilities: stream.driver.capabilities(),
            })
        })
    }
}

/// Moves a freshly produced frame into the caller's slot.
///
/// A buffer still in the slot is recycled when this stream issued it. A
/// produced frame that breaks the frame invariants is dropped and reported as
/// `Error`.
fn fill_slot(
    pool: &BufferPool,
    uuid: StreamUuid,
    slot: &mut Frame,
    mut frame: Frame,
) -> PluginResult<()> {
    frame.stream_uuid = uuid;
    if let Err(err) = frame.validate() {
        if let Some(buffer) = frame.take_buffer() {
            recycle(pool, buffer);
        }
        return Err(err);
    }

    if slot.buffer_pool() == Some(pool.id()) {
        if let Some(buffer) = slot.take_buffer() {
            recycle(pool, buffer);
        }
    }
    *slot = frame;
    Ok(())
}

fn recycle(pool: &BufferPool, buffer: framelink_core::FrameBuffer) {
    if buffer.pool_id() != pool.id() {
        return;
    }
    if let Err(err) = pool.release(buffer) {
        tracing::warn!(pool = pool.id().get(), error = %err, "buffer recycle failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{Driver, Readable};
    use crate::registry::{DriverDescriptor, DriverRegistry};
    use framelink_core::{HostConfig, ManualClock, PlaneLayout, Rational, ReturnCode};
    use std::sync::Arc;

    /// Produces one-byte ancillary frames on demand; `broken` frames carry a
    /// zero time base.
    struct Counter {
        pool: Arc<BufferPool>,
        next: u64,
        broken: bool,
    }

    impl Driver for Counter {
        fn kind(&self) -> DataKind {
            DataKind::Ancillary
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::SOURCE
        }

        fn queue_depth(&mut self) -> PluginResult<u64> {
            Ok(1)
        }

        fn as_readable(&mut self) -> Option<&mut dyn Readable> {
            Some(self)
        }
    }

    impl Readable for Counter {
        fn is_frame_ready(&mut self) -> PluginResult<()> {
            Ok(())
        }

        fn read(&mut self) -> PluginResult<Frame> {
            let mut frame = Frame::new(DataKind::Ancillary);
            frame.attach(self.pool.acquire(1), PlaneLayout::opaque(1))?;
            frame.frame_index = self.next;
            frame.time_base = if self.broken {
                Rational::new(1, 0)
            } else {
                Rational::new(1, 25)
            };
            self.next += 1;
            Ok(frame)
        }

        fn read_timeout(&mut self, _timeout: Duration) -> PluginResult<Frame> {
            self.read()
        }
    }

    fn host() -> PluginHost {
        let mut registry = DriverRegistry::new();
        registry
            .register_fn(
                DriverDescriptor::new("counter", DataKind::Ancillary, Capabilities::SOURCE, ""),
                |ctx| {
                    Ok(Box::new(Counter {
                        pool: ctx.pool,
                        next: 0,
                        broken: ctx.configuration == "broken",
                    }) as Box<dyn Driver>)
                },
            )
            .unwrap();
        PluginHost::with_settings(registry, HostConfig::default(), Arc::new(ManualClock::new()))
    }

    #[test]
    fn read_stamps_uuid_and_recycles_previous_buffer() {
        let host = host();
        let h = host.open("counter", "").unwrap();
        let uuid = host.query_uuid(h).unwrap();

        let mut slot = Frame::default();
        host.read(h, &mut slot).unwrap();
        assert_eq!(slot.stream_uuid, uuid);
        host.read(h, &mut slot).unwrap();
        assert_eq!(slot.frame_index, 1);

        let stats = host.pool_stats(h).unwrap();
        assert_eq!(stats.releases, 1);
        assert_eq!(stats.reuses, 0);
    }

    #[test]
    fn invalid_produced_frame_leaves_slot_alone() {
        let host = host();
        let h = host.open("counter", "broken").unwrap();
        let mut slot = Frame::default();
        let err = host.read(h, &mut slot).unwrap_err();
        assert_eq!(err.return_code(), ReturnCode::Error);
        assert_eq!(slot, Frame::default());
        assert_eq!(host.pool_stats(h).unwrap().releases, 1);
    }

    #[test]
    fn free_frame_checks_ownership() {
        let host = host();
        let a = host.open("counter", "").unwrap();
        let b = host.open("counter", "").unwrap();

        let mut frame = Frame::default();
        host.read(a, &mut frame).unwrap();
        assert_eq!(
            host.free_frame(b, &mut frame).unwrap_err().return_code(),
            ReturnCode::Error
        );
        assert!(frame.has_buffer());

        host.free_frame(a, &mut frame).unwrap();
        assert!(!frame.has_buffer());
        assert_eq!(
            host.free_frame(a, &mut frame).unwrap_err().return_code(),
            ReturnCode::Error
        );
        assert_eq!(host.pool_stats(a).unwrap().free, 1);
    }

    #[test]
    fn unsupported_capabilities_are_errors() {
        let host = host();
        let h = host.open("counter", "").unwrap();
        let frame = Frame::default();
        let err = host.write(h, &frame).unwrap_err();
        assert_eq!(err.return_code(), ReturnCode::Error);
        assert!(err.to_string().contains("write"));
        assert_eq!(
            host.seek(h, 3).unwrap_err().return_code(),
            ReturnCode::Error
        );
    }

    #[test]
    fn query_config_needs_room_for_terminator() {
        let host = host();
        let h = host.open("counter", "").unwrap();
        let mut empty = [0u8; 0];
        assert_eq!(
            host.query_config(h, &mut empty).unwrap_err(),
            PluginError::SmallBuffer {
                required: 1,
                available: 0
            }
        );
        let mut one = [0xffu8; 1];
        assert_eq!(host.query_config(h, &mut one).unwrap(), 0);
        assert_eq!(one, [0]);
    }

    #[test]
    fn stale_handle_is_not_found_everywhere() {
        let host = host();
        let h = host.open("counter", "").unwrap();
        let mut frame = Frame::default();
        host.read(h, &mut frame).unwrap();
        host.close(h).unwrap();

        let not_found = |r: PluginResult<()>| r.unwrap_err().return_code() == ReturnCode::InstanceNotFound;
        assert!(not_found(host.is_frame_ready(h)));
        assert!(not_found(host.read(h, &mut Frame::default())));
        assert!(not_found(host.free_frame(h, &mut frame)));
        assert!(not_found(host.seek(h, 0)));
        assert!(not_found(host.query_uuid(h).map(|_| ())));
        assert!(not_found(host.get_queue_depth(h).map(|_| ())));
        assert!(not_found(host.write(h, &frame)));
        assert!(not_found(host.read_timeout(h, &mut Frame::default(), 1_000_000)));
        assert!(not_found(host.query_config(h, &mut [0u8; 8]).map(|_| ())));
        assert!(not_found(host.config(h).map(|_| ())));
        // The frame outlives its stream as plain memory.
        assert_eq!(frame.buffer_size(), 1);
    }

    #[test]
    fn stream_info_reports_descriptor_fields() {
        let host = host();
        let h = host.open("counter", "").unwrap();
        let info = host.stream_info(h).unwrap();
        assert_eq!(info.plugin, "counter");
        assert_eq!(info.kind, DataKind::Ancillary);
        assert_eq!(info.capabilities, Capabilities::SOURCE);
        assert_eq!(info.handle, h);
    }
}
