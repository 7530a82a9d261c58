//! The driver interface a plugin implements.
//!
//! A driver is one stream instance. The base [`Driver`] trait covers what
//! every stream has; reading, writing and seeking are separate capability
//! traits a driver opts into through `as_readable` / `as_writable` /
//! `as_seekable`.

use framelink_core::{BufferPool, Clock, DataKind, Frame, PluginResult, StreamUuid};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Capability flags advertised by a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub readable: bool,
    pub writable: bool,
    pub seekable: bool,
}

impl Capabilities {
    pub const SOURCE: Capabilities = Capabilities {
        readable: true,
        writable: false,
        seekable: false,
    };

    pub const SEEKABLE_SOURCE: Capabilities = Capabilities {
        readable: true,
        writable: false,
        seekable: true,
    };

    pub const SINK: Capabilities = Capabilities {
        readable: false,
        writable: true,
        seekable: false,
    };

    pub fn supports_read(&self) -> bool {
        self.readable
    }

    pub fn supports_write(&self) -> bool {
        self.writable
    }

    pub fn supports_seek(&self) -> bool {
        self.seekable
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags: Vec<&str> = [
            (self.readable, "read"),
            (self.writable, "write"),
            (self.seekable, "seek"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect();
        if flags.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&flags.join("+"))
        }
    }
}

/// Everything a factory gets to build one stream.
#[derive(Clone)]
pub struct DriverContext {
    pub uuid: StreamUuid,
    /// Configuration string exactly as passed to `open`.
    pub configuration: String,
    /// The stream's buffer pool. Frames must be allocated from it.
    pub pool: Arc<BufferPool>,
    pub clock: Arc<dyn Clock>,
}

impl fmt::Debug for DriverContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverContext")
            .field("uuid", &self.uuid)
            .field("configuration", &self.configuration)
            .field("pool", &self.pool.id())
            .finish_non_exhaustive()
    }
}

/// One stream instance produced by a plugin.
pub trait Driver: Send {
    fn kind(&self) -> DataKind;

    fn capabilities(&self) -> Capabilities;

    /// `Created -> Open`. Called once, right after construction.
    fn open(&mut self) -> PluginResult<()> {
        Ok(())
    }

    /// `Open -> Closed`. Called once; the stream is gone afterwards whatever
    /// this returns.
    fn close(&mut self) -> PluginResult<()> {
        Ok(())
    }

    /// Units ready but not yet consumed.
    fn queue_depth(&mut self) -> PluginResult<u64>;

    fn as_readable(&mut self) -> Option<&mut dyn Readable> {
        None
    }

    fn as_writable(&mut self) -> Option<&mut dyn Writable> {
        None
    }

    fn as_seekable(&mut self) -> Option<&mut dyn Seekable> {
        None
    }
}

/// A stream frames can be pulled from.
///
/// Implementations return a complete frame or an error, never a partially
/// filled one.
pub trait Readable {
    /// `Ok` when a read would succeed right now. No side effects.
    fn is_frame_ready(&mut self) -> PluginResult<()>;

    /// Next frame if one is available now, `FrameNotReady` otherwise.
    fn read(&mut self) -> PluginResult<Frame>;

    /// Waits up to `timeout` for the next frame. A zero timeout must behave
    /// exactly like [`Readable::read`].
    fn read_timeout(&mut self, timeout: Duration) -> PluginResult<Frame>;
}

pub trait Writable {
    /// Consumes `frame` entirely or not at all. `SmallBuffer` when the
    /// destination cannot hold it.
    fn write(&mut self, frame: &Frame) -> PluginResult<()>;
}

pub trait Seekable {
    /// The next successful read yields unit `index`.
    fn seek(&mut self, index: u64) -> PluginResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_display_flags() {
        assert_eq!(Capabilities::SEEKABLE_SOURCE.to_string(), "read+seek");
        assert_eq!(Capabilities::SINK.to_string(), "write");
        assert_eq!(Capabilities::default().to_string(), "none");
        assert!(Capabilities::SOURCE.supports_read());
        assert!(!Capabilities::SOURCE.supports_seek());
    }
}
