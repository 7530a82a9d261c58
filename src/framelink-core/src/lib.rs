//! Core model of the Framelink plugin protocol: return codes, frames and
//! their planes, per-stream buffer pools, stream identifiers and clocks, plus
//! the configuration and logging bootstrap shared by hosts.

pub mod clock;
pub mod codes;
pub mod config;
pub mod diagnostics;
pub mod format;
pub mod frame;
pub mod logging;
pub mod paths;
pub mod pool;
pub mod uuid;

pub use clock::{Clock, ManualClock, SystemClock};
pub use codes::{status_of, ErrorClass, PluginError, PluginResult, ReturnCode};
pub use config::{
    Config, ConfigError, HostConfig, LogLevel, LoggingConfig, StreamPreset, ValidationError,
};
pub use diagnostics::{dump_frame, FrameSummary};
pub use format::{ColourFormat, DataKind, PixelFormat, PlaneLayout, SampleFormat};
pub use frame::{Component, Frame, Rational, MAX_PLANES};
pub use logging::{init_logging, init_logging_in, LoggingError, LoggingGuard};
pub use paths::{AppDirs, DirsError};
pub use pool::{BufferPool, FrameBuffer, PoolId, PoolStats};
pub use uuid::StreamUuid;

pub const APP_NAME: &str = "framelink";
pub const APP_AUTHOR: &str = "Framelink";
pub const APP_QUALIFIER: &str = "io";

pub const PROTOCOL_VERSION_MAJOR: u32 = 0;
pub const PROTOCOL_VERSION_MINOR: u32 = 0;
pub const PROTOCOL_VERSION_PATCH: u32 = 2;

/// Combined version, `major * 10000 + minor * 100 + patch`.
pub const PROTOCOL_VERSION: u32 =
    PROTOCOL_VERSION_MAJOR * 10000 + PROTOCOL_VERSION_MINOR * 100 + PROTOCOL_VERSION_PATCH;

#[cfg(test)]
mod tests {
    #[test]
    fn combined_protocol_version() {
        assert_eq!(super::PROTOCOL_VERSION, 2);
    }
}
