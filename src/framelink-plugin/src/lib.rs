//! Plugin side of the Framelink protocol.
//!
//! This crate provides:
//! - [`PluginHost`], which opens streams by plugin name and hands out integer
//!   [`Handle`]s for them
//! - The [`Driver`] trait and its capability traits ([`Readable`],
//!   [`Writable`], [`Seekable`]) that stream implementations provide
//! - A [`DriverRegistry`] mapping plugin names to factories, with built-in
//!   clocked test sources and a video sink
//! - [`boundary`] helpers that flatten results to the integer return-code
//!   convention
//!
//! # Usage
//!
//! ```rust,ignore
//! use framelink_core::Frame;
//! use framelink_plugin::PluginHost;
//!
//! let host = PluginHost::default();
//! let handle = host.open("video_src", "width=1920;height=1080;format=rgb24")?;
//! let mut frame = Frame::default();
//! host.read_timeout(handle, &mut frame, 1_000_000_000)?;
//! host.free_frame(handle, &mut frame)?;
//! host.close(handle)?;
//! ```

pub mod boundary;
pub mod contract;
pub mod driver;
pub mod drivers;
pub mod exchange;
pub mod handles;
pub mod host;
pub mod options;
pub mod registry;

pub use contract::{run_driver_contract, DriverContractError, DriverContractSpec};
pub use driver::{Capabilities, Driver, DriverContext, Readable, Seekable, Writable};
pub use exchange::StreamInfo;
pub use handles::{Handle, StreamState};
pub use host::PluginHost;
pub use options::{DriverOptions, OptionsError};
pub use registry::{DriverDescriptor, DriverFactory, DriverRegistry, FnFactory};
