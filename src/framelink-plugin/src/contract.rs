use crate::handles::Handle;
use crate::host::PluginHost;
use framelink_core::{Frame, PluginError, ReturnCode};
use std::time::Duration;
use thiserror::Error;

const READY_POLL: Duration = Duration::from_millis(1);

/// Inputs to the shared driver contract suite.
#[derive(Debug, Clone)]
pub struct DriverContractSpec {
    /// Registered plugin name.
    pub plugin: String,
    /// Configuration the stream is opened with.
    pub configuration: String,
    /// Frames to pull while checking ordering and bounds.
    pub frames: usize,
    /// Timeout for each read.
    pub timeout: Duration,
}

impl DriverContractSpec {
    pub fn new(plugin: impl Into<String>, configuration: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            configuration: configuration.into(),
            frames: 4,
            timeout: Duration::from_secs(1),
        }
    }
}

/// Errors surfaced by the driver contract harness.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DriverContractError {
    #[error("open returned negative handle {0}")]
    NegativeHandle(i32),
    #[error("query_config returned {actual:?}, expected {expected:?}")]
    ConfigMismatch { expected: String, actual: String },
    #[error("uuid changed during the stream's life")]
    UuidChanged,
    #[error("driver is not readable")]
    NotReadable,
    #[error("is_frame_ready said ready but read returned {0}")]
    ReadyButNotRead(ReturnCode),
    #[error("no frame became ready within {0:?}")]
    NeverReady(Duration),
    #[error("zero-timeout read returned {zero} while read returned {plain}")]
    ZeroTimeoutDiffers { zero: ReturnCode, plain: ReturnCode },
    #[error("frame {index} is malformed: {reason}")]
    MalformedFrame { index: u64, reason: String },
    #[error("frame index went backwards: {previous} then {current}")]
    IndexWentBackwards { previous: u64, current: u64 },
    #[error("{operation} on a closed handle returned {actual}, expected InstanceNotFound")]
    StaleHandle {
        operation: &'static str,
        actual: ReturnCode,
    },
    #[error("driver error while running contract: {0}")]
    DriverFailure(String),
}

fn failure(err: PluginError) -> DriverContractError {
    DriverContractError::DriverFailure(err.to_string())
}

fn code_of<T>(result: &Result<T, PluginError>) -> ReturnCode {
    match result {
        Ok(_) => ReturnCode::Ok,
        Err(err) => err.return_code(),
    }
}

/// Run the shared contract suite against a readable driver registered in
/// `host`.
///
/// The stream is opened and closed by the suite itself, so the host's clock
/// decides how long this takes.
pub fn run_driver_contract(
    host: &PluginHost,
    spec: &DriverContractSpec,
) -> Result<(), DriverContractError> {
    let handle = host
        .open(&spec.plugin, &spec.configuration)
        .map_err(failure)?;
    if !handle.is_valid() {
        return Err(DriverContractError::NegativeHandle(handle.get()));
    }

    let checks = verify_config(host, handle, spec)
        .and_then(|()| verify_readiness(host, handle, spec))
        .and_then(|()| verify_frames(host, handle, spec));
    if let Err(err) = checks {
        let _ = host.close(handle);
        return Err(err);
    }

    host.close(handle).map_err(failure)?;
    verify_stale(host, handle)
}

fn verify_config(
    host: &PluginHost,
    handle: Handle,
    spec: &DriverContractSpec,
) -> Result<(), DriverContractError> {
    let mut buffer = vec![0u8; spec.configuration.len() + 1];
    let len = host.query_config(handle, &mut buffer).map_err(failure)?;
    let actual = String::from_utf8_lossy(&buffer[..len]).into_owned();
    if actual != spec.configuration {
        return Err(DriverContractError::ConfigMismatch {
            expected: spec.configuration.clone(),
            actual,
        });
    }
    Ok(())
}

fn verify_readiness(
    host: &PluginHost,
    handle: Handle,
    spec: &DriverContractSpec,
) -> Result<(), DriverContractError> {
    let info = host.stream_info(handle).map_err(failure)?;
    if !info.capabilities.supports_read() {
        return Err(DriverContractError::NotReadable);
    }

    // Readiness and a plain read must agree, and a zero-timeout read must not
    // differ from a plain one.
    let ready = host.is_frame_ready(handle);
    let mut frame = Frame::default();
    let zero = host.read_timeout(handle, &mut frame, 0);
    if ready.is_ok() && zero.is_err() {
        return Err(DriverContractError::ReadyButNotRead(code_of(&zero)));
    }
    if zero.is_ok() {
        host.free_frame(handle, &mut frame).map_err(failure)?;
    }

    let ready = host.is_frame_ready(handle);
    let plain = host.read(handle, &mut frame);
    if ready.is_ok() && plain.is_err() {
        return Err(DriverContractError::ReadyButNotRead(code_of(&plain)));
    }
    if zero.is_err() && plain.is_err() && code_of(&zero) != code_of(&plain) {
        return Err(DriverContractError::ZeroTimeoutDiffers {
            zero: code_of(&zero),
            plain: code_of(&plain),
        });
    }
    if plain.is_ok() {
        host.free_frame(handle, &mut frame).map_err(failure)?;
    }

    // Wait on the host clock until the driver reports a frame, then hold it
    // to its word.
    let clock = host.clock();
    let deadline = clock.now() + spec.timeout;
    loop {
        match host.is_frame_ready(handle) {
            Ok(()) => break,
            Err(PluginError::FrameNotReady) if clock.now() < deadline => {
                clock.sleep(READY_POLL);
            }
            Err(PluginError::FrameNotReady) => {
                return Err(DriverContractError::NeverReady(spec.timeout))
            }
            Err(err) => return Err(failure(err)),
        }
    }
    let after_ready = host.read(handle, &mut frame);
    if after_ready.is_err() {
        return Err(DriverContractError::ReadyButNotRead(code_of(&after_ready)));
    }
    host.free_frame(handle, &mut frame).map_err(failure)?;
    Ok(())
}

fn verify_frames(
    host: &PluginHost,
    handle: Handle,
    spec: &DriverContractSpec,
) -> Result<(), DriverContractError> {
    let uuid = host.query_uuid(handle).map_err(failure)?;
    let timeout_ns = u64::try_from(spec.timeout.as_nanos()).unwrap_or(u64::MAX);
    let mut previous: Option<u64> = None;
    let mut frame = Frame::default();

    for _ in 0..spec.frames {
        match host.read_timeout(handle, &mut frame, timeout_ns) {
            Ok(()) => {}
            // A finite stream may run dry.
            Err(PluginError::FrameNotReady) => break,
            Err(err) => return Err(failure(err)),
        }

        if let Err(err) = frame.validate() {
            return Err(DriverContractError::MalformedFrame {
                index: frame.frame_index,
                reason: err.to_string(),
            });
        }
        if frame.stream_uuid != uuid {
            return Err(DriverContractError::UuidChanged);
        }
        if let Some(prev) = previous {
            if frame.frame_index < prev {
                return Err(DriverContractError::IndexWentBackwards {
                    previous: prev,
                    current: frame.frame_index,
                });
            }
        }
        previous = Some(frame.frame_index);
        host.free_frame(handle, &mut frame).map_err(failure)?;
    }

    if host.query_uuid(handle).map_err(failure)? != uuid {
        return Err(DriverContractError::UuidChanged);
    }
    Ok(())
}

fn verify_stale(host: &PluginHost, handle: Handle) -> Result<(), DriverContractError> {
    let mut frame = Frame::default();
    let outcomes = [
        ("close", code_of(&host.close(handle))),
        ("read", code_of(&host.read(handle, &mut frame))),
        ("is_frame_ready", code_of(&host.is_frame_ready(handle))),
        ("query_uuid", code_of(&host.query_uuid(handle))),
        ("get_queue_depth", code_of(&host.get_queue_depth(handle))),
    ];
    for (operation, actual) in outcomes {
        if actual != ReturnCode::InstanceNotFound {
            return Err(DriverContractError::StaleHandle { operation, actual });
        }
    }
    Ok(())
}
