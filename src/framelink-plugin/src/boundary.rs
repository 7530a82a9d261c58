//! Flattening of results to the integer convention: non-negative values are
//! results, negative values are [`ReturnCode`]s.

use crate::handles::Handle;
use framelink_core::{PluginResult, ReturnCode};

/// Handle on success, the failure's code otherwise.
pub fn handle_or_code(result: &PluginResult<Handle>) -> i32 {
    match result {
        Ok(handle) => handle.get(),
        Err(err) => err.return_code().code(),
    }
}

pub fn status_code(result: &PluginResult<()>) -> i32 {
    framelink_core::status_of(result).code()
}

/// Byte count on success. Lengths past `i32::MAX` cannot be represented and
/// report `SmallBuffer`.
pub fn length_or_code(result: &PluginResult<usize>) -> i32 {
    match result {
        Ok(len) => i32::try_from(*len).unwrap_or(ReturnCode::SmallBuffer.code()),
        Err(err) => err.return_code().code(),
    }
}

/// Queue depth on success, clamped to `i64::MAX` so it never reads as an
/// error code.
pub fn depth_or_code(result: &PluginResult<u64>) -> i64 {
    match result {
        Ok(depth) => i64::try_from(*depth).unwrap_or(i64::MAX),
        Err(err) => i64::from(err.return_code().code()),
    }
}
