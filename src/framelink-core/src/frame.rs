//! In-memory representation of one media frame.

use crate::codes::{PluginError, PluginResult};
use crate::format::{ColourFormat, DataKind, PlaneLayout};
use crate::pool::{FrameBuffer, PoolId};
use crate::uuid::StreamUuid;
use arrayvec::{ArrayString, ArrayVec};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MAX_PLANES: usize = 4;
/// Longest format name, in bytes.
pub const MAX_FORMAT_LEN: usize = 31;
/// Longest diagnostic message, in bytes.
pub const MAX_LOG_MESSAGE_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    pub numerator: u64,
    pub denominator: u64,
}

impl Rational {
    pub const fn new(numerator: u64, denominator: u64) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.denominator != 0
    }

    pub fn as_f64(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    /// `value * self` in nanoseconds, saturating. `None` for a zero denominator.
    pub fn scale_to_nanos(&self, value: u64) -> Option<u64> {
        if self.denominator == 0 {
            return None;
        }
        let nanos = (value as u128) * (self.numerator as u128) * 1_000_000_000u128
            / (self.denominator as u128);
        Some(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// View of one plane inside the frame's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Component {
    /// Byte offset of the plane in the buffer.
    pub offset: usize,
    /// Byte length of the plane.
    pub length: usize,
    /// Bytes per row (video) or per sample frame (audio).
    pub stride: u32,
    /// Elements per row.
    pub width: u32,
    pub bytes_per_element: u32,
}

impl Component {
    pub fn end(&self) -> Option<usize> {
        self.offset.checked_add(self.length)
    }
}

/// Short text stored inline with a hard capacity.
///
/// Assigning longer text fails with `SmallBuffer`; nothing is truncated.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BoundedText<const N: usize>(ArrayString<N>);

impl<const N: usize> BoundedText<N> {
    pub fn new(text: &str) -> PluginResult<Self> {
        ArrayString::from(text)
            .map(Self)
            .map_err(|_| PluginError::SmallBuffer {
                required: text.len(),
                available: N,
            })
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub const fn capacity() -> usize {
        N
    }
}

impl<const N: usize> fmt::Debug for BoundedText<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.0.as_str(), f)
    }
}

impl<const N: usize> fmt::Display for BoundedText<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

pub type FormatName = BoundedText<MAX_FORMAT_LEN>;
pub type LogMessage = BoundedText<MAX_LOG_MESSAGE_LEN>;

/// One unit of media data.
///
/// A default frame is an empty slot: no data kind, no buffer. Reads fill a
/// slot; `free_frame` empties it again and hands the buffer back to the
/// stream that issued it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub data_kind: DataKind,

    pub channels: u32,
    pub nb_samples: u32,

    pub width: u32,
    pub height: u32,
    pub colour_format: ColourFormat,
    pub has_alpha: bool,
    pub aspect_ratio: Rational,
    pub bit_depth: u32,
    pub is_planar: bool,

    format: FormatName,
    buffer: Option<FrameBuffer>,
    components: ArrayVec<Component, MAX_PLANES>,

    pub stream_uuid: StreamUuid,
    pub frame_index: u64,
    /// TAI nanoseconds since 1970 at which the source created the frame.
    pub origination_time: u64,
    pub time_base: Rational,

    log_message: LogMessage,
}

impl Frame {
    pub fn new(data_kind: DataKind) -> Self {
        Self {
            data_kind,
            ..Self::default()
        }
    }

    /// Attaches a buffer and the components laid out in it.
    ///
    /// Fails without touching the frame when the layout does not fit the
    /// buffer.
    pub fn attach(&mut self, buffer: FrameBuffer, layout: PlaneLayout) -> PluginResult<()> {
        check_components(&layout.components, buffer.len())?;
        self.buffer = Some(buffer);
        self.components = layout.components;
        Ok(())
    }

    /// Takes the buffer out, leaving an empty slot behind.
    pub fn take_buffer(&mut self) -> Option<FrameBuffer> {
        let buffer = self.buffer.take();
        *self = Frame::default();
        buffer
    }

    pub fn buffer(&self) -> Option<&[u8]> {
        self.buffer.as_ref().map(FrameBuffer::as_slice)
    }

    pub fn buffer_mut(&mut self) -> Option<&mut [u8]> {
        self.buffer.as_mut().map(FrameBuffer::as_mut_slice)
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer.as_ref().map_or(0, FrameBuffer::len)
    }

    pub fn buffer_pool(&self) -> Option<PoolId> {
        self.buffer.as_ref().map(FrameBuffer::pool_id)
    }

    pub fn has_buffer(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn planes(&self) -> usize {
        self.components.len()
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Bytes of plane `index`.
    pub fn plane(&self, index: usize) -> Option<&[u8]> {
        let component = self.components.get(index)?;
        let buffer = self.buffer.as_ref()?.as_slice();
        buffer.get(component.offset..component.end()?)
    }

    pub fn plane_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        let component = *self.components.get(index)?;
        let buffer = self.buffer.as_mut()?.as_mut_slice();
        buffer.get_mut(component.offset..component.end()?)
    }

    pub fn format(&self) -> &str {
        self.format.as_str()
    }

    pub fn set_format(&mut self, name: &str) -> PluginResult<()> {
        self.format = FormatName::new(name)?;
        Ok(())
    }

    pub fn log_message(&self) -> &str {
        self.log_message.as_str()
    }

    pub fn set_log_message(&mut self, message: &str) -> PluginResult<()> {
        self.log_message = LogMessage::new(message)?;
        Ok(())
    }

    /// Presentation time, `frame_index * time_base`, in nanoseconds.
    pub fn presentation_time_ns(&self) -> Option<u64> {
        self.time_base.scale_to_nanos(self.frame_index)
    }

    /// Checks the structural invariants of a populated frame.
    pub fn validate(&self) -> PluginResult<()> {
        let buffer = self
            .buffer
            .as_ref()
            .ok_or_else(|| PluginError::error("frame has no buffer"))?;

        if self.data_kind == DataKind::None {
            return Err(PluginError::error("frame has no data kind"));
        }
        if self.components.is_empty() {
            return Err(PluginError::error("frame has no components"));
        }
        check_components(&self.components, buffer.len())?;

        if !self.is_planar && self.components.len() != 1 {
            return Err(PluginError::error(format!(
                "packed frame with {} components",
                self.components.len()
            )));
        }
        if !self.time_base.is_valid() {
            return Err(PluginError::error("time base has a zero denominator"));
        }
        if self.data_kind == DataKind::Video && !self.aspect_ratio.is_valid() {
            return Err(PluginError::error("aspect ratio has a zero denominator"));
        }
        Ok(())
    }
}

/// Components must lie inside the buffer and must not overlap.
fn check_components(components: &[Component], buffer_size: usize) -> PluginResult<()> {
    if components.is_empty() || components.len() > MAX_PLANES {
        return Err(PluginError::error(format!(
            "frame must have 1..={MAX_PLANES} components, got {}",
            components.len()
        )));
    }

    for (i, c) in components.iter().enumerate() {
        let end = c
            .end()
            .filter(|&end| end <= buffer_size)
            .ok_or_else(|| {
                PluginError::error(format!(
                    "component {i} ({}+{}) exceeds buffer of {buffer_size} bytes",
                    c.offset, c.length
                ))
            })?;
        for (j, other) in components.iter().enumerate().skip(i + 1) {
            let other_end = other.end().unwrap_or(usize::MAX);
            if c.length > 0 && other.length > 0 && c.offset < other_end && other.offset < end {
                return Err(PluginError::error(format!(
                    "components {i} and {j} overlap"
                )));
            }
        }
    }
    Ok(())
}
