//! Pixel and sample formats, and the plane layouts derived from them.
//!
//! Plane sizing: a plane subsampled by `h` horizontally and `v` vertically
//! holds `ceil(width / h)` elements per row and `ceil(height / v)` rows. Rows
//! are tightly packed (`stride = width_elems * bytes_per_element`) and planes
//! follow each other with no padding.

use crate::codes::{PluginError, PluginResult};
use crate::frame::{Component, MAX_PLANES};
use arrayvec::ArrayVec;
use serde::{Deserialize, Serialize};

/// What a frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    #[default]
    None,
    Video,
    Audio,
    Ancillary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColourFormat {
    #[default]
    Rgb,
    Yuv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PlaneSpec {
    h_sub: u32,
    v_sub: u32,
    bytes_per_element: u32,
}

const fn plane(h_sub: u32, v_sub: u32, bytes_per_element: u32) -> PlaneSpec {
    PlaneSpec {
        h_sub,
        v_sub,
        bytes_per_element,
    }
}

const PACKED_3: &[PlaneSpec] = &[plane(1, 1, 3)];
const PACKED_4: &[PlaneSpec] = &[plane(1, 1, 4)];
const GRAY: &[PlaneSpec] = &[plane(1, 1, 1)];
const YUV420: &[PlaneSpec] = &[plane(1, 1, 1), plane(2, 2, 1), plane(2, 2, 1)];
const YUV422: &[PlaneSpec] = &[plane(1, 1, 1), plane(2, 1, 1), plane(2, 1, 1)];
const YUV444: &[PlaneSpec] = &[plane(1, 1, 1), plane(1, 1, 1), plane(1, 1, 1)];
// Second plane holds interleaved Cb/Cr pairs, one element per pair.
const NV12: &[PlaneSpec] = &[plane(1, 1, 1), plane(2, 2, 2)];
const YUV420_10: &[PlaneSpec] = &[plane(1, 1, 2), plane(2, 2, 2), plane(2, 2, 2)];
const YUVA420: &[PlaneSpec] = &[
    plane(1, 1, 1),
    plane(2, 2, 1),
    plane(2, 2, 1),
    plane(1, 1, 1),
];

/// Video formats understood by the built-in drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    Rgba,
    Bgra,
    Gray8,
    Yuv420p,
    Yuv422p,
    Yuv444p,
    Nv12,
    Yuv420p10,
    Yuva420p,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 11] = [
        PixelFormat::Rgb24,
        PixelFormat::Bgr24,
        PixelFormat::Rgba,
        PixelFormat::Bgra,
        PixelFormat::Gray8,
        PixelFormat::Yuv420p,
        PixelFormat::Yuv422p,
        PixelFormat::Yuv444p,
        PixelFormat::Nv12,
        PixelFormat::Yuv420p10,
        PixelFormat::Yuva420p,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PixelFormat::Rgb24 => "rgb24",
            PixelFormat::Bgr24 => "bgr24",
            PixelFormat::Rgba => "rgba",
            PixelFormat::Bgra => "bgra",
            PixelFormat::Gray8 => "gray8",
            PixelFormat::Yuv420p => "yuv420p",
            PixelFormat::Yuv422p => "yuv422p",
            PixelFormat::Yuv444p => "yuv444p",
            PixelFormat::Nv12 => "nv12",
            PixelFormat::Yuv420p10 => "yuv420p10",
            PixelFormat::Yuva420p => "yuva420p",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(name))
    }

    pub fn colour_format(self) -> ColourFormat {
        match self {
            PixelFormat::Rgb24
            | PixelFormat::Bgr24
            | PixelFormat::Rgba
            | PixelFormat::Bgra
            | PixelFormat::Gray8 => ColourFormat::Rgb,
            _ => ColourFormat::Yuv,
        }
    }

    pub fn has_alpha(self) -> bool {
        matches!(
            self,
            PixelFormat::Rgba | PixelFormat::Bgra | PixelFormat::Yuva420p
        )
    }

    pub fn bit_depth(self) -> u32 {
        match self {
            PixelFormat::Yuv420p10 => 10,
            _ => 8,
        }
    }

    pub fn is_planar(self) -> bool {
        self.planes().len() > 1
    }

    fn planes(self) -> &'static [PlaneSpec] {
        match self {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => PACKED_3,
            PixelFormat::Rgba | PixelFormat::Bgra => PACKED_4,
            PixelFormat::Gray8 => GRAY,
            PixelFormat::Yuv420p => YUV420,
            PixelFormat::Yuv422p => YUV422,
            PixelFormat::Yuv444p => YUV444,
            PixelFormat::Nv12 => NV12,
            PixelFormat::Yuv420p10 => YUV420_10,
            PixelFormat::Yuva420p => YUVA420,
        }
    }

    /// Component layout of a `width` x `height` picture in this format.
    pub fn layout(self, width: u32, height: u32) -> PluginResult<PlaneLayout> {
        if width == 0 || height == 0 {
            return Err(PluginError::error(format!(
                "invalid picture size {width}x{height}"
            )));
        }

        let mut components = ArrayVec::new();
        let mut offset = 0usize;
        for spec in self.planes() {
            let elems = width.div_ceil(spec.h_sub);
            let rows = height.div_ceil(spec.v_sub);
            let stride = elems
                .checked_mul(spec.bytes_per_element)
                .ok_or_else(|| overflow(width, height))?;
            let length = (stride as usize)
                .checked_mul(rows as usize)
                .ok_or_else(|| overflow(width, height))?;
            components.push(Component {
                offset,
                length,
                stride,
                width: elems,
                bytes_per_element: spec.bytes_per_element,
            });
            offset = offset
                .checked_add(length)
                .ok_or_else(|| overflow(width, height))?;
        }

        if offset > u32::MAX as usize {
            return Err(overflow(width, height));
        }

        Ok(PlaneLayout {
            components,
            buffer_size: offset,
        })
    }
}

fn overflow(width: u32, height: u32) -> PluginError {
    PluginError::error(format!("picture size {width}x{height} overflows a frame buffer"))
}

/// Audio sample encodings. Samples are always interleaved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    S16,
    S32,
    F32,
}

impl SampleFormat {
    pub const ALL: [SampleFormat; 3] = [SampleFormat::S16, SampleFormat::S32, SampleFormat::F32];

    pub fn name(self) -> &'static str {
        match self {
            SampleFormat::S16 => "s16",
            SampleFormat::S32 => "s32",
            SampleFormat::F32 => "f32",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(name))
    }

    pub fn bytes_per_sample(self) -> u32 {
        match self {
            SampleFormat::S16 => 2,
            SampleFormat::S32 | SampleFormat::F32 => 4,
        }
    }

    pub fn bit_depth(self) -> u32 {
        self.bytes_per_sample() * 8
    }

    /// Single interleaved component holding `samples` per channel.
    pub fn layout(self, channels: u32, samples: u32) -> PluginResult<PlaneLayout> {
        if channels == 0 || samples == 0 {
            return Err(PluginError::error(format!(
                "invalid audio shape: {channels} channels x {samples} samples"
            )));
        }
        let bpe = self.bytes_per_sample();
        let stride = channels
            .checked_mul(bpe)
            .ok_or_else(|| PluginError::error("audio frame too large"))?;
        let length = (stride as u64) * (samples as u64);
        if length > u32::MAX as u64 {
            return Err(PluginError::error("audio frame too large"));
        }

        let mut components = ArrayVec::new();
        components.push(Component {
            offset: 0,
            length: length as usize,
            stride,
            width: samples,
            bytes_per_element: bpe,
        });
        Ok(PlaneLayout {
            components,
            buffer_size: length as usize,
        })
    }
}

/// Components of one frame and the buffer size they add up to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaneLayout {
    pub components: ArrayVec<Component, MAX_PLANES>,
    pub buffer_size: usize,
}

impl PlaneLayout {
    /// A single opaque payload, as carried by ancillary frames.
    pub fn opaque(len: usize) -> Self {
        let mut components = ArrayVec::new();
        components.push(Component {
            offset: 0,
            length: len,
            stride: len as u32,
            width: len as u32,
            bytes_per_element: 1,
        });
        Self {
            components,
            buffer_size: len,
        }
    }

    pub fn planes(&self) -> usize {
        self.components.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_rgb_is_one_component() {
        let layout = PixelFormat::Rgb24.layout(1920, 1080).unwrap();
        assert_eq!(layout.planes(), 1);
        assert_eq!(layout.components[0].stride, 1920 * 3);
        assert_eq!(layout.buffer_size, 1920 * 1080 * 3);
        assert!(!PixelFormat::Rgb24.is_planar());
    }

    #[test]
    fn yuv420p_rounds_odd_dimensions_up() {
        let layout = PixelFormat::Yuv420p.layout(5, 3).unwrap();
        let sizes: Vec<_> = layout.components.iter().map(|c| c.length).collect();
        // Luma 5x3, chroma 3x2 each.
        assert_eq!(sizes, vec![15, 6, 6]);
        assert_eq!(layout.components[1].offset, 15);
        assert_eq!(layout.components[2].offset, 21);
        assert_eq!(layout.buffer_size, 27);
    }

    #[test]
    fn nv12_packs_chroma_pairs() {
        let layout = PixelFormat::Nv12.layout(4, 4).unwrap();
        assert_eq!(layout.planes(), 2);
        assert_eq!(layout.components[1].width, 2);
        assert_eq!(layout.components[1].stride, 4);
        assert_eq!(layout.buffer_size, 16 + 8);
    }

    #[test]
    fn high_bit_depth_uses_two_bytes() {
        let layout = PixelFormat::Yuv420p10.layout(2, 2).unwrap();
        assert_eq!(layout.components[0].bytes_per_element, 2);
        assert_eq!(layout.buffer_size, 8 + 2 + 2);
        assert_eq!(PixelFormat::Yuv420p10.bit_depth(), 10);
    }

    #[test]
    fn alpha_formats_have_four_planes() {
        let layout = PixelFormat::Yuva420p.layout(2, 2).unwrap();
        assert_eq!(layout.planes(), 4);
        assert!(PixelFormat::Yuva420p.has_alpha());
    }

    #[test]
    fn zero_dimensions_rejected() {
        assert!(PixelFormat::Gray8.layout(0, 10).is_err());
        assert!(SampleFormat::S16.layout(2, 0).is_err());
    }

    #[test]
    fn audio_size_is_samples_times_channels_times_width() {
        let layout = SampleFormat::S16.layout(2, 1024).unwrap();
        assert_eq!(layout.buffer_size, 1024 * 2 * 2);
        assert_eq!(layout.components[0].stride, 4);
    }

    #[test]
    fn every_format_has_a_plane_table() {
        for f in PixelFormat::ALL {
            let layout = f.layout(6, 4).unwrap();
            assert_eq!(layout.planes(), f.planes().len(), "{}", f.name());
            assert_eq!(f.is_planar(), layout.planes() > 1);
            let last = layout.components.last().unwrap();
            assert_eq!(last.offset + last.length, layout.buffer_size);
        }
    }

    #[test]
    fn names_round_trip() {
        for f in PixelFormat::ALL {
            assert_eq!(PixelFormat::from_name(f.name()), Some(f));
        }
        assert_eq!(PixelFormat::from_name("RGB24"), Some(PixelFormat::Rgb24));
        assert_eq!(SampleFormat::from_name("f32"), Some(SampleFormat::F32));
        assert_eq!(PixelFormat::from_name("hevc"), None);
    }
}
