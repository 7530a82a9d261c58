//! `video_src`: colour bars that scroll by one bar per frame.

use super::source::{ClockedSource, Pacing, Synth};
use crate::driver::{Capabilities, Driver, DriverContext};
use crate::options::{DriverOptions, OptionsError};
use crate::registry::{DriverDescriptor, DriverFactory};
use arrayvec::ArrayVec;
use framelink_core::{
    BufferPool, Component, DataKind, Frame, PixelFormat, PlaneLayout, PluginError, PluginResult,
    Rational,
};

pub const NAME: &str = "video_src";
pub const DEFAULT_FPS: Rational = Rational::new(25, 1);

/// 100% bars: white, yellow, cyan, green, magenta, red, blue, black.
const BARS: [[u8; 3]; 8] = [
    [255, 255, 255],
    [255, 255, 0],
    [0, 255, 255],
    [0, 255, 0],
    [255, 0, 255],
    [255, 0, 0],
    [0, 0, 255],
    [0, 0, 0],
];

/// Parses the `format` option shared by the video drivers.
pub(crate) fn take_pixel_format(options: &mut DriverOptions) -> Result<PixelFormat, OptionsError> {
    match options.take_str("format") {
        None => Ok(PixelFormat::Rgb24),
        Some(name) => PixelFormat::from_name(&name).ok_or_else(|| OptionsError::InvalidValue {
            key: "format".into(),
            value: name,
            reason: "unknown pixel format".into(),
        }),
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ColourBars {
    format: PixelFormat,
    width: u32,
    height: u32,
    fps: Rational,
    sar: Rational,
    layout: PlaneLayout,
}

impl ColourBars {
    pub(crate) fn from_options(options: &mut DriverOptions) -> PluginResult<Self> {
        let width = options.take_positive("width", None)?;
        let height = options.take_positive("height", None)?;
        let format = take_pixel_format(options)?;
        let fps = options.take_rational("fps", DEFAULT_FPS)?;
        let sar = options.take_rational("sar", Rational::new(1, 1))?;
        let layout = format
            .layout(width, height)
            .map_err(|err| PluginError::open_failed(err.to_string()))?;
        Ok(Self {
            format,
            width,
            height,
            fps,
            sar,
            layout,
        })
    }

    fn paint(&self, frame: &mut Frame, index: u64) -> PluginResult<()> {
        let components: ArrayVec<Component, { framelink_core::MAX_PLANES }> =
            frame.components().iter().copied().collect();
        for (plane, component) in components.iter().enumerate() {
            let row = self.row(plane, component, index);
            let bytes = frame
                .plane_mut(plane)
                .ok_or_else(|| PluginError::error(format!("plane {plane} is out of bounds")))?;
            for line in bytes.chunks_exact_mut(row.len()) {
                line.copy_from_slice(&row);
            }
        }
        Ok(())
    }

    /// Every row of a plane is identical, bars being vertical.
    fn row(&self, plane: usize, component: &Component, index: u64) -> Vec<u8> {
        let mut row = Vec::with_capacity(component.stride as usize);
        for element in 0..component.width {
            let x = u64::from(element) * u64::from(self.width) / u64::from(component.width);
            let bar = ((x * BARS.len() as u64 / u64::from(self.width)) + index) % BARS.len() as u64;
            row.extend_from_slice(&encode(self.format, plane, BARS[bar as usize]));
        }
        row
    }
}

/// BT.601 studio-range conversion.
fn yuv([r, g, b]: [u8; 3]) -> [u8; 3] {
    let (r, g, b) = (i32::from(r), i32::from(g), i32::from(b));
    let y = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
    let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
    let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
    [y as u8, u as u8, v as u8]
}

/// Bytes of one element of `plane` showing colour `rgb`.
fn encode(format: PixelFormat, plane: usize, rgb: [u8; 3]) -> ArrayVec<u8, 4> {
    let [r, g, b] = rgb;
    let [y, u, v] = yuv(rgb);
    let mut out = ArrayVec::new();
    match (format, plane) {
        (PixelFormat::Rgb24, _) => out.extend([r, g, b]),
        (PixelFormat::Bgr24, _) => out.extend([b, g, r]),
        (PixelFormat::Rgba, _) => out.extend([r, g, b, 255]),
        (PixelFormat::Bgra, _) => out.extend([b, g, r, 255]),
        (PixelFormat::Gray8, _) => out.push(y),
        (PixelFormat::Nv12, 0) => out.push(y),
        (PixelFormat::Nv12, _) => out.extend([u, v]),
        (PixelFormat::Yuv420p10, p) => {
            let sample = u16::from([y, u, v][p.min(2)]) << 2;
            out.extend(sample.to_le_bytes());
        }
        (_, 0) => out.push(y),
        (_, 1) => out.push(u),
        (_, 2) => out.push(v),
        // Alpha plane.
        (_, _) => out.push(255),
    }
    out
}

impl Synth for ColourBars {
    fn kind(&self) -> DataKind {
        DataKind::Video
    }

    fn rate(&self) -> Rational {
        self.fps
    }

    fn render(&mut self, index: u64, pool: &BufferPool) -> PluginResult<Frame> {
        let mut frame = Frame::new(DataKind::Video);
        frame.width = self.width;
        frame.height = self.height;
        frame.colour_format = self.format.colour_format();
        frame.has_alpha = self.format.has_alpha();
        frame.bit_depth = self.format.bit_depth();
        frame.is_planar = self.format.is_planar();
        frame.aspect_ratio = self.sar;
        frame.time_base = Rational::new(self.fps.denominator, self.fps.numerator);
        frame.set_format(self.format.name())?;

        frame.attach(pool.acquire(self.layout.buffer_size), self.layout.clone())?;
        self.paint(&mut frame, index)?;
        Ok(frame)
    }
}

pub(crate) struct VideoSourceFactory {
    descriptor: DriverDescriptor,
}

impl VideoSourceFactory {
    pub(crate) fn new() -> Self {
        Self {
            descriptor: DriverDescriptor::new(
                NAME,
                DataKind::Video,
                Capabilities::SEEKABLE_SOURCE,
                "colour bar test pattern",
            ),
        }
    }
}

impl DriverFactory for VideoSourceFactory {
    fn descriptor(&self) -> &DriverDescriptor {
        &self.descriptor
    }

    fn create(&self, ctx: DriverContext) -> PluginResult<Box<dyn Driver>> {
        let mut options = DriverOptions::parse(&ctx.configuration)?;
        let bars = ColourBars::from_options(&mut options)?;
        let pacing = Pacing::from_options(&mut options)?;
        options.finish()?;
        Ok(Box::new(ClockedSource::new(bars, pacing, &ctx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bars(config: &str) -> ColourBars {
        ColourBars::from_options(&mut DriverOptions::parse(config).unwrap()).unwrap()
    }

    #[test]
    fn rgb_bars_scroll_with_index() {
        let pool = BufferPool::default();
        let mut synth = bars("width=8;height=2;format=rgb24");

        let first = synth.render(0, &pool).unwrap();
        assert_eq!(&first.plane(0).unwrap()[..6], &[255, 255, 255, 255, 255, 0]);
        assert_eq!(first.format(), "rgb24");
        assert_eq!(first.time_base, Rational::new(1, 25));
        assert!(first.validate().is_ok());

        let second = synth.render(1, &pool).unwrap();
        assert_eq!(&second.plane(0).unwrap()[..3], &[255, 255, 0]);
        // Second row repeats the first.
        assert_eq!(&second.plane(0).unwrap()[24..27], &[255, 255, 0]);
    }

    #[test]
    fn planar_yuv_fills_every_plane() {
        let pool = BufferPool::default();
        let mut synth = bars("width=5;height=3;format=yuv420p");
        let frame = synth.render(0, &pool).unwrap();
        assert_eq!(frame.planes(), 3);
        assert!(frame.is_planar);
        // White: Y=235, U=V=128.
        assert_eq!(frame.plane(0).unwrap()[0], 235);
        assert_eq!(frame.plane(1).unwrap()[0], 128);
        assert_eq!(frame.plane(2).unwrap()[0], 128);
        assert_eq!(frame.plane(1).unwrap().len(), 3 * 2);
    }

    #[test]
    fn ten_bit_samples_are_little_endian() {
        let pool = BufferPool::default();
        let frame = bars("width=2;height=2;format=yuv420p10")
            .render(0, &pool)
            .unwrap();
        assert_eq!(frame.bit_depth, 10);
        assert_eq!(&frame.plane(0).unwrap()[..2], &(235u16 << 2).to_le_bytes());
    }

    #[test]
    fn alpha_plane_is_opaque() {
        let pool = BufferPool::default();
        let frame = bars("width=4;height=2;format=yuva420p").render(0, &pool).unwrap();
        assert!(frame.has_alpha);
        assert!(frame.plane(3).unwrap().iter().all(|&a| a == 255));
    }

    #[test]
    fn options_are_validated() {
        let parse = |c: &str| ColourBars::from_options(&mut DriverOptions::parse(c).unwrap());
        assert!(parse("height=2").is_err());
        assert!(parse("width=2;height=2;format=mjpeg").is_err());
        assert!(parse("width=2;height=2;sar=0:1").is_err());
        let synth = parse("width=2;height=2;fps=30000/1001;sar=16:11").unwrap();
        assert_eq!(synth.rate(), Rational::new(30000, 1001));
        assert_eq!(synth.sar, Rational::new(16, 11));
    }

    #[test]
    fn every_format_renders_a_valid_frame() {
        let pool = BufferPool::default();
        for format in PixelFormat::ALL {
            let config = format!("width=7;height=5;format={}", format.name());
            let frame = bars(&config).render(3, &pool).unwrap();
            assert!(frame.validate().is_ok(), "{config}");
            assert_eq!(frame.planes(), format.layout(7, 5).unwrap().planes());
        }
    }
}
