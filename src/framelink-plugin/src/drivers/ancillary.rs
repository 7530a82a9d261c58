//! `anc_src`: one `HH:MM:SS:FF` timecode per unit.

use super::source::{ClockedSource, Pacing, Synth};
use crate::driver::{Capabilities, Driver, DriverContext};
use crate::options::DriverOptions;
use crate::registry::{DriverDescriptor, DriverFactory};
use framelink_core::{BufferPool, DataKind, Frame, PlaneLayout, PluginResult, Rational};

pub const NAME: &str = "anc_src";
pub const FORMAT: &str = "timecode";

#[derive(Debug, Clone)]
pub(crate) struct Timecode {
    fps: Rational,
    /// Frames per timecode second, the rate rounded up (30000/1001 counts 30).
    nominal: u64,
}

impl Timecode {
    pub(crate) fn new(fps: Rational) -> Self {
        let nominal = fps.numerator.div_ceil(fps.denominator).max(1);
        Self { fps, nominal }
    }

    pub(crate) fn label(&self, index: u64) -> String {
        let ff = index % self.nominal;
        let total_secs = index / self.nominal;
        let ss = total_secs % 60;
        let mm = (total_secs / 60) % 60;
        let hh = (total_secs / 3600) % 24;
        format!("{hh:02}:{mm:02}:{ss:02}:{ff:02}")
    }
}

impl Synth for Timecode {
    fn kind(&self) -> DataKind {
        DataKind::Ancillary
    }

    fn rate(&self) -> Rational {
        self.fps
    }

    fn render(&mut self, index: u64, pool: &BufferPool) -> PluginResult<Frame> {
        let label = self.label(index);
        let mut frame = Frame::new(DataKind::Ancillary);
        frame.time_base = Rational::new(self.fps.denominator, self.fps.numerator);
        frame.set_format(FORMAT)?;

        let mut buffer = pool.acquire(label.len());
        buffer.as_mut_slice().copy_from_slice(label.as_bytes());
        frame.attach(buffer, PlaneLayout::opaque(label.len()))?;
        Ok(frame)
    }
}

pub(crate) struct AncillarySourceFactory {
    descriptor: DriverDescriptor,
}

impl AncillarySourceFactory {
    pub(crate) fn new() -> Self {
        Self {
            descriptor: DriverDescriptor::new(
                NAME,
                DataKind::Ancillary,
                Capabilities::SEEKABLE_SOURCE,
                "running timecode",
            ),
        }
    }
}

impl DriverFactory for AncillarySourceFactory {
    fn descriptor(&self) -> &DriverDescriptor {
        &self.descriptor
    }

    fn create(&self, ctx: DriverContext) -> PluginResult<Box<dyn Driver>> {
        let mut options = DriverOptions::parse(&ctx.configuration)?;
        let fps = options.take_rational("fps", super::video::DEFAULT_FPS)?;
        let pacing = Pacing::from_options(&mut options)?;
        options.finish()?;
        Ok(Box::new(ClockedSource::new(Timecode::new(fps), pacing, &ctx)))
    }
}
