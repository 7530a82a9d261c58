//! `audio_src`: an interleaved sine tone whose phase carries across frames.

use super::source::{ClockedSource, Pacing, Synth};
use crate::driver::{Capabilities, Driver, DriverContext};
use crate::options::{DriverOptions, OptionsError};
use crate::registry::{DriverDescriptor, DriverFactory};
use framelink_core::{
    BufferPool, DataKind, Frame, PlaneLayout, PluginError, PluginResult, Rational, SampleFormat,
};
use std::f64::consts::TAU;

pub const NAME: &str = "audio_src";
pub const DEFAULT_CHANNELS: u32 = 2;
pub const DEFAULT_RATE: u32 = 48_000;
pub const DEFAULT_SAMPLES: u32 = 1024;
pub const DEFAULT_TONE_HZ: f64 = 440.0;

/// Peak level relative to full scale.
const AMPLITUDE: f64 = 0.5;

#[derive(Debug, Clone)]
pub(crate) struct SineTone {
    format: SampleFormat,
    channels: u32,
    rate: u32,
    samples: u32,
    tone: f64,
    layout: PlaneLayout,
}

impl SineTone {
    pub(crate) fn from_options(options: &mut DriverOptions) -> PluginResult<Self> {
        let channels = options.take_positive("channels", Some(DEFAULT_CHANNELS))?;
        let rate = options.take_positive("rate", Some(DEFAULT_RATE))?;
        let samples = options.take_positive("samples", Some(DEFAULT_SAMPLES))?;
        let format = match options.take_str("format") {
            None => SampleFormat::S16,
            Some(name) => SampleFormat::from_name(&name).ok_or_else(|| {
                OptionsError::InvalidValue {
                    key: "format".into(),
                    value: name,
                    reason: "expected s16, s32 or f32".into(),
                }
            })?,
        };
        let tone: f64 = options.take("tone", DEFAULT_TONE_HZ)?;
        if !tone.is_finite() || tone < 0.0 {
            return Err(PluginError::open_failed(format!("invalid tone frequency {tone}")));
        }
        let layout = format
            .layout(channels, samples)
            .map_err(|err| PluginError::open_failed(err.to_string()))?;
        Ok(Self {
            format,
            channels,
            rate,
            samples,
            tone,
            layout,
        })
    }

    fn sample(&self, n: u64) -> f64 {
        // Reduce the cycle count first so long streams keep their precision.
        let cycles = (n as f64) * self.tone / f64::from(self.rate);
        (TAU * cycles.fract()).sin() * AMPLITUDE
    }

    fn fill(&self, bytes: &mut [u8], index: u64) {
        let bps = self.format.bytes_per_sample() as usize;
        let frame_bytes = bps * self.channels as usize;
        let first = index.saturating_mul(u64::from(self.samples));
        for (i, chunk) in bytes.chunks_exact_mut(frame_bytes).enumerate() {
            let value = self.sample(first.saturating_add(i as u64));
            for slot in chunk.chunks_exact_mut(bps) {
                match self.format {
                    SampleFormat::S16 => {
                        slot.copy_from_slice(&((value * f64::from(i16::MAX)) as i16).to_le_bytes())
                    }
                    SampleFormat::S32 => {
                        slot.copy_from_slice(&((value * f64::from(i32::MAX)) as i32).to_le_bytes())
                    }
                    SampleFormat::F32 => slot.copy_from_slice(&(value as f32).to_le_bytes()),
                }
            }
        }
    }
}

impl Synth for SineTone {
    fn kind(&self) -> DataKind {
        DataKind::Audio
    }

    fn rate(&self) -> Rational {
        Rational::new(u64::from(self.rate), u64::from(self.samples))
    }

    fn render(&mut self, index: u64, pool: &BufferPool) -> PluginResult<Frame> {
        let mut frame = Frame::new(DataKind::Audio);
        frame.channels = self.channels;
        frame.nb_samples = self.samples;
        frame.bit_depth = self.format.bit_depth();
        frame.time_base = Rational::new(u64::from(self.samples), u64::from(self.rate));
        frame.set_format(self.format.name())?;

        frame.attach(pool.acquire(self.layout.buffer_size), self.layout.clone())?;
        if let Some(bytes) = frame.plane_mut(0) {
            self.fill(bytes, index);
        }
        Ok(frame)
    }
}

pub(crate) struct AudioSourceFactory {
    descriptor: DriverDescriptor,
}

impl AudioSourceFactory {
    pub(crate) fn new() -> Self {
        Self {
            descriptor: DriverDescriptor::new(
                NAME,
                DataKind::Audio,
                Capabilities::SEEKABLE_SOURCE,
                "sine tone generator",
            ),
        }
    }
}

impl DriverFactory for AudioSourceFactory {
    fn descriptor(&self) -> &DriverDescriptor {
        &self.descriptor
    }

    fn create(&self, ctx: DriverContext) -> PluginResult<Box<dyn Driver>> {
        let mut options = DriverOptions::parse(&ctx.configuration)?;
        let tone = SineTone::from_options(&mut options)?;
        let pacing = Pacing::from_options(&mut options)?;
        options.finish()?;
        Ok(Box::new(ClockedSource::new(tone, pacing, &ctx)))
    }
}
