//! `video_sink`: a write-only destination of fixed capacity that keeps the
//! most recent units written to it.

use super::video::take_pixel_format;
use crate::driver::{Capabilities, Driver, DriverContext, Writable};
use crate::options::DriverOptions;
use crate::registry::{DriverDescriptor, DriverFactory};
use framelink_core::{
    BufferPool, DataKind, Frame, FrameBuffer, PixelFormat, PluginError, PluginResult,
};
use std::collections::VecDeque;
use std::sync::Arc;

pub const NAME: &str = "video_sink";
pub const DEFAULT_DEPTH: u32 = 4;

#[derive(Debug)]
struct Written {
    frame_index: u64,
    data: FrameBuffer,
}

pub(crate) struct VideoSink {
    format: PixelFormat,
    width: u32,
    height: u32,
    capacity: usize,
    depth: usize,
    retained: VecDeque<Written>,
    pool: Arc<BufferPool>,
    written: u64,
}

impl VideoSink {
    pub(crate) fn from_options(options: &mut DriverOptions, pool: Arc<BufferPool>) -> PluginResult<Self> {
        let width = options.take_positive("width", None)?;
        let height = options.take_positive("height", None)?;
        let format = take_pixel_format(options)?;
        let depth = options.take_positive("depth", Some(DEFAULT_DEPTH))?;
        let capacity = format
            .layout(width, height)
            .map_err(|err| PluginError::open_failed(err.to_string()))?
            .buffer_size;
        Ok(Self {
            format,
            width,
            height,
            capacity,
            depth: depth as usize,
            retained: VecDeque::new(),
            pool,
            written: 0,
        })
    }

    fn retain(&mut self, unit: Written) {
        self.retained.push_back(unit);
        while self.retained.len() > self.depth {
            if let Some(old) = self.retained.pop_front() {
                self.recycle(old.data);
            }
        }
    }

    fn recycle(&self, data: FrameBuffer) {
        if let Err(err) = self.pool.release(data) {
            tracing::warn!(error = %err, "sink buffer recycle failed");
        }
    }

    /// Index of the most recently written unit.
    pub(crate) fn last_index(&self) -> Option<u64> {
        self.retained.back().map(|w| w.frame_index)
    }
}

impl Driver for VideoSink {
    fn kind(&self) -> DataKind {
        DataKind::Video
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::SINK
    }

    fn open(&mut self) -> PluginResult<()> {
        tracing::debug!(
            format = self.format.name(),
            width = self.width,
            height = self.height,
            capacity = self.capacity,
            "sink ready"
        );
        Ok(())
    }

    fn close(&mut self) -> PluginResult<()> {
        tracing::debug!(written = self.written, last = ?self.last_index(), "sink closed");
        while let Some(unit) = self.retained.pop_front() {
            self.recycle(unit.data);
        }
        Ok(())
    }

    fn queue_depth(&mut self) -> PluginResult<u64> {
        Ok(self.retained.len() as u64)
    }

    fn as_writable(&mut self) -> Option<&mut dyn Writable> {
        Some(self)
    }
}

impl Writable for VideoSink {
    fn write(&mut self, frame: &Frame) -> PluginResult<()> {
        frame.validate()?;
        if frame.data_kind != DataKind::Video {
            return Err(PluginError::error(format!(
                "video sink cannot take {:?} frames",
                frame.data_kind
            )));
        }
        if PixelFormat::from_name(frame.format()) != Some(self.format) {
            return Err(PluginError::error(format!(
                "video sink takes {} frames, got '{}'",
                self.format.name(),
                frame.format()
            )));
        }
        let source = frame
            .buffer()
            .ok_or_else(|| PluginError::error("frame has no buffer"))?;
        if frame.width > self.width || frame.height > self.height {
            let required = self
                .format
                .layout(frame.width, frame.height)
                .map(|layout| layout.buffer_size)
                .unwrap_or(source.len());
            return Err(PluginError::SmallBuffer {
                required: required.max(source.len()),
                available: self.capacity,
            });
        }
        if source.len() > self.capacity {
            return Err(PluginError::SmallBuffer {
                required: source.len(),
                available: self.capacity,
            });
        }

        let mut data = self.pool.acquire(source.len());
        data.as_mut_slice().copy_from_slice(source);
        self.retain(Written {
            frame_index: frame.frame_index,
            data,
        });
        self.written += 1;
        Ok(())
    }
}

pub(crate) struct VideoSinkFactory {
    descriptor: DriverDescriptor,
}

impl VideoSinkFactory {
    pub(crate) fn new() -> Self {
        Self {
            descriptor: DriverDescriptor::new(
                NAME,
                DataKind::Video,
                Capabilities::SINK,
                "fixed-size frame store",
            ),
        }
    }
}

impl DriverFactory for VideoSinkFactory {
    fn descriptor(&self) -> &DriverDescriptor {
        &self.descriptor
    }

    fn create(&self, ctx: DriverContext) -> PluginResult<Box<dyn Driver>> {
        let mut options = DriverOptions::parse(&ctx.configuration)?;
        let sink = VideoSink::from_options(&mut options, ctx.pool.clone())?;
        options.finish()?;
        Ok(Box::new(sink))
    }
}
