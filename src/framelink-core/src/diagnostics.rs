//! Human-readable frame dumps for logs and the CLI.

use crate::format::{ColourFormat, DataKind};
use crate::frame::{Component, Frame, Rational};
use crate::uuid::StreamUuid;
use serde::Serialize;

/// Metadata of a frame, without its payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameSummary {
    pub data_kind: DataKind,
    pub format: String,
    pub stream_uuid: StreamUuid,
    pub frame_index: u64,
    pub origination_time: u64,
    pub time_base: Rational,
    pub presentation_time_ns: Option<u64>,
    pub buffer_size: usize,
    pub planes: usize,
    pub is_planar: bool,
    pub components: Vec<Component>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioSummary>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub log_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoSummary {
    pub width: u32,
    pub height: u32,
    pub colour_format: ColourFormat,
    pub has_alpha: bool,
    pub bit_depth: u32,
    pub aspect_ratio: Rational,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioSummary {
    pub channels: u32,
    pub nb_samples: u32,
    pub bit_depth: u32,
}

impl FrameSummary {
    pub fn of(frame: &Frame) -> Self {
        let video = (frame.data_kind == DataKind::Video).then(|| VideoSummary {
            width: frame.width,
            height: frame.height,
            colour_format: frame.colour_format,
            has_alpha: frame.has_alpha,
            bit_depth: frame.bit_depth,
            aspect_ratio: frame.aspect_ratio,
        });
        let audio = (frame.data_kind == DataKind::Audio).then(|| AudioSummary {
            channels: frame.channels,
            nb_samples: frame.nb_samples,
            bit_depth: frame.bit_depth,
        });

        Self {
            data_kind: frame.data_kind,
            format: frame.format().to_string(),
            stream_uuid: frame.stream_uuid,
            frame_index: frame.frame_index,
            origination_time: frame.origination_time,
            time_base: frame.time_base,
            presentation_time_ns: frame.presentation_time_ns(),
            buffer_size: frame.buffer_size(),
            planes: frame.planes(),
            is_planar: frame.is_planar,
            components: frame.components().to_vec(),
            video,
            audio,
            log_message: frame.log_message().to_string(),
        }
    }

    /// One-line description used in log output.
    pub fn describe(&self) -> String {
        let shape = match (&self.video, &self.audio) {
            (Some(v), _) => format!(
                "{}x{} {:?} {}bit{}",
                v.width,
                v.height,
                v.colour_format,
                v.bit_depth,
                if v.has_alpha { " alpha" } else { "" }
            ),
            (_, Some(a)) => format!("{}ch x {} samples {}bit", a.channels, a.nb_samples, a.bit_depth),
            _ => format!("{:?}", self.data_kind).to_lowercase(),
        };
        format!(
            "#{} {} [{}] {} bytes in {} plane(s)",
            self.frame_index, shape, self.format, self.buffer_size, self.planes
        )
    }
}

/// Renders a frame's metadata plus `message` to the tracing sink.
///
/// Has no effect on the frame or on any stream.
pub fn dump_frame(message: &str, frame: &Frame) {
    let summary = FrameSummary::of(frame);
    tracing::info!(
        stream = %summary.stream_uuid,
        frame_index = summary.frame_index,
        origination_time = summary.origination_time,
        time_base = %summary.time_base,
        frame_log = %summary.log_message,
        "{message}: {}",
        summary.describe()
    );
    for (i, c) in summary.components.iter().enumerate() {
        tracing::debug!(
            plane = i,
            offset = c.offset,
            length = c.length,
            stride = c.stride,
            width = c.width,
            bytes_per_element = c.bytes_per_element,
            "frame component"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::PixelFormat;
    use crate::pool::BufferPool;

    #[test]
    fn summary_describes_video() {
        let pool = BufferPool::default();
        let layout = PixelFormat::Rgb24.layout(4, 2).unwrap();
        let mut frame = Frame::new(DataKind::Video);
        frame.width = 4;
        frame.height = 2;
        frame.bit_depth = 8;
        frame.frame_index = 7;
        frame.set_format("rgb24").unwrap();
        frame.set_log_message("hello").unwrap();
        frame
            .attach(pool.acquire(layout.buffer_size), layout)
            .unwrap();

        let summary = FrameSummary::of(&frame);
        assert!(summary.audio.is_none());
        assert_eq!(summary.describe(), "#7 4x2 Rgb 8bit [rgb24] 24 bytes in 1 plane(s)");

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["video"]["width"], 4);
        assert_eq!(json["log_message"], "hello");
        assert_eq!(json["data_kind"], "video");

        dump_frame("test", &frame);
    }

    #[test]
    fn empty_slot_summary() {
        let summary = FrameSummary::of(&Frame::default());
        assert_eq!(summary.describe(), "#0 none [] 0 bytes in 0 plane(s)");
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json.get("log_message").is_none());
    }
}
