//! Drivers shipped with the crate.

mod ancillary;
mod audio;
mod cadence;
mod sink;
mod source;
mod video;

use crate::registry::DriverFactory;
use std::sync::Arc;

pub use ancillary::NAME as ANCILLARY_SOURCE;
pub use audio::NAME as AUDIO_SOURCE;
pub use sink::NAME as VIDEO_SINK;
pub use video::NAME as VIDEO_SOURCE;

pub(crate) fn builtin_factories() -> Vec<Arc<dyn DriverFactory>> {
    vec![
        Arc::new(video::VideoSourceFactory::new()),
        Arc::new(audio::AudioSourceFactory::new()),
        Arc::new(ancillary::AncillarySourceFactory::new()),
        Arc::new(sink::VideoSinkFactory::new()),
    ]
}
