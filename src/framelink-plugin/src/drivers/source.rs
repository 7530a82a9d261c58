//! Clocked read-only sources shared by the built-in generators.

use super::cadence::Cadence;
use crate::driver::{Capabilities, Driver, DriverContext, Readable, Seekable};
use crate::options::{DriverOptions, OptionsError};
use framelink_core::{BufferPool, Clock, DataKind, Frame, PluginError, PluginResult, Rational};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_QUEUE: u64 = 8;

/// Renders the payload of one unit. Pacing, indices and timestamps are the
/// source's job.
pub(crate) trait Synth: Send {
    fn kind(&self) -> DataKind;

    /// Units per second.
    fn rate(&self) -> Rational;

    /// Frame for unit `index` with its buffer taken from `pool`.
    fn render(&mut self, index: u64, pool: &BufferPool) -> PluginResult<Frame>;
}

/// `frames` and `queue`, shared by every source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Pacing {
    pub frames: Option<u64>,
    pub queue: u64,
}

impl Pacing {
    pub(crate) fn from_options(options: &mut DriverOptions) -> Result<Self, OptionsError> {
        let frames = options.take_parsed::<u64>("frames")?;
        if frames == Some(0) {
            return Err(OptionsError::InvalidValue {
                key: "frames".into(),
                value: "0".into(),
                reason: "must be greater than zero".into(),
            });
        }
        let queue = options.take("queue", DEFAULT_QUEUE)?;
        if queue == 0 {
            return Err(OptionsError::InvalidValue {
                key: "queue".into(),
                value: "0".into(),
                reason: "must be greater than zero".into(),
            });
        }
        Ok(Self { frames, queue })
    }
}

pub(crate) struct ClockedSource<S> {
    synth: S,
    cadence: Cadence,
    pool: Arc<BufferPool>,
    clock: Arc<dyn Clock>,
}

impl<S: Synth> ClockedSource<S> {
    pub(crate) fn new(synth: S, pacing: Pacing, ctx: &DriverContext) -> Self {
        let cadence = Cadence::new(synth.rate(), pacing.queue, pacing.frames, ctx.clock.now());
        Self {
            synth,
            cadence,
            pool: ctx.pool.clone(),
            clock: ctx.clock.clone(),
        }
    }

    fn try_read(&mut self) -> PluginResult<Frame> {
        let now = self.clock.now();
        let index = self.cadence.peek(now).ok_or(PluginError::FrameNotReady)?;

        let mut frame = self.synth.render(index, &self.pool)?;
        frame.frame_index = index;
        frame.origination_time = self.clock.tai_now_ns();

        self.cadence.commit(index);
        Ok(frame)
    }
}

impl<S: Synth> Driver for ClockedSource<S> {
    fn kind(&self) -> DataKind {
        self.synth.kind()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::SEEKABLE_SOURCE
    }

    fn open(&mut self) -> PluginResult<()> {
        // Pacing starts when the stream opens, not when it was configured.
        let rate = self.cadence.rate();
        tracing::debug!(kind = ?self.synth.kind(), %rate, "source started");
        self.cadence.seek(0, self.clock.now())
    }

    fn queue_depth(&mut self) -> PluginResult<u64> {
        Ok(self.cadence.pending(self.clock.now()))
    }

    fn as_readable(&mut self) -> Option<&mut dyn Readable> {
        Some(self)
    }

    fn as_seekable(&mut self) -> Option<&mut dyn Seekable> {
        Some(self)
    }
}

impl<S: Synth> Readable for ClockedSource<S> {
    fn is_frame_ready(&mut self) -> PluginResult<()> {
        match self.cadence.peek(self.clock.now()) {
            Some(_) => Ok(()),
            None => Err(PluginError::FrameNotReady),
        }
    }

    fn read(&mut self) -> PluginResult<Frame> {
        self.try_read()
    }

    fn read_timeout(&mut self, timeout: Duration) -> PluginResult<Frame> {
        if timeout.is_zero() {
            return self.try_read();
        }

        let deadline = self.clock.now().saturating_add(timeout);
        loop {
            match self.try_read() {
                Err(PluginError::FrameNotReady) => {}
                other => return other,
            }

            let now = self.clock.now();
            if now >= deadline {
                return Err(PluginError::FrameNotReady);
            }
            let Some(arrival) = self.cadence.next_arrival(now) else {
                return Err(PluginError::FrameNotReady);
            };
            let wake = arrival.min(deadline);
            self.clock
                .sleep(wake.saturating_sub(now).max(Duration::from_nanos(1)));
        }
    }
}

impl<S: Synth> Seekable for ClockedSource<S> {
    fn seek(&mut self, index: u64) -> PluginResult<()> {
        self.cadence.seek(index, self.clock.now())?;
        tracing::debug!(index, "source repositioned");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framelink_core::{ManualClock, PlaneLayout, StreamUuid};

    struct Ticks;

    impl Synth for Ticks {
        fn kind(&self) -> DataKind {
            DataKind::Ancillary
        }

        fn rate(&self) -> Rational {
            Rational::new(10, 1)
        }

        fn render(&mut self, _index: u64, pool: &BufferPool) -> PluginResult<Frame> {
            let mut frame = Frame::new(DataKind::Ancillary);
            frame.attach(pool.acquire(4), PlaneLayout::opaque(4))?;
            frame.time_base = Rational::new(1, 10);
            Ok(frame)
        }
    }

    fn source(frames: Option<u64>) -> (ClockedSource<Ticks>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::with_tai_base(1_000));
        let ctx = DriverContext {
            uuid: StreamUuid::NIL,
            configuration: String::new(),
            pool: Arc::new(BufferPool::default()),
            clock: clock.clone(),
        };
        let mut src = ClockedSource::new(Ticks, Pacing { frames, queue: 8 }, &ctx);
        src.open().unwrap();
        (src, clock)
    }

    #[test]
    fn read_is_not_ready_until_first_period() {
        let (mut src, clock) = source(None);
        assert_eq!(src.is_frame_ready(), Err(PluginError::FrameNotReady));
        assert_eq!(src.read().unwrap_err(), PluginError::FrameNotReady);

        clock.advance(Duration::from_millis(100));
        assert!(src.is_frame_ready().is_ok());
        let frame = src.read().unwrap();
        assert_eq!(frame.frame_index, 0);
        assert_eq!(frame.origination_time, 1_000 + 100_000_000);
    }

    #[test]
    fn read_timeout_waits_for_the_next_unit() {
        let (mut src, clock) = source(None);
        let frame = src.read_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(frame.frame_index, 0);
        assert_eq!(clock.now(), Duration::from_millis(100));
    }

    #[test]
    fn read_timeout_gives_up_at_deadline() {
        let (mut src, clock) = source(None);
        let err = src.read_timeout(Duration::from_millis(50)).unwrap_err();
        assert_eq!(err, PluginError::FrameNotReady);
        assert_eq!(clock.now(), Duration::from_millis(50));
    }

    #[test]
    fn zero_timeout_does_not_wait() {
        let (mut src, clock) = source(None);
        assert_eq!(
            src.read_timeout(Duration::ZERO).unwrap_err(),
            PluginError::FrameNotReady
        );
        assert_eq!(clock.now(), Duration::ZERO);
    }

    #[test]
    fn finished_stream_returns_immediately() {
        let (mut src, clock) = source(Some(1));
        src.read_timeout(Duration::from_secs(1)).unwrap();
        let before = clock.now();
        assert_eq!(
            src.read_timeout(Duration::from_secs(1)).unwrap_err(),
            PluginError::FrameNotReady
        );
        assert_eq!(clock.now(), before);
    }

    #[test]
    fn seek_sets_next_index() {
        let (mut src, clock) = source(None);
        src.seek(42).unwrap();
        clock.advance(Duration::from_millis(100));
        assert_eq!(src.read().unwrap().frame_index, 42);
        assert_eq!(src.queue_depth().unwrap(), 0);
    }

    #[test]
    fn pacing_rejects_zero_values() {
        let mut opts = DriverOptions::parse("queue=0").unwrap();
        assert!(Pacing::from_options(&mut opts).is_err());
        let mut opts = DriverOptions::parse("frames=0").unwrap();
        assert!(Pacing::from_options(&mut opts).is_err());
        let mut opts = DriverOptions::parse("frames=3").unwrap();
        assert_eq!(
            Pacing::from_options(&mut opts).unwrap(),
            Pacing {
                frames: Some(3),
                queue: DEFAULT_QUEUE
            }
        );
    }
}
