//! rodio-backed output: sine oscillator → envelope → master bus → sink.

use crate::error::{BroadcastError, Result};
use crate::output::{envelope_gain, MasterGain, OutputContext, OutputProvider, OutputState, ToneSpec};
use rodio::source::{SineWave, TakeDuration};
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use std::time::Duration;
use tracing::{debug, warn};

/// Applies the tone envelope to an oscillator. Passes channel layout through.
pub struct ToneEnvelope<S> {
    inner: S,
    tone: ToneSpec,
    samples: u64,
}

impl<S> ToneEnvelope<S>
where
    S: Source<Item = f32>,
{
    pub fn new(source: S, tone: ToneSpec) -> Self {
        ToneEnvelope {
            inner: source,
            tone,
            samples: 0,
        }
    }

    fn elapsed(&self) -> Duration {
        let per_sec = self.inner.sample_rate() as u64 * self.inner.channels().max(1) as u64;
        Duration::from_secs_f64(self.samples as f64 / per_sec.max(1) as f64)
    }
}

impl<S> Iterator for ToneEnvelope<S>
where
    S: Source<Item = f32>,
{
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        let sample = self.inner.next()?;
        let gain = envelope_gain(self.elapsed(), &self.tone);
        self.samples += 1;
        Some(sample * gain)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<S> Source for ToneEnvelope<S>
where
    S: Source<Item = f32>,
{
    fn current_frame_len(&self) -> Option<usize> {
        self.inner.current_frame_len()
    }

    fn channels(&self) -> u16 {
        self.inner.channels()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }
}

/// Scales samples by the live master gain, read per sample.
pub struct MasterBus<S> {
    inner: S,
    master: MasterGain,
}

impl<S> MasterBus<S>
where
    S: Source<Item = f32>,
{
    pub fn new(source: S, master: MasterGain) -> Self {
        MasterBus {
            inner: source,
            master,
        }
    }
}

impl<S> Iterator for MasterBus<S>
where
    S: Source<Item = f32>,
{
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        let sample = self.inner.next()?;
        Some(sample * self.master.gain())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<S> Source for MasterBus<S>
where
    S: Source<Item = f32>,
{
    fn current_frame_len(&self) -> Option<usize> {
        self.inner.current_frame_len()
    }

    fn channels(&self) -> u16 {
        self.inner.channels()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }
}

/// Build the full per-tone graph.
pub fn tone_source(tone: &ToneSpec, master: MasterGain) -> MasterBus<ToneEnvelope<TakeDuration<SineWave>>> {
    let oscillator = SineWave::new(tone.frequency_hz).take_duration(tone.duration);
    MasterBus::new(ToneEnvelope::new(oscillator, *tone), master)
}

/// Output context on the default device. Not `Send`: lives on the runtime thread.
pub struct RodioContext {
    _stream: OutputStream,
    handle: OutputStreamHandle,
    sink: Option<Sink>,
    master: MasterGain,
}

impl RodioContext {
    pub fn open(master: MasterGain) -> Result<Self> {
        let (stream, handle) = OutputStream::try_default().map_err(|e| {
            BroadcastError::OutputUnavailable(format!("Failed to open audio output: {}", e))
        })?;
        let sink = Sink::try_new(&handle).map_err(|e| {
            BroadcastError::OutputUnavailable(format!("Failed to create audio sink: {}", e))
        })?;
        Ok(RodioContext {
            _stream: stream,
            handle,
            sink: Some(sink),
            master,
        })
    }
}

impl OutputContext for RodioContext {
    fn state(&self) -> OutputState {
        match &self.sink {
            None => OutputState::Closed,
            Some(sink) if sink.is_paused() => OutputState::Suspended,
            Some(_) => OutputState::Ready,
        }
    }

    fn resume(&mut self) -> Result<()> {
        match &self.sink {
            Some(sink) => {
                sink.play();
                Ok(())
            }
            None => Err(BroadcastError::OutputUnavailable("audio sink is closed".into())),
        }
    }

    fn play_tone(&mut self, tone: &ToneSpec) -> Result<()> {
        let sink = self
            .sink
            .as_ref()
            .ok_or_else(|| BroadcastError::OutputUnavailable("audio sink is closed".into()))?;
        sink.append(tone_source(tone, self.master.clone()));
        Ok(())
    }

    fn halt(&mut self) {
        // A stopped sink is replaced rather than reused.
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        match Sink::try_new(&self.handle) {
            Ok(sink) => self.sink = Some(sink),
            Err(e) => warn!("audio sink could not be recreated: {}", e),
        }
    }
}

/// Opens the system default output device on demand.
#[derive(Debug, Clone, Copy, Default)]
pub struct RodioProvider;

impl OutputProvider for RodioProvider {
    fn acquire(&mut self, master: MasterGain) -> Result<Box<dyn OutputContext>> {
        let ctx = RodioContext::open(master)?;
        debug!("audio output acquired");
        Ok(Box::new(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A test source that produces a fixed sequence of samples.
    struct TestSource {
        samples: Vec<f32>,
        pos: usize,
        sample_rate: u32,
    }

    impl TestSource {
        fn constant(value: f32, count: usize, sample_rate: u32) -> Self {
            TestSource {
                samples: vec![value; count],
                pos: 0,
                sample_rate,
            }
        }
    }

    impl Iterator for TestSource {
        type Item = f32;
        fn next(&mut self) -> Option<f32> {
            let s = self.samples.get(self.pos).copied();
            self.pos += 1;
            s
        }
    }

    impl Source for TestSource {
        fn current_frame_len(&self) -> Option<usize> {
            Some(self.samples.len().saturating_sub(self.pos))
        }
        fn channels(&self) -> u16 {
            1
        }
        fn sample_rate(&self) -> u32 {
            self.sample_rate
        }
        fn total_duration(&self) -> Option<Duration> {
            None
        }
    }

    fn spec(duration_ms: u64, fade_ms: u64) -> ToneSpec {
        ToneSpec {
            frequency_hz: 600.0,
            duration: Duration::from_millis(duration_ms),
            fade: Duration::from_millis(fade_ms),
            level: 1.0,
        }
    }

    #[test]
    fn envelope_fades_constant_source() {
        // 1000 Hz mono: one sample per millisecond
        let source = TestSource::constant(1.0, 100, 1000);
        let out: Vec<f32> = ToneEnvelope::new(source, spec(100, 10)).collect();
        assert_eq!(out.len(), 100);
        assert_eq!(out[0], 0.0);
        assert!((out[5] - 0.5).abs() < 1e-3);
        assert_eq!(out[50], 1.0);
        assert!(out[99] < 0.2);
    }

    #[test]
    fn master_bus_follows_live_gain() {
        let master = MasterGain::new(0.5);
        let mut bus = MasterBus::new(TestSource::constant(1.0, 4, 1000), master.clone());
        assert_eq!(bus.next(), Some(0.5));
        master.set(0.0);
        assert_eq!(bus.next(), Some(0.0));
        master.set(1.0);
        assert_eq!(bus.next(), Some(1.0));
    }

    #[test]
    fn tone_source_has_tone_length() {
        let tone = spec(50, 5);
        let source = tone_source(&tone, MasterGain::new(1.0));
        let rate = source.sample_rate() as usize * source.channels() as usize;
        let count = source.count();
        let expected = rate * 50 / 1000;
        assert!(count.abs_diff(expected) <= 2, "got {} samples, expected ~{}", count, expected);
    }

    #[test]
    fn provider_opens_or_fails_gracefully() {
        match RodioProvider.acquire(MasterGain::new(0.5)) {
            Ok(ctx) => assert_eq!(ctx.state(), OutputState::Ready),
            Err(e) => assert!(matches!(e, BroadcastError::OutputUnavailable(_))),
        }
    }
}
