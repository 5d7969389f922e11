//! Output-context capability: where tones end up.
//!
//! Every tone runs oscillator → envelope → master gain. The master gain is
//! shared with whatever thread mixes samples, so a volume change reaches
//! tones that are already sounding.

use crate::error::Result;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Coarse state of an output context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputState {
    Ready,
    /// Alive but not producing sound until resumed.
    Suspended,
    /// Unusable; a new context must be acquired.
    Closed,
}

/// One tone to synthesise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneSpec {
    pub frequency_hz: f32,
    pub duration: Duration,
    /// Linear fade-in and fade-out length.
    pub fade: Duration,
    /// Level before the master bus.
    pub level: f32,
}

/// Envelope gain `elapsed` into a tone: linear fade-in, sustain, linear fade-out.
///
/// The fade is shortened to half the tone when the tone is too short for both.
pub fn envelope_gain(elapsed: Duration, tone: &ToneSpec) -> f32 {
    if elapsed >= tone.duration {
        return 0.0;
    }
    let fade = tone.fade.min(tone.duration / 2).as_secs_f32();
    let t = elapsed.as_secs_f32();
    let remaining = (tone.duration - elapsed).as_secs_f32();
    let shape = if fade <= 0.0 {
        1.0
    } else if t < fade {
        t / fade
    } else if remaining < fade {
        remaining / fade
    } else {
        1.0
    };
    shape * tone.level
}

/// The single long-lived master bus. Cheap to clone; all clones share one value.
#[derive(Debug, Clone)]
pub struct MasterGain {
    bits: Arc<AtomicU32>,
}

impl MasterGain {
    pub fn new(gain: f32) -> Self {
        MasterGain {
            bits: Arc::new(AtomicU32::new(gain.clamp(0.0, 1.0).to_bits())),
        }
    }

    pub fn gain(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn set(&self, gain: f32) {
        self.bits.store(gain.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }
}

/// A live audio output.
pub trait OutputContext {
    fn state(&self) -> OutputState;
    /// Attempt to leave `Suspended`. Must not block.
    fn resume(&mut self) -> Result<()>;
    /// Start a tone now, routed through the master bus.
    fn play_tone(&mut self, tone: &ToneSpec) -> Result<()>;
    /// Cut anything still sounding.
    fn halt(&mut self);
}

/// Acquires output contexts; injected into the audio channel.
pub trait OutputProvider {
    fn acquire(&mut self, master: MasterGain) -> Result<Box<dyn OutputContext>>;
}

/// Output that accepts tones and discards them.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProvider;

struct NullContext;

impl OutputContext for NullContext {
    fn state(&self) -> OutputState {
        OutputState::Ready
    }

    fn resume(&mut self) -> Result<()> {
        Ok(())
    }

    fn play_tone(&mut self, _tone: &ToneSpec) -> Result<()> {
        Ok(())
    }

    fn halt(&mut self) {}
}

impl OutputProvider for NullProvider {
    fn acquire(&mut self, _master: MasterGain) -> Result<Box<dyn OutputContext>> {
        Ok(Box::new(NullContext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(duration_ms: u64, fade_ms: u64) -> ToneSpec {
        ToneSpec {
            frequency_hz: 600.0,
            duration: Duration::from_millis(duration_ms),
            fade: Duration::from_millis(fade_ms),
            level: 0.15,
        }
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn envelope_ramps_up_sustains_and_ramps_down() {
        let t = tone(200, 20);
        assert!(close(envelope_gain(Duration::ZERO, &t), 0.0));
        assert!(close(envelope_gain(Duration::from_millis(10), &t), 0.075));
        assert!(close(envelope_gain(Duration::from_millis(100), &t), 0.15));
        assert!(close(envelope_gain(Duration::from_millis(190), &t), 0.075));
        assert_eq!(envelope_gain(Duration::from_millis(200), &t), 0.0);
    }

    #[test]
    fn short_tone_shrinks_fade() {
        let t = tone(20, 20);
        // fade capped at 10 ms, so the peak is reached at the midpoint
        assert!(close(envelope_gain(Duration::from_millis(10), &t), 0.15));
    }

    #[test]
    fn zero_fade_is_flat() {
        let t = tone(100, 0);
        assert!(close(envelope_gain(Duration::ZERO, &t), 0.15));
    }

    #[test]
    fn master_gain_is_shared_and_clamped() {
        let master = MasterGain::new(0.5);
        let mixer_side = master.clone();
        master.set(2.0);
        assert_eq!(mixer_side.gain(), 1.0);
        master.set(-1.0);
        assert_eq!(mixer_side.gain(), 0.0);
    }

    #[test]
    fn null_provider_accepts_tones() {
        let mut ctx = NullProvider.acquire(MasterGain::new(1.0)).unwrap();
        assert_eq!(ctx.state(), OutputState::Ready);
        assert!(ctx.play_tone(&tone(100, 10)).is_ok());
    }
}
