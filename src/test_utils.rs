//! Recording fakes for the output and scroll capabilities.
//!
//! Handles are `Clone + Send`: one copy goes into the channel, the test keeps
//! the other to inspect what happened.

use crate::error::{BroadcastError, Result};
use crate::output::{MasterGain, OutputContext, OutputProvider, OutputState, ToneSpec};
use crate::scroll_channel::{ScrollFrame, ScrollSurface};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A tone as the output saw it, with the master gain at that moment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayedTone {
    pub tone: ToneSpec,
    pub master_gain: f32,
}

#[derive(Debug)]
struct OutputLog {
    tones: Vec<PlayedTone>,
    state: OutputState,
    deny_acquire: bool,
    fail_playback: bool,
    acquisitions: usize,
    resumes: usize,
    halts: usize,
}

/// Output provider that records instead of sounding.
#[derive(Debug, Clone)]
pub struct RecordingOutput {
    log: Arc<Mutex<OutputLog>>,
}

impl RecordingOutput {
    pub fn new() -> Self {
        RecordingOutput {
            log: Arc::new(Mutex::new(OutputLog {
                tones: Vec::new(),
                state: OutputState::Ready,
                deny_acquire: false,
                fail_playback: false,
                acquisitions: 0,
                resumes: 0,
                halts: 0,
            })),
        }
    }

    /// Boxed clone, ready to inject.
    pub fn provider(&self) -> Box<dyn OutputProvider + Send> {
        Box::new(self.clone())
    }

    pub fn tones(&self) -> Vec<PlayedTone> {
        lock(&self.log).tones.clone()
    }

    pub fn tone_count(&self) -> usize {
        lock(&self.log).tones.len()
    }

    /// Force the state reported by live contexts.
    pub fn set_state(&self, state: OutputState) {
        lock(&self.log).state = state;
    }

    pub fn deny_acquire(&self, deny: bool) {
        lock(&self.log).deny_acquire = deny;
    }

    pub fn fail_playback(&self, fail: bool) {
        lock(&self.log).fail_playback = fail;
    }

    pub fn acquisitions(&self) -> usize {
        lock(&self.log).acquisitions
    }

    pub fn resumes(&self) -> usize {
        lock(&self.log).resumes
    }

    pub fn halts(&self) -> usize {
        lock(&self.log).halts
    }
}

impl Default for RecordingOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputProvider for RecordingOutput {
    fn acquire(&mut self, master: MasterGain) -> Result<Box<dyn OutputContext>> {
        let mut log = lock(&self.log);
        if log.deny_acquire {
            return Err(BroadcastError::OutputUnavailable("device denied".into()));
        }
        log.acquisitions += 1;
        log.state = OutputState::Ready;
        Ok(Box::new(RecordingContext {
            log: self.log.clone(),
            master,
        }))
    }
}

struct RecordingContext {
    log: Arc<Mutex<OutputLog>>,
    master: MasterGain,
}

impl OutputContext for RecordingContext {
    fn state(&self) -> OutputState {
        lock(&self.log).state
    }

    fn resume(&mut self) -> Result<()> {
        let mut log = lock(&self.log);
        log.resumes += 1;
        if log.state == OutputState::Suspended {
            log.state = OutputState::Ready;
        }
        Ok(())
    }

    fn play_tone(&mut self, tone: &ToneSpec) -> Result<()> {
        let mut log = lock(&self.log);
        if log.fail_playback {
            return Err(BroadcastError::OutputUnavailable("device unplugged".into()));
        }
        log.tones.push(PlayedTone {
            tone: *tone,
            master_gain: self.master.gain(),
        });
        Ok(())
    }

    fn halt(&mut self) {
        lock(&self.log).halts += 1;
    }
}

#[derive(Debug, Default)]
struct SurfaceLog {
    frames: Vec<ScrollFrame>,
    contents: Vec<Vec<String>>,
    clears: usize,
}

/// Scroll surface that keeps every frame.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    log: Arc<Mutex<SurfaceLog>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn surface(&self) -> Box<dyn ScrollSurface + Send> {
        Box::new(self.clone())
    }

    pub fn frames(&self) -> Vec<ScrollFrame> {
        lock(&self.log).frames.clone()
    }

    pub fn frame_count(&self) -> usize {
        lock(&self.log).frames.len()
    }

    /// Content handed over at the start of each pass.
    pub fn contents(&self) -> Vec<Vec<String>> {
        lock(&self.log).contents.clone()
    }

    pub fn clears(&self) -> usize {
        lock(&self.log).clears
    }
}

impl ScrollSurface for RecordingSurface {
    fn set_content(&mut self, lines: &[String]) {
        lock(&self.log).contents.push(lines.to_vec());
    }

    fn render(&mut self, frame: &ScrollFrame) {
        lock(&self.log).frames.push(*frame);
    }

    fn clear(&mut self) {
        lock(&self.log).clears += 1;
    }
}
