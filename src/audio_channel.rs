//! Audio channel: plays the broadcast as tones, forever.
//!
//! `Stopped → Starting → Playing → Stopped`. While playing, the channel runs
//! one session at a time: a broadcast lap, then a rest lap of `loop_pause`,
//! then a fresh broadcast read from the source. Empty broadcasts get a retry
//! lap instead of an error. Every deferred piece of work belongs to the
//! current session, so cancelling that session stops everything.

use crate::config::AudioConfig;
use crate::error::{BroadcastError, Result};
use crate::output::{MasterGain, OutputContext, OutputProvider, OutputState, ToneSpec};
use crate::persistence::Volume;
use crate::phrase::{BroadcastSequence, SequenceSource};
use crate::scheduler::{symbol_plan, Plan, Scheduler, SchedulerSession, SessionStep, Tone};
use crate::status::{ChannelKind, ChannelState, ChannelStatus, StatusEvent};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// What the current session is doing.
#[derive(Debug, Clone, PartialEq)]
pub enum Lap {
    Broadcast(BroadcastSequence),
    /// Inter-loop pause after a completed broadcast.
    Pause,
    /// Waiting for content to appear.
    Retry,
}

pub struct AudioChannel {
    config: AudioConfig,
    provider: Box<dyn OutputProvider>,
    context: Option<Box<dyn OutputContext>>,
    master: MasterGain,
    scheduler: Scheduler<Tone>,
    session: Option<SchedulerSession<Lap>>,
    state: ChannelState,
    laps: u64,
    tones_played: u64,
    outbox: Vec<StatusEvent>,
}

enum ToneOutcome {
    Played,
    Failed(String),
}

impl AudioChannel {
    pub fn new(config: AudioConfig, provider: Box<dyn OutputProvider>, master: MasterGain) -> Self {
        AudioChannel {
            config,
            provider,
            context: None,
            master,
            scheduler: Scheduler::new(),
            session: None,
            state: ChannelState::Stopped,
            laps: 0,
            tones_played: 0,
            outbox: Vec::new(),
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn master(&self) -> &MasterGain {
        &self.master
    }

    /// Apply a volume to the master bus. Takes effect on sounding tones.
    pub fn set_volume(&mut self, volume: Volume) {
        self.master.set(volume.gain());
    }

    /// The lap the current session is running, if any.
    pub fn current_lap(&self) -> Option<&Lap> {
        self.session.as_ref().map(|s| s.snapshot())
    }

    /// Broadcast laps played to completion since construction.
    pub fn completed_laps(&self) -> u64 {
        self.laps
    }

    pub fn tones_played(&self) -> u64 {
        self.tones_played
    }

    /// Acquire output and begin broadcasting. No-op unless stopped.
    pub fn start(&mut self, now: Duration, source: &dyn SequenceSource) -> Result<()> {
        if self.state != ChannelState::Stopped {
            debug!(state = %self.state, "audio start ignored");
            return Ok(());
        }
        self.state = ChannelState::Starting;
        if let Err(e) = self.ensure_context() {
            self.state = ChannelState::Stopped;
            error!("audio channel could not start: {}", e);
            self.report(ChannelStatus::Failed(e.to_string()));
            return Err(e);
        }
        self.state = ChannelState::Playing;
        info!("audio channel started");
        self.report(ChannelStatus::Started);
        self.launch(now, source);
        Ok(())
    }

    /// Cancel everything and go quiet. Returns false if already stopped.
    pub fn stop(&mut self) -> bool {
        if self.state == ChannelState::Stopped {
            return false;
        }
        self.cancel_session();
        if let Some(ctx) = self.context.as_mut() {
            ctx.halt();
        }
        self.state = ChannelState::Stopped;
        info!("audio channel stopped");
        self.report(ChannelStatus::Stopped);
        true
    }

    /// The source changed. A playing channel drops its session and starts a
    /// fresh one; the running session is never patched.
    pub fn content_changed(&mut self, now: Duration, source: &dyn SequenceSource) {
        if self.state != ChannelState::Playing {
            return;
        }
        debug!("audio content changed, restarting session");
        self.cancel_session();
        if let Some(ctx) = self.context.as_mut() {
            ctx.halt();
        }
        self.launch(now, source);
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.scheduler.next_deadline()
    }

    /// Run every timer due at `now`, in order.
    pub fn fire_due(&mut self, now: Duration, source: &dyn SequenceSource) {
        while let Some(fired) = self.scheduler.poll(now) {
            let Some(session) = self.session.as_mut() else {
                trace!("audio timer with no session");
                continue;
            };
            if !session.accept(&fired) {
                trace!("dropping stale audio timer");
                continue;
            }
            match fired.step {
                SessionStep::Step(tone) => self.sound(tone),
                SessionStep::Complete { total } => self.lap_complete(fired.timer.due(), total, source),
            }
        }
    }

    /// Status changes since the last drain.
    pub fn drain_events(&mut self) -> Vec<StatusEvent> {
        std::mem::take(&mut self.outbox)
    }

    fn report(&mut self, status: ChannelStatus) {
        self.outbox.push(StatusEvent::new(ChannelKind::Audio, status));
    }

    fn ensure_context(&mut self) -> Result<()> {
        if matches!(self.context.as_ref().map(|c| c.state()), Some(OutputState::Closed)) {
            debug!("dropping closed audio output");
            self.context = None;
        }
        let ctx = match self.context.take() {
            Some(ctx) => ctx,
            None => self.provider.acquire(self.master.clone()).map_err(|e| match e {
                BroadcastError::OutputUnavailable(_) => e,
                other => BroadcastError::OutputUnavailable(other.to_string()),
            })?,
        };
        let ctx = self.context.insert(ctx);
        if ctx.state() == OutputState::Suspended {
            if let Err(e) = ctx.resume() {
                warn!("audio output did not resume: {}", e);
            }
        }
        Ok(())
    }

    fn launch(&mut self, now: Duration, source: &dyn SequenceSource) {
        let sequence = source.broadcast_sequence();
        let plan = sequence
            .playable()
            .map(|symbols| symbol_plan(symbols.as_slice(), self.config.unit()));
        let session = match plan {
            Ok(plan) => {
                debug!(
                    revision = sequence.revision(),
                    tones = plan.len(),
                    total_ms = plan.total().as_millis() as u64,
                    "audio broadcast launched"
                );
                self.scheduler.launch(now, Lap::Broadcast(sequence), plan)
            }
            Err(e) => {
                debug!("{}, retrying in {:?}", e, self.config.empty_retry());
                self.scheduler
                    .launch(now, Lap::Retry, Plan::rest(self.config.empty_retry()))
            }
        };
        self.session = Some(session);
    }

    fn cancel_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            let cancelled = self.scheduler.cancel_all(&mut session);
            trace!(
                cancelled,
                started_ms = session.started_at().as_millis() as u64,
                reached_ms = session.cursor().as_millis() as u64,
                "audio session cancelled"
            );
        }
    }

    fn sound(&mut self, tone: Tone) {
        let spec = ToneSpec {
            frequency_hz: self.config.tone_hz,
            duration: tone.duration,
            fade: self.config.tone_fade(),
            level: self.config.tone_volume,
        };
        let outcome = match self.context.as_mut() {
            None => ToneOutcome::Failed("audio output lost".to_string()),
            Some(ctx) => match ctx.state() {
                OutputState::Closed => ToneOutcome::Failed("audio output closed".to_string()),
                state => {
                    if state == OutputState::Suspended {
                        if let Err(e) = ctx.resume() {
                            warn!("audio output did not resume: {}", e);
                        }
                    }
                    match ctx.play_tone(&spec) {
                        Ok(()) => ToneOutcome::Played,
                        Err(e) => ToneOutcome::Failed(e.to_string()),
                    }
                }
            },
        };
        match outcome {
            ToneOutcome::Played => self.tones_played += 1,
            ToneOutcome::Failed(msg) => self.fail(msg),
        }
    }

    fn lap_complete(&mut self, at: Duration, total: Duration, source: &dyn SequenceSource) {
        let finished_broadcast = matches!(self.current_lap(), Some(Lap::Broadcast(_)));
        self.session = None;
        if finished_broadcast {
            self.laps += 1;
            debug!(
                lap = self.laps,
                total_ms = total.as_millis() as u64,
                "audio broadcast complete"
            );
            self.session = Some(self.scheduler.launch(
                at,
                Lap::Pause,
                Plan::rest(self.config.loop_pause()),
            ));
        } else {
            self.launch(at, source);
        }
    }

    /// Terminal failure: report once and drop the output.
    fn fail(&mut self, msg: String) {
        if self.state == ChannelState::Stopped {
            return;
        }
        self.cancel_session();
        self.context = None;
        self.state = ChannelState::Stopped;
        error!("audio channel failed: {}", msg);
        self.report(ChannelStatus::Failed(msg));
    }
}
