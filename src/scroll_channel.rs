//! Scroll channel: the visual trace.
//!
//! Each pass starts with the wrapped code text just below the viewport and
//! moves it up one line per step until it is fully past the top. Cadence is
//! a fixed line interval with a little jitter; positions get sub-pixel
//! jitter. A finished pass is followed at once by a new one with freshly read
//! content. Runs on its own scheduler, so audio and scroll never share a
//! session.

use crate::config::ScrollConfig;
use crate::phrase::SequenceSource;
use crate::scheduler::{Plan, Scheduler, SchedulerSession, SessionStep};
use crate::status::{ChannelKind, ChannelState, ChannelStatus, StatusEvent};
use std::io::Write;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// What a surface is asked to draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollFrame {
    /// Y of the first content line relative to the viewport top. Negative once
    /// the content starts leaving through the top.
    pub offset_px: f32,
    /// Step number within the pass, from 0.
    pub line: usize,
    /// Steps in the pass.
    pub total_lines: usize,
}

/// Where frames end up.
pub trait ScrollSurface {
    /// New content at the start of each pass.
    fn set_content(&mut self, lines: &[String]);
    fn render(&mut self, frame: &ScrollFrame);
    /// Called on stop.
    fn clear(&mut self) {}
}

/// Greedy word wrap at spaces. Words longer than a line are split.
pub fn wrap_lines(text: &str, columns: usize) -> Vec<String> {
    let columns = columns.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split(' ').filter(|w| !w.is_empty()) {
        let mut word = word;
        while word.chars().count() > columns {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let split = word
                .char_indices()
                .nth(columns)
                .map(|(i, _)| i)
                .unwrap_or(word.len());
            lines.push(word[..split].to_string());
            word = &word[split..];
        }
        if word.is_empty() {
            continue;
        }
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > columns {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// One scheduled move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollStep {
    pub line: usize,
    pub offset_px: f32,
}

fn jitter_ms(rng: &mut fastrand::Rng, spread: u64) -> i64 {
    if spread == 0 {
        return 0;
    }
    rng.u64(0..=spread * 2) as i64 - spread as i64
}

fn jitter_px(rng: &mut fastrand::Rng, spread: f32) -> f32 {
    if spread <= 0.0 {
        return 0.0;
    }
    (rng.f32() * 2.0 - 1.0) * spread
}

/// Lay out one pass over `lines` rendered lines.
///
/// Step 0 places the content top at the viewport bottom. Each following step
/// moves up one line height; the last one leaves the content fully above the
/// viewport. The plan's total is the time of the last step.
pub fn scroll_plan(lines: usize, config: &ScrollConfig, rng: &mut fastrand::Rng) -> Plan<ScrollStep> {
    let line_height = config.line_height_px.max(1.0);
    let viewport = config.viewport_height_px.max(0.0);
    let content_height = lines as f32 * line_height;
    let steps = ((content_height + viewport) / line_height).ceil() as usize;

    let mut plan = Plan::new();
    plan.push(
        Duration::ZERO,
        ScrollStep {
            line: 0,
            offset_px: viewport,
        },
    );
    let mut at_ms: u64 = 0;
    for line in 1..=steps {
        let interval = config.line_interval().as_millis() as i64 + jitter_ms(rng, config.line_jitter_ms);
        at_ms += interval.max(1) as u64;
        let mut offset_px = viewport - line as f32 * line_height + jitter_px(rng, config.position_jitter_px);
        if line == steps {
            offset_px = offset_px.min(-content_height);
        }
        plan.push(Duration::from_millis(at_ms), ScrollStep { line, offset_px });
    }
    plan
}

/// Content of one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollContent {
    pub revision: u64,
    pub lines: Vec<String>,
    pub steps: usize,
}

/// What the current session is doing.
#[derive(Debug, Clone, PartialEq)]
pub enum Pass {
    Scroll(ScrollContent),
    /// Waiting for content to appear.
    Retry,
}

pub struct ScrollChannel {
    config: ScrollConfig,
    surface: Box<dyn ScrollSurface>,
    scheduler: Scheduler<ScrollStep>,
    session: Option<SchedulerSession<Pass>>,
    state: ChannelState,
    rng: fastrand::Rng,
    passes: u64,
    frames: u64,
    outbox: Vec<StatusEvent>,
}

impl ScrollChannel {
    pub fn new(config: ScrollConfig, surface: Box<dyn ScrollSurface>) -> Self {
        let rng = match config.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        ScrollChannel {
            config,
            surface,
            scheduler: Scheduler::new(),
            session: None,
            state: ChannelState::Stopped,
            rng,
            passes: 0,
            frames: 0,
            outbox: Vec::new(),
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn current_pass(&self) -> Option<&Pass> {
        self.session.as_ref().map(|s| s.snapshot())
    }

    /// Passes scrolled fully past the top.
    pub fn completed_passes(&self) -> u64 {
        self.passes
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    /// Begin scrolling. No-op unless stopped.
    pub fn start(&mut self, now: Duration, source: &dyn SequenceSource) {
        if self.state != ChannelState::Stopped {
            debug!(state = %self.state, "scroll start ignored");
            return;
        }
        self.state = ChannelState::Playing;
        info!("scroll channel started");
        self.outbox
            .push(StatusEvent::new(ChannelKind::Scroll, ChannelStatus::Started));
        self.launch(now, source);
    }

    /// Returns false if already stopped.
    pub fn stop(&mut self) -> bool {
        if self.state == ChannelState::Stopped {
            return false;
        }
        self.cancel_session();
        self.surface.clear();
        self.state = ChannelState::Stopped;
        info!("scroll channel stopped");
        self.outbox
            .push(StatusEvent::new(ChannelKind::Scroll, ChannelStatus::Stopped));
        true
    }

    /// Restart the pass from the bottom with fresh content.
    pub fn content_changed(&mut self, now: Duration, source: &dyn SequenceSource) {
        if self.state != ChannelState::Playing {
            return;
        }
        debug!("scroll content changed, restarting pass");
        self.cancel_session();
        self.launch(now, source);
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.scheduler.next_deadline()
    }

    pub fn fire_due(&mut self, now: Duration, source: &dyn SequenceSource) {
        while let Some(fired) = self.scheduler.poll(now) {
            let Some(session) = self.session.as_mut() else {
                continue;
            };
            if !session.accept(&fired) {
                trace!("dropping stale scroll timer");
                continue;
            }
            match fired.step {
                SessionStep::Step(step) => self.render(step),
                SessionStep::Complete { .. } => {
                    if matches!(self.current_pass(), Some(Pass::Scroll(_))) {
                        self.passes += 1;
                        trace!(pass = self.passes, "scroll pass complete");
                    }
                    self.session = None;
                    self.launch(fired.timer.due(), source);
                }
            }
        }
    }

    pub fn drain_events(&mut self) -> Vec<StatusEvent> {
        std::mem::take(&mut self.outbox)
    }

    fn launch(&mut self, now: Duration, source: &dyn SequenceSource) {
        let sequence = source.broadcast_sequence();
        let session = match sequence.playable() {
            Ok(_) => {
                let lines = wrap_lines(&sequence.code_text(), self.config.columns);
                let plan = scroll_plan(lines.len(), &self.config, &mut self.rng);
                let content = ScrollContent {
                    revision: sequence.revision(),
                    lines,
                    steps: plan.len(),
                };
                debug!(
                    revision = content.revision,
                    lines = content.lines.len(),
                    steps = content.steps,
                    "scroll pass launched"
                );
                self.surface.set_content(&content.lines);
                self.scheduler.launch(now, Pass::Scroll(content), plan)
            }
            Err(e) => {
                debug!("{}, retrying in {:?}", e, self.config.empty_retry());
                self.scheduler
                    .launch(now, Pass::Retry, Plan::rest(self.config.empty_retry()))
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
                "scroll session cancelled"
            );
        }
    }

    fn render(&mut self, step: ScrollStep) {
        let total_lines = match self.current_pass() {
            Some(Pass::Scroll(content)) => content.steps,
            _ => return,
        };
        self.frames += 1;
        self.surface.render(&ScrollFrame {
            offset_px: step.offset_px,
            line: step.line,
            total_lines,
        });
    }
}

/// Prints each content line as it enters the bottom of the viewport.
pub struct TextSurface<W> {
    out: W,
    lines: Vec<String>,
    line_height_px: f32,
    viewport_height_px: f32,
    shown: usize,
}

impl<W: Write> TextSurface<W> {
    pub fn new(out: W, config: &ScrollConfig) -> Self {
        TextSurface {
            out,
            lines: Vec::new(),
            line_height_px: config.line_height_px.max(1.0),
            viewport_height_px: config.viewport_height_px,
            shown: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ScrollSurface for TextSurface<W> {
    fn set_content(&mut self, lines: &[String]) {
        self.lines = lines.to_vec();
        self.shown = 0;
    }

    fn render(&mut self, frame: &ScrollFrame) {
        let entered = ((self.viewport_height_px - frame.offset_px) / self.line_height_px).round();
        let entered = (entered.max(0.0) as usize).min(self.lines.len());
        while self.shown < entered {
            if let Err(e) = writeln!(self.out, "{}", self.lines[self.shown]) {
                warn!("scroll output failed: {}", e);
                return;
            }
            self.shown += 1;
        }
        if let Err(e) = self.out.flush() {
            warn!("scroll output failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, VirtualClock};
    use crate::persistence::MemoryStore;
    use crate::phrase_store::{IdentityTranslator, PhraseStore};
    use crate::test_utils::RecordingSurface;

    fn seeded() -> ScrollConfig {
        ScrollConfig {
            seed: Some(7),
            ..ScrollConfig::default()
        }
    }

    #[test]
    fn wraps_greedily_at_spaces() {
        assert_eq!(wrap_lines("... --- ... / -", 8), vec!["... ---", "... / -"]);
        assert_eq!(wrap_lines("", 8), Vec::<String>::new());
        assert_eq!(wrap_lines("-----------", 4), vec!["----", "----", "---"]);
        assert_eq!(wrap_lines(". -", 0), vec![".", "-"]);
    }

    #[test]
    fn plan_moves_one_line_per_step_until_past_top() {
        let config = seeded();
        let mut rng = fastrand::Rng::with_seed(1);
        let plan = scroll_plan(2, &config, &mut rng);
        // ceil((48 + 240) / 24) = 12 moves plus the opening placement
        assert_eq!(plan.len(), 13);

        let steps = plan.steps();
        assert_eq!(steps[0].step.offset_px, 240.0);
        assert_eq!(steps[0].offset, Duration::ZERO);
        for (i, s) in steps.iter().enumerate().skip(1) {
            let nominal = 240.0 - i as f32 * 24.0;
            assert!((s.step.offset_px - nominal).abs() <= 0.5 || i == 12);
            let gap = (s.offset - steps[i - 1].offset).as_millis() as u64;
            assert!((1985..=2015).contains(&gap), "interval {} out of range", gap);
        }
        assert!(steps[12].step.offset_px <= -48.0);
        assert_eq!(plan.total(), steps[12].offset);
    }

    #[test]
    fn plan_is_reproducible_with_a_seed() {
        let config = seeded();
        let a = scroll_plan(3, &config, &mut fastrand::Rng::with_seed(42));
        let b = scroll_plan(3, &config, &mut fastrand::Rng::with_seed(42));
        assert_eq!(a, b);
    }

    #[test]
    fn no_jitter_gives_exact_cadence() {
        let config = ScrollConfig {
            line_jitter_ms: 0,
            position_jitter_px: 0.0,
            ..ScrollConfig::default()
        };
        let plan = scroll_plan(1, &config, &mut fastrand::Rng::with_seed(0));
        let offsets: Vec<u64> = plan.steps().iter().map(|s| s.offset.as_millis() as u64).collect();
        assert_eq!(offsets.len(), 12);
        assert_eq!(offsets[1], 2000);
        assert_eq!(offsets[11], 22_000);
        assert_eq!(plan.steps()[11].step.offset_px, -24.0);
    }

    fn run(channel: &mut ScrollChannel, clock: &mut VirtualClock, store: &PhraseStore, total_ms: u64) {
        let end = clock.now() + Duration::from_millis(total_ms);
        while clock.now() < end {
            let now = clock.advance_ms(50);
            channel.fire_due(now, store);
        }
    }

    #[test]
    fn pass_completes_and_restarts_from_bottom() {
        let store = PhraseStore::new(&["E"]);
        let surface = RecordingSurface::new();
        let mut channel = ScrollChannel::new(seeded(), surface.surface());
        let mut clock = VirtualClock::new();
        channel.start(clock.now(), &store);

        // one line: 11 moves at ~2 s
        run(&mut channel, &mut clock, &store, 11 * 2015 + 100);
        assert_eq!(channel.completed_passes(), 1);
        assert_eq!(surface.contents().len(), 2);
        assert_eq!(surface.contents()[0], vec![".".to_string()]);

        let frames = surface.frames();
        let restart = frames.iter().rposition(|f| f.line == 0).unwrap();
        assert!(restart > 0);
        assert_eq!(frames[restart].offset_px, 240.0);
        assert!(frames[restart - 1].offset_px <= -24.0);
    }

    #[test]
    fn stop_freezes_frames_and_is_idempotent() {
        let store = PhraseStore::new(&["SOS"]);
        let surface = RecordingSurface::new();
        let mut channel = ScrollChannel::new(seeded(), surface.surface());
        let mut clock = VirtualClock::new();
        channel.start(clock.now(), &store);
        run(&mut channel, &mut clock, &store, 5000);

        assert!(channel.stop());
        assert!(!channel.stop());
        let frozen = surface.frame_count();
        run(&mut channel, &mut clock, &store, 60_000);
        assert_eq!(surface.frame_count(), frozen);
        assert_eq!(surface.clears(), 1);
        assert_eq!(channel.next_deadline(), None);
    }

    #[test]
    fn content_change_restarts_with_new_text() {
        let mut store = PhraseStore::new(&["E"]);
        let surface = RecordingSurface::new();
        let mut channel = ScrollChannel::new(seeded(), surface.surface());
        let mut clock = VirtualClock::new();
        channel.start(clock.now(), &store);
        run(&mut channel, &mut clock, &store, 4100);

        let mut disk = MemoryStore::new();
        store.submit("T", &IdentityTranslator, &mut disk).unwrap();
        channel.content_changed(clock.now(), &store);

        match channel.current_pass() {
            Some(Pass::Scroll(content)) => {
                assert_eq!(content.revision, 1);
                assert_eq!(content.lines, vec![". / -".to_string()]);
            }
            other => panic!("expected a scroll pass, got {:?}", other),
        }
        assert_eq!(surface.contents().len(), 2);
    }

    #[test]
    fn empty_content_retries() {
        let mut store = PhraseStore::new::<&str>(&[]);
        let surface = RecordingSurface::new();
        let mut channel = ScrollChannel::new(seeded(), surface.surface());
        let mut clock = VirtualClock::new();
        channel.start(clock.now(), &store);
        assert_eq!(channel.current_pass(), Some(&Pass::Retry));

        let mut disk = MemoryStore::new();
        store.submit("E", &IdentityTranslator, &mut disk).unwrap();
        run(&mut channel, &mut clock, &store, 2000);
        assert!(matches!(channel.current_pass(), Some(Pass::Scroll(_))));
        assert_eq!(surface.frame_count(), 1);
    }

    #[test]
    fn zero_delays_never_stall_the_timeline() {
        let config = ScrollConfig {
            line_ms: 0,
            line_jitter_ms: 0,
            empty_retry_ms: 0,
            ..seeded()
        };
        let mut store = PhraseStore::new::<&str>(&[]);
        let surface = RecordingSurface::new();
        let mut channel = ScrollChannel::new(config, surface.surface());
        let mut clock = VirtualClock::new();
        channel.start(clock.now(), &store);
        run(&mut channel, &mut clock, &store, 50);
        assert!(channel.next_deadline().is_some_and(|due| due > clock.now()));

        let mut disk = MemoryStore::new();
        store.submit("E", &IdentityTranslator, &mut disk).unwrap();
        run(&mut channel, &mut clock, &store, 50);
        // 11 one-millisecond moves per pass
        assert!(channel.completed_passes() >= 3);
        assert!(channel.next_deadline().is_some_and(|due| due > clock.now()));
    }

    #[test]
    fn text_surface_prints_lines_as_they_enter() {
        let config = ScrollConfig::default();
        let mut surface = TextSurface::new(Vec::new(), &config);
        surface.set_content(&["one".to_string(), "two".to_string()]);
        let frame = |line: usize, offset_px: f32| ScrollFrame {
            offset_px,
            line,
            total_lines: 13,
        };
        surface.render(&frame(0, 240.0));
        surface.render(&frame(1, 216.3));
        surface.render(&frame(2, 191.6));
        surface.render(&frame(3, 168.0));
        assert_eq!(String::from_utf8(surface.into_inner()).unwrap(), "one\ntwo\n");
    }
}
