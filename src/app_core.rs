//! AppCore — central command dispatcher for morsecast.
//!
//! Owns the phrase store, both channels and the injected capabilities. The
//! CLI, the runtime thread and tests all go through these methods. Time is
//! always passed in, so the same core runs on a wall clock or a virtual one.

use crate::audio_channel::AudioChannel;
use crate::config::BroadcastConfig;
use crate::error::Result;
use crate::output::{MasterGain, OutputProvider};
use crate::persistence::{Persistence, Volume};
use crate::phrase::{BroadcastSequence, Phrase, SequenceSource};
use crate::phrase_store::{PhraseStore, Translator};
use crate::scheduler::total_duration;
use crate::scroll_channel::{ScrollChannel, ScrollSurface};
use crate::status::{ChannelState, ChannelStatus, StatusEvent};
use chrono::Local;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

// ── Activity log ────────────────────────────────────────────────────────────

const ACTIVITY_MAX: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for ActivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            ActivityLevel::Info => "info",
            ActivityLevel::Warn => "warn",
            ActivityLevel::Error => "error",
        })
    }
}

/// One line of operator-facing activity. `seq` keeps counting when old
/// entries are evicted, so it works as a read cursor.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub seq: u64,
    pub timestamp: String,
    pub level: ActivityLevel,
    pub message: String,
}

impl fmt::Display for ActivityEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:<5} {}", self.timestamp, self.level, self.message)
    }
}

/// Bounded ring of recent submissions and channel changes, newest last.
#[derive(Debug, Default)]
pub struct ActivityLog {
    entries: VecDeque<ActivityEntry>,
    next_seq: u64,
}

impl ActivityLog {
    pub fn record(&mut self, level: ActivityLevel, message: String) {
        self.entries.push_back(ActivityEntry {
            seq: self.next_seq,
            timestamp: Local::now().format("%H:%M:%S").to_string(),
            level,
            message,
        });
        self.next_seq += 1;
        if self.entries.len() > ACTIVITY_MAX {
            self.entries.pop_front();
        }
    }

    /// Entries with `seq >= since`. Evicted ones are simply missing.
    pub fn since(&self, since: u64) -> Vec<ActivityEntry> {
        self.entries
            .iter()
            .filter(|e| e.seq >= since)
            .cloned()
            .collect()
    }

    /// Cursor to pass to `since` for only what comes next.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Response data types ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct StatusData {
    pub audio: ChannelState,
    pub scroll: ChannelState,
    pub volume: u8,
    pub phrase_count: usize,
    pub system_phrase_count: usize,
    pub revision: u64,
    pub broadcast_secs: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhraseData {
    pub index: usize,
    pub original_text: String,
    pub translated_text: String,
    pub encoded_text: String,
    pub submitted_at: String,
}

impl PhraseData {
    fn from_phrase(index: usize, phrase: &Phrase) -> Self {
        PhraseData {
            index,
            original_text: phrase.original_text.clone(),
            translated_text: phrase.translated_text.clone(),
            encoded_text: phrase.encoded_text.clone(),
            submitted_at: phrase.submitted_at.to_rfc3339(),
        }
    }
}

// ── AppCore ─────────────────────────────────────────────────────────────────

pub struct AppCore {
    config: BroadcastConfig,
    store: PhraseStore,
    persistence: Box<dyn Persistence>,
    translator: Box<dyn Translator>,
    volume: Volume,
    audio: AudioChannel,
    scroll: ScrollChannel,
    pending: Vec<StatusEvent>,
    activity: ActivityLog,
}

impl AppCore {
    /// Build a core and restore phrases and volume from `persistence`.
    /// Unreadable state is logged and replaced by defaults.
    pub fn new(
        config: BroadcastConfig,
        persistence: Box<dyn Persistence>,
        translator: Box<dyn Translator>,
        output: Box<dyn OutputProvider>,
        surface: Box<dyn ScrollSurface>,
    ) -> Self {
        let mut store = PhraseStore::new(&config.system_phrases[..]);
        match persistence.load_phrases() {
            Ok(phrases) if !phrases.is_empty() => {
                info!(count = phrases.len(), "phrases restored");
                store.load(phrases);
            }
            Ok(_) => {}
            Err(e) => warn!("could not load phrases: {}", e),
        }
        let volume = match persistence.load_volume() {
            Ok(v) => v.unwrap_or_default(),
            Err(e) => {
                warn!("could not load volume: {}", e);
                Volume::default()
            }
        };

        let master = MasterGain::new(volume.gain());
        let audio = AudioChannel::new(config.audio.clone(), output, master);
        let scroll = ScrollChannel::new(config.scroll.clone(), surface);
        AppCore {
            config,
            store,
            persistence,
            translator,
            volume,
            audio,
            scroll,
            pending: Vec::new(),
            activity: ActivityLog::default(),
        }
    }

    pub fn config(&self) -> &BroadcastConfig {
        &self.config
    }

    // ── Status (read-only) ──────────────────────────────────────────────

    pub fn get_status(&self) -> StatusData {
        let sequence = self.store.broadcast_sequence();
        let broadcast = total_duration(sequence.symbols().as_slice(), self.config.audio.unit());
        StatusData {
            audio: self.audio.state(),
            scroll: self.scroll.state(),
            volume: self.volume.value(),
            phrase_count: self.store.len(),
            system_phrase_count: self.store.system_phrases().len(),
            revision: self.store.revision(),
            broadcast_secs: broadcast.as_secs_f64(),
        }
    }

    pub fn get_phrases(&self) -> Vec<PhraseData> {
        self.store
            .phrases()
            .iter()
            .enumerate()
            .map(|(i, p)| PhraseData::from_phrase(i, p))
            .collect()
    }

    pub fn broadcast_sequence(&self) -> BroadcastSequence {
        self.store.broadcast_sequence()
    }

    pub fn store(&self) -> &PhraseStore {
        &self.store
    }

    pub fn audio(&self) -> &AudioChannel {
        &self.audio
    }

    pub fn scroll(&self) -> &ScrollChannel {
        &self.scroll
    }

    // ── Channels ────────────────────────────────────────────────────────

    pub fn start_audio(&mut self, now: Duration) -> Result<()> {
        let result = self.audio.start(now, &self.store);
        self.collect_events();
        result
    }

    /// Returns false if audio was already stopped.
    pub fn stop_audio(&mut self) -> bool {
        let stopped = self.audio.stop();
        self.collect_events();
        stopped
    }

    pub fn start_scroll(&mut self, now: Duration) {
        self.scroll.start(now, &self.store);
        self.collect_events();
    }

    /// Returns false if scroll was already stopped.
    pub fn stop_scroll(&mut self) -> bool {
        let stopped = self.scroll.stop();
        self.collect_events();
        stopped
    }

    // ── Phrases ─────────────────────────────────────────────────────────

    /// Add a phrase and restart whichever channels are playing.
    pub fn submit(&mut self, now: Duration, text: &str) -> Result<Phrase> {
        let phrase = match self
            .store
            .submit(text, self.translator.as_ref(), self.persistence.as_mut())
        {
            Ok(p) => p,
            Err(e) => {
                self.activity
                    .record(ActivityLevel::Warn, format!("Rejected \"{}\": {}", text, e));
                return Err(e);
            }
        };
        self.activity.record(
            ActivityLevel::Info,
            format!("Added: {} ({})", phrase.translated_text, phrase.encoded_text),
        );

        self.audio.content_changed(now, &self.store);
        self.scroll.content_changed(now, &self.store);
        self.collect_events();
        Ok(phrase)
    }

    // ── Volume ──────────────────────────────────────────────────────────

    pub fn volume(&self) -> Volume {
        self.volume
    }

    /// Apply at once, then persist best-effort.
    pub fn set_volume(&mut self, value: u8) -> Volume {
        let volume = Volume::new(value);
        self.volume = volume;
        self.audio.set_volume(volume);
        info!(%volume, "volume set");
        if let Err(e) = self.persistence.save_volume(volume) {
            warn!("could not persist volume: {}", e);
        }
        volume
    }

    // ── Activity ────────────────────────────────────────────────────────

    pub fn get_activity(&self, since: u64) -> Vec<ActivityEntry> {
        self.activity.since(since)
    }

    pub fn clear_activity(&mut self) {
        self.activity.clear();
    }

    // ── Timeline ────────────────────────────────────────────────────────

    /// Earliest pending timer across both channels.
    pub fn next_deadline(&self) -> Option<Duration> {
        match (self.audio.next_deadline(), self.scroll.next_deadline()) {
            (Some(a), Some(s)) => Some(a.min(s)),
            (a, s) => a.or(s),
        }
    }

    /// Run everything due at `now` on both channels.
    pub fn fire_due(&mut self, now: Duration) {
        self.audio.fire_due(now, &self.store);
        self.scroll.fire_due(now, &self.store);
        self.collect_events();
    }

    /// Status changes since the last drain.
    pub fn drain_events(&mut self) -> Vec<StatusEvent> {
        std::mem::take(&mut self.pending)
    }

    fn collect_events(&mut self) {
        let events: Vec<StatusEvent> = self
            .audio
            .drain_events()
            .into_iter()
            .chain(self.scroll.drain_events())
            .collect();
        for event in events {
            let level = match event.status {
                ChannelStatus::Failed(_) => ActivityLevel::Error,
                _ => ActivityLevel::Info,
            };
            self.activity.record(level, event.to_string());
            self.pending.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BroadcastError;
    use crate::persistence::MemoryStore;
    use crate::phrase_store::UppercaseTranslator;
    use crate::status::ChannelKind;
    use crate::test_utils::{RecordingOutput, RecordingSurface};

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn make_core_with(store: MemoryStore, system: &[&str]) -> (AppCore, RecordingOutput, RecordingSurface) {
        let output = RecordingOutput::new();
        let surface = RecordingSurface::new();
        let mut config = BroadcastConfig::default();
        config.system_phrases = system.iter().map(|s| s.to_string()).collect();
        config.scroll.seed = Some(3);
        let core = AppCore::new(
            config,
            Box::new(store),
            Box::new(UppercaseTranslator),
            output.provider(),
            surface.surface(),
        );
        (core, output, surface)
    }

    fn make_core() -> (AppCore, RecordingOutput, RecordingSurface) {
        make_core_with(MemoryStore::new(), &[])
    }

    /// Fire everything up to `until`, in 10 ms steps.
    fn run_until(core: &mut AppCore, from: Duration, until: Duration) {
        let mut now = from;
        while now < until {
            now += ms(10);
            core.fire_due(now);
        }
    }

    // -- Construction --

    #[test]
    fn fresh_core_is_stopped_with_default_volume() {
        let (core, _, _) = make_core();
        let status = core.get_status();
        assert_eq!(status.audio, ChannelState::Stopped);
        assert_eq!(status.scroll, ChannelState::Stopped);
        assert_eq!(status.volume, 50);
        assert_eq!(status.phrase_count, 0);
        assert_eq!(core.next_deadline(), None);
    }

    #[test]
    fn restores_phrases_and_volume() {
        let mut disk = MemoryStore::new();
        disk.phrases = vec![Phrase::new("hi", "HI", chrono::Utc::now()).unwrap()];
        disk.volume = Some(Volume::new(80));
        let (core, _, _) = make_core_with(disk, &["E"]);

        let status = core.get_status();
        assert_eq!(status.phrase_count, 1);
        assert_eq!(status.system_phrase_count, 1);
        assert_eq!(status.volume, 80);
        assert_eq!(core.audio().master().gain(), 0.8);
        assert_eq!(core.broadcast_sequence().code_text(), ". / .... ..");
    }

    // -- Submit --

    #[test]
    fn submit_translates_and_lists() {
        let (mut core, _, _) = make_core();
        let phrase = core.submit(Duration::ZERO, "  sos ").unwrap();
        assert_eq!(phrase.translated_text, "SOS");
        assert_eq!(phrase.encoded_text, "... --- ...");

        let phrases = core.get_phrases();
        assert_eq!(phrases.len(), 1);
        assert_eq!(phrases[0].original_text, "  sos ");
        assert!((core.get_status().broadcast_secs - 5.2).abs() < 1e-9);
    }

    #[test]
    fn submit_rejects_unencodable_text() {
        let (mut core, _, _) = make_core();
        assert_eq!(core.submit(Duration::ZERO, "   "), Err(BroadcastError::EncodingEmpty));
        assert_eq!(core.submit(Duration::ZERO, "~~~"), Err(BroadcastError::EncodingEmpty));
        assert!(core.get_phrases().is_empty());
        assert_eq!(core.get_status().revision, 0);
    }

    #[test]
    fn submit_survives_failing_persistence() {
        let disk = MemoryStore {
            fail_saves: Some("disk full".into()),
            ..MemoryStore::default()
        };
        let (mut core, _, _) = make_core_with(disk, &[]);
        core.submit(Duration::ZERO, "e").unwrap();
        assert_eq!(core.get_phrases().len(), 1);
        assert_eq!(core.set_volume(10), Volume::new(10));
        assert_eq!(core.volume(), Volume::new(10));
    }

    #[test]
    fn submit_restarts_playing_channels_only() {
        let (mut core, output, surface) = make_core_with(MemoryStore::new(), &["E"]);
        core.start_audio(Duration::ZERO).unwrap();
        run_until(&mut core, Duration::ZERO, ms(100));

        core.submit(ms(100), "t").unwrap();
        assert_eq!(output.halts(), 1);
        // scroll was never started, so nothing was drawn
        assert!(surface.contents().is_empty());
        assert_eq!(core.get_status().scroll, ChannelState::Stopped);
    }

    // -- Channels --

    #[test]
    fn channels_start_and_stop_independently() {
        let (mut core, output, surface) = make_core_with(MemoryStore::new(), &["SOS"]);
        core.start_audio(Duration::ZERO).unwrap();
        core.start_scroll(Duration::ZERO);
        run_until(&mut core, Duration::ZERO, ms(1000));

        assert!(core.stop_audio());
        let tones = output.tone_count();
        let frames = surface.frame_count();
        run_until(&mut core, ms(1000), ms(30_000));

        assert_eq!(output.tone_count(), tones);
        assert!(surface.frame_count() > frames);
        assert_eq!(core.get_status().scroll, ChannelState::Playing);

        let events = core.drain_events();
        assert_eq!(
            events,
            vec![
                StatusEvent::new(ChannelKind::Audio, ChannelStatus::Started),
                StatusEvent::new(ChannelKind::Scroll, ChannelStatus::Started),
                StatusEvent::new(ChannelKind::Audio, ChannelStatus::Stopped),
            ]
        );
        assert!(core.drain_events().is_empty());
    }

    #[test]
    fn next_deadline_is_earliest_of_both() {
        let (mut core, _, _) = make_core_with(MemoryStore::new(), &["E"]);
        core.start_scroll(ms(5));
        assert_eq!(core.next_deadline(), Some(ms(5)));
        core.start_audio(ms(1)).unwrap();
        assert_eq!(core.next_deadline(), Some(ms(1)));
    }

    #[test]
    fn failed_start_is_logged_and_reported() {
        let (mut core, output, _) = make_core();
        output.deny_acquire(true);
        assert!(matches!(
            core.start_audio(Duration::ZERO),
            Err(BroadcastError::OutputUnavailable(_))
        ));
        let events = core.drain_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].status, ChannelStatus::Failed(_)));
        let activity = core.get_activity(0);
        assert_eq!(activity.last().map(|a| a.level), Some(ActivityLevel::Error));
    }

    // -- Volume --

    #[test]
    fn volume_is_clamped_applied_and_persisted() {
        let (mut core, output, _) = make_core_with(MemoryStore::new(), &["SOS"]);
        core.start_audio(Duration::ZERO).unwrap();
        run_until(&mut core, Duration::ZERO, ms(10));
        assert_eq!(core.set_volume(200), Volume::MAX);
        run_until(&mut core, ms(10), ms(500));

        let tones = output.tones();
        assert_eq!(tones[0].master_gain, 0.5);
        assert_eq!(tones[1].master_gain, 1.0);
        assert_eq!(core.get_status().volume, 100);
    }

    // -- Activity --

    #[test]
    fn activity_log_caps_entries_and_keeps_cursor() {
        let mut log = ActivityLog::default();
        for i in 0..(ACTIVITY_MAX + 20) {
            log.record(ActivityLevel::Info, format!("entry {}", i));
        }
        assert_eq!(log.len(), ACTIVITY_MAX);
        assert_eq!(log.since(0)[0].message, "entry 20");
        assert_eq!(log.since(0)[0].seq, 20);
        let cursor = log.next_seq();
        assert!(log.since(cursor).is_empty());
        log.record(ActivityLevel::Warn, "late".to_string());
        let fresh = log.since(cursor);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].to_string().split_once(' ').map(|x| x.1), Some("warn  late"));
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn submissions_and_channel_changes_reach_activity() {
        let (mut core, _, _) = make_core();
        assert!(core.submit(Duration::ZERO, "   ").is_err());
        core.submit(Duration::ZERO, "sos").unwrap();
        core.start_scroll(Duration::ZERO);

        let activity = core.get_activity(0);
        let levels: Vec<ActivityLevel> = activity.iter().map(|a| a.level).collect();
        assert_eq!(levels, vec![ActivityLevel::Warn, ActivityLevel::Info, ActivityLevel::Info]);
        assert_eq!(activity[1].message, "Added: SOS (... --- ...)");
        assert_eq!(core.get_activity(activity[2].seq).len(), 1);

        core.clear_activity();
        assert!(core.get_activity(0).is_empty());
    }
}
