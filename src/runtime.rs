//! Runtime — dedicated broadcast thread with channel-based command dispatch.
//!
//! The thread builds and owns the `AppCore` (no Send/Sync needed for the
//! output device). External code talks to it through `RuntimeHandle`, which
//! wraps an `mpsc::Sender<RuntimeCmd>`. Between commands the thread sleeps in
//! `recv_timeout` until the next timer deadline, then fires what is due on a
//! wall clock.

use crate::app_core::{ActivityEntry, AppCore, StatusData};
use crate::clock::{Clock, SystemClock};
use crate::error::{BroadcastError, Result};
use crate::phrase::Phrase;
use crate::status::StatusEvent;
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

/// Longest wait between loop turns when nothing is scheduled sooner.
const IDLE_POLL: Duration = Duration::from_millis(50);

// ── Commands ─────────────────────────────────────────────────────────────────

/// Commands sent to the runtime thread.
pub enum RuntimeCmd {
    StartAudio,
    StopAudio,
    StartScroll,
    StopScroll,
    Submit {
        text: String,
        reply: mpsc::Sender<Result<Phrase>>,
    },
    SetVolume(u8),
    Status {
        reply: mpsc::Sender<StatusData>,
    },
    Activity {
        since: u64,
        reply: mpsc::Sender<Vec<ActivityEntry>>,
    },
    Shutdown,
}

// ── Handle ───────────────────────────────────────────────────────────────────

/// Thread-safe handle for sending commands to the runtime.
#[derive(Clone)]
pub struct RuntimeHandle {
    tx: mpsc::Sender<RuntimeCmd>,
}

impl RuntimeHandle {
    fn send(&self, cmd: RuntimeCmd) -> Result<()> {
        self.tx.send(cmd).map_err(|_| {
            warn!("runtime is gone, command dropped");
            BroadcastError::RuntimeStopped
        })
    }

    pub fn start_audio(&self) -> Result<()> {
        self.send(RuntimeCmd::StartAudio)
    }

    pub fn stop_audio(&self) -> Result<()> {
        self.send(RuntimeCmd::StopAudio)
    }

    pub fn start_scroll(&self) -> Result<()> {
        self.send(RuntimeCmd::StartScroll)
    }

    pub fn stop_scroll(&self) -> Result<()> {
        self.send(RuntimeCmd::StopScroll)
    }

    pub fn set_volume(&self, value: u8) -> Result<()> {
        self.send(RuntimeCmd::SetVolume(value))
    }

    /// Submit a phrase and wait for the outcome.
    pub fn submit(&self, text: &str) -> Result<Phrase> {
        let (reply, rx) = mpsc::channel();
        self.tx
            .send(RuntimeCmd::Submit {
                text: text.to_string(),
                reply,
            })
            .map_err(|_| BroadcastError::RuntimeStopped)?;
        rx.recv().map_err(|_| BroadcastError::RuntimeStopped)?
    }

    pub fn status(&self) -> Result<StatusData> {
        let (reply, rx) = mpsc::channel();
        self.send(RuntimeCmd::Status { reply })?;
        rx.recv().map_err(|_| BroadcastError::RuntimeStopped)
    }

    /// Activity entries with `seq >= since`.
    pub fn activity(&self, since: u64) -> Result<Vec<ActivityEntry>> {
        let (reply, rx) = mpsc::channel();
        self.send(RuntimeCmd::Activity { since, reply })?;
        rx.recv().map_err(|_| BroadcastError::RuntimeStopped)
    }

    /// Ok even if the runtime already exited.
    pub fn shutdown(&self) {
        if self.tx.send(RuntimeCmd::Shutdown).is_err() {
            debug!("runtime already stopped");
        }
    }
}

// ── Runtime ──────────────────────────────────────────────────────────────────

/// Spawn the runtime on a dedicated thread.
///
/// `build` runs on the new thread and produces the core it will own.
/// `on_event` is called from that thread for every channel status change.
pub fn spawn_runtime<B, F>(build: B, on_event: F) -> std::io::Result<(RuntimeHandle, JoinHandle<()>)>
where
    B: FnOnce() -> AppCore + Send + 'static,
    F: Fn(StatusEvent) + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<RuntimeCmd>();

    let join = std::thread::Builder::new()
        .name("broadcast-runtime".into())
        .spawn(move || {
            let core = build();
            runtime_loop(rx, core, SystemClock::new(), on_event);
        })?;

    Ok((RuntimeHandle { tx }, join))
}

/// Main loop for the runtime thread. Owns the core.
fn runtime_loop<C, F>(rx: mpsc::Receiver<RuntimeCmd>, mut core: AppCore, clock: C, on_event: F)
where
    C: Clock,
    F: Fn(StatusEvent),
{
    loop {
        let wait = core
            .next_deadline()
            .map(|due| due.saturating_sub(clock.now()))
            .unwrap_or(IDLE_POLL)
            .min(IDLE_POLL);

        match rx.recv_timeout(wait) {
            Ok(RuntimeCmd::Shutdown) => {
                core.stop_audio();
                core.stop_scroll();
                deliver(&mut core, &on_event);
                debug!("runtime shut down");
                break;
            }
            Ok(cmd) => dispatch(&mut core, cmd, clock.now()),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                // All handles dropped
                core.stop_audio();
                core.stop_scroll();
                deliver(&mut core, &on_event);
                break;
            }
        }

        core.fire_due(clock.now());
        deliver(&mut core, &on_event);
    }
}

fn dispatch(core: &mut AppCore, cmd: RuntimeCmd, now: Duration) {
    match cmd {
        RuntimeCmd::StartAudio => {
            // failure already surfaces as a status event
            if let Err(e) = core.start_audio(now) {
                debug!("start audio: {}", e);
            }
        }
        RuntimeCmd::StopAudio => {
            core.stop_audio();
        }
        RuntimeCmd::StartScroll => core.start_scroll(now),
        RuntimeCmd::StopScroll => {
            core.stop_scroll();
        }
        RuntimeCmd::Submit { text, reply } => {
            if reply.send(core.submit(now, &text)).is_err() {
                warn!("submit caller went away before the reply");
            }
        }
        RuntimeCmd::SetVolume(value) => {
            core.set_volume(value);
        }
        RuntimeCmd::Status { reply } => {
            if reply.send(core.get_status()).is_err() {
                warn!("status caller went away before the reply");
            }
        }
        RuntimeCmd::Activity { since, reply } => {
            if reply.send(core.get_activity(since)).is_err() {
                warn!("activity caller went away before the reply");
            }
        }
        RuntimeCmd::Shutdown => {}
    }
}

fn deliver<F: Fn(StatusEvent)>(core: &mut AppCore, on_event: &F) {
    for event in core.drain_events() {
        on_event(event);
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
