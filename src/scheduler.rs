//! Timing plans and cancellable sessions.
//!
//! A `Plan` is a list of `(offset, step)` pairs plus a total duration. The
//! `Scheduler` turns a plan into timers on its own `TimerQueue` and hands the
//! owning channel a `SchedulerSession` that tracks every pending handle.
//! Continuation (looping) is decided by the owner when it sees `Complete`;
//! timers never schedule further timers themselves.

use crate::clock::{TimerId, TimerQueue};
use crate::encoder::Symbol;
use std::collections::BTreeSet;
use std::time::Duration;

/// Default base timing quantum.
pub const DEFAULT_UNIT: Duration = Duration::from_millis(200);

/// Units a short mark occupies including its trailing intra-symbol gap.
const SHORT_ADVANCE: u32 = 2;
/// Units a long mark occupies including its trailing intra-symbol gap.
const LONG_ADVANCE: u32 = 4;
const GAP_ADVANCE: u32 = 1;
const WORD_GAP_ADVANCE: u32 = 7;

// ── Plans ───────────────────────────────────────────────────────────────────

/// A single step of a plan, `offset` from session start.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStep<M> {
    pub offset: Duration,
    pub step: M,
}

/// Time-ordered steps plus the total session length.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan<M> {
    steps: Vec<PlannedStep<M>>,
    total: Duration,
}

impl<M> Plan<M> {
    pub fn new() -> Self {
        Plan {
            steps: Vec::new(),
            total: Duration::ZERO,
        }
    }

    /// A plan with no steps that completes after `wait`.
    pub fn rest(wait: Duration) -> Self {
        Plan {
            steps: Vec::new(),
            total: wait,
        }
    }

    /// Append a step. The total grows to cover it.
    pub fn push(&mut self, offset: Duration, step: M) {
        self.total = self.total.max(offset);
        self.steps.push(PlannedStep { offset, step });
    }

    /// Stretch the total (never shrinks below the last step).
    pub fn set_total(&mut self, total: Duration) {
        let last = self.steps.last().map(|s| s.offset).unwrap_or(Duration::ZERO);
        self.total = total.max(last);
    }

    pub fn steps(&self) -> &[PlannedStep<M>] {
        &self.steps
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl<M> Default for Plan<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// An audible mark: which symbol and how long the tone lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tone {
    pub symbol: Symbol,
    pub duration: Duration,
}

/// Lay out a symbol sequence on the 1:3:7 timing grid.
///
/// Short = 1 unit on, cursor +2. Long = 3 units on, cursor +4. Gap = +1.
/// WordGap = +7 and swallows any gaps that follow it.
pub fn symbol_plan(symbols: &[Symbol], unit: Duration) -> Plan<Tone> {
    let mut plan = Plan::new();
    let mut cursor: u32 = 0;
    let mut i = 0;
    while i < symbols.len() {
        match symbols[i] {
            Symbol::Short => {
                plan.push(
                    unit * cursor,
                    Tone {
                        symbol: Symbol::Short,
                        duration: unit,
                    },
                );
                cursor += SHORT_ADVANCE;
            }
            Symbol::Long => {
                plan.push(
                    unit * cursor,
                    Tone {
                        symbol: Symbol::Long,
                        duration: unit * 3,
                    },
                );
                cursor += LONG_ADVANCE;
            }
            Symbol::Gap => cursor += GAP_ADVANCE,
            Symbol::WordGap => {
                cursor += WORD_GAP_ADVANCE;
                while symbols.get(i + 1) == Some(&Symbol::Gap) {
                    i += 1;
                }
            }
        }
        i += 1;
    }
    plan.set_total(unit * cursor);
    plan
}

/// Total broadcast length of a symbol sequence.
pub fn total_duration(symbols: &[Symbol], unit: Duration) -> Duration {
    symbol_plan(symbols, unit).total()
}

// ── Sessions ────────────────────────────────────────────────────────────────

/// Identifies one run of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

/// What a fired timer carries.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionStep<M> {
    Step(M),
    /// Final timer of a session, carrying its total duration.
    Complete { total: Duration },
}

/// A timer that came due.
#[derive(Debug, Clone, PartialEq)]
pub struct Fired<M> {
    pub timer: TimerId,
    pub session: SessionId,
    pub step: SessionStep<M>,
}

/// One run of a channel over a snapshot `S`.
#[derive(Debug)]
pub struct SchedulerSession<S> {
    id: SessionId,
    snapshot: S,
    started_at: Duration,
    cursor: Duration,
    total: Duration,
    pending: BTreeSet<TimerId>,
    active: bool,
}

impl<S> SchedulerSession<S> {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn snapshot(&self) -> &S {
        &self.snapshot
    }

    pub fn started_at(&self) -> Duration {
        self.started_at
    }

    /// Offset of the most recently fired step.
    pub fn cursor(&self) -> Duration {
        self.cursor
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Liveness check for a fired timer.
    ///
    /// Accepts only timers this session still holds. A `Complete` step
    /// finishes the session.
    pub fn accept<M>(&mut self, fired: &Fired<M>) -> bool {
        if !self.active || fired.session != self.id || !self.pending.remove(&fired.timer) {
            return false;
        }
        self.cursor = fired.timer.due().saturating_sub(self.started_at);
        if matches!(fired.step, SessionStep::Complete { .. }) {
            self.active = false;
        }
        true
    }
}

/// Cooperative scheduler for one independent timeline.
#[derive(Debug)]
pub struct Scheduler<M> {
    queue: TimerQueue<(SessionId, SessionStep<M>)>,
    next_session: u64,
}

impl<M> Scheduler<M> {
    pub fn new() -> Self {
        Scheduler {
            queue: TimerQueue::new(),
            next_session: 1,
        }
    }

    /// Schedule every step of `plan` from `now` and return the session owning them.
    pub fn launch<S>(&mut self, now: Duration, snapshot: S, plan: Plan<M>) -> SchedulerSession<S> {
        let id = SessionId(self.next_session);
        self.next_session += 1;

        let total = plan.total;
        let mut pending = BTreeSet::new();
        for PlannedStep { offset, step } in plan.steps {
            pending.insert(self.queue.schedule(now, offset, (id, SessionStep::Step(step))));
        }
        pending.insert(
            self.queue
                .schedule(now, total, (id, SessionStep::Complete { total })),
        );

        SchedulerSession {
            id,
            snapshot,
            started_at: now,
            cursor: Duration::ZERO,
            total,
            pending,
            active: true,
        }
    }

    /// Cancel every pending timer of `session` and deactivate it.
    /// Returns how many timers were removed.
    pub fn cancel_all<S>(&mut self, session: &mut SchedulerSession<S>) -> usize {
        let mut removed = 0;
        for id in std::mem::take(&mut session.pending) {
            if self.queue.cancel(id).is_some() {
                removed += 1;
            }
        }
        session.active = false;
        removed
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.queue.next_deadline()
    }

    /// Next due timer at `now`, if any.
    pub fn poll(&mut self, now: Duration) -> Option<Fired<M>> {
        self.queue
            .pop_due(now)
            .map(|(timer, (session, step))| Fired {
                timer,
                session,
                step,
            })
    }

    /// Timers still queued across all sessions.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

impl<M> Default for Scheduler<M> {
    fn default() -> Self {
        Self::new()
    }
}
