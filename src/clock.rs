//! Round timing.
//!
//! `RoundClock` is a plain timer queue: callers schedule events at offsets from
//! an anchor time and later ask which ones are due. It never reads a real
//! clock, so the browser loop feeds it `performance.now()` while tests feed it
//! whatever timestamps they like.
//!
//! Follow-up timers are anchored at the due time of the event that caused
//! them rather than at the frame time it was noticed, so a slow frame does not
//! stretch later phases.

use crate::stones::StoneId;

/// Timing knobs, all in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Timings {
    pub show_ms: f64,
    pub input_ms: f64,
    pub buffer_ms: f64,
    pub session_ms: f64,
    pub session_tick_ms: f64,
    pub correct_feedback_ms: f64,
    pub incorrect_feedback_ms: f64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            show_ms: 10_000.0,
            input_ms: 20_000.0,
            buffer_ms: 10_000.0,
            session_ms: 150_000.0, // 2m 30s
            session_tick_ms: 100.0,
            correct_feedback_ms: 1_000.0,
            incorrect_feedback_ms: 700.0,
        }
    }
}

impl Timings {
    pub fn feedback_ms(&self, correct: bool) -> f64 {
        if correct {
            self.correct_feedback_ms
        } else {
            self.incorrect_feedback_ms
        }
    }
}

/// Something the clock wants the round machine to react to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClockEvent {
    /// Rabbit lands on the `step`-th stone of the sequence.
    Highlight { stone: StoneId, step: usize },
    /// Rabbit hops off into the bushes at the end of the show.
    ExitHop,
    ShowEnd,
    InputTimeout,
    BufferExpire,
    FeedbackDone,
    SessionTick { remaining_ms: f64 },
    SessionExpire,
}

/// A due event together with the time it was due.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fired {
    pub at_ms: f64,
    pub event: ClockEvent,
}

#[derive(Clone, Debug)]
struct Timer {
    due_ms: f64,
    seq: u64,
    event: ClockEvent,
}

/// Session-wide countdown. Ticks are derived from the start time, so missed
/// frames coalesce into a single tick carrying the latest remaining time.
#[derive(Clone, Debug)]
struct Countdown {
    start_ms: f64,
    total_ms: f64,
    tick_ms: f64,
    last_tick: u64,
}

impl Countdown {
    fn deadline(&self) -> f64 {
        self.start_ms + self.total_ms
    }

    fn remaining(&self, now: f64) -> f64 {
        (self.deadline() - now).max(0.0)
    }

    /// Latest tick index reached at `now`.
    fn tick_index(&self, now: f64) -> u64 {
        if self.tick_ms <= 0.0 || now < self.start_ms {
            return 0;
        }
        ((now - self.start_ms) / self.tick_ms).floor() as u64
    }

    fn due(&self, now: f64) -> Option<Fired> {
        if now >= self.deadline() {
            return Some(Fired {
                at_ms: self.deadline(),
                event: ClockEvent::SessionExpire,
            });
        }
        let idx = self.tick_index(now);
        (idx > self.last_tick).then(|| {
            let at_ms = self.start_ms + idx as f64 * self.tick_ms;
            Fired {
                at_ms,
                event: ClockEvent::SessionTick {
                    remaining_ms: self.remaining(at_ms),
                },
            }
        })
    }
}

/// Cancellable timer set for one session.
#[derive(Clone, Debug, Default)]
pub struct RoundClock {
    timers: Vec<Timer>,
    next_seq: u64,
    phase_deadline: Option<f64>,
    countdown: Option<Countdown>,
}

impl RoundClock {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, due_ms: f64, event: ClockEvent) {
        self.timers.push(Timer {
            due_ms,
            seq: self.next_seq,
            event,
        });
        self.next_seq += 1;
    }

    /// Lay out the hop animation for `sequence` across `show_ms`.
    ///
    /// The window is cut into `len + 2` equal steps: a settle step at home,
    /// one per stone, and the hop into the bushes. Whatever remains after the
    /// exit hop is the tail before the input phase opens.
    pub fn schedule_show_phase(&mut self, now: f64, sequence: &[StoneId], show_ms: f64) {
        let step_ms = (show_ms / (sequence.len() + 2) as f64).floor();
        for (step, &stone) in sequence.iter().enumerate() {
            self.push(
                now + (step + 1) as f64 * step_ms,
                ClockEvent::Highlight { stone, step },
            );
        }
        self.push(
            now + (sequence.len() + 1) as f64 * step_ms,
            ClockEvent::ExitHop,
        );
        self.push(now + show_ms, ClockEvent::ShowEnd);
        self.phase_deadline = Some(now + show_ms);
    }

    pub fn schedule_input_phase(&mut self, now: f64, duration_ms: f64) {
        self.push(now + duration_ms, ClockEvent::InputTimeout);
        self.phase_deadline = Some(now + duration_ms);
    }

    /// One-time extension of the input window.
    pub fn schedule_buffer(&mut self, now: f64, duration_ms: f64) {
        self.push(now + duration_ms, ClockEvent::BufferExpire);
        self.phase_deadline = Some(now + duration_ms);
    }

    pub fn schedule_feedback(&mut self, now: f64, delay_ms: f64) {
        self.push(now + delay_ms, ClockEvent::FeedbackDone);
        self.phase_deadline = None;
    }

    /// Start (or restart) the session countdown.
    pub fn start_session_countdown(&mut self, now: f64, total_ms: f64, tick_ms: f64) {
        self.countdown = Some(Countdown {
            start_ms: now,
            total_ms,
            tick_ms,
            last_tick: 0,
        });
    }

    pub fn session_running(&self) -> bool {
        self.countdown.is_some()
    }

    /// Drop every round-scoped timer. Must run before a transition schedules
    /// anything new, otherwise a timer from the previous round fires into the
    /// next one. The session countdown keeps running.
    pub fn cancel_round(&mut self) {
        self.timers.clear();
        self.phase_deadline = None;
    }

    /// Drop everything, the session countdown included.
    pub fn cancel_all(&mut self) {
        self.cancel_round();
        self.countdown = None;
    }

    /// Round-scoped timers still waiting.
    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    /// Remove and return the earliest event due at `now`.
    ///
    /// Session expiry wins ties so that a countdown reaching zero preempts
    /// whatever the round was about to do.
    pub fn pop_due(&mut self, now: f64) -> Option<Fired> {
        let round = self
            .timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due_ms <= now)
            .min_by(|(_, a), (_, b)| a.due_ms.total_cmp(&b.due_ms).then(a.seq.cmp(&b.seq)))
            .map(|(idx, t)| (idx, t.due_ms));
        let session = self.countdown.as_ref().and_then(|c| c.due(now));

        match (round, session) {
            (Some((idx, due)), Some(s)) if due < s.at_ms => Some(self.take_timer(idx)),
            (_, Some(s)) => {
                self.consume_session(&s, now);
                Some(s)
            }
            (Some((idx, _)), None) => Some(self.take_timer(idx)),
            (None, None) => None,
        }
    }

    fn take_timer(&mut self, idx: usize) -> Fired {
        let timer = self.timers.swap_remove(idx);
        Fired {
            at_ms: timer.due_ms,
            event: timer.event,
        }
    }

    fn consume_session(&mut self, fired: &Fired, now: f64) {
        match fired.event {
            ClockEvent::SessionExpire => self.countdown = None,
            _ => {
                if let Some(c) = self.countdown.as_mut() {
                    c.last_tick = c.tick_index(now);
                }
            }
        }
    }

    /// Time left in the current show / input / buffer window.
    pub fn phase_remaining(&self, now: f64) -> f64 {
        self.phase_deadline.map_or(0.0, |d| (d - now).max(0.0))
    }

    /// Time left on the session countdown, if one is running.
    pub fn session_remaining(&self, now: f64) -> Option<f64> {
        self.countdown.as_ref().map(|c| c.remaining(now))
    }
}
