//! Round state machine for Rabbit's Path.
//!
//! One `RoundStateMachine` owns a whole session: the practice rounds, the
//! scored rounds, the score and the round history. The outside world talks to
//! it through two doors:
//!
//! - [`RoundStateMachine::handle`] for discrete user actions (start, tap a
//!   stone, continue after a pause, ...)
//! - [`RoundStateMachine::tick`] to let time pass
//!
//! Both mutate the owned [`SessionState`] synchronously and return the
//! [`Effect`]s the presentation layer should carry out. Nothing here touches
//! the DOM or a real clock, so whole sessions can be replayed in tests.
//!
//! ```text
//! ready ──start──▶ show ──show end──▶ input ──tap / timeout──▶ feedback
//!                   ▲                   │ │                       │
//!                   │        no taps ◀──┘ └─▶ (buffer, once)      │
//!                   │           │                                 │
//!                   │        paused ──continue──▶ show            │
//!                   └─────────── next round / trial retry ◀───────┘
//!                                trial_done / done
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::clock::{ClockEvent, Fired, RoundClock, Timings};
use crate::config::GameConfig;
use crate::error::ConfigError;
use crate::policy::SequencePolicy;
use crate::stones::{EXIT_STONE, START_STONE, StoneId, is_sentinel};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Ready,
    Show,
    Input,
    Feedback,
    Paused,
    TrialDone,
    Done,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Correct,
    Wrong,
}

impl Outcome {
    pub fn from_correct(correct: bool) -> Self {
        if correct { Self::Correct } else { Self::Wrong }
    }

    pub fn is_correct(self) -> bool {
        self == Self::Correct
    }
}

/// Log entry for one concluded scored round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundResult {
    /// Zero-based scored round index.
    pub round: usize,
    pub sequence: Vec<StoneId>,
    pub input: Vec<StoneId>,
    pub correct: bool,
}

/// Snapshot handed to the result sink when a session ends.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSummary {
    pub score: u32,
    pub total_rounds: usize,
    pub rounds_played: usize,
    pub history: Vec<RoundResult>,
}

/// User actions the machine understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    Tap(StoneId),
    /// Resume after an idle pause; replays the same round with a new sequence.
    Continue,
    /// From `trial_done`, practice again from the first trial round.
    RestartTrial,
    /// From `trial_done`, begin the scored game and its countdown.
    StartGame,
    /// Abandon everything and return to a fresh `ready` session.
    Restart,
}

/// Directive for the presentation layer (or the result sink).
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    MoveAvatar(StoneId),
    Highlight(Option<StoneId>),
    Save(GameSummary),
}

/// Everything a renderer needs, owned by the machine.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub phase: Phase,
    pub is_trial: bool,
    pub trial_round_index: usize,
    pub round_index: usize,
    pub current_sequence: Vec<StoneId>,
    pub player_input: Vec<StoneId>,
    pub buffer_activated: bool,
    pub score: u32,
    pub history: Vec<RoundResult>,
    pub last_outcome: Option<Outcome>,
    /// Stone lit up during the show phase.
    pub active_stone: Option<StoneId>,
    pub time_remaining_in_phase_ms: f64,
    pub total_time_remaining_ms: f64,
}

impl SessionState {
    fn new(is_trial: bool, session_ms: f64) -> Self {
        Self {
            phase: Phase::Ready,
            is_trial,
            trial_round_index: 0,
            round_index: 0,
            current_sequence: Vec::new(),
            player_input: Vec::new(),
            buffer_activated: false,
            score: 0,
            history: Vec::new(),
            last_outcome: None,
            active_stone: None,
            time_remaining_in_phase_ms: 0.0,
            total_time_remaining_ms: session_ms,
        }
    }

    /// Short banner text for the current phase.
    pub fn label(&self) -> &'static str {
        match self.phase {
            Phase::Ready => "Ready",
            Phase::Show => "Watch carefully",
            Phase::Input => "Your turn",
            Phase::Feedback => match self.last_outcome {
                Some(Outcome::Correct) => "Correct!",
                _ => "Oops!",
            },
            Phase::Paused => "Please focus!",
            Phase::TrialDone => "Trial complete!",
            Phase::Done => "Finished",
        }
    }

    /// Index of the round in play, trial or scored.
    pub fn current_round(&self) -> usize {
        if self.is_trial {
            self.trial_round_index
        } else {
            self.round_index
        }
    }
}

/// Drives one Rabbit's Path session.
#[derive(Debug)]
pub struct RoundStateMachine<R> {
    policy: SequencePolicy,
    playable: Vec<StoneId>,
    total_rounds: usize,
    trial_rounds: usize,
    reverse_input: bool,
    timings: Timings,
    clock: RoundClock,
    rng: R,
    state: SessionState,
    summary_emitted: bool,
}

impl<R: Rng> RoundStateMachine<R> {
    /// Build a machine for `config`, drawing sequences from `playable`.
    pub fn new(config: &GameConfig, playable: Vec<StoneId>, rng: R) -> Result<Self, ConfigError> {
        config.validate()?;
        let policy = SequencePolicy::new(config.policy.to_config())?;
        Ok(Self {
            policy,
            playable,
            total_rounds: config.total_rounds,
            trial_rounds: config.trial_rounds,
            reverse_input: config.reverse_input,
            timings: config.timings,
            clock: RoundClock::new(),
            rng,
            state: SessionState::new(config.trial_rounds > 0, config.timings.session_ms),
            summary_emitted: false,
        })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn clock(&self) -> &RoundClock {
        &self.clock
    }

    pub fn policy(&self) -> &SequencePolicy {
        &self.policy
    }

    pub fn total_rounds(&self) -> usize {
        self.total_rounds
    }

    /// Stones in the order the player must tap them.
    pub fn target(&self) -> Vec<StoneId> {
        let mut target = self.state.current_sequence.clone();
        if self.reverse_input {
            target.reverse();
        }
        target
    }

    /// Summary of the scored rounds completed so far.
    pub fn summary(&self) -> GameSummary {
        let history = self.state.history.clone();
        GameSummary {
            score: self.state.score,
            total_rounds: self.total_rounds,
            rounds_played: history.last().map_or(0, |r| r.round + 1),
            history,
        }
    }

    /// Apply a user action at time `now`. Timers due by `now` fire first, so
    /// the action sees the phase it actually arrived in. Actions that make no
    /// sense in that phase are ignored.
    #[instrument(level = "debug", skip(self), fields(phase = ?self.state.phase))]
    pub fn handle(&mut self, now: f64, command: Command) -> Vec<Effect> {
        let mut fx = Vec::new();
        while let Some(fired) = self.clock.pop_due(now) {
            self.on_clock(fired, &mut fx);
        }
        match (command, self.state.phase) {
            (Command::Start, Phase::Ready) => {
                if self.state.is_trial {
                    self.start_round(now, 0, &mut fx);
                } else {
                    self.begin_scored(now, &mut fx);
                }
            }
            (Command::Tap(stone), Phase::Input) => self.on_tap(now, stone, &mut fx),
            (Command::Continue, Phase::Paused) => {
                let round = self.state.current_round();
                info!(round, trial = self.state.is_trial, "Resuming after pause");
                self.start_round(now, round, &mut fx);
            }
            (Command::RestartTrial, Phase::TrialDone) => {
                self.state.is_trial = true;
                self.start_round(now, 0, &mut fx);
            }
            (Command::StartGame, Phase::TrialDone) => self.begin_scored(now, &mut fx),
            (Command::Restart, _) => {
                self.reset();
                fx.push(Effect::Highlight(None));
                fx.push(Effect::MoveAvatar(START_STONE));
            }
            (command, phase) => debug!(?command, ?phase, "Ignoring command"),
        }
        self.refresh_phase_time(now);
        fx
    }

    /// Let time pass up to `now`, firing every due timer in order.
    pub fn tick(&mut self, now: f64) -> Vec<Effect> {
        let mut fx = Vec::new();
        while let Some(fired) = self.clock.pop_due(now) {
            self.on_clock(fired, &mut fx);
        }
        self.refresh_phase_time(now);
        fx
    }

    fn refresh_phase_time(&mut self, now: f64) {
        self.state.time_remaining_in_phase_ms = self.clock.phase_remaining(now);
    }

    fn reset(&mut self) {
        self.clock.cancel_all();
        self.state = SessionState::new(self.trial_rounds > 0, self.timings.session_ms);
        self.summary_emitted = false;
        info!("Session reset");
    }

    fn begin_scored(&mut self, now: f64, fx: &mut Vec<Effect>) {
        let s = &mut self.state;
        s.is_trial = false;
        s.score = 0;
        s.history.clear();
        s.total_time_remaining_ms = self.timings.session_ms;
        self.clock.start_session_countdown(
            now,
            self.timings.session_ms,
            self.timings.session_tick_ms,
        );
        info!(total_rounds = self.total_rounds, "Scored game started");
        self.start_round(now, 0, fx);
    }

    fn start_round(&mut self, now: f64, index: usize, fx: &mut Vec<Effect>) {
        self.clock.cancel_round();

        let s = &mut self.state;
        s.player_input.clear();
        s.buffer_activated = false;
        s.last_outcome = None;
        s.active_stone = None;
        if s.is_trial {
            s.trial_round_index = index;
        } else {
            s.round_index = index;
        }

        let length = self.policy.compute_length(index, &s.history, s.is_trial);
        let generated = self
            .policy
            .generate_sequence(&mut self.rng, &self.playable, length);
        s.current_sequence = generated.stones;
        s.phase = Phase::Show;
        debug!(
            round = index,
            trial = s.is_trial,
            length,
            sequence = ?s.current_sequence,
            "Round started"
        );

        fx.push(Effect::Highlight(None));
        fx.push(Effect::MoveAvatar(START_STONE));
        self.clock
            .schedule_show_phase(now, &self.state.current_sequence, self.timings.show_ms);
    }

    fn on_clock(&mut self, fired: Fired, fx: &mut Vec<Effect>) {
        let at = fired.at_ms;
        match (fired.event, self.state.phase) {
            (ClockEvent::SessionExpire, Phase::Done) => {}
            (ClockEvent::SessionExpire, phase) => {
                info!(?phase, "Session time is up");
                self.state.total_time_remaining_ms = 0.0;
                self.finish_session(at, fx);
            }
            (ClockEvent::SessionTick { remaining_ms }, _) => {
                self.state.total_time_remaining_ms = remaining_ms;
            }
            (ClockEvent::Highlight { stone, .. }, Phase::Show) => {
                self.state.active_stone = Some(stone);
                fx.push(Effect::Highlight(Some(stone)));
                fx.push(Effect::MoveAvatar(stone));
            }
            (ClockEvent::ExitHop, Phase::Show) => {
                self.state.active_stone = None;
                fx.push(Effect::Highlight(None));
                fx.push(Effect::MoveAvatar(EXIT_STONE));
            }
            (ClockEvent::ShowEnd, Phase::Show) => {
                self.clock.cancel_round();
                let s = &mut self.state;
                s.phase = Phase::Input;
                s.player_input.clear();
                s.active_stone = None;
                fx.push(Effect::Highlight(None));
                fx.push(Effect::MoveAvatar(START_STONE));
                self.clock.schedule_input_phase(at, self.timings.input_ms);
            }
            (ClockEvent::InputTimeout, Phase::Input) => self.on_input_timeout(at, fx),
            (ClockEvent::BufferExpire, Phase::Input) => self.finish_round(at, fx),
            (ClockEvent::FeedbackDone, Phase::Feedback) => self.advance(at, fx),
            (event, phase) => debug!(?event, ?phase, "Dropping timer for another phase"),
        }
    }

    fn on_tap(&mut self, now: f64, stone: StoneId, fx: &mut Vec<Effect>) {
        if is_sentinel(stone) || !self.playable.contains(&stone) {
            debug!(stone, "Ignoring tap on non-playable stone");
            return;
        }
        self.state.player_input.push(stone);
        fx.push(Effect::MoveAvatar(stone));

        let target = self.target();
        let input = &self.state.player_input;
        let step = input.len() - 1;
        if target.get(step) != Some(&stone) || input.len() == target.len() {
            self.finish_round(now, fx);
        }
    }

    /// Input-so-far matches the start of the target.
    fn input_is_prefix(&self) -> bool {
        self.target().starts_with(&self.state.player_input)
    }

    fn on_input_timeout(&mut self, at: f64, fx: &mut Vec<Effect>) {
        if self.state.player_input.is_empty() {
            self.clock.cancel_round();
            self.state.phase = Phase::Paused;
            info!(
                round = self.state.current_round(),
                "No taps before timeout, pausing"
            );
            return;
        }
        if !self.state.buffer_activated && self.input_is_prefix() {
            self.clock.cancel_round();
            self.state.buffer_activated = true;
            self.clock.schedule_buffer(at, self.timings.buffer_ms);
            debug!(input = ?self.state.player_input, "Partial input, extending window");
            return;
        }
        self.finish_round(at, fx);
    }

    /// Score the round and enter feedback. Only exact, full-length input
    /// counts as correct.
    fn finish_round(&mut self, at: f64, fx: &mut Vec<Effect>) {
        self.clock.cancel_round();
        let correct = self.state.player_input == self.target();
        let s = &mut self.state;
        s.phase = Phase::Feedback;
        s.last_outcome = Some(Outcome::from_correct(correct));
        s.active_stone = None;
        if correct {
            fx.push(Effect::MoveAvatar(EXIT_STONE));
        }
        if !s.is_trial {
            s.history.push(RoundResult {
                round: s.round_index,
                sequence: s.current_sequence.clone(),
                input: s.player_input.clone(),
                correct,
            });
            if correct {
                s.score += 1;
            }
        }
        info!(
            round = s.current_round(),
            trial = s.is_trial,
            correct,
            score = s.score,
            "Round finished"
        );
        self.clock
            .schedule_feedback(at, self.timings.feedback_ms(correct));
    }

    fn advance(&mut self, at: f64, fx: &mut Vec<Effect>) {
        let s = &self.state;
        if s.is_trial {
            let passed = s.last_outcome.is_some_and(Outcome::is_correct);
            let next = if passed {
                s.trial_round_index + 1
            } else {
                s.trial_round_index
            };
            if next >= self.trial_rounds {
                self.clock.cancel_round();
                self.state.phase = Phase::TrialDone;
                info!("Practice rounds complete");
            } else {
                self.start_round(at, next, fx);
            }
            return;
        }

        let next = s.round_index + 1;
        if next >= self.total_rounds {
            self.finish_session(at, fx);
        } else {
            self.start_round(at, next, fx);
        }
    }

    fn finish_session(&mut self, at: f64, fx: &mut Vec<Effect>) {
        if let Some(remaining) = self.clock.session_remaining(at) {
            self.state.total_time_remaining_ms = remaining;
        }
        self.clock.cancel_all();
        self.state.phase = Phase::Done;
        self.state.active_stone = None;
        if !self.summary_emitted {
            self.summary_emitted = true;
            let summary = self.summary();
            info!(
                score = summary.score,
                rounds_played = summary.rounds_played,
                "Session finished"
            );
            fx.push(Effect::Save(summary));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn machine(config: GameConfig) -> RoundStateMachine<StdRng> {
        RoundStateMachine::new(&config, (1..=10).collect(), StdRng::seed_from_u64(42)).unwrap()
    }

    #[test]
    fn starts_in_ready_with_trials() {
        let m = machine(GameConfig::default());
        assert_eq!(m.phase(), Phase::Ready);
        assert!(m.state().is_trial);
        assert_eq!(m.state().label(), "Ready");
    }

    #[test]
    fn start_enters_show_with_trial_length() {
        let mut m = machine(GameConfig::default());
        let fx = m.handle(0.0, Command::Start);
        assert_eq!(m.phase(), Phase::Show);
        assert_eq!(m.state().current_sequence.len(), 3);
        assert!(fx.contains(&Effect::MoveAvatar(START_STONE)));
        assert_eq!(m.state().time_remaining_in_phase_ms, 10_000.0);
    }

    #[test]
    fn taps_outside_input_are_ignored() {
        let mut m = machine(GameConfig::default());
        m.handle(0.0, Command::Start);
        let before = m.state().clone();
        assert!(m.handle(100.0, Command::Tap(3)).is_empty());
        assert_eq!(m.state().player_input, before.player_input);
    }

    #[test]
    fn sentinel_and_unknown_taps_are_ignored() {
        let mut m = machine(GameConfig::default());
        m.handle(0.0, Command::Start);
        m.tick(10_000.0);
        assert_eq!(m.phase(), Phase::Input);
        for stone in [START_STONE, EXIT_STONE, 42] {
            assert!(m.handle(10_100.0, Command::Tap(stone)).is_empty());
        }
        assert!(m.state().player_input.is_empty());
        assert_eq!(m.phase(), Phase::Input);
    }

    #[test]
    fn show_phase_highlights_each_stone_then_exits() {
        let mut m = machine(GameConfig::default());
        m.handle(0.0, Command::Start);
        let sequence = m.state().current_sequence.clone();
        let fx = m.tick(9_999.0);
        let lit: Vec<StoneId> = fx
            .iter()
            .filter_map(|e| match e {
                Effect::Highlight(Some(s)) => Some(*s),
                _ => None,
            })
            .collect();
        assert_eq!(lit, sequence);
        assert_eq!(fx.last(), Some(&Effect::MoveAvatar(EXIT_STONE)));
        assert_eq!(m.phase(), Phase::Show);
    }

    #[test]
    fn reverse_mode_expects_back_to_front() {
        let config = GameConfig {
            reverse_input: true,
            trial_rounds: 0,
            ..GameConfig::default()
        };
        let mut m = machine(config);
        m.handle(0.0, Command::Start);
        m.tick(10_000.0);
        let mut target = m.state().current_sequence.clone();
        target.reverse();
        assert_eq!(m.target(), target);
        for stone in &target {
            m.handle(10_500.0, Command::Tap(*stone));
        }
        assert_eq!(m.state().last_outcome, Some(Outcome::Correct));
        assert_eq!(m.state().score, 1);
    }

    #[test]
    fn restart_cancels_everything() {
        let mut m = machine(GameConfig::default());
        m.handle(0.0, Command::Start);
        m.handle(500.0, Command::Restart);
        assert_eq!(m.phase(), Phase::Ready);
        assert_eq!(m.clock().pending(), 0);
        assert!(m.tick(60_000.0).is_empty());
        assert_eq!(m.phase(), Phase::Ready);
    }
}
