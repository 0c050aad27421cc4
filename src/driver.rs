//! Glue between the round machine, a presenter and a result sink.

use rand::Rng;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::GameConfig;
use crate::error::ConfigError;
use crate::machine::{Command, Effect, GameSummary, RoundStateMachine, SessionState};
use crate::record::{ResultDocument, ResultSink, document_id, now_timestamp};
use crate::stones::{START_STONE, StoneId, StoneLayout};

/// What a presenter draws from. Built fresh for every render.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(flatten)]
    pub state: SessionState,
    /// Stone the rabbit stands on (or is hopping to).
    pub avatar: StoneId,
    pub label: &'static str,
    pub total_rounds: usize,
}

/// Redraws the scene from a snapshot. Must not feed anything back into the
/// game; a second call with the same snapshot draws the same picture.
pub trait Presenter {
    fn render(&mut self, snapshot: &Snapshot);
}

/// One running session with its collaborators attached.
pub struct GameDriver<P, S, R> {
    machine: RoundStateMachine<R>,
    presenter: P,
    sink: S,
    student_name: String,
    class_name: String,
    avatar: StoneId,
}

impl<P: Presenter, S: ResultSink, R: Rng> GameDriver<P, S, R> {
    pub fn new(
        config: &GameConfig,
        layout: &StoneLayout,
        presenter: P,
        sink: S,
        rng: R,
    ) -> Result<Self, ConfigError> {
        let machine = RoundStateMachine::new(config, layout.playable_ids(), rng)?;
        let mut driver = Self {
            machine,
            presenter,
            sink,
            student_name: config.student_name.clone(),
            class_name: config.class_name.clone(),
            avatar: START_STONE,
        };
        driver.render();
        Ok(driver)
    }

    pub fn machine(&self) -> &RoundStateMachine<R> {
        &self.machine
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn avatar(&self) -> StoneId {
        self.avatar
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.machine.state().clone();
        Snapshot {
            label: state.label(),
            state,
            avatar: self.avatar,
            total_rounds: self.machine.total_rounds(),
        }
    }

    /// Forward a user action, then redraw.
    pub fn handle(&mut self, now: f64, command: Command) {
        let fx = self.machine.handle(now, command);
        self.apply(fx);
        self.render();
    }

    /// Advance time, then redraw.
    pub fn tick(&mut self, now: f64) {
        let fx = self.machine.tick(now);
        self.apply(fx);
        self.render();
    }

    pub fn render(&mut self) {
        let snapshot = self.snapshot();
        self.presenter.render(&snapshot);
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::MoveAvatar(stone) => self.avatar = stone,
                // Highlight state already lives in the snapshot.
                Effect::Highlight(_) => {}
                Effect::Save(summary) => self.save(summary),
            }
        }
    }

    /// Fire-and-forget persistence; nothing here can reach back into the
    /// finished session.
    fn save(&self, summary: GameSummary) {
        if self.student_name.trim().is_empty() {
            warn!("Cannot save: student name not set");
            return;
        }
        let doc_id = document_id(&self.student_name);
        let document =
            ResultDocument::from_summary(&self.student_name, &self.class_name, summary, now_timestamp());
        match self.sink.save(&doc_id, &document) {
            Ok(()) => info!(%doc_id, "Rabbit path result handed to store"),
            Err(e) => error!(%doc_id, error = %e, "Save failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::Phase;
    use crate::record::MemorySink;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[derive(Default)]
    struct Recorder {
        frames: Vec<Snapshot>,
    }

    impl Presenter for Recorder {
        fn render(&mut self, snapshot: &Snapshot) {
            self.frames.push(snapshot.clone());
        }
    }

    fn driver(config: GameConfig) -> GameDriver<Recorder, MemorySink, StdRng> {
        GameDriver::new(
            &config,
            &StoneLayout::default_river(),
            Recorder::default(),
            MemorySink::new(),
            StdRng::seed_from_u64(3),
        )
        .unwrap()
    }

    fn quick_config(name: &str) -> GameConfig {
        GameConfig {
            student_name: name.to_owned(),
            class_name: "3B".to_owned(),
            total_rounds: 1,
            trial_rounds: 0,
            ..GameConfig::default()
        }
    }

    #[test]
    fn renders_on_construction_and_every_step() {
        let mut d = driver(GameConfig::default());
        assert_eq!(d.presenter().frames.len(), 1);
        d.handle(0.0, Command::Start);
        d.tick(16.0);
        assert_eq!(d.presenter().frames.len(), 3);
        assert_eq!(d.presenter().frames[1].label, "Watch carefully");
    }

    #[test]
    fn render_is_a_pure_projection() {
        let mut d = driver(GameConfig::default());
        d.handle(0.0, Command::Start);
        d.render();
        d.render();
        let frames = &d.presenter().frames;
        let n = frames.len();
        assert_eq!(frames[n - 1], frames[n - 2]);
        assert_eq!(d.machine().phase(), Phase::Show);
    }

    #[test]
    fn avatar_follows_show_phase() {
        let mut d = driver(GameConfig::default());
        d.handle(0.0, Command::Start);
        let first = d.machine().state().current_sequence[0];
        // step = 10000 / 5
        d.tick(2_000.0);
        assert_eq!(d.avatar(), first);
        d.tick(10_000.0);
        assert_eq!(d.avatar(), START_STONE);
    }

    #[test]
    fn finished_session_is_saved_once() {
        let mut d = driver(quick_config("  Mia "));
        d.handle(0.0, Command::Start);
        d.tick(10_000.0);
        for stone in d.machine().target() {
            d.handle(11_000.0, Command::Tap(stone));
        }
        d.tick(12_000.0);
        assert_eq!(d.machine().phase(), Phase::Done);
        d.tick(200_000.0);

        let saved = d.sink().saved();
        assert_eq!(saved.len(), 1);
        let (id, doc) = &saved[0];
        assert_eq!(id, "mia");
        assert_eq!(doc.class_name.as_deref(), Some("3B"));
        let section = doc.rabbit_path.as_ref().unwrap();
        assert_eq!(section.score, 1);
        assert_eq!(section.rounds_played, 1);
    }

    #[test]
    fn blank_name_skips_save() {
        let mut d = driver(quick_config("   "));
        d.handle(0.0, Command::Start);
        d.tick(200_000.0);
        assert_eq!(d.machine().phase(), Phase::Done);
        assert!(d.sink().is_empty());
    }

    #[test]
    fn snapshot_serializes_flat() {
        let d = driver(GameConfig::default());
        let value = serde_json::to_value(d.snapshot()).unwrap();
        assert_eq!(value["phase"], "ready");
        assert_eq!(value["isTrial"], true);
        assert_eq!(value["avatar"], 0);
        assert_eq!(value["totalRounds"], 12);
    }
}
