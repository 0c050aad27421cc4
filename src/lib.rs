//! Rabbit's Path core crate.
//!
//! A stone-sequence memory game: the rabbit hops across a river, and the
//! child taps the same stones back. Sequence length adapts to performance
//! band by band. The core (`policy`, `clock`, `machine`) is pure and driven
//! by caller-supplied time; `web` mounts it on a canvas and runs it from
//! `requestAnimationFrame`. Finished sessions are handed to a result sink.

use wasm_bindgen::prelude::*;

pub mod clock;
pub mod config;
pub mod driver;
pub mod error;
pub mod logging;
pub mod machine;
pub mod policy;
pub mod record;
pub mod report;
pub mod stones;
pub mod web;

pub use clock::{ClockEvent, Fired, RoundClock, Timings};
pub use config::{GameConfig, PolicyVariant};
pub use driver::{GameDriver, Presenter, Snapshot};
pub use error::{ConfigError, LayoutError, SinkError};
pub use machine::{
    Command, Effect, GameSummary, Outcome, Phase, RoundResult, RoundStateMachine, SessionState,
};
pub use policy::{GeneratedSequence, PolicyConfig, SequencePolicy, Tier};
pub use record::{MemorySink, ResultDocument, ResultSink};
pub use stones::{EXIT_STONE, START_STONE, Stone, StoneId, StoneLayout};

// Optional small allocator for size (feature gated)
#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn wasm_start() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}
