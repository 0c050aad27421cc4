//! Session configuration supplied by the host page.
//!
//! Everything has a default so a page can pass `{}` and get the grade-3 game
//! with the stock timings. Values arrive as camelCase JSON.

use serde::{Deserialize, Serialize};

use crate::clock::Timings;
use crate::error::ConfigError;
use crate::policy::PolicyConfig;

/// Which progression rules a session uses.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyVariant {
    #[default]
    #[serde(rename = "grade-3")]
    Grade3,
    #[serde(rename = "grade-4")]
    Grade4,
    Custom(PolicyConfig),
}

impl PolicyVariant {
    pub fn to_config(&self) -> PolicyConfig {
        match self {
            Self::Grade3 => PolicyConfig::grade3(),
            Self::Grade4 => PolicyConfig::grade4(),
            Self::Custom(config) => config.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameConfig {
    pub student_name: String,
    pub class_name: String,
    pub total_rounds: usize,
    /// Practice rounds before the scored game; zero skips practice.
    pub trial_rounds: usize,
    pub policy: PolicyVariant,
    /// Expect the sequence back to front.
    pub reverse_input: bool,
    pub timings: Timings,
    /// `tracing` filter directive, e.g. `"info"` or `"rabbit_path=debug"`.
    pub log_level: String,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            student_name: String::new(),
            class_name: String::new(),
            total_rounds: 12,
            trial_rounds: 2,
            policy: PolicyVariant::default(),
            reverse_input: false,
            timings: Timings::default(),
            log_level: "info".to_owned(),
        }
    }
}

impl GameConfig {
    /// Parse and validate a config coming from the page.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.total_rounds == 0 {
            return Err(ConfigError::invalid("totalRounds must be at least 1"));
        }
        self.policy.to_config().validate()?;
        let t = &self.timings;
        let named = [
            ("showMs", t.show_ms),
            ("inputMs", t.input_ms),
            ("bufferMs", t.buffer_ms),
            ("sessionMs", t.session_ms),
            ("sessionTickMs", t.session_tick_ms),
            ("correctFeedbackMs", t.correct_feedback_ms),
            ("incorrectFeedbackMs", t.incorrect_feedback_ms),
        ];
        if let Some((name, _)) = named.iter().find(|(_, v)| !(v.is_finite() && *v > 0.0)) {
            return Err(ConfigError::invalid(format!(
                "timings.{name} must be a positive number"
            )));
        }
        Ok(())
    }
}
