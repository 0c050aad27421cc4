//! Error types for the fallible edges of the crate.
//!
//! The round core itself never fails: anomalies inside a session degrade to a
//! defined fallback. Errors only surface where data crosses into or out of the
//! game (configuration, stored layouts, persisted results).

/// Problems with a [`GameConfig`](crate::config::GameConfig).
#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum ConfigError {
    /// The JSON could not be parsed into a config.
    #[display("Config is not valid JSON: {}", source)]
    Json {
        /// Underlying parser error.
        source: serde_json::Error,
    },

    /// The config parsed but violates a constraint.
    #[display("Invalid config: {}", reason)]
    Invalid {
        /// What was wrong.
        #[error(not(source))]
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(source: serde_json::Error) -> Self {
        Self::Json { source }
    }
}

/// Problems loading or storing a [`StoneLayout`](crate::stones::StoneLayout).
#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum LayoutError {
    /// The stored layout is not a JSON array of stones.
    #[display("Stone layout is not valid JSON: {}", source)]
    Json {
        /// Underlying parser error.
        source: serde_json::Error,
    },

    /// The stored layout contains no stones.
    #[display("Stone layout is empty")]
    Empty,

    /// Only start / exit stones, so no sequence can be drawn.
    #[display("Stone layout has no playable stones")]
    NoPlayable,
}

impl From<serde_json::Error> for LayoutError {
    fn from(source: serde_json::Error) -> Self {
        Self::Json { source }
    }
}

/// Failure reported by a [`ResultSink`](crate::record::ResultSink).
#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum SinkError {
    /// The document could not be serialized.
    #[display("Could not serialize result document: {}", source)]
    Serialize {
        /// Underlying serializer error.
        source: serde_json::Error,
    },

    /// The store rejected or failed the write.
    #[display("Result store failed: {}", message)]
    Store {
        /// Message reported by the store.
        #[error(not(source))]
        message: String,
    },
}

impl From<serde_json::Error> for SinkError {
    fn from(source: serde_json::Error) -> Self {
        Self::Serialize { source }
    }
}
