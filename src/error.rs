// src/error.rs

use thiserror::Error;

/// Frame decode failures. All of these are recoverable: the dispatcher
/// logs and discards the offending frame.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("frame truncated: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    #[error("unknown message tag {0:#04x}")]
    UnknownTag(u8),

    #[error("declared body length {declared} does not match actual {actual}")]
    LengthMismatch { declared: usize, actual: usize },
}

/// Startup configuration failures. These are fatal; the pipeline refuses
/// to start.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(String),

    #[error("invalid option `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Push against a queue that has been closed for shutdown.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("queue closed")]
pub struct QueueClosed;

/// Orchestrator startup failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to spawn {name} worker")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}
