//! Error taxonomy for the engine and its decode backends.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use super::time::TimeMs;

/// Errors reported by a decode backend
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to open {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("stream error: {0}")]
    Stream(String),

    #[error("seek to {target_ms} ms failed: {reason}")]
    Seek { target_ms: TimeMs, reason: String },

    #[error("unsupported media: {0}")]
    Unsupported(String),

    #[error("invalid frame buffer: {0}")]
    InvalidFrame(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The precise decoder entered an unrecoverable state.
///
/// Carried on events as a value, so it is `Clone` and holds only the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodeFault {
    pub reason: String,
}

impl DecodeFault {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

impl fmt::Display for DecodeFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

impl From<DecodeError> for DecodeFault {
    fn from(e: DecodeError) -> Self {
        DecodeFault::new(e.to_string())
    }
}

/// Engine-level conditions surfaced to collaborators
#[derive(Debug, Error)]
pub enum EngineError {
    /// Non-fatal: duration degrades to `Growing`
    #[error("clip duration could not be resolved")]
    DurationUnresolvable,

    #[error("decode fault: {0}")]
    DecodeFault(DecodeFault),

    /// Non-fatal: the last displayed preview stays on screen
    #[error("no preview available at {0} ms")]
    PreviewUnavailable(TimeMs),

    #[error("frame step rejected: no frame rate estimate")]
    NoFrameRate,

    #[error("no media loaded")]
    NoMedia,
}

impl From<DecodeFault> for EngineError {
    fn from(f: DecodeFault) -> Self {
        EngineError::DecodeFault(f)
    }
}
