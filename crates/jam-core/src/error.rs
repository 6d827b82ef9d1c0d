//! Error types for the playback core

use thiserror::Error;

use crate::types::Stem;

/// Errors that can occur while loading or playing stems
#[derive(Error, Debug)]
pub enum PlayerError {
    /// Stem file could not be opened
    #[error("Failed to open stem file: {0}")]
    OpenError(String),

    /// Stem file could not be decoded
    #[error("Failed to decode stem {stem:?}: {reason}")]
    DecodeError { stem: Stem, reason: String },

    /// Decoded stem has no audio frames
    #[error("Stem {0:?} decoded to an empty buffer")]
    EmptyStem(Stem),

    /// Failed to build or start the output stream
    #[error("Failed to start audio output: {0}")]
    OutputError(String),

    /// Mixdown rendering failed
    #[error("Mixdown failed: {0}")]
    MixdownError(String),
}

/// Result type for playback operations
pub type PlayerResult<T> = Result<T, PlayerError>;
