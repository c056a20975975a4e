//! Error taxonomy for the recording-session engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    /// Capture or playback device unavailable or failing
    #[error("Audio device error: {0}")]
    Device(String),

    /// Operation issued in the wrong take-recording state
    #[error("Conflict: {0}")]
    Conflict(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Audio container encoding failure
    #[error("Audio encoding error: {0}")]
    Encoding(#[from] hound::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Index or time outside the data it refers to
    #[error("Out of bounds: {0}")]
    Bounds(String),

    /// A take that was still being recorded when the session ended or was saved
    #[error("Take {take_index} of chunk {chunk_index} under '{header}' was still open")]
    OpenTake {
        header: String,
        chunk_index: usize,
        take_index: usize,
    },
}

pub type SessionResult<T> = Result<T, SessionError>;
