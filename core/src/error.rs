use thiserror::Error;

/// Misuse of the scheduler API.
///
/// These are caller bugs: they are reported immediately and never retried.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("engine has already been added to a scheduler")]
    AlreadyScheduled,

    #[error("engine has not been added to this scheduler")]
    NotOwned,
}

/// Failure to turn encoded audio into an [`crate::buffer::AudioBuffer`].
#[derive(Error, Debug)]
pub enum BufferError {
    #[error("WAV decoding error: {0}")]
    Wav(#[from] hound::Error),

    #[error("unsupported sample format: {bits} bit {format}")]
    UnsupportedFormat { bits: u16, format: &'static str },

    #[error("audio buffer contains no samples")]
    Empty,
}

/// A control message that could not be understood.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown selector '{0}'")]
    UnknownSelector(String),

    #[error("invalid value for '{selector}': {reason}")]
    InvalidValue {
        selector: String,
        reason: &'static str,
    },
}
