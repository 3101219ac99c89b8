use crate::config::FrameDetection;

/// Errors that can occur while configuring frame extraction.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The selected detection policy needs a delimiter that is empty.
    #[error("{detection} requires a non-empty {delimiter} sequence")]
    MissingDelimiter {
        detection: FrameDetection,
        delimiter: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, FrameError>;
