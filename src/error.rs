use std::path::PathBuf;

/// Recoverable error kinds surfaced by the editor core.
///
/// Every variant leaves the session state untouched: a failed operation is a
/// no-op and the caller decides how to notify the user.
#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error("failed to decode audio file {path:?}: {reason}")]
    DecodeFailed { path: PathBuf, reason: String },

    #[error("pitch analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("spectrogram computation failed: {0}")]
    SpectrogramFailed(String),

    #[error("playback could not start: {0}")]
    PlaybackFailed(String),

    #[error("invalid project file: {0}")]
    InvalidProjectFile(String),

    #[error("invalid CSV data at line {line}: {reason}")]
    InvalidCsv { line: usize, reason: String },
}

pub type Result<T> = std::result::Result<T, EditorError>;
