//! Pitch-analysis core of a monophonic vocal-intonation editor.
//!
//! The crate turns a mono recording into a frame-accurate pitch trajectory
//! with alternative candidates, a magnitude spectrogram for display, and
//! editable note segments, and keeps those three consistent under editing
//! operations, undo/redo, and synthesized playback.

pub mod analysis;
pub mod audio;
pub mod error;
pub mod history;
pub mod notes;
pub mod playback;
pub mod project;
pub mod session;

pub use analysis::pyin::AnalysisParams;
pub use analysis::spectrogram::SpectrogramData;
pub use analysis::track::{PitchCandidate, PitchFrame, PitchTrack};
pub use audio::AudioBuffer;
pub use error::EditorError;
pub use history::{HistoryStore, Snapshot};
pub use notes::Note;
pub use playback::{MixerState, PlayRequest, PlaybackScheduler};
pub use project::ProjectFile;
pub use session::EditorSession;
