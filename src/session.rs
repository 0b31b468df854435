//! The editing session: owns the audio buffer, the committed history, the
//! background analysis jobs, and the playback scheduler, and exposes the
//! editing intents the interaction layer calls into.
//!
//! Methods that mutate state commit a fresh snapshot; a failed operation
//! commits nothing.

use crate::analysis::pyin::AnalysisParams;
use crate::analysis::spectrogram::SpectrogramData;
use crate::analysis::worker::AnalysisService;
use crate::analysis::{frame_duration, snap_time};
use crate::audio::{AudioBuffer, file};
use crate::error::EditorError;
use crate::history::{HistoryStore, Snapshot};
use crate::notes::{self, NoteIds};
use crate::playback::{MixerState, PlayRequest, PlaybackScheduler};
use crate::project::{ProjectFile, ProjectSettings, ViewState, PROJECT_VERSION};
use std::path::Path;
use tracing::{info, warn};

/// Outcome of loading a project: either applied directly, or parked until
/// the user relocates the referenced audio file.
#[derive(Debug, PartialEq)]
pub enum ProjectLoad {
    Applied,
    NeedsRelocation { file_name: String },
}

pub struct EditorSession {
    buffer: Option<AudioBuffer>,
    file_name: String,
    history: HistoryStore,
    ids: NoteIds,
    analysis: AnalysisService,
    spectrogram: Option<SpectrogramData>,
    pending_project: Option<ProjectFile>,
    view_state: ViewState,
    settings: ProjectSettings,
    selection: Option<(f64, f64)>,
    current_time: f64,
    playback: Option<PlaybackScheduler>,
    mixer: MixerState,
}

impl Default for EditorSession {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorSession {
    pub fn new() -> Self {
        Self {
            buffer: None,
            file_name: String::new(),
            history: HistoryStore::default(),
            ids: NoteIds::default(),
            analysis: AnalysisService::new(),
            spectrogram: None,
            pending_project: None,
            view_state: ViewState::default(),
            settings: ProjectSettings::default(),
            selection: None,
            current_time: 0.0,
            playback: None,
            mixer: MixerState::default(),
        }
    }

    // ----- audio -----

    /// Decode a file and make it the session buffer. History and the
    /// spectrogram restart from scratch; a pending project referencing this
    /// file name is applied.
    pub fn load_audio<P: AsRef<Path>>(&mut self, path: P) -> Result<(), EditorError> {
        let buffer = file::decode(&path)?;
        let name = path
            .as_ref()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.install_buffer(buffer, name);
        Ok(())
    }

    /// Install an already-decoded buffer (the decoder collaborator hands the
    /// session exactly this).
    pub fn install_buffer(&mut self, buffer: AudioBuffer, file_name: String) {
        info!(
            file = %file_name,
            seconds = buffer.duration(),
            sample_rate = buffer.sample_rate(),
            "buffer installed"
        );
        self.buffer = Some(buffer);
        self.file_name = file_name.clone();
        self.spectrogram = None;
        self.selection = None;
        self.current_time = 0.0;
        self.history.reset(Snapshot::default());

        if let Some(pending) = self.pending_project.take() {
            if pending.file_name == file_name {
                self.apply_project(pending);
            } else {
                // Still the wrong file; keep waiting
                self.pending_project = Some(pending);
            }
        }
    }

    pub fn buffer(&self) -> Option<&AudioBuffer> {
        self.buffer.as_ref()
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    fn sample_rate(&self) -> u32 {
        self.buffer.as_ref().map_or(44100, AudioBuffer::sample_rate)
    }

    fn snap(&self, t: f64) -> f64 {
        snap_time(t, self.sample_rate())
    }

    // ----- analysis -----

    /// Run the pitch pass and the spectrogram pass over the whole buffer and
    /// install the results. Progress of the pitch pass is forwarded to
    /// `progress`. The spectrogram is allowed to fail; the pitch pass is not.
    pub async fn analyze(
        &mut self,
        params: AnalysisParams,
        mut progress: impl FnMut(f32),
    ) -> Result<(), EditorError> {
        let buffer = self
            .buffer
            .clone()
            .ok_or_else(|| EditorError::AnalysisFailed("no audio loaded".into()))?;

        let spectrogram_job = self.analysis.start_spectrogram(&buffer);
        let mut pitch_job = self.analysis.start_pitch(&buffer, params);

        while let Some(v) = pitch_job.progress.recv().await {
            progress(v);
        }
        let pitch_generation = pitch_job.generation;
        let track = pitch_job.join().await?;

        if self.analysis.pitch_is_current(pitch_generation) {
            self.history.reset(Snapshot {
                pitch: track,
                notes: Vec::new(),
            });
        } else {
            info!("discarding stale pitch result");
        }

        let spectrogram_generation = spectrogram_job.generation;
        match spectrogram_job.join().await {
            Ok(data) if self.analysis.spectrogram_is_current(spectrogram_generation) => {
                self.spectrogram = Some(data);
            }
            Ok(_) => info!("discarding stale spectrogram"),
            Err(e) => {
                // Visualization degrades; the session stays usable
                warn!("spectrogram failed: {e}");
            }
        }
        Ok(())
    }

    /// Deep re-search of the current selection; the merged track becomes a
    /// new snapshot. No selection or a failed search changes nothing.
    pub async fn recalc_candidates(&mut self) -> Result<(), EditorError> {
        let (start, end) = self
            .selection
            .ok_or_else(|| EditorError::AnalysisFailed("no selection to re-analyze".into()))?;
        let buffer = self
            .buffer
            .clone()
            .ok_or_else(|| EditorError::AnalysisFailed("no audio loaded".into()))?;

        let job = self
            .analysis
            .start_region(&buffer, start, end, AnalysisParams::deep());
        let generation = job.generation;
        let frames = job.join().await?;

        if !self.analysis.pitch_is_current(generation) {
            info!("discarding stale region result");
            return Ok(());
        }

        let current = self.history.current();
        let merged = current.pitch.merge_region(start, end, frames);
        let snapshot = Snapshot {
            pitch: merged,
            notes: current.notes.clone(),
        };
        self.history.commit(snapshot);
        Ok(())
    }

    pub fn spectrogram(&self) -> Option<&SpectrogramData> {
        self.spectrogram.as_ref()
    }

    // ----- view and selection -----

    /// Selection bounds snap to the frame grid.
    pub fn set_selection(&mut self, selection: Option<(f64, f64)>) {
        self.selection = selection.map(|(s, e)| (self.snap(s), self.snap(e)));
    }

    pub fn selection(&self) -> Option<(f64, f64)> {
        self.selection
    }

    pub fn seek(&mut self, t: f64) {
        self.current_time = self.snap(t.max(0.0));
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.view_state.zoom = zoom.max(1.0);
    }

    pub fn set_view_start(&mut self, view_start: f64) {
        self.view_state.view_start = view_start.max(0.0);
    }

    /// Snap a candidate note boundary against peers, the grid, and the
    /// buffer edges, honoring the shift-to-bypass convention.
    pub fn snap_boundary(&self, t: f64, ignore_id: Option<u64>, shift_held: bool) -> f64 {
        let duration = self.buffer.as_ref().map_or(0.0, AudioBuffer::duration);
        notes::snap_to_boundary(
            t,
            &self.history.current().notes,
            self.view_state.zoom,
            frame_duration(self.sample_rate()),
            duration,
            ignore_id,
            shift_held,
        )
    }

    // ----- snapshot state -----

    pub fn current(&self) -> &std::sync::Arc<Snapshot> {
        self.history.current()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo(&mut self) -> bool {
        self.history.undo()
    }

    pub fn redo(&mut self) -> bool {
        self.history.redo()
    }

    // ----- note editing -----

    /// Create a note over the selection, replacing whatever it covers.
    pub fn create_note_from_selection(&mut self) -> bool {
        let Some((start, end)) = self.selection else {
            return false;
        };
        let current = self.history.current();
        let result =
            notes::create_or_replace(&current.notes, start, end, &current.pitch, &mut self.ids);
        let changed = result != current.notes;
        if changed {
            let snapshot = Snapshot {
                pitch: current.pitch.clone(),
                notes: result,
            };
            self.history.commit(snapshot);
        }
        changed
    }

    pub fn delete_note(&mut self, id: u64) -> bool {
        let current = self.history.current();
        if !current.notes.iter().any(|n| n.id == id) {
            return false;
        }
        let snapshot = Snapshot {
            pitch: current.pitch.clone(),
            notes: current.notes.iter().filter(|n| n.id != id).cloned().collect(),
        };
        self.history.commit(snapshot);
        true
    }

    pub fn split_note(&mut self, id: u64, t: f64) -> bool {
        let t = self.snap(t);
        let current = self.history.current();
        let (result, ok) = notes::split_note(&current.notes, id, t, &current.pitch, &mut self.ids);
        if ok {
            let snapshot = Snapshot {
                pitch: current.pitch.clone(),
                notes: result,
            };
            self.history.commit(snapshot);
        }
        ok
    }

    pub fn resize_note(&mut self, id: u64, new_start: f64, new_end: f64) -> bool {
        let new_start = self.snap(new_start);
        let new_end = self.snap(new_end);
        let current = self.history.current();
        let result =
            notes::resize_with_push(&current.notes, id, new_start, new_end, &current.pitch);
        let changed = result != current.notes;
        if changed {
            let snapshot = Snapshot {
                pitch: current.pitch.clone(),
                notes: result,
            };
            self.history.commit(snapshot);
        }
        changed
    }

    // ----- pitch editing -----

    /// Move the chosen pitch of every voiced frame in the selection to its
    /// next candidate, upward or downward.
    pub fn shift_candidates(&mut self, up: bool) -> bool {
        let Some((start, end)) = self.selection else {
            return false;
        };
        let current = self.history.current();
        let mut pitch = current.pitch.clone();
        if pitch.shift_candidate(start, end, up) == 0 {
            return false;
        }
        let snapshot = Snapshot {
            pitch,
            notes: current.notes.clone(),
        };
        self.history.commit(snapshot);
        true
    }

    /// Force the selection to unvoiced.
    pub fn delete_pitch(&mut self) -> bool {
        let Some((start, end)) = self.selection else {
            return false;
        };
        let current = self.history.current();
        let mut pitch = current.pitch.clone();
        if pitch.delete_pitch(start, end) == 0 {
            return false;
        }
        let snapshot = Snapshot {
            pitch,
            notes: current.notes.clone(),
        };
        self.history.commit(snapshot);
        true
    }

    // ----- project persistence -----

    pub fn export_project(&self) -> ProjectFile {
        let current = self.history.current();
        ProjectFile {
            version: PROJECT_VERSION.into(),
            file_name: self.file_name.clone(),
            sample_rate: self.sample_rate(),
            pitch_data: current.pitch.clone(),
            notes: current.notes.clone(),
            view_state: self.view_state,
            settings: self.settings,
        }
    }

    /// Load a project. When the referenced audio file name does not match
    /// the loaded buffer the project is held pending and nothing mutates;
    /// loading the right audio file later applies it.
    pub fn load_project(&mut self, project: ProjectFile) -> ProjectLoad {
        let matches = self
            .buffer
            .as_ref()
            .map(|_| self.file_name == project.file_name)
            .unwrap_or(false);
        if !matches {
            let file_name = project.file_name.clone();
            info!(file = %file_name, "project held until its audio file is located");
            self.pending_project = Some(project);
            return ProjectLoad::NeedsRelocation { file_name };
        }
        self.apply_project(project);
        ProjectLoad::Applied
    }

    fn apply_project(&mut self, project: ProjectFile) {
        for note in &project.notes {
            self.ids.reserve_through(note.id);
        }
        self.view_state = project.view_state;
        self.settings = project.settings;
        self.history.reset(Snapshot {
            pitch: project.pitch_data,
            notes: project.notes,
        });
        info!("project applied");
    }

    pub fn has_pending_project(&self) -> bool {
        self.pending_project.is_some()
    }

    // ----- playback -----

    /// Start playback of the current snapshot. The scheduler is created on
    /// first use; a missing output device surfaces as `PlaybackFailed` and
    /// leaves the session state untouched.
    pub fn play(&mut self, request: PlayRequest) -> Result<(), EditorError> {
        let buffer = self
            .buffer
            .as_ref()
            .ok_or_else(|| EditorError::PlaybackFailed("no audio loaded".into()))?;
        if self.playback.is_none() {
            self.playback = Some(PlaybackScheduler::new()?);
        }
        let Some(scheduler) = self.playback.as_ref() else {
            return Err(EditorError::PlaybackFailed("scheduler unavailable".into()));
        };
        scheduler.play(buffer, self.history.current(), request)?;
        scheduler.update_mixer(self.mixer);
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(playback) = &self.playback {
            playback.stop();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playback.as_ref().is_some_and(PlaybackScheduler::is_playing)
    }

    pub fn update_mixer(&mut self, mixer: MixerState) {
        self.mixer = mixer;
        if let Some(playback) = &self.playback {
            playback.update_mixer(mixer);
        }
    }
}
