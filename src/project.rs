//! Project persistence and interchange formats: project JSON, pitch/notes
//! CSV, and Sonic Visualiser layer XML.

use crate::analysis::track::{PitchCandidate, PitchFrame, PitchTrack};
use crate::error::EditorError;
use crate::notes::Note;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

pub const PROJECT_VERSION: &str = "1.2";

/// View portion of the project file. The canvas layer owns the semantics;
/// the core only round-trips it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewState {
    pub zoom: f64,
    pub view_start: f64,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            zoom: 100.0,
            view_start: 0.0,
        }
    }
}

/// Analysis settings persisted with the project.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectSettings {
    pub threshold: f32,
    pub rms_threshold: f32,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            threshold: crate::analysis::PYIN_THRESHOLD,
            rms_threshold: crate::analysis::RMS_THRESHOLD,
        }
    }
}

/// The complete persisted state. Pitch frames carry their full candidate
/// lists; optional fields are tolerated on import and written canonically.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFile {
    pub version: String,
    pub file_name: String,
    pub sample_rate: u32,
    pub pitch_data: PitchTrack,
    pub notes: Vec<Note>,
    #[serde(default)]
    pub view_state: ViewState,
    #[serde(default)]
    pub settings: ProjectSettings,
}

impl ProjectFile {
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).expect("project serialization cannot fail")
    }

    pub fn from_json(json: &str) -> Result<Self, EditorError> {
        let project: ProjectFile = serde_json::from_str(json)
            .map_err(|e| EditorError::InvalidProjectFile(e.to_string()))?;
        if project.sample_rate == 0 {
            return Err(EditorError::InvalidProjectFile(
                "sample rate is zero".into(),
            ));
        }
        for note in &project.notes {
            if !(note.start < note.end) || note.pitch <= 0.0 {
                return Err(EditorError::InvalidProjectFile(format!(
                    "malformed note {}: [{}, {}] @ {} Hz",
                    note.id, note.start, note.end, note.pitch
                )));
            }
        }
        Ok(project)
    }
}

/// Pitch track as CSV: `Time(s),Frequency(Hz),Probability`, one row per
/// frame.
pub fn pitch_to_csv(track: &PitchTrack) -> String {
    let mut out = String::from("Time(s),Frequency(Hz),Probability\n");
    for frame in track.frames() {
        let _ = writeln!(
            out,
            "{:.6},{:.3},{:.3}",
            frame.timestamp, frame.frequency, frame.probability
        );
    }
    out
}

/// Parse pitch CSV back into frames. Imported frames get a minimal candidate
/// list holding just the chosen value, so the chosen pair always appears in
/// the candidates.
pub fn pitch_from_csv(csv: &str) -> Result<Vec<PitchFrame>, EditorError> {
    let mut frames = Vec::new();
    for (i, line) in csv.lines().enumerate() {
        if i == 0 {
            if !line.starts_with("Time(s)") {
                return Err(EditorError::InvalidCsv {
                    line: 1,
                    reason: format!("unexpected header {line:?}"),
                });
            }
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != 3 {
            return Err(EditorError::InvalidCsv {
                line: i + 1,
                reason: format!("expected 3 fields, got {}", fields.len()),
            });
        }
        let parse = |s: &str, what: &str| -> Result<f64, EditorError> {
            s.trim().parse::<f64>().map_err(|_| EditorError::InvalidCsv {
                line: i + 1,
                reason: format!("bad {what} value {s:?}"),
            })
        };
        let timestamp = parse(fields[0], "time")?;
        let frequency = parse(fields[1], "frequency")? as f32;
        let probability = parse(fields[2], "probability")? as f32;

        let candidate = PitchCandidate {
            frequency: frequency.max(0.0),
            probability: probability.clamp(0.0, 1.0).max(1e-4),
            yin_dip: (1.0 - probability).clamp(0.0, 1.0),
        };
        frames.push(PitchFrame {
            timestamp,
            frequency: candidate.frequency,
            probability: candidate.probability,
            has_pitch: candidate.frequency > 0.0,
            candidates: vec![candidate],
        });
    }
    Ok(frames)
}

/// Notes as CSV: `Onset(s),Duration(s),Pitch(Hz)`.
pub fn notes_to_csv(notes: &[Note]) -> String {
    let mut out = String::from("Onset(s),Duration(s),Pitch(Hz)\n");
    for note in notes {
        let _ = writeln!(
            out,
            "{:.6},{:.6},{:.3}",
            note.start,
            note.duration(),
            note.pitch
        );
    }
    out
}

/// Parse notes CSV; ids are assigned sequentially starting at `first_id`.
pub fn notes_from_csv(csv: &str, first_id: u64) -> Result<Vec<Note>, EditorError> {
    let mut notes = Vec::new();
    for (i, line) in csv.lines().enumerate() {
        if i == 0 {
            if !line.starts_with("Onset(s)") {
                return Err(EditorError::InvalidCsv {
                    line: 1,
                    reason: format!("unexpected header {line:?}"),
                });
            }
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != 3 {
            return Err(EditorError::InvalidCsv {
                line: i + 1,
                reason: format!("expected 3 fields, got {}", fields.len()),
            });
        }
        let parse = |s: &str, what: &str| -> Result<f64, EditorError> {
            s.trim().parse::<f64>().map_err(|_| EditorError::InvalidCsv {
                line: i + 1,
                reason: format!("bad {what} value {s:?}"),
            })
        };
        let onset = parse(fields[0], "onset")?;
        let duration = parse(fields[1], "duration")?;
        let pitch = parse(fields[2], "pitch")? as f32;
        if duration <= 0.0 || pitch <= 0.0 {
            return Err(EditorError::InvalidCsv {
                line: i + 1,
                reason: "non-positive duration or pitch".into(),
            });
        }
        notes.push(Note {
            id: first_id + notes.len() as u64,
            start: onset,
            end: onset + duration,
            pitch,
            state: None,
        });
    }
    Ok(notes)
}

fn svl_envelope(sample_rate: u32, body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <!DOCTYPE sonic-visualiser>\n\
         <sv>\n  <data>\n    <model id=\"1\" name=\"\" sampleRate=\"{sample_rate}\" \
         type=\"sparse\" dimensions=\"2\" resolution=\"1\" notifyOnAdd=\"true\" \
         dataset=\"0\"/>\n    <dataset id=\"0\" dimensions=\"2\">\n{body}    </dataset>\n  \
         </data>\n</sv>\n"
    )
}

/// Voiced pitch frames as a Sonic Visualiser time-value layer.
pub fn pitch_to_svl(track: &PitchTrack, sample_rate: u32) -> String {
    let mut body = String::new();
    for frame in track.frames() {
        if !frame.has_pitch {
            continue;
        }
        let sample = (frame.timestamp * sample_rate as f64).round() as u64;
        let _ = writeln!(
            body,
            "      <point frame=\"{sample}\" value=\"{:.3}\" label=\"p\"/>",
            frame.frequency
        );
    }
    svl_envelope(sample_rate, &body)
}

/// Notes as a Sonic Visualiser segment layer; durations are in samples.
pub fn notes_to_svl(notes: &[Note], sample_rate: u32) -> String {
    let mut body = String::new();
    for note in notes {
        let frame = (note.start * sample_rate as f64).round() as u64;
        let duration = (note.duration() * sample_rate as f64).round() as u64;
        let _ = writeln!(
            body,
            "      <segment frame=\"{frame}\" duration=\"{duration}\" value=\"{:.3}\"/>",
            note.pitch
        );
    }
    svl_envelope(sample_rate, &body)
}
