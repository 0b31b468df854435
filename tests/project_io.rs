//! Project persistence over a full analysis: serialize, parse, re-serialize,
//! and the interchange exports, exercised end to end through the session.

use intona::analysis::pyin::AnalysisParams;
use intona::audio::AudioBuffer;
use intona::project::{self, ProjectFile};
use intona::session::{EditorSession, ProjectLoad};

fn sine_buffer(freq: f32, seconds: f32) -> AudioBuffer {
    let sr = 44100u32;
    let samples: Vec<f32> = (0..(seconds * sr as f32) as usize)
        .map(|n| 0.5 * (2.0 * std::f32::consts::PI * freq * n as f32 / sr as f32).sin())
        .collect();
    AudioBuffer::new(sr, samples)
}

async fn analyzed_session() -> EditorSession {
    let mut session = EditorSession::new();
    session.install_buffer(sine_buffer(220.0, 1.0), "take01.wav".into());
    session
        .analyze(AnalysisParams::default(), |_| {})
        .await
        .expect("analysis");
    session.set_selection(Some((0.1, 0.9)));
    assert!(session.create_note_from_selection());
    session
}

#[tokio::test]
async fn project_round_trip_is_byte_equal() {
    let session = analyzed_session().await;
    let project = session.export_project();

    let json = project.to_json();
    let parsed = ProjectFile::from_json(&json).expect("parse");
    assert_eq!(parsed.to_json(), json);

    assert_eq!(parsed.version, "1.2");
    assert_eq!(parsed.file_name, "take01.wav");
    assert_eq!(parsed.sample_rate, 44100);
    assert_eq!(parsed.pitch_data.len(), session.current().pitch.len());
    assert_eq!(parsed.notes.len(), 1);
}

#[tokio::test]
async fn project_restores_into_a_fresh_session() {
    let session = analyzed_session().await;
    let json = session.export_project().to_json();

    let mut restored = EditorSession::new();
    restored.install_buffer(sine_buffer(220.0, 1.0), "take01.wav".into());
    let project = ProjectFile::from_json(&json).expect("parse");
    assert_eq!(restored.load_project(project), ProjectLoad::Applied);

    assert_eq!(restored.current().notes.len(), 1);
    assert_eq!(
        restored.current().pitch.len(),
        session.current().pitch.len()
    );

    // New note ids never collide with restored ones
    restored.set_selection(Some((0.1, 0.4)));
    assert!(restored.create_note_from_selection());
    let ids: Vec<u64> = restored.current().notes.iter().map(|n| n.id).collect();
    let mut deduped = ids.clone();
    deduped.dedup();
    assert_eq!(ids, deduped);
}

#[tokio::test]
async fn relocation_flow_holds_state_until_the_right_audio_arrives() {
    let session = analyzed_session().await;
    let json = session.export_project().to_json();

    let mut other = EditorSession::new();
    other.install_buffer(sine_buffer(330.0, 0.5), "different.wav".into());
    let project = ProjectFile::from_json(&json).expect("parse");

    let result = other.load_project(project);
    assert_eq!(
        result,
        ProjectLoad::NeedsRelocation {
            file_name: "take01.wav".into()
        }
    );
    assert!(other.current().notes.is_empty(), "state mutated while pending");

    other.install_buffer(sine_buffer(220.0, 1.0), "take01.wav".into());
    assert_eq!(other.current().notes.len(), 1);
}

#[tokio::test]
async fn csv_and_svl_exports_cover_the_analysis() {
    let session = analyzed_session().await;
    let snapshot = session.current();

    let pitch_csv = project::pitch_to_csv(&snapshot.pitch);
    assert_eq!(pitch_csv.lines().count(), 1 + snapshot.pitch.len());
    let reparsed = project::pitch_from_csv(&pitch_csv).expect("pitch csv parse");
    assert_eq!(reparsed.len(), snapshot.pitch.len());

    let notes_csv = project::notes_to_csv(&snapshot.notes);
    let reparsed = project::notes_from_csv(&notes_csv, 100).expect("notes csv parse");
    assert_eq!(reparsed.len(), snapshot.notes.len());
    assert!((reparsed[0].pitch - snapshot.notes[0].pitch).abs() < 0.001);

    let voiced = snapshot.pitch.frames().iter().filter(|f| f.has_pitch).count();
    let svl = project::pitch_to_svl(&snapshot.pitch, 44100);
    assert_eq!(svl.matches("<point ").count(), voiced);

    let svl = project::notes_to_svl(&snapshot.notes, 44100);
    assert_eq!(svl.matches("<segment ").count(), 1);
}

#[tokio::test]
async fn undo_survives_an_edit_heavy_session() {
    let mut session = analyzed_session().await;

    let first_note = session.current().notes[0].clone();
    assert!(session.split_note(first_note.id, 0.5));
    assert_eq!(session.current().notes.len(), 2);

    let left_id = session.current().notes[0].id;
    assert!(session.resize_note(left_id, 0.1, 0.6));
    assert!(session.delete_note(session.current().notes[1].id));
    assert_eq!(session.current().notes.len(), 1);

    // Walk all the way back to the post-analysis state
    while session.can_undo() {
        session.undo();
    }
    assert!(session.current().notes.is_empty());
    assert!(!session.current().pitch.is_empty());

    // And forward again
    while session.can_redo() {
        session.redo();
    }
    assert_eq!(session.current().notes.len(), 1);
}
