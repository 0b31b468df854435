//! End-to-end pitch analysis scenarios on synthetic signals:
//! - Silence stays silent
//! - A pure tone is tracked tightly
//! - An octave jump settles within a few frames
//! - Deep re-search recovers a tone the default pass gated out

use intona::analysis::pyin::{self, AnalysisParams};
use intona::analysis::spectrogram;
use intona::analysis::{FRAME_LENGTH, HOP_LENGTH};

fn sine(freq: f32, sample_rate: u32, seconds: f32, amplitude: f32) -> Vec<f32> {
    let len = (seconds * sample_rate as f32) as usize;
    (0..len)
        .map(|n| {
            amplitude * (2.0 * std::f32::consts::PI * freq * n as f32 / sample_rate as f32).sin()
        })
        .collect()
}

fn analyze(samples: &[f32], params: AnalysisParams) -> intona::PitchTrack {
    pyin::analyze(samples, 44100, params, &mut |_| {}).expect("analysis should succeed")
}

#[test]
fn silence_in_silence_out() {
    let samples = vec![0.0f32; 44100];
    let track = analyze(&samples, AnalysisParams::default());

    assert_eq!(track.len(), (44100 - FRAME_LENGTH) / HOP_LENGTH);
    for frame in track.frames() {
        assert!(
            !frame.has_pitch,
            "silent frame at {} came out voiced",
            frame.timestamp
        );
        assert_eq!(frame.frequency, 0.0);
    }
}

#[test]
fn pure_tone_is_tracked_within_a_hertz() {
    let samples = sine(440.0, 44100, 1.0, 0.5);
    let track = analyze(&samples, AnalysisParams::default());

    assert!(track.len() > 50);
    for frame in track.frames().iter().skip(2) {
        assert!(
            frame.has_pitch,
            "frame at {} lost the tone",
            frame.timestamp
        );
        assert!(
            (439.0..=441.0).contains(&frame.frequency),
            "frame at {} drifted to {} Hz",
            frame.timestamp,
            frame.frequency
        );
        assert!(
            frame.probability >= 0.8,
            "frame at {} has weak probability {}",
            frame.timestamp,
            frame.probability
        );
    }
}

#[test]
fn octave_jump_settles_quickly() {
    let sr = 44100u32;
    let mut samples = sine(220.0, sr, 0.5, 0.5);
    samples.extend(sine(440.0, sr, 0.5, 0.5));
    let boundary = sr as usize / 2;

    let track = analyze(&samples, AnalysisParams::default());

    let mut mischosen = 0;
    for (i, frame) in track.frames().iter().enumerate() {
        let window_start = i * HOP_LENGTH;
        let window_end = window_start + FRAME_LENGTH;
        let straddles = window_start < boundary && boundary < window_end;

        let truth = if window_end <= boundary { 220.0 } else { 440.0 };
        let within = frame.has_pitch && (frame.frequency - truth).abs() / truth <= 0.01;

        if straddles {
            if !within {
                mischosen += 1;
            }
        } else {
            assert!(
                within,
                "frame {i} (t={}) chose {} Hz, expected about {truth} Hz",
                frame.timestamp, frame.frequency
            );
        }
    }
    // Only frames whose window contains the jump may be off
    assert!(mischosen <= 4, "{mischosen} frames mischosen at the jump");
}

#[test]
fn deep_research_recovers_a_gated_tone() {
    let sr = 44100u32;
    // Quiet enough that the default RMS gate drops every frame
    let samples = sine(300.0, sr, 1.0, 0.007);

    let track = analyze(&samples, AnalysisParams::default());
    assert!(
        track.frames().iter().all(|f| !f.has_pitch),
        "default analysis should gate the quiet tone out"
    );

    let region = pyin::reanalyze_region(&samples, sr, 0.2, 0.8, AnalysisParams::deep(), &mut |_| {})
        .expect("deep re-search should succeed");
    assert!(!region.is_empty());

    let voiced_near_300 = region
        .iter()
        .filter(|f| f.has_pitch && (f.frequency - 300.0).abs() < 9.0)
        .count();
    assert!(
        voiced_near_300 as f64 >= 0.7 * region.len() as f64,
        "only {voiced_near_300} of {} region frames recovered the tone",
        region.len()
    );

    // Merging keeps the outside untouched and the whole track sorted
    let merged = track.merge_region(0.2, 0.8, region);
    assert!(
        merged
            .frames()
            .windows(2)
            .all(|w| w[0].timestamp < w[1].timestamp),
        "merged track is not strictly ordered"
    );
    for frame in merged.frames() {
        if frame.timestamp < 0.2 - 1e-9 || frame.timestamp > 0.8 + 1e-9 {
            assert!(!frame.has_pitch, "frame outside the region changed");
        }
    }
}

#[test]
fn single_frame_selection_yields_single_frame() {
    let sr = 44100u32;
    let samples = sine(250.0, sr, 1.0, 0.5);
    // One hop of selection holds exactly one frame of the re-analysis grid
    let t0 = 0.464;
    let t1 = t0 + HOP_LENGTH as f64 / sr as f64;

    let region = pyin::reanalyze_region(&samples, sr, t0, t1, AnalysisParams::deep(), &mut |_| {})
        .expect("deep re-search should succeed");
    assert_eq!(region.len(), 1, "expected exactly one frame in the region");
    assert!(!region[0].candidates.is_empty());
    assert!(region[0].has_pitch);
}

#[test]
fn empty_audio_yields_empty_outputs() {
    let track = analyze(&[], AnalysisParams::default());
    assert!(track.is_empty());

    let data = spectrogram::compute(&[], 44100).expect("spectrogram of nothing");
    assert_eq!(data.width(), 0);
}

#[test]
fn spectrogram_and_pitch_share_the_frame_grid() {
    let samples = sine(330.0, 44100, 0.7, 0.5);
    let track = analyze(&samples, AnalysisParams::default());
    let data = spectrogram::compute(&samples, 44100).expect("spectrogram");

    assert_eq!(track.len(), data.width());
    assert_eq!(data.height(), FRAME_LENGTH / 2);
}
