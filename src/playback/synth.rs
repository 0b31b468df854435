//! Synthesis voices for the pitch curve and the note segments.
//!
//! The scheduler owns one pitch voice (triangle oscillator, low-pass filter,
//! slow sine vibrato) following the frame-by-frame pitch curve, and one pulse
//! voice per scheduled note with a short linear envelope. All scheduling is
//! table-driven: events carry wall-clock times relative to the arm anchor and
//! the voices consume them as the render position sweeps past.

use crate::analysis::track::PitchTrack;
use crate::notes::Note;

/// Cutoff of the pitch voice's smoothing filter.
const PITCH_LP_CUTOFF: f32 = 500.0;
/// Gain of the pitch voice while the curve is voiced.
const PITCH_VOICE_GAIN: f32 = 0.7;
/// Vibrato rate and depth (fraction of the base frequency).
const VIBRATO_HZ: f32 = 5.0;
const VIBRATO_DEPTH: f32 = 0.005;
/// Parameter smoothing time for frequency/gain ramps.
const RAMP_SECONDS: f32 = 0.010;

const NOTE_DUTY: f32 = 0.3;
const NOTE_LP_CUTOFF: f32 = 2000.0;
const NOTE_ATTACK: f64 = 0.010;
const NOTE_RELEASE: f64 = 0.050;
const NOTE_SUSTAIN: f32 = 0.8;
const NOTE_DECAY: f64 = 0.040;

/// One point of the pitch-curve schedule, wall seconds from the anchor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PitchPoint {
    pub at: f64,
    pub frequency: f32,
    pub voiced: bool,
}

/// One scheduled note pulse, wall seconds from the anchor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoteEvent {
    pub at: f64,
    pub duration: f64,
    pub frequency: f32,
}

/// Everything the voices need for one arm of playback, derived from the
/// current snapshot at play time. Mid-play edits do not touch this.
#[derive(Clone, Debug, Default)]
pub struct Schedule {
    pub pitch_points: Vec<PitchPoint>,
    pub note_events: Vec<NoteEvent>,
}

impl Schedule {
    /// Map the snapshot onto wall time: a frame at buffer time `ts` sounds at
    /// `(ts - start_offset) / rate` after the anchor. Notes overlapping the
    /// window are clipped to it.
    pub fn build(
        pitch: &PitchTrack,
        notes: &[Note],
        start_offset: f64,
        window_end: f64,
        rate: f64,
    ) -> Self {
        let mut pitch_points = Vec::new();
        for frame in pitch.frames() {
            if frame.timestamp < start_offset || frame.timestamp > window_end {
                continue;
            }
            pitch_points.push(PitchPoint {
                at: (frame.timestamp - start_offset) / rate,
                frequency: frame.frequency,
                voiced: frame.has_pitch,
            });
        }

        let mut note_events = Vec::new();
        for note in notes {
            if note.end <= start_offset || note.start >= window_end {
                continue;
            }
            let clipped_start = note.start.max(start_offset);
            let clipped_end = note.end.min(window_end);
            note_events.push(NoteEvent {
                at: (clipped_start - start_offset) / rate,
                duration: (clipped_end - clipped_start) / rate,
                frequency: note.pitch,
            });
        }
        note_events.sort_by(|a, b| a.at.total_cmp(&b.at));

        Self {
            pitch_points,
            note_events,
        }
    }
}

fn one_pole_coef(cutoff: f32, sample_rate: f32) -> f32 {
    1.0 - (-2.0 * std::f32::consts::PI * cutoff / sample_rate).exp()
}

/// Triangle oscillator following the pitch curve through a low-pass filter,
/// with a gentle 5 Hz vibrato detune.
pub struct PitchVoice {
    points: Vec<PitchPoint>,
    next: usize,
    sample_rate: f32,
    phase: f32,
    vibrato_phase: f32,
    frequency: f32,
    target_frequency: f32,
    gain: f32,
    target_gain: f32,
    lp_state: f32,
    lp_coef: f32,
    ramp_coef: f32,
}

impl PitchVoice {
    pub fn new(points: Vec<PitchPoint>, sample_rate: f32) -> Self {
        Self {
            points,
            next: 0,
            sample_rate,
            phase: 0.0,
            vibrato_phase: 0.0,
            frequency: 0.0,
            target_frequency: 0.0,
            gain: 0.0,
            target_gain: 0.0,
            lp_state: 0.0,
            lp_coef: one_pole_coef(PITCH_LP_CUTOFF, sample_rate),
            ramp_coef: one_pole_coef(1.0 / RAMP_SECONDS, sample_rate),
        }
    }

    /// Render one sample at wall time `t` seconds after the anchor.
    pub fn tick(&mut self, t: f64) -> f32 {
        while self.next < self.points.len() && self.points[self.next].at <= t {
            let p = self.points[self.next];
            if p.voiced {
                self.target_frequency = p.frequency;
                self.target_gain = PITCH_VOICE_GAIN;
                if self.frequency == 0.0 {
                    // Coming out of silence: jump instead of sweeping up
                    self.frequency = p.frequency;
                }
            } else {
                self.target_gain = 0.0;
            }
            self.next += 1;
        }

        self.frequency += (self.target_frequency - self.frequency) * self.ramp_coef;
        self.gain += (self.target_gain - self.gain) * self.ramp_coef;

        self.vibrato_phase += VIBRATO_HZ / self.sample_rate;
        if self.vibrato_phase >= 1.0 {
            self.vibrato_phase -= 1.0;
        }
        let vibrato = (2.0 * std::f32::consts::PI * self.vibrato_phase).sin();
        let f = self.frequency * (1.0 + VIBRATO_DEPTH * vibrato);

        self.phase += f / self.sample_rate;
        if self.phase >= 1.0 {
            self.phase -= self.phase.floor();
        }
        let triangle = 1.0 - 4.0 * (self.phase - 0.5).abs();

        self.lp_state += (triangle * self.gain - self.lp_state) * self.lp_coef;
        self.lp_state
    }
}

struct NoteVoiceState {
    event: NoteEvent,
    phase: f32,
    lp_state: f32,
}

/// Pulse-wave voices for the scheduled notes, one per event, each with a
/// linear attack/decay/sustain/release envelope inside its duration.
pub struct NoteSynth {
    voices: Vec<NoteVoiceState>,
    sample_rate: f32,
    lp_coef: f32,
}

impl NoteSynth {
    pub fn new(events: Vec<NoteEvent>, sample_rate: f32) -> Self {
        Self {
            voices: events
                .into_iter()
                .map(|event| NoteVoiceState {
                    event,
                    phase: 0.0,
                    lp_state: 0.0,
                })
                .collect(),
            sample_rate,
            lp_coef: one_pole_coef(NOTE_LP_CUTOFF, sample_rate),
        }
    }

    fn envelope(event: &NoteEvent, rel: f64) -> f32 {
        if rel < 0.0 || rel > event.duration {
            return 0.0;
        }
        let attack = (rel / NOTE_ATTACK).min(1.0) as f32;
        let decay = if rel > NOTE_ATTACK {
            let d = ((rel - NOTE_ATTACK) / NOTE_DECAY).min(1.0) as f32;
            1.0 - d * (1.0 - NOTE_SUSTAIN)
        } else {
            1.0
        };
        let release = ((event.duration - rel) / NOTE_RELEASE).min(1.0) as f32;
        attack * decay * release
    }

    /// Render one sample at wall time `t` seconds after the anchor.
    pub fn tick(&mut self, t: f64) -> f32 {
        let mut out = 0.0;
        for voice in &mut self.voices {
            let rel = t - voice.event.at;
            let env = Self::envelope(&voice.event, rel);
            if env <= 0.0 {
                continue;
            }
            voice.phase += voice.event.frequency / self.sample_rate;
            if voice.phase >= 1.0 {
                voice.phase -= voice.phase.floor();
            }
            let pulse = if voice.phase < NOTE_DUTY { 1.0 } else { -1.0 };
            voice.lp_state += (pulse * env - voice.lp_state) * self.lp_coef;
            out += voice.lp_state;
        }
        out
    }
}
