//! Playback of the current snapshot: the time-stretched original recording,
//! a synthesized pitch-curve voice, and synthesized note pulses, all running
//! against one wall clock inside the audio callback.
//!
//! The schedule and the stretched buffer are built once per arm, at play
//! time (or on each loop re-arm); edits made while playing are picked up by
//! the next play.

pub mod stretch;
pub mod synth;

use crate::audio::AudioBuffer;
use crate::error::EditorError;
use crate::history::Snapshot;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use self::synth::{NoteSynth, PitchVoice, Schedule};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// Gain smoothing time for mixer changes, seconds.
const MIXER_RAMP: f32 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChannelMix {
    pub enabled: bool,
    pub volume: f32,
}

impl Default for ChannelMix {
    fn default() -> Self {
        Self {
            enabled: true,
            volume: 1.0,
        }
    }
}

impl ChannelMix {
    /// Volume 0 and disabled are the same thing.
    fn effective(&self) -> f32 {
        if self.enabled {
            self.volume.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Mixer levels for the three playback voices.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MixerState {
    pub original: ChannelMix,
    pub pitch: ChannelMix,
    pub notes: ChannelMix,
}

/// Everything `play` needs to know about where and how to start.
#[derive(Clone, Copy, Debug)]
pub struct PlayRequest {
    /// Buffer time to start from, seconds.
    pub start_offset: f64,
    /// Optional bound on how much buffer time to play.
    pub duration: Option<f64>,
    /// Playback rate; pitch of the original is preserved.
    pub rate: f64,
    /// Loop region in buffer time. Reaching the end re-arms at the start.
    pub loop_region: Option<(f64, f64)>,
}

impl Default for PlayRequest {
    fn default() -> Self {
        Self {
            start_offset: 0.0,
            duration: None,
            rate: 1.0,
            loop_region: None,
        }
    }
}

/// One arm of playback: the stretched original plus the voice schedule and
/// how long the arm runs in wall time.
#[derive(Clone, Debug)]
struct Arm {
    stretched: Vec<f32>,
    schedule: Schedule,
    start_offset: f64,
    wall_end: f64,
}

/// Build an arm from the snapshot. Pure, so it is testable without a device.
fn prepare_arm(
    buffer: &AudioBuffer,
    snapshot: &Snapshot,
    start_offset: f64,
    window_end: f64,
    rate: f64,
) -> Arm {
    let sr = buffer.sample_rate() as f64;
    let first = ((start_offset.max(0.0) * sr) as usize).min(buffer.len());
    let last = ((window_end * sr).ceil() as usize).clamp(first, buffer.len());
    let stretched = stretch::stretch(&buffer.samples()[first..last], rate);

    Arm {
        stretched,
        schedule: Schedule::build(&snapshot.pitch, &snapshot.notes, start_offset, window_end, rate),
        start_offset,
        wall_end: (window_end - start_offset) / rate,
    }
}

struct Engine {
    playing: bool,
    wall_pos: u64,
    device_rate: f32,
    buffer_rate: f32,
    rate: f64,
    arm: Arm,
    loop_arm: Option<Arm>,
    orig_pos: f64,
    pitch_voice: PitchVoice,
    note_synth: NoteSynth,
    gains: [f32; 3],
    targets: [f32; 3],
    gain_coef: f32,
}

impl Engine {
    fn idle(device_rate: f32) -> Self {
        Self {
            playing: false,
            wall_pos: 0,
            device_rate,
            buffer_rate: device_rate,
            rate: 1.0,
            arm: Arm {
                stretched: Vec::new(),
                schedule: Schedule::default(),
                start_offset: 0.0,
                wall_end: 0.0,
            },
            loop_arm: None,
            orig_pos: 0.0,
            pitch_voice: PitchVoice::new(Vec::new(), device_rate),
            note_synth: NoteSynth::new(Vec::new(), device_rate),
            gains: [0.0; 3],
            targets: [1.0, 1.0, 1.0],
            gain_coef: 1.0 - (-1.0 / (MIXER_RAMP * device_rate)).exp(),
        }
    }

    fn arm_voices(&mut self) {
        self.pitch_voice = PitchVoice::new(self.arm.schedule.pitch_points.clone(), self.device_rate);
        self.note_synth = NoteSynth::new(self.arm.schedule.note_events.clone(), self.device_rate);
        self.wall_pos = 0;
        self.orig_pos = 0.0;
    }

    fn start(&mut self, arm: Arm, loop_arm: Option<Arm>, rate: f64, buffer_rate: f32) {
        self.arm = arm;
        self.loop_arm = loop_arm;
        self.rate = rate;
        self.buffer_rate = buffer_rate;
        self.arm_voices();
        self.playing = true;
    }

    fn re_arm(&mut self) {
        if let Some(next) = self.loop_arm.clone() {
            self.arm = next;
            self.arm_voices();
        }
    }

    /// Buffer time currently under the playhead.
    fn position(&self) -> f64 {
        self.arm.start_offset + self.wall_pos as f64 / self.device_rate as f64 * self.rate
    }

    fn render(&mut self, output: &mut [f32], channels: usize) {
        for sample in output.iter_mut() {
            *sample = 0.0;
        }
        if !self.playing {
            return;
        }

        let orig_step = self.buffer_rate as f64 / self.device_rate as f64;
        for frame in output.chunks_exact_mut(channels) {
            let mut t = self.wall_pos as f64 / self.device_rate as f64;

            if t >= self.arm.wall_end {
                if self.loop_arm.is_some() {
                    self.re_arm();
                    t = 0.0;
                } else {
                    self.playing = false;
                    return;
                }
            }

            // Linear interpolation into the stretched original
            let orig = {
                let i = self.orig_pos as usize;
                let frac = (self.orig_pos - i as f64) as f32;
                let a = self.arm.stretched.get(i).copied().unwrap_or(0.0);
                let b = self.arm.stretched.get(i + 1).copied().unwrap_or(0.0);
                a + (b - a) * frac
            };
            self.orig_pos += orig_step;

            let pitch = self.pitch_voice.tick(t);
            let note = self.note_synth.tick(t);

            for (g, target) in self.gains.iter_mut().zip(&self.targets) {
                *g += (target - *g) * self.gain_coef;
            }

            let mixed = orig * self.gains[0] + pitch * self.gains[1] + note * self.gains[2];
            for ch in frame.iter_mut() {
                *ch = mixed;
            }
            self.wall_pos += 1;
        }
    }
}

/// Owns the output stream and the render engine. Constructed once per app
/// root and passed around; there is no global audio service.
pub struct PlaybackScheduler {
    engine: Arc<Mutex<Engine>>,
    _stream: cpal::Stream,
}

impl PlaybackScheduler {
    pub fn new() -> Result<Self, EditorError> {
        let host = cpal::default_host();
        debug!(audio_host = ?host.id(), "using audio host");
        let device = host
            .default_output_device()
            .ok_or_else(|| EditorError::PlaybackFailed("no output device available".into()))?;
        let supported = device
            .default_output_config()
            .map_err(|e| EditorError::PlaybackFailed(e.to_string()))?;
        let sample_format = supported.sample_format();
        let mut config = supported.config();
        config.buffer_size = cpal::BufferSize::Fixed(512);
        let channels = config.channels as usize;
        let device_rate = config.sample_rate as f32;
        debug!(?config, "output stream config");

        let engine = Arc::new(Mutex::new(Engine::idle(device_rate)));
        let engine_for_callback = Arc::clone(&engine);

        let stream = match sample_format {
            cpal::SampleFormat::F32 => device
                .build_output_stream(
                    &config,
                    move |output: &mut [f32], _| {
                        // Panicking out of a callback is bad; zero on poison
                        match engine_for_callback.lock() {
                            Ok(mut engine) => engine.render(output, channels),
                            Err(e) => {
                                error!("engine mutex poisoned: {e}");
                                for s in output.iter_mut() {
                                    *s = 0.0;
                                }
                            }
                        }
                    },
                    move |err| {
                        warn!("output stream error: {err}");
                    },
                    None,
                )
                .map_err(|e| EditorError::PlaybackFailed(e.to_string()))?,
            other => {
                return Err(EditorError::PlaybackFailed(format!(
                    "unsupported sample format: {other:?}"
                )));
            }
        };

        info!(device_rate, channels, "playback scheduler ready");
        Ok(Self {
            engine,
            _stream: stream,
        })
    }

    /// Arm the voices from the current snapshot and start the clock. The
    /// snapshot is read once, here; later edits wait for the next play.
    pub fn play(
        &self,
        buffer: &AudioBuffer,
        snapshot: &Snapshot,
        request: PlayRequest,
    ) -> Result<(), EditorError> {
        if request.rate <= 0.0 {
            return Err(EditorError::PlaybackFailed(format!(
                "non-positive playback rate {}",
                request.rate
            )));
        }

        let duration = buffer.duration();
        let window_end = match (request.duration, request.loop_region) {
            (_, Some((_, loop_end))) => loop_end.min(duration),
            (Some(d), None) => (request.start_offset + d).min(duration),
            (None, None) => duration,
        };

        let arm = prepare_arm(
            buffer,
            snapshot,
            request.start_offset,
            window_end,
            request.rate,
        );
        let loop_arm = request.loop_region.map(|(loop_start, loop_end)| {
            prepare_arm(
                buffer,
                snapshot,
                loop_start,
                loop_end.min(duration),
                request.rate,
            )
        });

        {
            let mut engine = self.engine.lock().unwrap();
            engine.start(arm, loop_arm, request.rate, buffer.sample_rate() as f32);
        }

        // A paused stream resumes on play; retry once before giving up
        if let Err(first) = self._stream.play() {
            warn!("stream start failed, retrying: {first}");
            if let Err(second) = self._stream.play() {
                self.engine.lock().unwrap().playing = false;
                return Err(EditorError::PlaybackFailed(second.to_string()));
            }
        }
        info!(
            start = request.start_offset,
            rate = request.rate,
            looped = request.loop_region.is_some(),
            "playback started"
        );
        Ok(())
    }

    /// Idempotent; the callback falls silent on its next run.
    pub fn stop(&self) {
        let mut engine = self.engine.lock().unwrap();
        if engine.playing {
            debug!("playback stopped");
        }
        engine.playing = false;
    }

    pub fn is_playing(&self) -> bool {
        self.engine.lock().unwrap().playing
    }

    /// Buffer time under the playhead, `start_offset + wall_time * rate`.
    pub fn position(&self) -> f64 {
        self.engine.lock().unwrap().position()
    }

    pub fn update_mixer(&self, mixer: MixerState) {
        let mut engine = self.engine.lock().unwrap();
        engine.targets = [
            mixer.original.effective(),
            mixer.pitch.effective(),
            mixer.notes.effective(),
        ];
    }
}
