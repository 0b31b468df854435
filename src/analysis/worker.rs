//! Background analysis jobs.
//!
//! Pitch and spectrogram passes run on blocking worker threads, one in-flight
//! job per kind. Every job carries a generation number; a result whose
//! generation no longer matches the service counter is stale (a newer job for
//! the same kind has started) and must be dropped without being applied.

use crate::analysis::pyin::{self, AnalysisParams};
use crate::analysis::spectrogram::{self, SpectrogramData};
use crate::analysis::track::{PitchFrame, PitchTrack};
use crate::audio::AudioBuffer;
use crate::error::EditorError;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Hands out analysis jobs and tracks which generation of each kind is
/// current.
#[derive(Debug, Default)]
pub struct AnalysisService {
    pitch_generation: u64,
    spectrogram_generation: u64,
}

/// In-flight pitch analysis. `progress` yields values in [0, 1].
pub struct PitchJob {
    pub generation: u64,
    pub progress: mpsc::UnboundedReceiver<f32>,
    handle: JoinHandle<Result<PitchTrack, EditorError>>,
}

impl PitchJob {
    pub async fn join(self) -> Result<PitchTrack, EditorError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => {
                warn!("pitch worker died: {e}");
                Err(EditorError::AnalysisFailed(e.to_string()))
            }
        }
    }
}

/// In-flight deep re-search of a region; resolves to the region's frames.
pub struct RegionJob {
    pub generation: u64,
    pub start: f64,
    pub end: f64,
    pub progress: mpsc::UnboundedReceiver<f32>,
    handle: JoinHandle<Result<Vec<PitchFrame>, EditorError>>,
}

impl RegionJob {
    pub async fn join(self) -> Result<Vec<PitchFrame>, EditorError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => {
                warn!("region worker died: {e}");
                Err(EditorError::AnalysisFailed(e.to_string()))
            }
        }
    }
}

/// In-flight spectrogram pass.
pub struct SpectrogramJob {
    pub generation: u64,
    handle: JoinHandle<Result<SpectrogramData, EditorError>>,
}

impl SpectrogramJob {
    pub async fn join(self) -> Result<SpectrogramData, EditorError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => {
                warn!("spectrogram worker died: {e}");
                Err(EditorError::SpectrogramFailed(e.to_string()))
            }
        }
    }
}

impl AnalysisService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a full pitch pass. Any earlier pitch job becomes stale.
    pub fn start_pitch(&mut self, buffer: &AudioBuffer, params: AnalysisParams) -> PitchJob {
        self.pitch_generation += 1;
        let generation = self.pitch_generation;
        let samples: Arc<[f32]> = Arc::from(buffer.samples());
        let sample_rate = buffer.sample_rate();
        let (tx, rx) = mpsc::unbounded_channel();

        debug!(generation, "starting pitch analysis job");
        let handle = tokio::task::spawn_blocking(move || {
            pyin::analyze(&samples, sample_rate, params, &mut |v| {
                let _ = tx.send(v);
            })
        });

        PitchJob {
            generation,
            progress: rx,
            handle,
        }
    }

    /// Start a deep re-search of `[start, end]`. Shares the pitch generation
    /// counter: a full pass started afterwards also makes this stale.
    pub fn start_region(
        &mut self,
        buffer: &AudioBuffer,
        start: f64,
        end: f64,
        params: AnalysisParams,
    ) -> RegionJob {
        self.pitch_generation += 1;
        let generation = self.pitch_generation;
        let samples: Arc<[f32]> = Arc::from(buffer.samples());
        let sample_rate = buffer.sample_rate();
        let (tx, rx) = mpsc::unbounded_channel();

        debug!(generation, start, end, "starting region re-search job");
        let handle = tokio::task::spawn_blocking(move || {
            pyin::reanalyze_region(&samples, sample_rate, start, end, params, &mut |v| {
                let _ = tx.send(v);
            })
        });

        RegionJob {
            generation,
            start,
            end,
            progress: rx,
            handle,
        }
    }

    /// Start a spectrogram pass. Any earlier spectrogram job becomes stale.
    pub fn start_spectrogram(&mut self, buffer: &AudioBuffer) -> SpectrogramJob {
        self.spectrogram_generation += 1;
        let generation = self.spectrogram_generation;
        let samples: Arc<[f32]> = Arc::from(buffer.samples());
        let sample_rate = buffer.sample_rate();

        debug!(generation, "starting spectrogram job");
        let handle =
            tokio::task::spawn_blocking(move || spectrogram::compute(&samples, sample_rate));

        SpectrogramJob { generation, handle }
    }

    pub fn pitch_is_current(&self, generation: u64) -> bool {
        self.pitch_generation == generation
    }

    pub fn spectrogram_is_current(&self, generation: u64) -> bool {
        self.spectrogram_generation == generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_buffer(freq: f32, seconds: f32) -> AudioBuffer {
        let sr = 44100u32;
        let samples: Vec<f32> = (0..(seconds * sr as f32) as usize)
            .map(|n| 0.5 * (2.0 * std::f32::consts::PI * freq * n as f32 / sr as f32).sin())
            .collect();
        AudioBuffer::new(sr, samples)
    }

    #[tokio::test]
    async fn pitch_job_reports_progress_and_completes() {
        let buffer = sine_buffer(220.0, 0.5);
        let mut service = AnalysisService::new();
        let mut job = service.start_pitch(&buffer, AnalysisParams::default());

        let track = (&mut job.handle).await.unwrap().unwrap();
        assert!(!track.is_empty());

        let mut last = 0.0;
        while let Ok(v) = job.progress.try_recv() {
            assert!(v >= last - 1e-6, "progress went backwards: {last} -> {v}");
            last = v;
        }
        assert_eq!(last, 1.0);
    }

    #[tokio::test]
    async fn newer_job_makes_older_generation_stale() {
        let buffer = sine_buffer(220.0, 0.3);
        let mut service = AnalysisService::new();

        let first = service.start_spectrogram(&buffer);
        let second = service.start_spectrogram(&buffer);

        assert!(!service.spectrogram_is_current(first.generation));
        assert!(service.spectrogram_is_current(second.generation));

        // Both still run to completion; the stale result is simply dropped.
        let _ = first.join().await.unwrap();
        let _ = second.join().await.unwrap();
    }

    #[tokio::test]
    async fn region_job_returns_frames_inside_region_only() {
        let buffer = sine_buffer(300.0, 1.0);
        let mut service = AnalysisService::new();
        let job = service.start_region(&buffer, 0.2, 0.4, AnalysisParams::deep());

        let frames = job.join().await.unwrap();
        assert!(!frames.is_empty());
        for f in &frames {
            assert!(
                f.timestamp >= 0.2 - 1e-9 && f.timestamp <= 0.4 + 1e-9,
                "frame at {} escaped the region",
                f.timestamp
            );
        }
    }
}
