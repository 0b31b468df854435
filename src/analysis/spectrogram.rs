//! Hann-windowed STFT magnitudes for the visualization layer.

use crate::analysis::{FRAME_LENGTH, HOP_LENGTH, fft};
use crate::error::EditorError;
use rayon::prelude::*;
use tracing::debug;

/// Magnitude matrix of the whole recording plus its global maximum, used for
/// display normalization. Columns are analysis frames on the shared hop
/// grid; rows are the first half of the FFT bins.
#[derive(Clone, Debug, Default)]
pub struct SpectrogramData {
    width: usize,
    height: usize,
    magnitudes: Vec<Vec<f32>>,
    max_magnitude: f32,
}

impl SpectrogramData {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Magnitudes of frame `x`, `height` bins from DC upward.
    pub fn column(&self, x: usize) -> &[f32] {
        &self.magnitudes[x]
    }

    pub fn max_magnitude(&self) -> f32 {
        self.max_magnitude
    }
}

fn hann_window(len: usize) -> Vec<f32> {
    (0..len)
        .map(|n| {
            let phase = 2.0 * std::f32::consts::PI * n as f32 / len as f32;
            0.5 * (1.0 - phase.cos())
        })
        .collect()
}

/// Compute the full spectrogram. Frames fan out across the rayon pool; the
/// global maximum is reduced from the per-frame maxima.
pub fn compute(samples: &[f32], sample_rate: u32) -> Result<SpectrogramData, EditorError> {
    if sample_rate == 0 {
        return Err(EditorError::SpectrogramFailed("sample rate is zero".into()));
    }
    let height = FRAME_LENGTH / 2;
    let n_frames = if samples.len() < FRAME_LENGTH {
        0
    } else {
        (samples.len() - FRAME_LENGTH) / HOP_LENGTH
    };
    if n_frames == 0 {
        return Ok(SpectrogramData {
            width: 0,
            height,
            magnitudes: Vec::new(),
            max_magnitude: 0.0,
        });
    }

    let window = hann_window(FRAME_LENGTH);

    let columns: Vec<(Vec<f32>, f32)> = (0..n_frames)
        .into_par_iter()
        .map(|i| {
            let start = i * HOP_LENGTH;
            let frame = &samples[start..start + FRAME_LENGTH];

            let mut re: Vec<f32> = frame.iter().zip(&window).map(|(s, w)| s * w).collect();
            let mut im = vec![0.0f32; FRAME_LENGTH];
            fft::forward(&mut re, &mut im);

            let mut column = Vec::with_capacity(height);
            let mut frame_max = 0.0f32;
            for bin in 0..height {
                let mag = (re[bin] * re[bin] + im[bin] * im[bin]).sqrt();
                frame_max = frame_max.max(mag);
                column.push(mag);
            }
            (column, frame_max)
        })
        .collect();

    let max_magnitude = columns.iter().map(|(_, m)| *m).fold(0.0f32, f32::max);
    let magnitudes = columns.into_iter().map(|(c, _)| c).collect();

    debug!(n_frames, height, max_magnitude, "spectrogram computed");
    Ok(SpectrogramData {
        width: n_frames,
        height,
        magnitudes,
        max_magnitude,
    })
}
