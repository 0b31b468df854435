//! Pitch-preserving time stretching of the original recording.
//!
//! Offline granular overlap-add: Hann-windowed grains are read from the
//! input at `rate` times the speed they are written to the output, so tempo
//! changes while the waveform inside each grain, and with it the perceived
//! pitch, stays put. Window-sum normalization flattens the grain envelope.

const GRAIN: usize = 2048;
const SYNTH_HOP: usize = 512;

/// Stretch `samples` so playback at the original sample rate advances through
/// the source material at `rate` (0.5 = half speed, twice as long). Rates at
/// or below zero and unity are passed through.
pub fn stretch(samples: &[f32], rate: f64) -> Vec<f32> {
    if samples.is_empty() || rate <= 0.0 || (rate - 1.0).abs() < 1e-9 {
        return samples.to_vec();
    }

    let out_len = (samples.len() as f64 / rate).round() as usize;
    let mut out = vec![0.0f32; out_len + GRAIN];
    let mut window_sum = vec![0.0f32; out_len + GRAIN];

    let window: Vec<f32> = (0..GRAIN)
        .map(|n| {
            let phase = 2.0 * std::f32::consts::PI * n as f32 / GRAIN as f32;
            0.5 * (1.0 - phase.cos())
        })
        .collect();

    let n_grains = (out_len + SYNTH_HOP - 1) / SYNTH_HOP;
    for k in 0..n_grains {
        let out_pos = k * SYNTH_HOP;
        let in_pos = ((out_pos as f64) * rate).round() as usize;
        if in_pos >= samples.len() {
            break;
        }
        let grain_len = GRAIN.min(samples.len() - in_pos);
        for j in 0..grain_len {
            let w = window[j];
            out[out_pos + j] += samples[in_pos + j] * w;
            window_sum[out_pos + j] += w;
        }
    }

    out.truncate(out_len);
    for (s, w) in out.iter_mut().zip(&window_sum) {
        if *w > 1e-6 {
            *s /= w;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|n| (2.0 * std::f32::consts::PI * freq * n as f32 / sample_rate as f32).sin())
            .collect()
    }

    /// Zero-crossing based frequency estimate, good enough for a steady sine.
    fn estimate_freq(signal: &[f32], sample_rate: u32) -> f32 {
        let mut crossings = 0;
        for pair in signal.windows(2) {
            if pair[0] <= 0.0 && pair[1] > 0.0 {
                crossings += 1;
            }
        }
        crossings as f32 * sample_rate as f32 / signal.len() as f32
    }

    #[test]
    fn unity_rate_is_identity() {
        let input = sine(220.0, 44100, 8192);
        assert_eq!(stretch(&input, 1.0), input);
    }

    // A period of exactly 128 samples divides every grain hop, so the
    // overlapped grains stay phase-coherent and the tone survives cleanly.
    const TONE: f32 = 44100.0 / 128.0;

    #[test]
    fn half_rate_doubles_length_and_keeps_pitch() {
        let sr = 44100;
        let input = sine(TONE, sr, sr as usize / 2);
        let out = stretch(&input, 0.5);

        let expected = input.len() * 2;
        assert!(
            out.len().abs_diff(expected) <= GRAIN,
            "expected about {expected} samples, got {}",
            out.len()
        );

        // Skip the edges where grain coverage thins out
        let mid = &out[GRAIN..out.len() - GRAIN];
        let freq = estimate_freq(mid, sr);
        assert!(
            (freq - TONE).abs() < 10.0,
            "stretched pitch drifted to {freq} Hz"
        );
    }

    #[test]
    fn double_rate_halves_length_and_keeps_pitch() {
        let sr = 44100;
        let input = sine(TONE, sr, sr as usize);
        let out = stretch(&input, 2.0);

        assert!(out.len().abs_diff(input.len() / 2) <= GRAIN);
        let mid = &out[GRAIN..out.len() - GRAIN];
        let freq = estimate_freq(mid, sr);
        assert!(
            (freq - TONE).abs() < 10.0,
            "stretched pitch drifted to {freq} Hz"
        );
    }

    #[test]
    fn empty_input_stays_empty() {
        assert!(stretch(&[], 0.5).is_empty());
    }
}
