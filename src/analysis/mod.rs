pub mod fft;
pub mod pyin;
pub mod spectrogram;
pub mod track;
pub mod worker;
pub mod yin;

// Shared frame geometry for every analysis pass
pub const FRAME_LENGTH: usize = 2048;
pub const HOP_LENGTH: usize = 512;

// Pitch search range and default decision thresholds
pub const MIN_F0: f32 = 60.0;
pub const MAX_F0: f32 = 1200.0;
pub const PYIN_THRESHOLD: f32 = 0.75;
pub const RMS_THRESHOLD: f32 = 0.01;

// Viterbi path costs and despeckling
pub const TRANSITION_COST_WEIGHT: f32 = 1.0;
pub const VOICING_TRANSITION_COST: f32 = 1.5;
pub const MIN_VOICED_RUN: usize = 8;

// Deep search: candidate cap and the region padding for re-analysis.
// The pad is a whole number of hops so re-analyzed frames stay on the grid.
pub const DEEP_CANDIDATE_CAP: usize = 20;
pub const REANALYSIS_PAD: usize = 4096;

/// Duration of one analysis hop in seconds.
pub fn frame_duration(sample_rate: u32) -> f64 {
    HOP_LENGTH as f64 / sample_rate as f64
}

/// Snap a time to the analysis frame grid.
///
/// Every externally supplied time (selection bounds, note boundaries, split
/// points, seek targets on commit) passes through here, so candidate arrays
/// from different analysis passes align exactly.
pub fn snap_time(t: f64, sample_rate: u32) -> f64 {
    let hops = (t * sample_rate as f64 / HOP_LENGTH as f64).round();
    hops * HOP_LENGTH as f64 / sample_rate as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snap_time_lands_on_hop_multiples() {
        let sr = 44100;
        let snapped = snap_time(0.5, sr);
        let hops = snapped * sr as f64 / HOP_LENGTH as f64;
        assert!(
            (hops - hops.round()).abs() < 1e-9,
            "snapped time {snapped} is not on the hop grid"
        );
    }

    #[test]
    fn snap_time_is_idempotent() {
        let sr = 44100;
        for &t in &[0.0, 0.013, 0.5, 1.234567, 10.0] {
            let once = snap_time(t, sr);
            let twice = snap_time(once, sr);
            assert!(
                (once - twice).abs() < 1e-12,
                "snap_time not idempotent at t={t}: {once} vs {twice}"
            );
        }
    }

    #[test]
    fn reanalysis_pad_is_whole_hops() {
        assert_eq!(REANALYSIS_PAD % HOP_LENGTH, 0);
    }
}
