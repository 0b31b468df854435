//! Frame-level YIN building blocks: difference function, cumulative-mean
//! normalized difference, and sub-sample minimum refinement.

/// Simple RMS energy of a frame, used for voicing / silence detection.
pub fn frame_rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = frame.iter().map(|x| x * x).sum();
    (sum_sq / frame.len() as f32).sqrt()
}

/// Difference function over half the frame:
/// `d[tau] = sum_{j < N/2} (x[j] - x[j+tau])^2` for `tau` in `[0, N/2)`.
pub fn difference_function(frame: &[f32]) -> Vec<f32> {
    let half = frame.len() / 2;
    let mut d = vec![0.0; half];

    for tau in 1..half {
        let mut acc = 0.0;
        for j in 0..half {
            let diff = frame[j] - frame[j + tau];
            acc += diff * diff;
        }
        d[tau] = acc;
    }
    d
}

/// Cumulative-mean-normalized difference:
/// `d'[tau] = d[tau] * tau / sum_{k=1..tau} d[k]`, with `d'[0] = 1`.
pub fn cumulative_mean_normalized_difference(d: &[f32]) -> Vec<f32> {
    let mut cmnd = vec![1.0; d.len()];
    let mut running_sum = 0.0;

    for tau in 1..d.len() {
        running_sum += d[tau];
        cmnd[tau] = if running_sum > 0.0 {
            d[tau] * tau as f32 / running_sum
        } else {
            1.0
        };
    }
    cmnd
}

/// Refine a sample minimum at `tau` with the parabola through
/// `(tau-1, tau, tau+1)`. Returned unchanged at the boundaries or when the
/// parabola degenerates.
pub fn parabolic_interp(cmnd: &[f32], tau: usize) -> f32 {
    if tau == 0 || tau + 1 >= cmnd.len() {
        return tau as f32;
    }
    let x0 = cmnd[tau - 1];
    let x1 = cmnd[tau];
    let x2 = cmnd[tau + 1];
    let denom = 2.0 * (2.0 * x1 - x2 - x0);
    if denom.abs() < 1e-9 {
        tau as f32
    } else {
        tau as f32 + (x2 - x0) / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difference_function_matches_hand_computation() {
        let frame = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let d = difference_function(&frame);

        assert_eq!(d.len(), 4);
        assert_eq!(d[0], 0.0);
        // d[1] = 4 * (-1)^2, d[2] = 4 * (-2)^2, d[3] = 4 * (-3)^2
        assert!((d[1] - 4.0).abs() < 1e-6);
        assert!((d[2] - 16.0).abs() < 1e-6);
        assert!((d[3] - 36.0).abs() < 1e-6);
    }

    #[test]
    fn cmnd_starts_at_one_and_stays_finite() {
        let d = vec![0.0, 1.0, 2.0, 3.0, 4.0];
        let cmnd = cumulative_mean_normalized_difference(&d);

        assert_eq!(cmnd[0], 1.0);
        for (tau, v) in cmnd.iter().enumerate() {
            assert!(v.is_finite() && *v >= 0.0, "cmnd[{tau}] = {v}");
        }
    }

    #[test]
    fn cmnd_of_periodic_signal_dips_at_the_period() {
        let period = 32;
        let frame: Vec<f32> = (0..512)
            .map(|i| (2.0 * std::f32::consts::PI * i as f32 / period as f32).sin())
            .collect();
        let d = difference_function(&frame);
        let cmnd = cumulative_mean_normalized_difference(&d);

        let dip = cmnd[period];
        for tau in period / 2..period - 2 {
            assert!(
                dip < cmnd[tau],
                "expected dip at tau={period} (got {dip}) below cmnd[{tau}]={}",
                cmnd[tau]
            );
        }
    }

    #[test]
    fn parabolic_interp_finds_offset_vertex() {
        // Parabola with vertex at 10.25
        let vertex = 10.25f32;
        let cmnd: Vec<f32> = (0..20).map(|t| (t as f32 - vertex).powi(2)).collect();
        let refined = parabolic_interp(&cmnd, 10);
        assert!(
            (refined - vertex).abs() < 1e-3,
            "expected {vertex}, got {refined}"
        );
    }

    #[test]
    fn parabolic_interp_passes_through_on_boundary_and_flat() {
        let flat = vec![0.5; 8];
        assert_eq!(parabolic_interp(&flat, 0), 0.0);
        assert_eq!(parabolic_interp(&flat, 7), 7.0);
        assert_eq!(parabolic_interp(&flat, 3), 3.0);
    }

    #[test]
    fn frame_rms_of_unit_square_wave_is_one() {
        let frame: Vec<f32> = (0..64).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        assert!((frame_rms(&frame) - 1.0).abs() < 1e-6);
        assert_eq!(frame_rms(&[]), 0.0);
    }
}
