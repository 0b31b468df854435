//! In-place radix-2 complex FFT over parallel real/imaginary slices.
//!
//! Forward sign convention `W = exp(-j*2*pi/N)`. The caller windows; no
//! scaling is applied in either direction.

/// Transform `re`/`im` in place. Length must be a power of two and the two
/// slices must have equal length.
pub fn forward(re: &mut [f32], im: &mut [f32]) {
    let n = re.len();
    debug_assert_eq!(n, im.len());
    debug_assert!(n.is_power_of_two());
    if n < 2 {
        return;
    }

    bit_reverse_permute(re, im);

    let mut len = 2;
    while len <= n {
        let half = len / 2;
        let step = -2.0 * std::f32::consts::PI / len as f32;
        for start in (0..n).step_by(len) {
            for k in 0..half {
                let angle = step * k as f32;
                let (w_im, w_re) = angle.sin_cos();
                let i = start + k;
                let j = i + half;

                let t_re = re[j] * w_re - im[j] * w_im;
                let t_im = re[j] * w_im + im[j] * w_re;
                re[j] = re[i] - t_re;
                im[j] = im[i] - t_im;
                re[i] += t_re;
                im[i] += t_im;
            }
        }
        len <<= 1;
    }
}

fn bit_reverse_permute(re: &mut [f32], im: &mut [f32]) {
    let n = re.len();
    let bits = n.trailing_zeros();
    for i in 0..n {
        let j = i.reverse_bits() >> (usize::BITS - bits);
        if j > i {
            re.swap(i, j);
            im.swap(i, j);
        }
    }
}
