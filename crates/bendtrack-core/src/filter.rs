//! Separable Gaussian pre-blur applied to templates and search crops.

use crate::{Patch, PlaneView};

/// Relative kernel value at which the Gaussian tail is cut off.
const KERNEL_ACCURACY: f64 = 0.02;

/// Normalised 1D Gaussian kernel, truncated where it drops below
/// `KERNEL_ACCURACY` of its peak.
pub fn gaussian_kernel(sigma: f64) -> Vec<f32> {
    if sigma <= 0.0 {
        return vec![1.0];
    }
    let radius = (sigma * (-2.0 * KERNEL_ACCURACY.ln()).sqrt()).ceil().max(1.0) as i64;
    let mut kernel: Vec<f64> = (-radius..=radius)
        .map(|i| (-(i * i) as f64 / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f64 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= sum);
    kernel.into_iter().map(|k| k as f32).collect()
}

/// Blur every plane with an edge-clamped separable Gaussian.
///
/// `sigma <= 0` returns an unchanged copy.
pub fn gaussian_blur(patch: &Patch, sigma: f64) -> Patch {
    if sigma <= 0.0 {
        return patch.clone();
    }
    let kernel = gaussian_kernel(sigma);
    patch.map_planes(|plane| blur_plane(plane, &kernel))
}

fn blur_plane(src: PlaneView<'_>, kernel: &[f32]) -> Vec<f32> {
    let (w, h) = (src.width, src.height);
    let r = (kernel.len() / 2) as i64;

    let mut horizontal = vec![0.0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            horizontal[y * w + x] = kernel
                .iter()
                .enumerate()
                .map(|(k, &wk)| wk * src.clamped(x as i64 + k as i64 - r, y as i64))
                .sum();
        }
    }

    let tmp = PlaneView {
        width: w,
        height: h,
        data: &horizontal,
    };
    let mut out = vec![0.0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            out[y * w + x] = kernel
                .iter()
                .enumerate()
                .map(|(k, &wk)| wk * tmp.clamped(x as i64, y as i64 + k as i64 - r))
                .sum();
        }
    }
    out
}
