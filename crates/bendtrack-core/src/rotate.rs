//! Bicubic rotation of templates about their pixel centre.
//!
//! Angles are in radians and positive angles turn the content clockwise as
//! seen on screen (y axis pointing down), which is the convention used for
//! every template rotation in the tracker.

use nalgebra::Vector2;

use crate::{Patch, PlaneView};

/// Cubic convolution coefficient.
const CUBIC_A: f64 = 0.5;

/// Below this magnitude a rotation is treated as the identity.
const MIN_ANGLE: f64 = 1e-12;

#[inline]
fn cubic(t: f64) -> f64 {
    let t = t.abs();
    if t <= 1.0 {
        t * t * (t * (-CUBIC_A + 2.0) + (CUBIC_A - 3.0)) + 1.0
    } else if t < 2.0 {
        -CUBIC_A * t * t * t + 5.0 * CUBIC_A * t * t - 8.0 * CUBIC_A * t + 4.0 * CUBIC_A
    } else {
        0.0
    }
}

fn sample_bicubic(src: &PlaneView<'_>, x: f64, y: f64) -> f32 {
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let mut acc = 0.0;
    for j in -1..=2 {
        let wy = cubic(y - (y0 + j) as f64);
        if wy == 0.0 {
            continue;
        }
        let mut row = 0.0;
        for i in -1..=2 {
            row += cubic(x - (x0 + i) as f64) * src.clamped(x0 + i, y0 + j) as f64;
        }
        acc += wy * row;
    }
    acc as f32
}

/// Where an offset from the rotation centre ends up after `rotate_bicubic`.
#[inline]
pub fn rotate_offset(offset: Vector2<f64>, angle: f64) -> Vector2<f64> {
    let (s, c) = angle.sin_cos();
    Vector2::new(c * offset.x - s * offset.y, s * offset.x + c * offset.y)
}

/// Rotate every plane about `((w - 1) / 2, (h - 1) / 2)`.
///
/// Samples that fall outside the source are taken from the nearest edge.
pub fn rotate_bicubic(patch: &Patch, angle: f64) -> Patch {
    if angle.abs() < MIN_ANGLE {
        return patch.clone();
    }
    let (w, h) = (patch.width(), patch.height());
    let cx = (w as f64 - 1.0) / 2.0;
    let cy = (h as f64 - 1.0) / 2.0;
    let (s, c) = angle.sin_cos();

    patch.map_planes(|plane| {
        let mut out = Vec::with_capacity(w * h);
        for y in 0..h {
            let dy = y as f64 - cy;
            for x in 0..w {
                let dx = x as f64 - cx;
                // inverse rotation back into the source
                let sx = cx + c * dx + s * dy;
                let sy = cy - s * dx + c * dy;
                out.push(sample_bicubic(&plane, sx, sy));
            }
        }
        out
    })
}
