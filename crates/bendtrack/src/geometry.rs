//! Three-point circular-arc fit of the tracked segment.
//!
//! Angles follow the mathematical orientation with the image y axis
//! pointing down: a chord pointing right has angle 0, one pointing up has
//! angle `+pi/2`. The bend is signed by the side of the chord the midpoint
//! falls on.

use std::f64::consts::PI;

use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Which side of `[-1, 1]` the half-bend cosine had to be clamped from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CosineClamp {
    /// `c >= 1`: the three points are collinear in order.
    Straight,
    /// `c <= -1`: the midpoint lies beyond an end, a complete fold-back.
    FoldBack,
}

/// Bending geometry derived from the free, attached and mid points.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BendingState {
    pub full_angle: f64,
    pub bending_angle: f64,
    /// Signed curvature in px^-1.
    pub curvature: f64,
    pub deflection_angle: f64,
    pub chord_length: f64,
    pub arc_length: f64,
    pub initial_length: f64,
    /// `(arc_length - initial_length) / initial_length`.
    pub deformation: f64,
    /// Set when the law-of-cosines argument left `[-1, 1]`.
    #[serde(default)]
    pub clamp: Option<CosineClamp>,
}

/// Orientation of a chord vector.
pub fn chord_angle(h: Vector2<f64>) -> f64 {
    let norm = h.norm();
    if norm == 0.0 {
        return 0.0;
    }
    let angle = (h.x / norm).clamp(-1.0, 1.0).acos();
    if h.y > 0.0 {
        -angle
    } else {
        angle
    }
}

/// Bending angle from the half-bend cosine `c` and the side sign.
///
/// Out-of-domain cosines are clamped instead of failing.
pub fn bending_angle_from_cosine(c: f64, sign: f64) -> (f64, Option<CosineClamp>) {
    if c.is_nan() || c >= 1.0 {
        (0.0, Some(CosineClamp::Straight))
    } else if c <= -1.0 {
        (2.0 * PI, Some(CosineClamp::FoldBack))
    } else {
        (2.0 * sign * c.acos(), None)
    }
}

/// Solve the arc through `free`, `attached` and `mid`.
///
/// `initial_length` defaults to the solved arc length, which makes the
/// first solve of a calibration report zero deformation.
pub fn solve_bending(
    free: Point2<f64>,
    attached: Point2<f64>,
    mid: Point2<f64>,
    initial_length: Option<f64>,
) -> BendingState {
    let h = free - attached;
    let chord_length = h.norm();
    let full_angle = chord_angle(h);

    let h1 = (mid - attached).norm();
    let h2 = (mid - free).norm();
    let c = (chord_length * chord_length - h1 * h1 - h2 * h2) / (2.0 * h1 * h2);

    let h_mid = mid - nalgebra::center(&attached, &free);
    let cross = h.x * h_mid.y - h.y * h_mid.x;
    let sign = if cross > 0.0 {
        1.0
    } else if cross < 0.0 {
        -1.0
    } else {
        0.0
    };
    let (bending_angle, clamp) = bending_angle_from_cosine(c, sign);
    if let Some(clamp) = clamp {
        log::debug!("half-bend cosine {c:.9} clamped ({clamp:?})");
    }

    // sin(pi) is exactly zero for a complete fold-back
    let half_sin = match clamp {
        Some(CosineClamp::FoldBack) => 0.0,
        _ => (bending_angle / 2.0).sin(),
    };
    let curvature = if chord_length > 0.0 {
        2.0 * half_sin / chord_length
    } else {
        0.0
    };
    let deflection_angle = full_angle - bending_angle / 2.0;
    let arc_length = if curvature != 0.0 {
        (bending_angle / curvature).abs()
    } else {
        chord_length
    };

    let initial_length = initial_length.unwrap_or(arc_length);
    let deformation = if initial_length > 0.0 {
        (arc_length - initial_length) / initial_length
    } else {
        0.0
    };

    BendingState {
        full_angle,
        bending_angle,
        curvature,
        deflection_angle,
        chord_length,
        arc_length,
        initial_length,
        deformation,
        clamp,
    }
}

/// Height of the arc above the chord midpoint, signed like the curvature.
pub fn sagitta(curvature: f64, arc_length: f64) -> f64 {
    if curvature == 0.0 {
        0.0
    } else {
        (1.0 - (curvature * arc_length / 2.0).cos()) / curvature
    }
}

/// Unit normal of the chord `h`, pointing to the side a positive bend
/// puts the midpoint on.
pub fn chord_normal(h: Vector2<f64>) -> Vector2<f64> {
    let norm = h.norm();
    if norm == 0.0 {
        Vector2::zeros()
    } else {
        Vector2::new(-h.y, h.x) / norm
    }
}

/// Where the midpoint should sit for the chord `attached -> free` given a
/// previous curvature and arc length.
pub fn predicted_midpoint(
    free: Point2<f64>,
    attached: Point2<f64>,
    curvature: f64,
    arc_length: f64,
) -> Point2<f64> {
    let normal = chord_normal(free - attached);
    nalgebra::center(&attached, &free) + normal * sagitta(curvature, arc_length)
}

impl BendingState {
    /// Half-bend orientation used as the free-end template reference.
    #[inline]
    pub fn bisector_angle(&self) -> f64 {
        self.full_angle + self.bending_angle / 2.0
    }

    /// Recompute against a different initial length.
    pub fn with_initial_length(mut self, initial_length: f64) -> Self {
        self.initial_length = initial_length;
        self.deformation = if initial_length > 0.0 {
            (self.arc_length - initial_length) / initial_length
        } else {
            0.0
        };
        self
    }

    /// Sample the fitted arc from `attached` to `free`.
    ///
    /// `samples` includes both ends; the straight chord is returned when the
    /// curvature vanishes.
    pub fn centerline(
        &self,
        attached: Point2<f64>,
        free: Point2<f64>,
        samples: usize,
    ) -> Vec<Point2<f64>> {
        let samples = samples.max(2);
        let step = 1.0 / (samples - 1) as f64;
        if self.curvature == 0.0 || self.clamp.is_some() {
            return (0..samples)
                .map(|i| attached + (free - attached) * (i as f64 * step))
                .collect();
        }
        let radius = 1.0 / self.curvature;
        let normal = chord_normal(free - attached);
        let center = nalgebra::center(&attached, &free)
            - normal * (radius * (self.bending_angle / 2.0).cos());
        let start = attached - center;
        let end = free - center;
        let a0 = start.y.atan2(start.x);
        let a1 = end.y.atan2(end.x);
        // sweep through the midpoint side: a positive bend turns the radius
        // from the attached end towards the free end the short way round
        let mut sweep = a1 - a0;
        let target = if self.bending_angle >= 0.0 {
            -self.bending_angle.abs()
        } else {
            self.bending_angle.abs()
        };
        while sweep - target > PI {
            sweep -= 2.0 * PI;
        }
        while sweep - target < -PI {
            sweep += 2.0 * PI;
        }
        let r = start.norm();
        (0..samples)
            .map(|i| {
                let a = a0 + sweep * (i as f64 * step);
                center + Vector2::new(a.cos(), a.sin()) * r
            })
            .collect()
    }
}
