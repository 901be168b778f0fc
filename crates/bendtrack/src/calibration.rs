//! Selection of the reference points and the template rectangles.

use bendtrack_core::{Frame, PixelRect};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::{PointKind, TrackError};

/// Fraction of a template square that stays after the rotation inset.
const INSET_KEEP: f64 = 0.7;

/// Smallest template half-size worth matching with.
const MIN_HALF_SIZE: usize = 2;

/// Points and rectangles picked on a reference frame.
///
/// `free_rect` and `mid_rect` are the full template squares; the tracker
/// matches with their central inset.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSelection {
    pub free: Point2<f64>,
    pub attached: Point2<f64>,
    pub mid: Point2<f64>,
    pub holder_rect: PixelRect,
    pub free_rect: PixelRect,
    pub mid_rect: PixelRect,
}

/// Source of reference selections: invoked once at start and again on every
/// reselection, with the frame that becomes the new reference.
pub trait Calibration: Send {
    fn select_reference_points(&mut self, reference: &Frame)
        -> Result<ReferenceSelection, TrackError>;
}

/// Template square around `point`, shrunk near the image edge.
///
/// The nominal half-size is `template_size / 2`. If the square grown by the
/// search radius would leave the image, the half-size drops to
/// `min((d - radius) / 0.7, d)` where `d` is the distance to the nearest
/// edge. Points within `radius + 1` px of an edge are rejected.
pub fn template_square(
    kind: PointKind,
    point: Point2<f64>,
    template_size: usize,
    radius: usize,
    width: usize,
    height: usize,
) -> Result<PixelRect, TrackError> {
    let edge_distance = point
        .x
        .min(width as f64 - point.x)
        .min(point.y)
        .min(height as f64 - point.y);
    let too_close = || TrackError::PointTooCloseToEdge {
        point: kind,
        x: point.x,
        y: point.y,
        margin: radius + 1,
    };
    if edge_distance <= (radius + 1) as f64 {
        return Err(too_close());
    }

    let mut half = template_size / 2;
    let needed = (half as f64).max(INSET_KEEP * half as f64 + radius as f64);
    if needed > edge_distance {
        half = ((edge_distance - radius as f64) / INSET_KEEP).min(edge_distance) as usize;
        log::debug!("{kind} template shrunk to {}px near the image edge", 2 * half);
    }
    if half < MIN_HALF_SIZE {
        return Err(too_close());
    }

    Ok(PixelRect::new(
        (point.x - half as f64).floor() as i32,
        (point.y - half as f64).floor() as i32,
        2 * half,
        2 * half,
    ))
}

/// Point selection as written in a configuration file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointSelection {
    pub free: Point2<f64>,
    pub attached: Point2<f64>,
    /// Required unless `initially_straight` is set.
    #[serde(default)]
    pub mid: Option<Point2<f64>>,
    /// The needle is straight on the reference frame: the midpoint is the
    /// chord midpoint.
    #[serde(default)]
    pub initially_straight: bool,
    /// With `initially_straight`, move the attached point along the chord so
    /// the chord has this length.
    #[serde(default)]
    pub standard_length: Option<f64>,
    pub holder_rect: PixelRect,
}

impl PointSelection {
    /// Resolve into a full selection for a `width x height` frame.
    pub fn resolve(
        &self,
        width: usize,
        height: usize,
        template_size: usize,
        radius: usize,
    ) -> Result<ReferenceSelection, TrackError> {
        let free = self.free;
        let mut attached = self.attached;
        let mid = if self.initially_straight {
            if let Some(length) = self.standard_length {
                let chord = attached - free;
                let current = chord.norm();
                if current == 0.0 || length <= 0.0 {
                    return Err(TrackError::Calibration(
                        "standard length needs distinct end points and a positive length".into(),
                    ));
                }
                attached = free + chord * (length / current);
                log::info!(
                    "attached end moved to ({:.1}, {:.1}) for a {length:.1}px chord",
                    attached.x,
                    attached.y
                );
            }
            nalgebra::center(&free, &attached)
        } else {
            self.mid.ok_or_else(|| {
                TrackError::Calibration("a midpoint is required for a bent reference".into())
            })?
        };

        if !self.holder_rect.fits_within(width, height) {
            return Err(TrackError::Calibration(format!(
                "holder rectangle {:?} leaves the {width}x{height} frame",
                self.holder_rect
            )));
        }

        Ok(ReferenceSelection {
            free,
            attached,
            mid,
            holder_rect: self.holder_rect,
            free_rect: template_square(PointKind::Free, free, template_size, radius, width, height)?,
            mid_rect: template_square(PointKind::Mid, mid, template_size, radius, width, height)?,
        })
    }
}

/// Non-interactive calibration replaying a fixed selection.
///
/// On reselection the same points are taken on the new reference frame.
#[derive(Clone, Debug)]
pub struct StaticCalibration {
    selection: PointSelection,
    template_size: usize,
    radius: usize,
}

impl StaticCalibration {
    pub fn new(selection: PointSelection, template_size: usize, radius: usize) -> Self {
        Self {
            selection,
            template_size,
            radius,
        }
    }
}

impl Calibration for StaticCalibration {
    fn select_reference_points(
        &mut self,
        reference: &Frame,
    ) -> Result<ReferenceSelection, TrackError> {
        self.selection.resolve(
            reference.width(),
            reference.height(),
            self.template_size,
            self.radius,
        )
    }
}
