//! Reference templates cut from the calibration frame.

use bendtrack_core::{gaussian_blur, rotate_bicubic, rotate_offset, BitDepth, Frame, Patch, PixelRect};
use bendtrack_match::TemplateMatcher;
use nalgebra::{Point2, Vector2};

use crate::{solve_bending, BendingState, PointKind, ReferenceSelection, TrackError, TrackerParams};

/// Rotatable template of the free end or the midpoint.
#[derive(Clone, Debug)]
pub struct PointTemplate {
    pub kind: PointKind,
    /// Tracked point on the reference frame.
    pub position: Point2<f64>,
    /// Full template square in image coordinates.
    pub square: PixelRect,
    /// Inset of `square` that is actually matched, in image coordinates.
    pub match_rect: PixelRect,
    inset: PixelRect,
    /// Offset of `position` from the centre of `square`.
    pivot: Vector2<f64>,
    patch: Patch,
}

impl PointTemplate {
    fn build(
        kind: PointKind,
        frame: &Patch,
        position: Point2<f64>,
        square: PixelRect,
        params: &TrackerParams,
    ) -> Result<Self, TrackError> {
        let patch = gaussian_blur(&frame.crop(&square)?, params.blur_sigma);
        let match_rect = square.inset(params.template_inset);
        Ok(Self {
            kind,
            position,
            square,
            match_rect,
            inset: match_rect.translated(-square.x, -square.y),
            pivot: position - square.center(),
            patch,
        })
    }

    /// Template rotated by `angle` (clockwise on screen) and cut to the
    /// match inset.
    pub fn matching_template(&self, angle: f64) -> Result<Patch, TrackError> {
        let rotated = rotate_bicubic(&self.patch, angle);
        Ok(rotated.crop(&self.inset)?)
    }

    /// Displacement of the tracked point when the template rotated by
    /// `angle` matched with its top-left corner at `top_left`.
    pub fn displacement(&self, top_left: Point2<f64>, angle: f64) -> Vector2<f64> {
        top_left - Point2::from(self.match_rect.origin()) + self.pivot_shift(angle)
    }

    /// Where the rotated template's top-left corner lands when the tracked
    /// point sits at `point`.
    pub fn top_left_for(&self, point: Point2<f64>, angle: f64) -> Point2<f64> {
        point - (self.position - Point2::from(self.match_rect.origin())) - self.pivot_shift(angle)
    }

    #[inline]
    fn pivot_shift(&self, angle: f64) -> Vector2<f64> {
        rotate_offset(self.pivot, angle) - self.pivot
    }
}

/// Holder template: the holder rectangle, matched without rotation.
#[derive(Clone, Debug)]
pub struct HolderTemplate {
    pub rect: PixelRect,
    pub patch: Patch,
    /// Self-match score of `patch`.
    pub ideal: f64,
}

/// Everything fixed by one calibration.
#[derive(Clone, Debug)]
pub struct ReferenceSet {
    pub selection: ReferenceSelection,
    pub holder: HolderTemplate,
    pub free: PointTemplate,
    pub mid: PointTemplate,
    /// Geometry on the reference frame.
    pub initial: BendingState,
    /// `full_angle + bending_angle / 2` on the reference frame.
    pub initial_angle: f64,
    width: usize,
    height: usize,
    bit_depth: BitDepth,
}

impl ReferenceSet {
    /// Cut templates from `frame`. `initial_length` defaults to the
    /// reference arc length.
    pub fn build(
        frame: &Frame,
        selection: &ReferenceSelection,
        params: &TrackerParams,
        matcher: &TemplateMatcher,
        initial_length: Option<f64>,
    ) -> Result<Self, TrackError> {
        let patch = frame.to_patch(params.match_intensity);

        let holder_patch = gaussian_blur(&patch.crop(&selection.holder_rect)?, params.blur_sigma);
        let holder = HolderTemplate {
            rect: selection.holder_rect,
            ideal: matcher.ideal_score(&holder_patch)?,
            patch: holder_patch,
        };
        let free = PointTemplate::build(
            PointKind::Free,
            &patch,
            selection.free,
            selection.free_rect,
            params,
        )?;
        let mid = PointTemplate::build(PointKind::Mid, &patch, selection.mid, selection.mid_rect, params)?;

        let initial = solve_bending(selection.free, selection.attached, selection.mid, initial_length);
        log::info!(
            "reference: chord {:.2}px, arc {:.2}px, bend {:.4}rad, initial length {:.2}px",
            initial.chord_length,
            initial.arc_length,
            initial.bending_angle,
            initial.initial_length
        );

        Ok(Self {
            selection: *selection,
            holder,
            free,
            mid,
            initial_angle: initial.bisector_angle(),
            initial,
            width: frame.width(),
            height: frame.height(),
            bit_depth: frame.bit_depth(),
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Frames must match the reference size and bit depth.
    pub fn check_layout(&self, index: usize, frame: &Frame) -> Result<(), TrackError> {
        if frame.width() == self.width
            && frame.height() == self.height
            && frame.bit_depth() == self.bit_depth
        {
            return Ok(());
        }
        Err(TrackError::FrameMismatch {
            index,
            width: frame.width(),
            height: frame.height(),
            depth: frame.bit_depth(),
            ref_width: self.width,
            ref_height: self.height,
            ref_depth: self.bit_depth,
        })
    }

    /// Template tracking `kind`; the holder has none of this type.
    pub fn point(&self, kind: PointKind) -> Option<&PointTemplate> {
        match kind {
            PointKind::Free => Some(&self.free),
            PointKind::Mid => Some(&self.mid),
            PointKind::Holder => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use bendtrack_core::PixelData;
    use std::f64::consts::FRAC_PI_2;

    fn frame() -> Frame {
        let (w, h) = (120, 90);
        let data = (0..w * h)
            .map(|i| {
                let (x, y) = ((i % w) as f64, (i / w) as f64);
                (128.0 + 60.0 * (x * 0.21).sin() * (y * 0.17).cos()) as u8
            })
            .collect();
        Frame::new(w, h, PixelData::Gray8(data)).unwrap()
    }

    fn selection() -> ReferenceSelection {
        ReferenceSelection {
            free: Point2::new(90.0, 45.0),
            attached: Point2::new(20.0, 45.0),
            mid: Point2::new(55.0, 40.0),
            holder_rect: PixelRect::new(5, 30, 20, 30),
            free_rect: PixelRect::new(70, 25, 40, 40),
            mid_rect: PixelRect::new(35, 20, 40, 40),
        }
    }

    fn reference() -> ReferenceSet {
        let params = TrackerParams::default();
        let matcher = TemplateMatcher::new(params.matcher_params());
        ReferenceSet::build(&frame(), &selection(), &params, &matcher, None).unwrap()
    }

    #[test]
    fn templates_use_the_inset() {
        let refs = reference();
        assert_eq!(refs.free.match_rect, PixelRect::new(76, 31, 28, 28));
        let tpl = refs.free.matching_template(0.3).unwrap();
        assert_eq!((tpl.width(), tpl.height()), (28, 28));
        assert_eq!(refs.holder.patch.width(), 20);
        assert!(refs.holder.ideal > 0.0);
        assert_abs_diff_eq!(refs.initial.deformation, 0.0);
    }

    #[test]
    fn unrotated_match_at_reference_is_zero_displacement() {
        let refs = reference();
        let tl = Point2::new(76.0, 31.0);
        assert_abs_diff_eq!(refs.free.displacement(tl, 0.0), Vector2::zeros());
        assert_abs_diff_eq!(refs.free.top_left_for(refs.free.position, 0.0), tl);
    }

    #[test]
    fn pivot_follows_rotation() {
        let refs = reference();
        // the point sits (0.5, 0.5) off the square centre (89.5, 44.5)
        let tl = Point2::new(76.0, 31.0);
        let d = refs.free.displacement(tl, FRAC_PI_2);
        assert_abs_diff_eq!(d, Vector2::new(-1.0, 0.0), epsilon = 1e-12);
        let back = refs.free.top_left_for(refs.free.position + d, FRAC_PI_2);
        assert_abs_diff_eq!(back, tl, epsilon = 1e-12);
    }

    #[test]
    fn layout_check_reports_mismatch() {
        let refs = reference();
        let other = Frame::new(10, 10, PixelData::Gray8(vec![0; 100])).unwrap();
        assert!(refs.check_layout(3, &frame()).is_ok());
        assert!(matches!(
            refs.check_layout(3, &other),
            Err(TrackError::FrameMismatch { index: 3, width: 10, .. })
        ));
    }
}
