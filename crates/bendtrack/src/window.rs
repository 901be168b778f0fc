//! Search windows: where in the frame a tracked point is looked for, and
//! how that region grows when a match is rejected.

use bendtrack_core::PixelRect;
use nalgebra::{Point2, Vector2};

/// Image sides a window had to be pushed back from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BoundaryHits {
    pub left: bool,
    pub right: bool,
    pub top: bool,
    pub bottom: bool,
}

impl BoundaryHits {
    #[inline]
    pub fn all(&self) -> bool {
        self.left && self.right && self.top && self.bottom
    }

    pub fn merge(&mut self, other: BoundaryHits) {
        self.left |= other.left;
        self.right |= other.right;
        self.top |= other.top;
        self.bottom |= other.bottom;
    }
}

/// A clamped crop region together with the radius that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SearchWindow {
    pub rect: PixelRect,
    /// Margin around the reference rectangle; `0` marks a whole-frame search.
    pub radius: usize,
    pub hits: BoundaryHits,
}

impl SearchWindow {
    #[inline]
    pub fn origin(&self) -> Vector2<f64> {
        self.rect.origin()
    }

    #[inline]
    pub fn is_full_frame(&self) -> bool {
        self.radius == 0
    }
}

/// Result of a (possibly escalated) search.
#[derive(Clone, Debug, PartialEq)]
pub struct Escalation<T> {
    /// Outcome of the last attempt.
    pub value: T,
    pub window: SearchWindow,
    pub accepted: bool,
    /// Number of times the radius was doubled.
    pub steps: usize,
    /// Every side of the image was hit; the window cannot grow any more.
    pub exhausted: bool,
}

/// Produces search windows for one tracked point.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchWindowController {
    reference: PixelRect,
    image_width: usize,
    image_height: usize,
    base_radius: usize,
}

impl SearchWindowController {
    /// `reference` is the point's match rectangle in the reference frame.
    pub fn new(
        reference: PixelRect,
        image_width: usize,
        image_height: usize,
        base_radius: usize,
    ) -> Self {
        Self {
            reference,
            image_width,
            image_height,
            base_radius,
        }
    }

    #[inline]
    pub fn reference(&self) -> &PixelRect {
        &self.reference
    }

    #[inline]
    pub fn base_radius(&self) -> usize {
        self.base_radius
    }

    /// Window around the reference rectangle moved by `displacement`.
    ///
    /// `radius == 0` gives the whole frame.
    pub fn window(&self, displacement: Vector2<f64>, radius: usize) -> SearchWindow {
        let top_left = Point2::new(
            self.reference.x + displacement.x.floor() as i32,
            self.reference.y + displacement.y.floor() as i32,
        );
        self.window_at(top_left, radius)
    }

    /// Window for a template whose top-left corner is expected at `top_left`.
    pub fn window_at(&self, top_left: Point2<i32>, radius: usize) -> SearchWindow {
        if radius == 0 {
            return SearchWindow {
                rect: PixelRect::new(0, 0, self.image_width, self.image_height),
                radius: 0,
                hits: BoundaryHits {
                    left: true,
                    right: true,
                    top: true,
                    bottom: true,
                },
            };
        }
        let r = radius as i32;
        let rect = PixelRect::new(
            top_left.x - r,
            top_left.y - r,
            self.reference.width + 2 * radius,
            self.reference.height + 2 * radius,
        );
        let (rect, hits) = self.clamp(rect);
        SearchWindow { rect, radius, hits }
    }

    /// Push `rect` inside the image, per axis, keeping its size when it fits.
    ///
    /// A rectangle larger than the image along an axis is cut to the image
    /// and counts as hitting both sides of that axis.
    pub fn clamp(&self, rect: PixelRect) -> (PixelRect, BoundaryHits) {
        let mut hits = BoundaryHits::default();
        let (x, width) = clamp_axis(
            rect.x,
            rect.width,
            self.image_width,
            &mut hits.left,
            &mut hits.right,
        );
        let (y, height) = clamp_axis(
            rect.y,
            rect.height,
            self.image_height,
            &mut hits.top,
            &mut hits.bottom,
        );
        (PixelRect::new(x, y, width, height), hits)
    }

    /// Run `attempt` on `first`, doubling the radius around `displacement`
    /// after each rejection until a match is accepted or every image side
    /// has been hit. A whole-frame `first` window is tried once.
    pub fn escalate<T, E, F>(
        &self,
        first: SearchWindow,
        displacement: Vector2<f64>,
        mut attempt: F,
    ) -> Result<Escalation<T>, E>
    where
        F: FnMut(&SearchWindow) -> Result<(T, bool), E>,
    {
        let mut window = first;
        let mut hits = first.hits;
        let (mut value, mut accepted) = attempt(&window)?;
        let mut steps = 0;
        while !accepted && !window.is_full_frame() && !hits.all() {
            let radius = window.radius.max(1) * 2;
            window = self.window(displacement, radius);
            hits.merge(window.hits);
            steps += 1;
            log::debug!(
                "escalating search to radius {radius} at ({}, {}) {}x{}",
                window.rect.x,
                window.rect.y,
                window.rect.width,
                window.rect.height
            );
            (value, accepted) = attempt(&window)?;
        }
        Ok(Escalation {
            value,
            window,
            accepted,
            steps,
            exhausted: !accepted && (hits.all() || window.is_full_frame()),
        })
    }
}

fn clamp_axis(
    start: i32,
    len: usize,
    limit: usize,
    low_hit: &mut bool,
    high_hit: &mut bool,
) -> (i32, usize) {
    if len >= limit {
        *low_hit = true;
        *high_hit = true;
        return (0, limit);
    }
    let mut start = start;
    if start < 0 {
        start = 0;
        *low_hit = true;
    }
    if start + len as i32 > limit as i32 {
        start = limit as i32 - len as i32;
        *high_hit = true;
    }
    (start, len)
}
