use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Axis-aligned integer rectangle in pixel coordinates.
///
/// `x`/`y` may be negative while a window is being clamped; every rectangle
/// handed to a crop must lie inside the image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub width: usize,
    pub height: usize,
}

impl PixelRect {
    pub fn new(x: i32, y: i32, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Square `[c - half, c + half)` on both axes around an integer centre.
    pub fn square_around(center: Point2<i32>, half: usize) -> Self {
        let h = half as i32;
        Self::new(center.x - h, center.y - h, 2 * half, 2 * half)
    }

    #[inline]
    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    #[inline]
    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    #[inline]
    pub fn origin(&self) -> Vector2<f64> {
        Vector2::new(self.x as f64, self.y as f64)
    }

    #[inline]
    pub fn min_side(&self) -> usize {
        self.width.min(self.height)
    }

    /// Pixel-centre of the rectangle, `((w - 1) / 2, (h - 1) / 2)` from the origin.
    pub fn center(&self) -> Point2<f64> {
        Point2::new(
            self.x as f64 + (self.width as f64 - 1.0) / 2.0,
            self.y as f64 + (self.height as f64 - 1.0) / 2.0,
        )
    }

    pub fn translated(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Shrink by `frac` of the size on every side, truncating like the pixel
    /// grid does (`0.15` keeps the central `70%`).
    pub fn inset(&self, frac: f64) -> Self {
        let shrink = |len: usize| -> (i32, usize) {
            let len = len as f64;
            let offset = (len * frac + 1e-9).floor() as i32;
            let kept = (len * (1.0 - 2.0 * frac) + 1e-9).floor().max(1.0) as usize;
            (offset, kept)
        };
        let (dx, w) = shrink(self.width);
        let (dy, h) = shrink(self.height);
        Self::new(self.x + dx, self.y + dy, w, h)
    }

    /// True when the rectangle lies completely inside a `width x height` image.
    pub fn fits_within(&self, width: usize, height: usize) -> bool {
        self.x >= 0
            && self.y >= 0
            && self.right() <= width as i32
            && self.bottom() <= height as i32
            && self.width > 0
            && self.height > 0
    }
}
