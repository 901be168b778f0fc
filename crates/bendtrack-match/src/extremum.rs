//! Extremum search on a correlation surface and its sub-pixel refinement.

use nalgebra::{Point2, Vector2};

use crate::{CorrelationSurface, Polarity};

/// Line in surface coordinates along which a constrained search runs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirectionLine {
    pub origin: Point2<f64>,
    pub direction: Vector2<f64>,
}

impl DirectionLine {
    pub fn new(origin: Point2<f64>, direction: Vector2<f64>) -> Self {
        Self { origin, direction }
    }

    /// A zero direction carries no constraint.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.direction.x == 0.0 && self.direction.y == 0.0
    }

    #[inline]
    fn angle(&self) -> f64 {
        self.direction.y.atan2(self.direction.x)
    }

    /// Surface cells crossed by the line, sampling along the dominant axis.
    fn cells(&self, width: usize, height: usize) -> Vec<(usize, usize)> {
        let (x0, y0) = (self.origin.x, self.origin.y);
        let (dx, dy) = (self.direction.x, self.direction.y);
        let mut cells = Vec::new();
        if dx.abs() > dy.abs() {
            for col in 0..width {
                let row = (y0 + dy * (col as f64 - x0) / dx).round();
                if row >= 0.0 && row < height as f64 {
                    cells.push((col, row as usize));
                }
            }
        } else {
            for row in 0..height {
                let col = (x0 + dx * (row as f64 - y0) / dy).round();
                if col >= 0.0 && col < width as f64 {
                    cells.push((col as usize, row));
                }
            }
        }
        cells
    }
}

fn better(polarity: Polarity, candidate: f64, best: f64) -> bool {
    match polarity {
        Polarity::Minimize => candidate < best,
        Polarity::Maximize => candidate > best,
    }
}

fn best_of(
    surface: &CorrelationSurface,
    polarity: Polarity,
    cells: impl Iterator<Item = (usize, usize)>,
) -> Option<(usize, usize)> {
    let mut best: Option<((usize, usize), f64)> = None;
    for (x, y) in cells {
        let v = surface.at(x, y);
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if !better(polarity, v, b) => {}
            _ => best = Some(((x, y), v)),
        }
    }
    best.map(|(cell, _)| cell)
}

/// Integer location of the best surface value.
///
/// With a non-degenerate `line`, only cells on the line compete. A line that
/// misses the surface, or a degenerate one, falls back to the full scan.
/// Returns `None` only for an empty or all-NaN surface.
pub fn find_extremum(
    surface: &CorrelationSurface,
    polarity: Polarity,
    line: Option<&DirectionLine>,
) -> Option<(usize, usize)> {
    let full = || (0..surface.height).flat_map(|y| (0..surface.width).map(move |x| (x, y)));
    match line.filter(|l| !l.is_degenerate()) {
        Some(line) => {
            let cells = line.cells(surface.width, surface.height);
            if cells.is_empty() {
                log::debug!("direction line misses the surface, scanning it whole");
                best_of(surface, polarity, full())
            } else {
                best_of(surface, polarity, cells.into_iter())
            }
        }
        None => best_of(surface, polarity, full()),
    }
}

/// Sub-pixel offset of the extremum at `(x, y)` from a local quadratic fit.
///
/// The offset is zero at the surface border, for a singular fit, and when
/// either component exceeds one pixel.
pub fn refine_subpixel(
    surface: &CorrelationSurface,
    x: usize,
    y: usize,
    line: Option<&DirectionLine>,
) -> Vector2<f64> {
    if x == 0 || y == 0 || x + 1 >= surface.width || y + 1 >= surface.height {
        return Vector2::zeros();
    }
    let f = |dx: isize, dy: isize| {
        surface.at((x as isize + dx) as usize, (y as isize + dy) as usize)
    };
    let c = f(0, 0);
    let fxx = f(-1, 0) - 2.0 * c + f(1, 0);
    let fyy = f(0, -1) - 2.0 * c + f(0, 1);
    let fxy = (f(1, 1) + f(-1, -1) - f(1, -1) - f(-1, 1)) / 4.0;
    let fx = (f(1, 0) - f(-1, 0)) / 2.0;
    let fy = (f(0, 1) - f(0, -1)) / 2.0;

    let offset = match line.filter(|l| !l.is_degenerate()) {
        None => {
            let denom = fxy * fxy - fxx * fyy;
            if denom == 0.0 {
                Vector2::zeros()
            } else {
                Vector2::new(
                    (fyy * fx - fxy * fy) / denom,
                    (fxx * fy - fxy * fx) / denom,
                )
            }
        }
        Some(line) => {
            let (sin, cos) = line.angle().sin_cos();
            let fr = fx * cos + fy * sin;
            let frr = fxx * cos * cos + fyy * sin * sin + fxy * sin * cos;
            if frr == 0.0 {
                Vector2::zeros()
            } else {
                let t = -fr / frr;
                Vector2::new(t * cos, t * sin)
            }
        }
    };

    if !offset.x.is_finite() || !offset.y.is_finite() || offset.x.abs() > 1.0 || offset.y.abs() > 1.0 {
        return Vector2::zeros();
    }
    offset
}
