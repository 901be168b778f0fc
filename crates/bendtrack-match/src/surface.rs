//! Correlation / difference surfaces.

use bendtrack_core::Patch;

use crate::{MatchError, MatchMetric};

/// Denominators below this are treated as zero-variance patches.
const MIN_DENOM: f64 = 1e-12;

/// Row-major surface of size `(srcW - tplW + 1) x (srcH - tplH + 1)`; the
/// value at `(x, y)` scores the template placed with its top-left corner at
/// `(x, y)` in the source.
#[derive(Clone, Debug, PartialEq)]
pub struct CorrelationSurface {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f64>,
}

impl CorrelationSurface {
    #[inline]
    pub fn at(&self, x: usize, y: usize) -> f64 {
        self.data[y * self.width + x]
    }
}

/// Template statistics shared by every placement.
struct TemplateStats {
    n: f64,
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
}

impl TemplateStats {
    fn of(template: &Patch) -> Self {
        let mut sum = Vec::with_capacity(template.plane_count());
        let mut sum_sq = Vec::with_capacity(template.plane_count());
        for plane in template.planes() {
            sum.push(plane.data.iter().map(|&v| v as f64).sum());
            sum_sq.push(plane.data.iter().map(|&v| (v as f64) * (v as f64)).sum());
        }
        Self {
            n: (template.width() * template.height()) as f64,
            sum,
            sum_sq,
        }
    }
}

/// Per-placement accumulators, summed over planes where a metric allows.
#[derive(Default)]
struct Window {
    cross: f64,
    sq_diff: f64,
    src_sq: f64,
    tpl_sq: f64,
    cross_centered: f64,
    src_var: f64,
    tpl_var: f64,
}

/// Compute the full surface of `template` slid over `source`.
pub fn compute_surface(
    source: &Patch,
    template: &Patch,
    metric: MatchMetric,
) -> Result<CorrelationSurface, MatchError> {
    if template.width() == 0 || template.height() == 0 {
        return Err(MatchError::EmptyTemplate {
            width: template.width(),
            height: template.height(),
        });
    }
    if template.width() > source.width() || template.height() > source.height() {
        return Err(MatchError::TemplateTooLarge {
            template_width: template.width(),
            template_height: template.height(),
            source_width: source.width(),
            source_height: source.height(),
        });
    }
    if template.plane_count() != source.plane_count() {
        return Err(MatchError::PlaneMismatch {
            source_planes: source.plane_count(),
            template_planes: template.plane_count(),
        });
    }

    let stats = TemplateStats::of(template);
    let (tw, th) = (template.width(), template.height());
    let width = source.width() - tw + 1;
    let height = source.height() - th + 1;
    let mut data = Vec::with_capacity(width * height);

    for v in 0..height {
        for u in 0..width {
            let mut acc = Window::default();
            for (p, (src, tpl)) in source.planes().zip(template.planes()).enumerate() {
                let (mut s, mut s2, mut st, mut d2) = (0.0f64, 0.0f64, 0.0f64, 0.0f64);
                for y in 0..th {
                    let src_row = &src.data[(v + y) * src.width + u..][..tw];
                    let tpl_row = &tpl.data[y * tw..][..tw];
                    for (&i, &t) in src_row.iter().zip(tpl_row) {
                        let (i, t) = (i as f64, t as f64);
                        s += i;
                        s2 += i * i;
                        st += i * t;
                        d2 += (t - i) * (t - i);
                    }
                }
                acc.cross += st;
                acc.sq_diff += d2;
                acc.src_sq += s2;
                acc.tpl_sq += stats.sum_sq[p];
                acc.cross_centered += st - stats.sum[p] * s / stats.n;
                acc.src_var += (s2 - s * s / stats.n).max(0.0);
                acc.tpl_var += (stats.sum_sq[p] - stats.sum[p] * stats.sum[p] / stats.n).max(0.0);
            }
            data.push(score(metric, &acc));
        }
    }

    Ok(CorrelationSurface {
        width,
        height,
        data,
    })
}

fn score(metric: MatchMetric, w: &Window) -> f64 {
    match metric {
        MatchMetric::SqDiff => w.sq_diff,
        MatchMetric::SqDiffNormed => {
            let denom = (w.tpl_sq * w.src_sq).sqrt();
            if denom > MIN_DENOM {
                w.sq_diff / denom
            } else {
                1.0
            }
        }
        MatchMetric::CCorr => w.cross,
        MatchMetric::CCorrNormed => {
            let denom = (w.tpl_sq * w.src_sq).sqrt();
            if denom > MIN_DENOM {
                (w.cross / denom).clamp(-1.0, 1.0)
            } else {
                0.0
            }
        }
        MatchMetric::CCoeff => w.cross_centered,
        MatchMetric::CCoeffNormed => {
            let denom = (w.tpl_var * w.src_var).sqrt();
            if denom > MIN_DENOM {
                (w.cross_centered / denom).clamp(-1.0, 1.0)
            } else {
                0.0
            }
        }
    }
}
