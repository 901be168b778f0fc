//! Template matching for the bending tracker.
//!
//! A [`TemplateMatcher`] computes a correlation surface with one of six
//! [`MatchMetric`]s, locates its extremum (optionally restricted to a
//! [`DirectionLine`]) and refines it to sub-pixel precision with a local
//! quadratic fit. [`MatchQualityThresholds`] decides whether a match is good
//! enough by comparing its score against the template's self-match score.

mod error;
mod extremum;
mod matcher;
mod metric;
mod quality;
mod surface;

pub use error::MatchError;
pub use extremum::{find_extremum, refine_subpixel, DirectionLine};
pub use matcher::{MatchResult, MatcherParams, TemplateMatcher};
pub use metric::{MatchMetric, Polarity};
pub use quality::{touches_window_edge, EdgeCheck, MatchQualityThresholds, MatchVerdict};
pub use surface::{compute_surface, CorrelationSurface};
