use serde::{Deserialize, Serialize};

/// Whether a metric rewards low or high surface values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Polarity {
    /// Difference metrics: lower is better.
    Minimize,
    /// Correlation metrics: higher is better.
    Maximize,
}

/// Similarity metric used to build the correlation surface.
///
/// The six variants follow the classic template-matching family; their
/// declaration order is the metric index used in configuration files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchMetric {
    /// Sum of squared differences.
    #[serde(rename = "sqdiff")]
    SqDiff,
    /// Sum of squared differences over `sqrt(sum T^2 * sum I^2)`.
    #[serde(rename = "sqdiff_normed")]
    SqDiffNormed,
    /// Raw cross-correlation.
    #[serde(rename = "ccorr")]
    CCorr,
    /// Cross-correlation over `sqrt(sum T^2 * sum I^2)`.
    #[serde(rename = "ccorr_normed")]
    CCorrNormed,
    /// Cross-correlation of mean-subtracted patches.
    #[serde(rename = "ccoeff")]
    CCoeff,
    /// Correlation coefficient in `[-1, 1]`.
    #[default]
    #[serde(rename = "ccoeff_normed")]
    CCoeffNormed,
}

impl MatchMetric {
    pub const ALL: [MatchMetric; 6] = [
        MatchMetric::SqDiff,
        MatchMetric::SqDiffNormed,
        MatchMetric::CCorr,
        MatchMetric::CCorrNormed,
        MatchMetric::CCoeff,
        MatchMetric::CCoeffNormed,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    #[inline]
    pub fn polarity(self) -> Polarity {
        match self {
            MatchMetric::SqDiff | MatchMetric::SqDiffNormed => Polarity::Minimize,
            _ => Polarity::Maximize,
        }
    }

    /// Metric used for the template's self-match baseline.
    ///
    /// A self-match under `SqDiff` is identically zero, so its baseline is
    /// the raw cross-correlation (`sum T^2`) instead.
    #[inline]
    pub fn baseline_metric(self) -> Self {
        match self {
            MatchMetric::SqDiff => MatchMetric::CCorr,
            other => other,
        }
    }

    /// True when `candidate` is a strictly better surface value than `best`.
    #[inline]
    pub fn is_better(self, candidate: f64, best: f64) -> bool {
        match self.polarity() {
            Polarity::Minimize => candidate < best,
            Polarity::Maximize => candidate > best,
        }
    }
}
