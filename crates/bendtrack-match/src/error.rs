/// Errors returned by the template matcher.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    #[error("template {template_width}x{template_height} does not fit in source {source_width}x{source_height}")]
    TemplateTooLarge {
        template_width: usize,
        template_height: usize,
        source_width: usize,
        source_height: usize,
    },
    #[error("source has {source_planes} planes but template has {template_planes}")]
    PlaneMismatch {
        source_planes: usize,
        template_planes: usize,
    },
    #[error("template is empty ({width}x{height})")]
    EmptyTemplate { width: usize, height: usize },
    #[error("correlation surface contains only NaN")]
    NoExtremum,
}
