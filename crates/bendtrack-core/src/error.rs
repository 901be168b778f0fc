/// Errors raised while building frames and patches.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("buffer holds {actual} samples, expected {expected} for a {width}x{height} image")]
    BufferLength {
        width: usize,
        height: usize,
        expected: usize,
        actual: usize,
    },
    #[error("image dimensions must be non-zero (got {width}x{height})")]
    EmptyImage { width: usize, height: usize },
    #[error("patch planes disagree: expected {expected} planes, got {actual}")]
    PlaneCount { expected: usize, actual: usize },
    #[error("crop {x},{y} {width}x{height} leaves the {image_width}x{image_height} image")]
    CropOutOfBounds {
        x: i32,
        y: i32,
        width: usize,
        height: usize,
        image_width: usize,
        image_height: usize,
    },
}
