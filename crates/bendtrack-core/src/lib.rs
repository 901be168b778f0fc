//! Core frame and patch primitives for bending-needle tracking.
//!
//! This crate owns everything that touches raw pixels before matching:
//! frame buffers of the supported bit depths, planar `f32` patches,
//! integer rectangles, the Gaussian pre-blur and bicubic rotation of
//! templates. It knows nothing about similarity metrics or geometry.

mod error;
mod filter;
mod image;
mod logger;
mod rect;
mod rotate;

pub use error::ImageError;
pub use filter::{gaussian_blur, gaussian_kernel};
pub use image::{BitDepth, Frame, Patch, PixelData, PlaneView};
pub use rect::PixelRect;
pub use rotate::{rotate_bicubic, rotate_offset};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{current_frame, init_with_level, FrameLogScope};
