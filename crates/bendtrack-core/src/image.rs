//! Frame buffers as delivered by a frame source, and the planar `f32`
//! patches every matching step works on.

use serde::{Deserialize, Serialize};

use crate::{ImageError, PixelRect};

/// Sample layout of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BitDepth {
    Gray8,
    Gray16,
    Rgb24,
    Gray32,
}

impl BitDepth {
    pub fn bits(self) -> u32 {
        match self {
            BitDepth::Gray8 => 8,
            BitDepth::Gray16 => 16,
            BitDepth::Rgb24 => 24,
            BitDepth::Gray32 => 32,
        }
    }
}

/// Row-major pixel storage. `Rgb8` is interleaved, three bytes per pixel.
#[derive(Clone, Debug, PartialEq)]
pub enum PixelData {
    Gray8(Vec<u8>),
    Gray16(Vec<u16>),
    Rgb8(Vec<u8>),
    Gray32(Vec<f32>),
}

impl PixelData {
    pub fn bit_depth(&self) -> BitDepth {
        match self {
            PixelData::Gray8(_) => BitDepth::Gray8,
            PixelData::Gray16(_) => BitDepth::Gray16,
            PixelData::Rgb8(_) => BitDepth::Rgb24,
            PixelData::Gray32(_) => BitDepth::Gray32,
        }
    }

    fn samples(&self) -> usize {
        match self {
            PixelData::Gray8(v) => v.len(),
            PixelData::Gray16(v) => v.len(),
            PixelData::Rgb8(v) => v.len(),
            PixelData::Gray32(v) => v.len(),
        }
    }
}

/// One image of the tracked sequence.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    width: usize,
    height: usize,
    pixels: PixelData,
}

impl Frame {
    /// Wrap a pixel buffer, validating its length against the dimensions.
    pub fn new(width: usize, height: usize, pixels: PixelData) -> Result<Self, ImageError> {
        if width == 0 || height == 0 {
            return Err(ImageError::EmptyImage { width, height });
        }
        let per_pixel = if matches!(pixels, PixelData::Rgb8(_)) { 3 } else { 1 };
        let expected = width * height * per_pixel;
        let actual = pixels.samples();
        if actual != expected {
            return Err(ImageError::BufferLength {
                width,
                height,
                expected,
                actual,
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
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

    #[inline]
    pub fn pixels(&self) -> &PixelData {
        &self.pixels
    }

    #[inline]
    pub fn bit_depth(&self) -> BitDepth {
        self.pixels.bit_depth()
    }

    /// Same size and sample layout, i.e. comparable against the reference.
    pub fn same_layout(&self, other: &Frame) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.bit_depth() == other.bit_depth()
    }

    /// Convert into a matching patch.
    ///
    /// 16-bit samples are scaled into `[0, 1]`; 8-bit and float samples keep
    /// their values. RGB frames become a single intensity plane when
    /// `intensity` is set, otherwise one plane per channel.
    pub fn to_patch(&self, intensity: bool) -> Patch {
        let planes = match &self.pixels {
            PixelData::Gray8(v) => vec![v.iter().map(|&p| p as f32).collect()],
            PixelData::Gray16(v) => vec![v.iter().map(|&p| p as f32 / 65535.0).collect()],
            PixelData::Gray32(v) => vec![v.clone()],
            PixelData::Rgb8(v) if intensity => vec![v
                .chunks_exact(3)
                .map(|px| (px[0] as f32 + px[1] as f32 + px[2] as f32) / 3.0)
                .collect()],
            PixelData::Rgb8(v) => (0..3)
                .map(|c| v.chunks_exact(3).map(|px| px[c] as f32).collect())
                .collect(),
        };
        Patch {
            width: self.width,
            height: self.height,
            planes,
        }
    }
}

/// Borrowed single plane of a patch.
#[derive(Clone, Copy, Debug)]
pub struct PlaneView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [f32], // row-major, len = w*h
}

impl PlaneView<'_> {
    #[inline]
    pub fn at(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    /// Edge-clamped lookup for resampling kernels.
    #[inline]
    pub fn clamped(&self, x: i64, y: i64) -> f32 {
        let x = x.clamp(0, self.width as i64 - 1) as usize;
        let y = y.clamp(0, self.height as i64 - 1) as usize;
        self.data[y * self.width + x]
    }
}

/// Planar `f32` image with one or three planes of identical size.
#[derive(Clone, Debug, PartialEq)]
pub struct Patch {
    width: usize,
    height: usize,
    planes: Vec<Vec<f32>>,
}

impl Patch {
    /// Single-plane patch.
    pub fn from_plane(width: usize, height: usize, data: Vec<f32>) -> Result<Self, ImageError> {
        Self::from_planes(width, height, vec![data])
    }

    pub fn from_planes(
        width: usize,
        height: usize,
        planes: Vec<Vec<f32>>,
    ) -> Result<Self, ImageError> {
        if width == 0 || height == 0 {
            return Err(ImageError::EmptyImage { width, height });
        }
        if planes.is_empty() {
            return Err(ImageError::PlaneCount {
                expected: 1,
                actual: 0,
            });
        }
        for plane in &planes {
            if plane.len() != width * height {
                return Err(ImageError::BufferLength {
                    width,
                    height,
                    expected: width * height,
                    actual: plane.len(),
                });
            }
        }
        Ok(Self {
            width,
            height,
            planes,
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

    #[inline]
    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    #[inline]
    pub fn plane(&self, index: usize) -> PlaneView<'_> {
        PlaneView {
            width: self.width,
            height: self.height,
            data: &self.planes[index],
        }
    }

    pub fn planes(&self) -> impl Iterator<Item = PlaneView<'_>> {
        (0..self.planes.len()).map(|i| self.plane(i))
    }

    /// Copy out a rectangle that must lie inside the patch.
    pub fn crop(&self, rect: &PixelRect) -> Result<Patch, ImageError> {
        if !rect.fits_within(self.width, self.height) {
            return Err(ImageError::CropOutOfBounds {
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height,
                image_width: self.width,
                image_height: self.height,
            });
        }
        let (x0, y0) = (rect.x as usize, rect.y as usize);
        let planes = self
            .planes
            .iter()
            .map(|plane| {
                let mut out = Vec::with_capacity(rect.width * rect.height);
                for y in y0..y0 + rect.height {
                    let row = y * self.width;
                    out.extend_from_slice(&plane[row + x0..row + x0 + rect.width]);
                }
                out
            })
            .collect();
        Ok(Patch {
            width: rect.width,
            height: rect.height,
            planes,
        })
    }

    /// Apply a per-plane transform that preserves the patch size.
    pub fn map_planes<F>(&self, f: F) -> Patch
    where
        F: Fn(PlaneView<'_>) -> Vec<f32>,
    {
        Patch {
            width: self.width,
            height: self.height,
            planes: self.planes().map(f).collect(),
        }
    }
}
