//! Frame and timestamp providers.

use std::collections::VecDeque;

use bendtrack_core::Frame;

use crate::TrackError;

/// A frame with an optional label (usually its file name).
#[derive(Clone, Debug, PartialEq)]
pub struct SourceFrame {
    pub frame: Frame,
    pub label: Option<String>,
}

impl From<Frame> for SourceFrame {
    fn from(frame: Frame) -> Self {
        Self { frame, label: None }
    }
}

/// Sequential frame supply. `None` ends the sequence.
pub trait FrameProvider: Send {
    fn next_frame(&mut self) -> Option<Result<SourceFrame, TrackError>>;
}

/// Frames held in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryFrames {
    frames: VecDeque<SourceFrame>,
}

impl MemoryFrames {
    pub fn new<I>(frames: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<SourceFrame>,
    {
        Self {
            frames: frames.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameProvider for MemoryFrames {
    fn next_frame(&mut self) -> Option<Result<SourceFrame, TrackError>> {
        self.frames.pop_front().map(Ok)
    }
}

/// Acquisition time of a frame in seconds, if known.
pub trait TimeSource: Send {
    fn timestamp_of(&mut self, index: usize) -> Option<f64>;
}

/// No timestamps: emitted frames are spaced by the configured time step,
/// so skipped frames advance the clock and dropped ones do not.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConstantStep;

impl TimeSource for ConstantStep {
    fn timestamp_of(&mut self, _index: usize) -> Option<f64> {
        None
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameRate {
    pub fps: f64,
}

impl TimeSource for FrameRate {
    fn timestamp_of(&mut self, index: usize) -> Option<f64> {
        (self.fps > 0.0).then(|| index as f64 / self.fps)
    }
}

/// Explicit per-frame timestamps; frames past the end have none.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Timestamps(pub Vec<f64>);

impl TimeSource for Timestamps {
    fn timestamp_of(&mut self, index: usize) -> Option<f64> {
        self.0.get(index).copied().filter(|t| t.is_finite())
    }
}

/// Elapsed time since the reference frame.
///
/// Timestamps are used while every frame has one; after the first gap the
/// clock advances by a constant step for the rest of the run.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameClock {
    step: f64,
    origin: Option<f64>,
    last: f64,
}

impl FrameClock {
    /// Start at the reference frame's timestamp.
    pub fn new(step: f64, reference: Option<f64>) -> Self {
        if reference.is_none() {
            log::debug!("reference frame has no timestamp, using {step}s steps");
        }
        Self {
            step,
            origin: reference,
            last: 0.0,
        }
    }

    /// Time of the next emitted frame.
    pub fn tick(&mut self, timestamp: Option<f64>) -> f64 {
        match (self.origin, timestamp) {
            (Some(origin), Some(t)) => self.last = t - origin,
            (Some(_), None) => {
                log::debug!("timestamp missing, switching to {}s steps", self.step);
                self.origin = None;
                self.last += self.step;
            }
            (None, _) => self.last += self.step,
        }
        self.last
    }

    #[inline]
    pub fn elapsed(&self) -> f64 {
        self.last
    }
}

#[cfg(feature = "image")]
pub use self::files::{frame_from_dynamic, DirectoryFrames, FolderMonitor};

#[cfg(feature = "image")]
mod files {
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use bendtrack_core::{Frame, PixelData};
    use image::{DynamicImage, ImageReader};

    use super::{FrameProvider, SourceFrame};
    use crate::TrackError;

    const EXTENSIONS: &[&str] = &["png", "tif", "tiff", "jpg", "jpeg", "bmp", "pgm", "pnm"];

    fn is_image(path: &Path) -> bool {
        path.is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
    }

    /// Image files in `dir` sorted by name.
    fn list_images(dir: &Path) -> Result<Vec<PathBuf>, TrackError> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if is_image(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Convert a decoded image, keeping 8/16-bit gray, 24-bit RGB and float
    /// data as they are.
    pub fn frame_from_dynamic(img: DynamicImage) -> Result<Frame, TrackError> {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let pixels = match img {
            DynamicImage::ImageLuma8(buf) => PixelData::Gray8(buf.into_raw()),
            DynamicImage::ImageLumaA8(_) => PixelData::Gray8(img.to_luma8().into_raw()),
            DynamicImage::ImageLuma16(buf) => PixelData::Gray16(buf.into_raw()),
            DynamicImage::ImageLumaA16(_) => PixelData::Gray16(img.to_luma16().into_raw()),
            DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => {
                let rgb = img.to_rgb32f().into_raw();
                PixelData::Gray32(rgb.chunks_exact(3).map(|c| (c[0] + c[1] + c[2]) / 3.0).collect())
            }
            other => PixelData::Rgb8(other.to_rgb8().into_raw()),
        };
        Ok(Frame::new(w, h, pixels)?)
    }

    fn load(path: &Path) -> Result<SourceFrame, TrackError> {
        let decode = |source| TrackError::Decode {
            path: path.to_path_buf(),
            source,
        };
        let img = ImageReader::open(path)?
            .with_guessed_format()?
            .decode()
            .map_err(decode)?;
        Ok(SourceFrame {
            frame: frame_from_dynamic(img)?,
            label: path.file_name().map(|n| n.to_string_lossy().into_owned()),
        })
    }

    /// Every image in a directory, in name order.
    #[derive(Clone, Debug)]
    pub struct DirectoryFrames {
        paths: std::vec::IntoIter<PathBuf>,
    }

    impl DirectoryFrames {
        pub fn open(dir: impl AsRef<Path>) -> Result<Self, TrackError> {
            let paths = list_images(dir.as_ref())?;
            log::info!("{} frames in {}", paths.len(), dir.as_ref().display());
            Ok(Self {
                paths: paths.into_iter(),
            })
        }
    }

    impl FrameProvider for DirectoryFrames {
        fn next_frame(&mut self) -> Option<Result<SourceFrame, TrackError>> {
            self.paths.next().map(|p| load(&p))
        }
    }

    /// Directory source that keeps waiting for new files.
    ///
    /// Files are picked up when they sort after the last delivered one.
    #[derive(Debug)]
    pub struct FolderMonitor {
        dir: PathBuf,
        pending: Vec<PathBuf>,
        last: Option<PathBuf>,
        poll: Duration,
        idle_timeout: Option<Duration>,
        stop: Arc<AtomicBool>,
    }

    impl FolderMonitor {
        pub fn new(dir: impl Into<PathBuf>, poll: Duration) -> Self {
            Self {
                dir: dir.into(),
                pending: Vec::new(),
                last: None,
                poll,
                idle_timeout: None,
                stop: Arc::new(AtomicBool::new(false)),
            }
        }

        /// End the sequence when no new file shows up for `timeout`.
        pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
            self.idle_timeout = Some(timeout);
            self
        }

        /// Flag that ends the sequence at the next poll when set.
        pub fn stop_flag(&self) -> Arc<AtomicBool> {
            Arc::clone(&self.stop)
        }

        fn rescan(&mut self) -> Result<(), TrackError> {
            let mut fresh: Vec<PathBuf> = list_images(&self.dir)?
                .into_iter()
                .filter(|p| self.last.as_ref().is_none_or(|last| p > last))
                .collect();
            // pending is consumed from the back
            fresh.reverse();
            self.pending = fresh;
            Ok(())
        }
    }

    impl FrameProvider for FolderMonitor {
        fn next_frame(&mut self) -> Option<Result<SourceFrame, TrackError>> {
            let idle_since = Instant::now();
            loop {
                if self.stop.load(Ordering::Relaxed) {
                    log::info!("folder monitor stopped");
                    return None;
                }
                if let Some(path) = self.pending.pop() {
                    self.last = Some(path.clone());
                    return Some(load(&path));
                }
                if let Err(e) = self.rescan() {
                    return Some(Err(e));
                }
                if !self.pending.is_empty() {
                    continue;
                }
                if self.idle_timeout.is_some_and(|t| idle_since.elapsed() >= t) {
                    log::info!("no new frames in {} for {:?}", self.dir.display(), idle_since.elapsed());
                    return None;
                }
                thread::sleep(self.poll);
            }
        }
    }
}
