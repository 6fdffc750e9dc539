//! Downsized working copies of source images.
//!
//! Uploads only need enough pixels for the remote detector, so every source
//! image is re-encoded with its long edge capped before it leaves the machine.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageReader};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Long edge of downsized database images.
pub const DATABASE_LONG_EDGE: u32 = 600;
/// Long edge of downsized query images.
pub const QUERY_LONG_EDGE: u32 = 1000;
/// JPEG quality of working copies (0–100).
pub const DEFAULT_JPEG_QUALITY: u8 = 75;

// Triangle is the closest area-averaging filter `image` offers for downscaling.
const RESAMPLE_FILTER: FilterType = FilterType::Triangle;

#[derive(Error, Debug)]
pub enum PrepareError {
    #[error("failed to load {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("image {0} has a zero dimension")]
    EmptyImage(PathBuf),
    #[error("file name not found for {0}")]
    MissingFileName(PathBuf),
    #[error("io error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// A working copy paired with the original it was produced from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedImage {
    pub original: PathBuf,
    pub working: PathBuf,
}

/// Result of preparing one source image.
#[derive(Debug)]
pub enum PrepareOutcome {
    Downsized(PreparedImage),
    /// The image could not be prepared and is absent from the working set.
    Skipped {
        original: PathBuf,
        error: PrepareError,
    },
}

/// Compute the downsized size of a `width` x `height` image.
///
/// The longer side becomes `long_edge`; the shorter side is scaled by the
/// same ratio and floored, never dropping below one pixel. Square images
/// map to a `long_edge` square.
pub fn target_dimensions(width: u32, height: u32, long_edge: u32) -> (u32, u32) {
    if width == height {
        return (long_edge, long_edge);
    }

    let (long, short) = if width > height {
        (width, height)
    } else {
        (height, width)
    };
    let ratio = long as f64 / short as f64;
    let scaled_short = ((long_edge as f64 / ratio).floor() as u32).max(1);

    if width > height {
        (long_edge, scaled_short)
    } else {
        (scaled_short, long_edge)
    }
}

/// Produces downsized JPEG working copies.
#[derive(Debug, Clone)]
pub struct ImagePreparer {
    quality: u8,
}

impl Default for ImagePreparer {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl ImagePreparer {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    /// Write a copy of `source`, long edge capped at `long_edge`, into
    /// `destination` under the same file name.
    ///
    /// Failures are reported as [`PrepareOutcome::Skipped`]; they never abort
    /// the batch the image belongs to.
    pub fn prepare(&self, source: &Path, destination: &Path, long_edge: u32) -> PrepareOutcome {
        let display_name = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.display().to_string());

        match self.downsize(source, destination, long_edge) {
            Ok(working) => {
                println!("  {display_name} downsized.");
                tracing::debug!(
                    source = %source.display(),
                    working = %working.display(),
                    long_edge,
                    "image downsized"
                );
                PrepareOutcome::Downsized(PreparedImage {
                    original: source.to_path_buf(),
                    working,
                })
            }
            Err(error) => {
                println!("  Problem loading {display_name}.");
                tracing::warn!(source = %source.display(), error = %error, "image skipped");
                PrepareOutcome::Skipped {
                    original: source.to_path_buf(),
                    error,
                }
            }
        }
    }

    fn downsize(
        &self,
        source: &Path,
        destination: &Path,
        long_edge: u32,
    ) -> Result<PathBuf, PrepareError> {
        let file_name = source
            .file_name()
            .ok_or_else(|| PrepareError::MissingFileName(source.to_path_buf()))?;

        // Content decides the decoder; the extension is only a fallback.
        let image = ImageReader::open(source)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(ImageError::IoError)
            .and_then(|reader| reader.decode())
            .map_err(|source_err| PrepareError::Decode {
                path: source.to_path_buf(),
                source: source_err,
            })?;

        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(PrepareError::EmptyImage(source.to_path_buf()));
        }

        let (new_width, new_height) = target_dimensions(width, height, long_edge);
        let resized = image.resize_exact(new_width, new_height, RESAMPLE_FILTER);

        fs::create_dir_all(destination).map_err(|err| PrepareError::Io {
            path: destination.to_path_buf(),
            source: err,
        })?;

        let target = destination.join(file_name);
        let file = File::create(&target).map_err(|err| PrepareError::Io {
            path: target.clone(),
            source: err,
        })?;

        // JPEG carries no alpha channel.
        let encoder = JpegEncoder::new_with_quality(BufWriter::new(file), self.quality);
        DynamicImage::ImageRgb8(resized.to_rgb8())
            .write_with_encoder(encoder)
            .map_err(|err| PrepareError::Encode {
                path: target.clone(),
                source: err,
            })?;

        Ok(target)
    }
}
