//! Image optimization for the target platform
//!
//! Takes a source image that fails the upload constraints and produces a
//! derived file that satisfies them: resized and cropped to the nearest
//! recommended preset, re-encoded with a bounded quality search. The derived
//! file is written next to the source and is disposable; a periodic sweep
//! removes old ones.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::imageops::FilterType;
use image::DynamicImage;
use tracing::{debug, warn};

use crate::error::MediaError;
use crate::media::constraints::{self, MAX_FILE_SIZE};
use crate::types::{ImageMimeType, ImageSpec};

/// Suffix marking derived files written by the optimizer
pub const DERIVED_SUFFIX: &str = "-x-optimized";

/// Derived files older than this are removed by the sweep
pub const DERIVED_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Quality for the size-reduction retry when the first encode is too large
const FALLBACK_QUALITY: u8 = 70;

/// Outcome of an optimization pass. Both variants are usable images; the
/// no-op path is a valid result, not a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimizeOutcome {
    /// Source already satisfies the constraints; use it unchanged
    Original(PathBuf),
    /// A derived file was written satisfying the constraints
    Optimized(PathBuf),
}

impl OptimizeOutcome {
    pub fn path(&self) -> &Path {
        match self {
            Self::Original(p) | Self::Optimized(p) => p,
        }
    }

    pub fn into_path(self) -> PathBuf {
        match self {
            Self::Original(p) | Self::Optimized(p) => p,
        }
    }
}

#[derive(Debug, Default)]
pub struct ImageOptimizer;

impl ImageOptimizer {
    pub fn new() -> Self {
        Self
    }

    /// Read the metadata needed for the acceptability decision.
    pub fn image_spec(&self, path: &Path) -> Result<ImageSpec, MediaError> {
        let mime_type = ImageMimeType::from_path(path).ok_or_else(|| {
            MediaError::InvalidImage(format!("unsupported image type: {}", path.display()))
        })?;
        let byte_size = std::fs::metadata(path)?.len();
        let (width, height) = image::image_dimensions(path)?;

        Ok(ImageSpec {
            width,
            height,
            byte_size,
            mime_type,
        })
    }

    /// Produce an image satisfying the platform constraints.
    ///
    /// Returns the source unchanged when it is already acceptable. Otherwise
    /// resizes and crops to the preset chosen by aspect ratio, re-encodes at
    /// the format's quality level, and retries once at a lower quality if the
    /// result is over the size limit. If even that is too large the attempt
    /// is discarded and `OptimizationFailed` is returned; callers fall back
    /// to the unmodified source.
    pub fn optimize(&self, source: &Path) -> Result<OptimizeOutcome, MediaError> {
        let spec = self.image_spec(source)?;

        if constraints::is_acceptable(&spec)? {
            debug!(path = %source.display(), "image already satisfies constraints");
            return Ok(OptimizeOutcome::Original(source.to_path_buf()));
        }

        let preset = constraints::target_preset(spec.aspect_ratio()?);
        let (width, height) = preset.dimensions();
        debug!(
            path = %source.display(),
            ?preset,
            "resizing image to {}x{}", width, height
        );

        let img = image::open(source)?;
        let resized = img.resize_to_fill(width, height, FilterType::Lanczos3);

        let mut encoded = encode(&resized, spec.mime_type, encode_quality(spec.mime_type))?;
        if encoded.len() as u64 > MAX_FILE_SIZE {
            warn!(
                path = %source.display(),
                size = encoded.len(),
                "encoded image over the size limit, retrying at quality {}",
                FALLBACK_QUALITY
            );
            encoded = encode(&resized, spec.mime_type, FALLBACK_QUALITY)?;
        }
        if encoded.len() as u64 > MAX_FILE_SIZE {
            return Err(MediaError::OptimizationFailed(format!(
                "re-encoded image still exceeds {} bytes ({} bytes)",
                MAX_FILE_SIZE,
                encoded.len()
            )));
        }

        let derived = derived_path(source, spec.mime_type);
        std::fs::write(&derived, &encoded)?;

        Ok(OptimizeOutcome::Optimized(derived))
    }

    /// Delete derived files in `dir` older than `max_age`.
    ///
    /// Returns the number of files removed. Unreadable entries are skipped;
    /// the sweep is best-effort.
    pub fn cleanup_derived(&self, dir: &Path, max_age: Duration) -> Result<usize, MediaError> {
        let mut removed = 0;

        for entry in std::fs::read_dir(dir)? {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            let name = entry.file_name();
            let is_derived = name
                .to_str()
                .map(|n| n.contains(&format!("{}.", DERIVED_SUFFIX)))
                .unwrap_or(false);
            if !is_derived {
                continue;
            }

            let old_enough = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|t| t.elapsed().ok())
                .map(|age| age >= max_age)
                .unwrap_or(false);

            if old_enough && std::fs::remove_file(entry.path()).is_ok() {
                removed += 1;
            }
        }

        Ok(removed)
    }
}

/// Quality level for the first encode attempt, per format.
///
/// PNG has no lossy quality knob; its level selects the compression effort
/// instead.
fn encode_quality(mime: ImageMimeType) -> u8 {
    match mime {
        ImageMimeType::Jpeg | ImageMimeType::WebP => 85,
        ImageMimeType::Png => 90,
        ImageMimeType::Gif => 85,
    }
}

/// Encode a resized image into an in-memory buffer.
///
/// PNG sources stay PNG (lossless, compression level driven by `quality`);
/// everything else goes through the JPEG encoder, which gives the quality
/// search an actual size lever.
fn encode(
    img: &DynamicImage,
    source_mime: ImageMimeType,
    quality: u8,
) -> Result<Vec<u8>, MediaError> {
    let mut buf = Vec::new();
    let mut cursor = Cursor::new(&mut buf);

    match source_mime {
        ImageMimeType::Png => {
            let compression = if quality < 90 {
                CompressionType::Best
            } else {
                CompressionType::Default
            };
            let encoder =
                PngEncoder::new_with_quality(&mut cursor, compression, PngFilterType::Adaptive);
            img.write_with_encoder(encoder)?;
        }
        _ => {
            let encoder = JpegEncoder::new_with_quality(&mut cursor, quality);
            img.to_rgb8().write_with_encoder(encoder)?;
        }
    }

    Ok(buf)
}

/// Path for the derived file, next to the source.
///
/// The extension follows the encoded format, not the source's.
fn derived_path(source: &Path, source_mime: ImageMimeType) -> PathBuf {
    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    let ext = match source_mime {
        ImageMimeType::Png => "png",
        _ => "jpg",
    };
    source.with_file_name(format!("{}{}.{}", stem, DERIVED_SUFFIX, ext))
}
