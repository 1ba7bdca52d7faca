//! Acceptability rules for images uploaded to the target platform
//!
//! Pure predicates over [`ImageSpec`]; no filesystem access happens here.

use crate::error::MediaError;
use crate::types::{ImageSpec, Preset};

/// Maximum media file size accepted by the platform (5 MiB)
pub const MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;

/// Widest aspect ratio the platform accepts (3:1); the narrowest is its
/// inverse (1:3)
pub const MAX_ASPECT_RATIO: f64 = 3.0;

/// Largest dimension acceptable without resizing to a preset
pub const MAX_FREEFORM_DIMENSION: u32 = 1600;

/// Decide whether an image can be uploaded as-is.
///
/// All of the following must hold:
/// - byte size at most [`MAX_FILE_SIZE`]
/// - aspect ratio within [1/3, 3.0] inclusive
/// - dimensions exactly match a recommended preset, or both are at most
///   [`MAX_FREEFORM_DIMENSION`]
///
/// A zero height is invalid input and reported as an error rather than a
/// rejection.
pub fn is_acceptable(spec: &ImageSpec) -> Result<bool, MediaError> {
    let ratio = spec.aspect_ratio()?;

    if spec.byte_size > MAX_FILE_SIZE {
        return Ok(false);
    }

    if !(1.0 / MAX_ASPECT_RATIO..=MAX_ASPECT_RATIO).contains(&ratio) {
        return Ok(false);
    }

    for preset in Preset::ALL {
        if (spec.width, spec.height) == preset.dimensions() {
            return Ok(true);
        }
    }

    Ok(spec.width <= MAX_FREEFORM_DIMENSION && spec.height <= MAX_FREEFORM_DIMENSION)
}

/// Pick the resize target for an image by its aspect ratio.
///
/// Boundaries are deterministic: ratios above 1.5 are landscape, below 0.9
/// portrait, everything in between (boundaries included) square.
pub fn target_preset(ratio: f64) -> Preset {
    if ratio > 1.5 {
        Preset::Landscape
    } else if ratio < 0.9 {
        Preset::Portrait
    } else {
        Preset::Square
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ImageMimeType;

    fn spec(width: u32, height: u32, byte_size: u64) -> ImageSpec {
        ImageSpec {
            width,
            height,
            byte_size,
            mime_type: ImageMimeType::Jpeg,
        }
    }

    #[test]
    fn test_preset_dimensions_are_acceptable() {
        for preset in Preset::ALL {
            let (w, h) = preset.dimensions();
            assert!(is_acceptable(&spec(w, h, 1024)).unwrap());
        }
    }

    #[test]
    fn test_small_freeform_image_is_acceptable() {
        assert!(is_acceptable(&spec(800, 600, 1024)).unwrap());
        assert!(is_acceptable(&spec(1600, 1600, 1024)).unwrap());
    }

    #[test]
    fn test_large_freeform_image_is_rejected() {
        assert!(!is_acceptable(&spec(1601, 900, 1024)).unwrap());
        assert!(!is_acceptable(&spec(900, 1601, 1024)).unwrap());
        // Large but exactly a preset: acceptable even though > 1600 wouldn't be
        assert!(is_acceptable(&spec(1200, 1200, 1024)).unwrap());
    }

    #[test]
    fn test_oversized_file_is_rejected() {
        assert!(!is_acceptable(&spec(800, 600, MAX_FILE_SIZE + 1)).unwrap());
        assert!(is_acceptable(&spec(800, 600, MAX_FILE_SIZE)).unwrap());
    }

    #[test]
    fn test_extreme_aspect_ratios_are_rejected() {
        // 4:1 and 1:4 are outside the allowed band
        assert!(!is_acceptable(&spec(1600, 400, 1024)).unwrap());
        assert!(!is_acceptable(&spec(400, 1600, 1024)).unwrap());
        // Exactly 3:1 and 1:3 are inclusive
        assert!(is_acceptable(&spec(1500, 500, 1024)).unwrap());
        assert!(is_acceptable(&spec(500, 1500, 1024)).unwrap());
    }

    #[test]
    fn test_zero_height_is_an_error() {
        assert!(is_acceptable(&spec(1200, 0, 1024)).is_err());
    }

    #[test]
    fn test_target_preset_by_ratio() {
        assert_eq!(target_preset(1.6), Preset::Landscape);
        assert_eq!(target_preset(16.0 / 9.0), Preset::Landscape);
        assert_eq!(target_preset(1.0), Preset::Square);
        assert_eq!(target_preset(0.8), Preset::Portrait);
        assert_eq!(target_preset(0.5), Preset::Portrait);
    }

    #[test]
    fn test_target_preset_boundaries_are_square() {
        // Boundaries land on Square: landscape needs > 1.5, portrait < 0.9
        assert_eq!(target_preset(1.5), Preset::Square);
        assert_eq!(target_preset(0.9), Preset::Square);
    }
}
