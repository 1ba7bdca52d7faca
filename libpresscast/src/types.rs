//! Core types for Presscast

use serde::{Deserialize, Serialize};

use crate::error::MediaError;

/// A "post transitioned to published" event delivered by the host.
///
/// The host owns post storage; Presscast only sees the fields it needs to
/// compose and publish the message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostEvent {
    /// Host-side post identifier
    pub post_id: String,
    pub title: String,
    pub permalink: String,
    /// Explicit excerpt, if the host has one; the workflow falls back to
    /// trimming the content
    pub excerpt: Option<String>,
    pub content: String,
    pub author: String,
    /// Host content type (e.g. "post", "page")
    pub content_type: String,
}

/// Outcome of one publish attempt. Always returned as a value, never thrown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishResult {
    Success { remote_post_id: String },
    Failure { reason: String },
    /// Event was gated out before any work happened (disabled, wrong
    /// content type, retry no longer needed)
    Skipped { reason: String },
}

impl PublishResult {
    pub fn is_success(&self) -> bool {
        matches!(self, PublishResult::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, PublishResult::Failure { .. })
    }
}

/// One row of the publish log ring buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: Option<i64>,
    pub post_id: String,
    /// Unix timestamp of the attempt
    pub timestamp: i64,
    pub message: String,
    pub image_path: Option<String>,
    pub success: bool,
    /// Remote id on success, provider error text on failure
    pub response_text: String,
    pub remote_post_id: Option<String>,
}

/// Last known publish outcome for a post, used by the retry path.
/// Stored as TEXT through `as_str`/`from_str`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PublishStatus {
    Succeeded,
    Failed,
}

impl PublishStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Supported image MIME types for media uploads
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ImageMimeType {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl ImageMimeType {
    /// Parse MIME type from a MIME string (e.g., "image/jpeg")
    pub fn from_mime_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/gif" => Some(Self::Gif),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Detect MIME type from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Detect MIME type from a file path's extension
    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Get the MIME type string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
        }
    }

    /// Get the typical file extension for this MIME type
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::WebP => "webp",
        }
    }
}

impl std::fmt::Display for ImageMimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Image metadata used to decide whether optimization is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSpec {
    pub width: u32,
    pub height: u32,
    pub byte_size: u64,
    pub mime_type: ImageMimeType,
}

impl ImageSpec {
    /// Width/height ratio. `height == 0` is invalid input, not a division.
    pub fn aspect_ratio(&self) -> Result<f64, MediaError> {
        if self.height == 0 {
            return Err(MediaError::InvalidImage(
                "image height is zero".to_string(),
            ));
        }
        Ok(f64::from(self.width) / f64::from(self.height))
    }
}

/// Recommended image presets for the target platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// 16:9
    Landscape,
    /// 1:1
    Square,
    /// 4:5
    Portrait,
}

impl Preset {
    pub const ALL: [Preset; 3] = [Preset::Landscape, Preset::Square, Preset::Portrait];

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::Landscape => (1200, 675),
            Self::Square => (1200, 1200),
            Self::Portrait => (1080, 1350),
        }
    }
}
