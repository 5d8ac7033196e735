//! # Storage Module
//!
//! Storage access for everything above it: reading files, decoding media,
//! normalizing orientation and producing thumbnails.
//!
//! ## Decoding
//! - JPEG via `zune-jpeg`, falling back to the `image` crate
//! - Other still formats via the `image` crate
//! - Videos through a [`FrameExtractor`] supplied by the host application
//!
//! Decoding failures are per-file errors; callers decide how to record them.

pub mod decode;
pub mod orientation;
pub mod resize;

pub use decode::{FastDecoder, MediaFormat};
pub use resize::{fit_within, FastResizer};

use crate::core::model::{Dimensions, Rotation};
use crate::error::StorageError;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// JPEG quality of generated thumbnails
const THUMBNAIL_QUALITY: u8 = 85;

/// Extracts a representative still frame from a video
pub trait FrameExtractor: Send + Sync {
    fn first_frame(&self, path: &Path) -> Result<DynamicImage, StorageError>;
}

/// A decoded file, turned upright
#[derive(Debug, Clone)]
pub struct DecodedMedia {
    /// Upright pixels
    pub image: DynamicImage,
    /// Rotation that was applied to the stored pixels
    pub rotation: Rotation,
}

impl DecodedMedia {
    /// Size of the upright pixels
    pub fn dimensions(&self) -> Dimensions {
        let (width, height) = self.image.dimensions();
        Dimensions::new(width, height)
    }

    /// Size of the pixels as stored in the file
    pub fn stored_dimensions(&self) -> Dimensions {
        let upright = self.dimensions();
        if self.rotation.swaps_axes() {
            Dimensions::new(upright.height, upright.width)
        } else {
            upright
        }
    }
}

/// An encoded thumbnail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub bytes: Vec<u8>,
    pub dimensions: Dimensions,
}

/// Filesystem and codec access used by the catalog
pub trait StorageAccess: Send + Sync {
    /// Directory under the data root reserved for `key`
    fn resolve_data_directory(&self, key: &str) -> PathBuf;

    /// Read a whole file
    fn read_file(&self, path: &Path) -> Result<Vec<u8>, StorageError>;

    /// Rotation recorded in the file's metadata
    fn read_rotation(&self, bytes: &[u8]) -> Rotation {
        orientation::read_rotation(bytes)
    }

    /// Decode file contents and apply their recorded orientation
    fn decode(&self, path: &Path, bytes: &[u8]) -> Result<DecodedMedia, StorageError>;

    /// Aspect-preserving JPEG thumbnail within the bounds
    fn thumbnail(
        &self,
        image: &DynamicImage,
        max_width: u32,
        max_height: u32,
    ) -> Result<Thumbnail, StorageError>;

    /// Decode and thumbnail in one step
    fn decode_and_thumbnail(
        &self,
        path: &Path,
        bytes: &[u8],
        max_width: u32,
        max_height: u32,
    ) -> Result<(DecodedMedia, Thumbnail), StorageError> {
        let decoded = self.decode(path, bytes)?;
        let thumbnail = self.thumbnail(&decoded.image, max_width, max_height)?;
        Ok((decoded, thumbnail))
    }
}

/// Storage access backed by the local filesystem
pub struct LocalStorage {
    data_root: PathBuf,
    frame_extractor: Option<Arc<dyn FrameExtractor>>,
}

impl LocalStorage {
    /// Create storage rooted at `data_root`
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            frame_extractor: None,
        }
    }

    /// Default data root under the platform data directory
    pub fn default_data_root() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("media-catalog")
    }

    /// Use an external extractor for video first frames
    pub fn with_frame_extractor(mut self, extractor: Arc<dyn FrameExtractor>) -> Self {
        self.frame_extractor = Some(extractor);
        self
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }
}

impl StorageAccess for LocalStorage {
    fn resolve_data_directory(&self, key: &str) -> PathBuf {
        self.data_root.join(key)
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>, StorageError> {
        std::fs::read(path).map_err(|e| StorageError::from_io(path, e))
    }

    fn decode(&self, path: &Path, bytes: &[u8]) -> Result<DecodedMedia, StorageError> {
        let format = MediaFormat::from_path(path);

        if format.is_video() {
            let extractor = self.frame_extractor.as_ref().ok_or_else(|| {
                StorageError::FrameExtractionUnavailable {
                    path: path.to_path_buf(),
                }
            })?;
            return Ok(DecodedMedia {
                image: extractor.first_frame(path)?,
                rotation: Rotation::Deg0,
            });
        }

        if format == MediaFormat::Unknown {
            return Err(StorageError::UnsupportedMedia {
                path: path.to_path_buf(),
            });
        }

        let stored = FastDecoder::decode(path, bytes)?;
        let rotation = self.read_rotation(bytes);

        Ok(DecodedMedia {
            image: orientation::apply_rotation(&stored, rotation),
            rotation,
        })
    }

    fn thumbnail(
        &self,
        image: &DynamicImage,
        max_width: u32,
        max_height: u32,
    ) -> Result<Thumbnail, StorageError> {
        let (width, height) = image.dimensions();
        let (thumb_width, thumb_height) = fit_within(width, height, max_width, max_height);

        let mut resizer = FastResizer::new();
        let resized = resizer.resize_to_rgb(image, thumb_width, thumb_height)?;

        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, THUMBNAIL_QUALITY)
            .encode_image(&resized)
            .map_err(|e| StorageError::ThumbnailFailed(e.to_string()))?;

        Ok(Thumbnail {
            bytes,
            dimensions: Dimensions::new(thumb_width, thumb_height),
        })
    }
}
