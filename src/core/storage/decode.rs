//! Fast image decoding with format-specific optimizations.
//!
//! Uses zune-jpeg for JPEG files (1.5-2x faster than image crate),
//! falls back to image crate for other formats.

use crate::error::StorageError;
use image::{DynamicImage, GenericImageView, ImageBuffer, Luma, Rgb, Rgba};
use serde::{Deserialize, Serialize};
use std::path::Path;
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_jpeg::JpegDecoder;

/// Media formats recognized by the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaFormat {
    Jpeg,
    Png,
    WebP,
    Gif,
    Bmp,
    Tiff,
    Heic,
    /// Video container; decoding needs an external frame extractor
    Video,
    Unknown,
}

impl MediaFormat {
    /// Detect format from file extension
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(MediaFormat::Unknown)
    }

    /// Detect format from an extension, case-insensitively
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" | "jfif" => MediaFormat::Jpeg,
            "png" => MediaFormat::Png,
            "webp" => MediaFormat::WebP,
            "gif" => MediaFormat::Gif,
            "bmp" => MediaFormat::Bmp,
            "tiff" | "tif" => MediaFormat::Tiff,
            "heic" | "heif" => MediaFormat::Heic,
            "mp4" | "mov" | "avi" | "mkv" | "m4v" | "3gp" | "webm" | "wmv" | "flv" => {
                MediaFormat::Video
            }
            _ => MediaFormat::Unknown,
        }
    }

    pub fn is_image(&self) -> bool {
        !matches!(self, MediaFormat::Video | MediaFormat::Unknown)
    }

    pub fn is_video(&self) -> bool {
        matches!(self, MediaFormat::Video)
    }
}

/// Fast image decoder that uses optimized decoders per format
pub struct FastDecoder;

impl FastDecoder {
    /// Decode already-read file contents using the fastest available decoder.
    ///
    /// - JPEG: Uses zune-jpeg (1.5-2x faster), image crate on failure
    /// - Other formats: image crate, with the format guessed from the bytes
    pub fn decode(path: &Path, bytes: &[u8]) -> Result<DynamicImage, StorageError> {
        if bytes.is_empty() {
            return Err(StorageError::EmptyImage {
                path: path.to_path_buf(),
            });
        }

        let image = match MediaFormat::from_path(path) {
            MediaFormat::Jpeg => {
                Self::decode_jpeg(path, bytes).or_else(|_| Self::decode_fallback(path, bytes))?
            }
            _ => Self::decode_fallback(path, bytes)?,
        };

        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(StorageError::EmptyImage {
                path: path.to_path_buf(),
            });
        }

        Ok(image)
    }

    /// Fast JPEG decoding using zune-jpeg
    fn decode_jpeg(path: &Path, bytes: &[u8]) -> Result<DynamicImage, StorageError> {
        // Configure decoder to output RGB
        let options = DecoderOptions::new_fast().jpeg_set_out_colorspace(ColorSpace::RGB);
        let mut decoder = JpegDecoder::new_with_options(bytes, options);

        let pixels = decoder.decode().map_err(|e| StorageError::DecodeError {
            path: path.to_path_buf(),
            reason: format!("zune-jpeg decode failed: {:?}", e),
        })?;

        let info = decoder.info().ok_or_else(|| StorageError::DecodeError {
            path: path.to_path_buf(),
            reason: "Failed to get image info".to_string(),
        })?;

        let width = info.width as u32;
        let height = info.height as u32;

        // Get actual output colorspace after decoding
        let out_colorspace = decoder.get_output_colorspace().unwrap_or(ColorSpace::RGB);

        let buffer_error = |kind: &str| StorageError::DecodeError {
            path: path.to_path_buf(),
            reason: format!("Failed to create {} buffer", kind),
        };

        let image = match out_colorspace {
            ColorSpace::RGB => {
                let buffer: ImageBuffer<Rgb<u8>, Vec<u8>> =
                    ImageBuffer::from_raw(width, height, pixels).ok_or_else(|| buffer_error("RGB"))?;
                DynamicImage::ImageRgb8(buffer)
            }
            ColorSpace::RGBA => {
                let buffer: ImageBuffer<Rgba<u8>, Vec<u8>> =
                    ImageBuffer::from_raw(width, height, pixels).ok_or_else(|| buffer_error("RGBA"))?;
                DynamicImage::ImageRgba8(buffer)
            }
            ColorSpace::Luma => {
                let buffer: ImageBuffer<Luma<u8>, Vec<u8>> =
                    ImageBuffer::from_raw(width, height, pixels).ok_or_else(|| buffer_error("Luma"))?;
                DynamicImage::ImageLuma8(buffer)
            }
            _ => {
                // Unsupported colorspace, fall back to image crate
                return Self::decode_fallback(path, bytes);
            }
        };

        Ok(image)
    }

    /// Fallback to image crate for non-JPEG formats
    fn decode_fallback(path: &Path, bytes: &[u8]) -> Result<DynamicImage, StorageError> {
        image::load_from_memory(bytes).map_err(|e| StorageError::DecodeError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat as EncodedFormat;
    use std::io::Cursor;

    fn encode(image: &DynamicImage, format: EncodedFormat) -> Vec<u8> {
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
        bytes
    }

    fn sample_image() -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_fn(32, 24, |x, y| {
            Rgb([(x * 8) as u8, (y * 10) as u8, 128])
        }))
    }

    #[test]
    fn format_detection_is_case_insensitive() {
        assert_eq!(MediaFormat::from_path(Path::new("photo.JPG")), MediaFormat::Jpeg);
        assert_eq!(MediaFormat::from_path(Path::new("photo.jpeg")), MediaFormat::Jpeg);
        assert_eq!(MediaFormat::from_path(Path::new("image.PNG")), MediaFormat::Png);
        assert_eq!(MediaFormat::from_path(Path::new("clip.MOV")), MediaFormat::Video);
        assert_eq!(MediaFormat::from_path(Path::new("notes.txt")), MediaFormat::Unknown);
        assert_eq!(MediaFormat::from_path(Path::new("no_extension")), MediaFormat::Unknown);
    }

    #[test]
    fn videos_are_not_images() {
        assert!(MediaFormat::Jpeg.is_image());
        assert!(!MediaFormat::Video.is_image());
        assert!(MediaFormat::Video.is_video());
        assert!(!MediaFormat::Unknown.is_image());
    }

    #[test]
    fn decodes_png_bytes() {
        let bytes = encode(&sample_image(), EncodedFormat::Png);
        let decoded = FastDecoder::decode(Path::new("sample.png"), &bytes).unwrap();
        assert_eq!(decoded.dimensions(), (32, 24));
    }

    #[test]
    fn decodes_jpeg_bytes() {
        let bytes = encode(&sample_image(), EncodedFormat::Jpeg);
        let decoded = FastDecoder::decode(Path::new("sample.jpg"), &bytes).unwrap();
        assert_eq!(decoded.dimensions(), (32, 24));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let result = FastDecoder::decode(Path::new("broken.jpg"), b"this is not an image");
        assert!(matches!(result, Err(StorageError::DecodeError { .. })));
    }

    #[test]
    fn empty_file_is_reported_as_empty() {
        let result = FastDecoder::decode(Path::new("empty.png"), b"");
        assert!(matches!(result, Err(StorageError::EmptyImage { .. })));
    }
}
