//! Fast SIMD-accelerated image resizing.
//!
//! Uses fast_image_resize crate which is 5-14x faster than image crate's resize.
//! Automatically uses AVX2/NEON SIMD when available.

use crate::error::StorageError;
use fast_image_resize::{images::Image, FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Rgb, RgbImage};

/// Fast image resizer using SIMD acceleration
pub struct FastResizer {
    resizer: Resizer,
}

impl FastResizer {
    /// Create a new fast resizer
    pub fn new() -> Self {
        Self {
            resizer: Resizer::new(),
        }
    }

    /// Resize an image to the specified dimensions and convert to grayscale.
    ///
    /// This is the normalization step for gradient fingerprints:
    /// small fixed grid + grayscale conversion.
    pub fn resize_to_grayscale(
        &mut self,
        image: &DynamicImage,
        width: u32,
        height: u32,
    ) -> Result<GrayImage, StorageError> {
        // Convert to grayscale first (this is faster than resizing RGB then converting)
        let gray = image.to_luma8();
        check_dimensions(gray.width(), gray.height(), width, height)?;

        let src_image = Image::from_vec_u8(gray.width(), gray.height(), gray.into_raw(), PixelType::U8)
            .map_err(|e| StorageError::ResizeFailed(format!("source image: {}", e)))?;
        let mut dst_image = Image::new(width, height, PixelType::U8);

        self.resize_into(&src_image, &mut dst_image)?;

        let result: ImageBuffer<Luma<u8>, Vec<u8>> =
            ImageBuffer::from_raw(width, height, dst_image.into_vec()).ok_or_else(|| {
                StorageError::ResizeFailed("failed to create result buffer".to_string())
            })?;

        Ok(result)
    }

    /// Resize an image to the specified dimensions as RGB
    pub fn resize_to_rgb(
        &mut self,
        image: &DynamicImage,
        width: u32,
        height: u32,
    ) -> Result<RgbImage, StorageError> {
        let rgb = image.to_rgb8();
        check_dimensions(rgb.width(), rgb.height(), width, height)?;

        let src_image = Image::from_vec_u8(rgb.width(), rgb.height(), rgb.into_raw(), PixelType::U8x3)
            .map_err(|e| StorageError::ResizeFailed(format!("source image: {}", e)))?;
        let mut dst_image = Image::new(width, height, PixelType::U8x3);

        self.resize_into(&src_image, &mut dst_image)?;

        let result: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_raw(width, height, dst_image.into_vec()).ok_or_else(|| {
                StorageError::ResizeFailed("failed to create result buffer".to_string())
            })?;

        Ok(result)
    }

    fn resize_into(&mut self, src: &Image<'_>, dst: &mut Image<'_>) -> Result<(), StorageError> {
        // Bilinear is a good balance of speed and quality for hashing and thumbnails
        let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));

        self.resizer
            .resize(src, dst, &options)
            .map_err(|e| StorageError::ResizeFailed(e.to_string()))
    }
}

impl Default for FastResizer {
    fn default() -> Self {
        Self::new()
    }
}

fn check_dimensions(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Result<(), StorageError> {
    if src_w == 0 || src_h == 0 {
        return Err(StorageError::ResizeFailed("invalid source dimensions".to_string()));
    }
    if dst_w == 0 || dst_h == 0 {
        return Err(StorageError::ResizeFailed("invalid destination dimensions".to_string()));
    }
    Ok(())
}

/// Largest size that fits within the bounds while keeping the aspect ratio.
///
/// Images already inside the bounds keep their size.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }

    let scale = f64::min(
        max_width as f64 / width as f64,
        max_height as f64 / height as f64,
    );
    let fitted_width = ((width as f64 * scale).round() as u32).clamp(1, max_width);
    let fitted_height = ((height as f64 * scale).round() as u32).clamp(1, max_height);

    (fitted_width, fitted_height)
}

/// Convenience function for one-off grayscale resizing
pub fn resize_to_grayscale(
    image: &DynamicImage,
    width: u32,
    height: u32,
) -> Result<GrayImage, StorageError> {
    let mut resizer = FastResizer::new();
    resizer.resize_to_grayscale(image, width, height)
}
