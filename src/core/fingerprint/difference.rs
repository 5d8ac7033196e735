//! Difference Hash (dHash) implementation.
//!
//! dHash works by:
//! 1. Resizing the upright image to 9x8, ignoring its aspect ratio
//! 2. Converting to grayscale
//! 3. Comparing each pixel to the one to its right
//! 4. If left pixel is brighter, set bit to 1, else 0
//!
//! The 64 bits are packed MSB-first into a `u64` and rendered in decimal.
//! Because the grid is computed after the recorded rotation is applied, a
//! rotated copy of a photo yields the same value.

use crate::core::storage::resize::resize_to_grayscale;
use crate::error::FingerprintError;
use image::DynamicImage;

/// Grid height; the grid is one column wider
const GRID_SIZE: u32 = 8;

/// Difference Hash (dHash) over a fixed 9x8 grid
#[derive(Debug, Clone, Copy, Default)]
pub struct DifferenceHasher;

impl DifferenceHasher {
    pub fn new() -> Self {
        Self
    }

    /// Compute the packed gradient bits of an upright image
    pub fn hash_bits(&self, image: &DynamicImage) -> Result<u64, FingerprintError> {
        // One extra column to compute differences
        let gray = resize_to_grayscale(image, GRID_SIZE + 1, GRID_SIZE)?;

        let mut bits: u64 = 0;
        for y in 0..GRID_SIZE {
            for x in 0..GRID_SIZE {
                let left_pixel = gray.get_pixel(x, y)[0];
                let right_pixel = gray.get_pixel(x + 1, y)[0];

                bits <<= 1;
                if left_pixel > right_pixel {
                    bits |= 1;
                }
            }
        }

        Ok(bits)
    }

    /// Compute the fingerprint string of an upright image
    pub fn fingerprint(&self, image: &DynamicImage) -> Result<String, FingerprintError> {
        Ok(self.hash_bits(image)?.to_string())
    }
}
