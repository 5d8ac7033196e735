//! Perceptual Hash (pHash) implementation.
//!
//! pHash uses the Discrete Cosine Transform (DCT) to extract
//! frequency information from the image. This makes it more
//! robust to:
//! - Scaling
//! - Brightness/contrast changes
//! - Compression artifacts
//!
//! We use the image_hasher crate's DCT preprocessing with a mean hash over
//! an 8x8 grid, which yields 64 bits rendered as a decimal `u64`.

use crate::error::FingerprintError;
use image::DynamicImage;
use image_hasher::{HashAlg, HasherConfig as ImageHasherConfig};

/// Perceptual Hash (pHash) implementation using DCT
pub struct PerceptualHasher {
    /// Internal hasher from image_hasher crate
    hasher: image_hasher::Hasher,
}

impl PerceptualHasher {
    /// Create a new 8x8 pHash hasher
    pub fn new() -> Self {
        let hasher = ImageHasherConfig::new()
            .hash_size(8, 8)
            .hash_alg(HashAlg::Mean)
            .preproc_dct()
            .to_hasher();

        Self { hasher }
    }

    /// Compute the packed hash bits of an upright image
    pub fn hash_bits(&self, image: &DynamicImage) -> Result<u64, FingerprintError> {
        let hash = self.hasher.hash_image(image);
        let bytes = hash.as_bytes();

        if bytes.is_empty() {
            return Err(FingerprintError::ComputationFailed(
                "pHash produced no bits".to_string(),
            ));
        }

        Ok(bytes
            .iter()
            .take(8)
            .fold(0u64, |bits, byte| (bits << 8) | u64::from(*byte)))
    }

    /// Compute the fingerprint string of an upright image
    pub fn fingerprint(&self, image: &DynamicImage) -> Result<String, FingerprintError> {
        Ok(self.hash_bits(image)?.to_string())
    }
}

impl Default for PerceptualHasher {
    fn default() -> Self {
        Self::new()
    }
}
