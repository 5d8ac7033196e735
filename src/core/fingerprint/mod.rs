//! # Fingerprint Module
//!
//! Computes the fingerprints used as duplicate-grouping keys.
//!
//! ## Supported Kinds
//! - **Exact** - BLAKE3 over the file bytes
//! - **dHash (Difference Hash)** - rotation-tolerant gradient bits, the primary mode
//! - **pHash (Perceptual Hash)** - rotation-tolerant DCT structure
//!
//! ## How It Works
//! 1. Storage decodes the image upright, using the rotation recorded in its EXIF tag
//! 2. It is reduced to a small fixed grid, independent of its aspect ratio
//! 3. Bits are extracted from pixel relationships and packed into a `u64`
//! 4. The integer is rendered as a decimal string
//!
//! Two entries are duplicates under a kind iff their strings are equal;
//! no distance threshold is applied.
//!
//! ## Example
//! ```rust,ignore
//! use media_catalog::core::fingerprint::{FingerprintCalculator, FingerprintKind, FingerprintSource};
//!
//! let calculator = FingerprintCalculator::new(&[FingerprintKind::Difference]);
//! let fingerprint = calculator.compute(FingerprintKind::Difference, &source)?;
//! ```

mod difference;
mod exact;
mod kind;
mod perceptual;

pub use difference::DifferenceHasher;
pub use exact::exact_fingerprint;
pub use kind::{FingerprintKind, FingerprintKinds};
pub use perceptual::PerceptualHasher;

use crate::core::model::{Fingerprints, SENTINEL_FINGERPRINT};
use crate::error::FingerprintError;
use image::DynamicImage;

/// What a fingerprint is computed from
#[derive(Clone, Copy)]
pub struct FingerprintSource<'a> {
    /// Full file contents
    pub bytes: &'a [u8],
    /// Decoded, already upright image; `None` when decoding failed
    pub image: Option<&'a DynamicImage>,
}

/// Fingerprints computed for one file, plus the first failure if any
#[derive(Debug, Clone)]
pub struct FingerprintOutcome {
    pub fingerprints: Fingerprints,
    pub failure: Option<String>,
}

/// Computes the enabled fingerprint kinds
pub struct FingerprintCalculator {
    enabled: Vec<FingerprintKind>,
    difference: DifferenceHasher,
    perceptual: PerceptualHasher,
}

impl FingerprintCalculator {
    /// Create a calculator for the given kinds
    pub fn new(enabled: &[FingerprintKind]) -> Self {
        let mut enabled = enabled.to_vec();
        enabled.sort();
        enabled.dedup();

        Self {
            enabled,
            difference: DifferenceHasher::new(),
            perceptual: PerceptualHasher::new(),
        }
    }

    pub fn enabled(&self) -> &[FingerprintKind] {
        &self.enabled
    }

    pub fn enabled_kinds(&self) -> FingerprintKinds {
        FingerprintKinds::of(&self.enabled)
    }

    /// Compute one fingerprint
    pub fn compute(
        &self,
        kind: FingerprintKind,
        source: &FingerprintSource<'_>,
    ) -> Result<String, FingerprintError> {
        match kind {
            FingerprintKind::Exact => Ok(exact_fingerprint(source.bytes)),
            FingerprintKind::Difference => self.difference.fingerprint(Self::pixels(source)?),
            FingerprintKind::Perceptual => self.perceptual.fingerprint(Self::pixels(source)?),
        }
    }

    /// Compute every enabled kind.
    ///
    /// Disabled kinds and failed computations hold the sentinel value.
    /// Every enabled kind is recorded as computed, including failed ones.
    pub fn compute_enabled(&self, source: &FingerprintSource<'_>) -> FingerprintOutcome {
        let mut fingerprints = Fingerprints::unset();
        fingerprints.computed = self.enabled_kinds();
        let mut failure = None;

        for kind in &self.enabled {
            match self.compute(*kind, source) {
                Ok(value) => fingerprints.set(*kind, value),
                Err(e) => {
                    fingerprints.set(*kind, SENTINEL_FINGERPRINT.to_string());
                    failure.get_or_insert_with(|| format!("{} unavailable: {}", kind, e));
                }
            }
        }

        FingerprintOutcome {
            fingerprints,
            failure,
        }
    }

    fn pixels<'a>(source: &FingerprintSource<'a>) -> Result<&'a DynamicImage, FingerprintError> {
        source.image.ok_or_else(|| {
            FingerprintError::ComputationFailed("image could not be decoded".to_string())
        })
    }
}
