//! Fingerprint kinds.

use serde::{Deserialize, Serialize};

/// Available fingerprint kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintKind {
    /// BLAKE3 digest of the file bytes - only bit-identical files match
    Exact,
    /// Difference Hash (dHash) - rotation-compensated brightness gradients
    Difference,
    /// Perceptual Hash (pHash) - rotation-compensated DCT structure
    Perceptual,
}

impl FingerprintKind {
    /// All kinds, in slot order
    pub const ALL: [FingerprintKind; 3] = [
        FingerprintKind::Exact,
        FingerprintKind::Difference,
        FingerprintKind::Perceptual,
    ];

    fn bit(self) -> u8 {
        match self {
            FingerprintKind::Exact => 0b001,
            FingerprintKind::Difference => 0b010,
            FingerprintKind::Perceptual => 0b100,
        }
    }
}

impl std::fmt::Display for FingerprintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FingerprintKind::Exact => write!(f, "blake3"),
            FingerprintKind::Difference => write!(f, "dHash"),
            FingerprintKind::Perceptual => write!(f, "pHash"),
        }
    }
}

/// A set of fingerprint kinds, stored as a bit mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FingerprintKinds(u8);

impl FingerprintKinds {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn of(kinds: &[FingerprintKind]) -> Self {
        kinds.iter().fold(Self::empty(), |mut set, kind| {
            set.insert(*kind);
            set
        })
    }

    /// Rebuild from a persisted mask; unknown bits are dropped
    pub fn from_bits(bits: u8) -> Self {
        Self(bits & 0b111)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn insert(&mut self, kind: FingerprintKind) {
        self.0 |= kind.bit();
    }

    pub fn contains(self, kind: FingerprintKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Whether every kind in `other` is also in `self`
    pub fn contains_all(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Members in slot order
    pub fn iter(self) -> impl Iterator<Item = FingerprintKind> {
        FingerprintKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_display() {
        assert_eq!(FingerprintKind::Exact.to_string(), "blake3");
        assert_eq!(FingerprintKind::Difference.to_string(), "dHash");
        assert_eq!(FingerprintKind::Perceptual.to_string(), "pHash");
    }

    #[test]
    fn kind_serializes_lowercase() {
        let json = serde_json::to_string(&FingerprintKind::Difference).unwrap();
        assert_eq!(json, "\"difference\"");
    }

    #[test]
    fn kind_set_membership() {
        let set = FingerprintKinds::of(&[FingerprintKind::Perceptual, FingerprintKind::Exact]);

        assert!(set.contains(FingerprintKind::Exact));
        assert!(!set.contains(FingerprintKind::Difference));
        assert!(set.contains_all(FingerprintKinds::of(&[FingerprintKind::Perceptual])));
        assert!(!set.contains_all(FingerprintKinds::of(&FingerprintKind::ALL)));
        assert!(set.contains_all(FingerprintKinds::empty()));
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![FingerprintKind::Exact, FingerprintKind::Perceptual]
        );
    }

    #[test]
    fn kind_set_survives_its_bit_mask() {
        let set = FingerprintKinds::of(&[FingerprintKind::Difference]);
        assert_eq!(FingerprintKinds::from_bits(set.bits()), set);
        assert_eq!(FingerprintKinds::from_bits(0xF8), FingerprintKinds::empty());
    }
}
