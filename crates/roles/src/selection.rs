//! Chunk index selection for performance challenges.

use alloy_primitives::Keccak256;
use rand::{Rng, SeedableRng, rngs::StdRng};
use tether_primitives::{ChallengeId, ChunkIndex, ChunkRange, PeerKey};

use crate::IndexSelection;

/// Draws indices for one hoster: a uniformly chosen range, then a uniform
/// index inside it.
pub(crate) struct IndexPicker {
    rng: StdRng,
}

impl IndexPicker {
    /// `Seeded` derives the generator from `keccak256(challenge || hoster)`, so
    /// anyone can recompute the picks.
    pub(crate) fn new(policy: IndexSelection, challenge: ChallengeId, hoster: &PeerKey) -> Self {
        let rng = match policy {
            IndexSelection::Seeded => {
                let mut hasher = Keccak256::new();
                hasher.update(challenge.0.to_le_bytes());
                hasher.update(hoster.as_bytes());
                StdRng::from_seed(hasher.finalize().0)
            }
            IndexSelection::Random => StdRng::from_rng(&mut rand::rng()),
        };
        Self { rng }
    }

    /// Picks one index covered by `ranges`, or `None` if there are none.
    pub(crate) fn pick(&mut self, ranges: &[ChunkRange]) -> Option<ChunkIndex> {
        if ranges.is_empty() {
            return None;
        }
        let range = ranges.get(self.rng.random_range(0..ranges.len()))?;
        Some(self.rng.random_range(range.start()..=range.end()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges() -> Vec<ChunkRange> {
        vec![ChunkRange::new(0, 9).unwrap(), ChunkRange::new(100, 104).unwrap()]
    }

    #[test]
    fn test_seeded_picks_are_reproducible() {
        let hoster = PeerKey::new([4; 32]);
        let picks = |challenge| {
            let mut picker = IndexPicker::new(IndexSelection::Seeded, challenge, &hoster);
            (0..8).map(|_| picker.pick(&ranges()).unwrap()).collect::<Vec<_>>()
        };
        assert_eq!(picks(ChallengeId(1)), picks(ChallengeId(1)));
        assert_ne!(picks(ChallengeId(1)), picks(ChallengeId(2)));
    }

    #[test]
    fn test_picks_stay_in_ranges() {
        let mut picker = IndexPicker::new(IndexSelection::Random, ChallengeId(1), &PeerKey::new([1; 32]));
        for _ in 0..64 {
            let index = picker.pick(&ranges()).unwrap();
            assert!(ranges().iter().any(|r| r.contains(index)));
        }
        assert_eq!(picker.pick(&[]), None);
    }
}
