//! Inclusive chunk ranges.

use serde::{Deserialize, Serialize};

use crate::{ChunkIndex, RangeError};

/// Inclusive range `[start, end]` of chunk indices declared by a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkRange {
    start: ChunkIndex,
    end: ChunkIndex,
}

impl ChunkRange {
    /// Creates a range, rejecting `start > end`.
    pub fn new(start: ChunkIndex, end: ChunkIndex) -> Result<Self, RangeError> {
        if start > end {
            return Err(RangeError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    /// First index.
    pub fn start(&self) -> ChunkIndex {
        self.start
    }

    /// Last index (inclusive).
    pub fn end(&self) -> ChunkIndex {
        self.end
    }

    /// Number of chunks in the range.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Ranges are never empty.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns true if `index` lies within the range.
    pub fn contains(&self, index: ChunkIndex) -> bool {
        (self.start..=self.end).contains(&index)
    }

    /// Iterates the indices of the range.
    pub fn iter(&self) -> impl Iterator<Item = ChunkIndex> + use<> {
        self.start..=self.end
    }

    /// Maps an ordinal over the concatenation of `ranges` to a chunk index.
    ///
    /// Returns `None` once `ordinal` runs past the last range.
    pub fn nth_in(ranges: &[ChunkRange], mut ordinal: u64) -> Option<ChunkIndex> {
        for range in ranges {
            if ordinal < range.len() {
                return Some(range.start + ordinal);
            }
            ordinal -= range.len();
        }
        None
    }
}

/// Total number of chunks covered by `ranges`.
pub fn ranges_count(ranges: &[ChunkRange]) -> u64 {
    ranges.iter().map(ChunkRange::len).sum()
}
