use std::{cmp::Ordering, fmt::Display};

use static_assertions::const_assert;

use super::{compact_bits_by_3, expand_bits_by_3};

/// Integer address of a voxel (or of a branch node at a shallower level) in an octree. Each component holds
/// one bit per tree level, with the root level in the most significant used bit
#[derive(Debug, Default, PartialEq, Eq, Copy, Clone, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OctreeKey {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

// All three components of a key at maximum depth have to fit into one 64-bit Morton code
const_assert!(3 * OctreeKey::MAX_DEPTH as u32 <= u64::BITS);

impl OctreeKey {
    /// Maximum supported tree depth
    pub const MAX_DEPTH: u8 = 21;

    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Returns the child index (in `[0;7]`) of this key at the tree level selected by `depth_mask`. The
    /// x bit is the most significant bit of the child index, the z bit the least significant one
    ///
    /// ```
    /// # use voxtree_core::math::OctreeKey;
    /// let key = OctreeKey::new(0b10, 0b01, 0b11);
    /// assert_eq!(0b101, key.child_index(0b10));
    /// assert_eq!(0b011, key.child_index(0b01));
    /// ```
    #[inline]
    pub fn child_index(&self, depth_mask: u32) -> u8 {
        ((((self.x & depth_mask) != 0) as u8) << 2)
            | ((((self.y & depth_mask) != 0) as u8) << 1)
            | (((self.z & depth_mask) != 0) as u8)
    }

    /// Returns the key of the child with index `child_index` one level below the node addressed by this key
    ///
    /// ```
    /// # use voxtree_core::math::OctreeKey;
    /// let root = OctreeKey::default();
    /// let child = root.child_key(0b110);
    /// assert_eq!(OctreeKey::new(1, 1, 0), child);
    /// assert_eq!(OctreeKey::new(2, 3, 1), child.child_key(0b011));
    /// ```
    #[inline]
    pub fn child_key(&self, child_index: u8) -> Self {
        Self {
            x: (self.x << 1) | ((child_index >> 2) & 1) as u32,
            y: (self.y << 1) | ((child_index >> 1) & 1) as u32,
            z: (self.z << 1) | (child_index & 1) as u32,
        }
    }

    /// Returns true if every component fits into `depth` bits
    pub fn fits_depth(&self, depth: u8) -> bool {
        let limit = 1_u64 << depth;
        (self.x as u64) < limit && (self.y as u64) < limit && (self.z as u64) < limit
    }

    /// Interleaves the components into a 64-bit Morton code. Per level, the x bit is the most significant of
    /// the three bits, matching [child_index](OctreeKey::child_index), so that the Morton codes of all leaves
    /// sort in the same order in which a depth-first traversal visits them
    pub fn morton_code(&self) -> u64 {
        (expand_bits_by_3(self.x as u64) << 2)
            | (expand_bits_by_3(self.y as u64) << 1)
            | expand_bits_by_3(self.z as u64)
    }

    /// Inverse of [morton_code](OctreeKey::morton_code)
    pub fn from_morton_code(code: u64) -> Self {
        Self {
            x: compact_bits_by_3(code >> 2) as u32,
            y: compact_bits_by_3(code >> 1) as u32,
            z: compact_bits_by_3(code) as u32,
        }
    }
}

impl Ord for OctreeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.morton_code().cmp(&other.morton_code())
    }
}

impl PartialOrd for OctreeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for OctreeKey {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(fmt, "({}, {}, {})", self.x, self.y, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_morton_roundtrip() {
        let key = OctreeKey::new(0x1FFFFF, 12345, 0);
        assert_eq!(key, OctreeKey::from_morton_code(key.morton_code()));
    }

    #[test]
    fn test_ordering_follows_traversal() {
        // Walk two levels depth-first and make sure the keys come out sorted
        let mut keys = vec![];
        for first in 0..8 {
            for second in 0..8 {
                keys.push(OctreeKey::default().child_key(first).child_key(second));
            }
        }
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_fits_depth() {
        assert!(OctreeKey::new(255, 0, 7).fits_depth(8));
        assert!(!OctreeKey::new(256, 0, 7).fits_depth(8));
    }
}
