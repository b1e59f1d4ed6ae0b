use anyhow::Result;

use super::{LeafContainer, Octree};
use crate::math::OctreeKey;

/// Pair of octrees for successive frames of a point cloud. New points go into the current tree, while the previous
/// tree keeps the last frame for comparison. Both trees always have the same depth
///
/// The structure of the current tree can be serialized relative to the previous one: each branch is coded as the
/// XOR of the two occupancy bytes, which is mostly zero bits for slowly changing scenes
pub struct DoubleBufferedOctree<L> {
    current: Octree<L>,
    previous: Octree<L>,
}

impl<L: LeafContainer> DoubleBufferedOctree<L> {
    /// Creates two empty octrees of the given depth. Panics if `depth` is invalid, see [Octree::new]
    pub fn new(depth: u8) -> Self {
        Self {
            current: Octree::new(depth),
            previous: Octree::new(depth),
        }
    }

    pub fn current(&self) -> &Octree<L> {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut Octree<L> {
        &mut self.current
    }

    pub fn previous(&self) -> &Octree<L> {
        &self.previous
    }

    pub fn depth(&self) -> u8 {
        self.current.depth()
    }

    /// Changes the depth of both trees. Panics unless both trees are empty
    pub fn set_depth(&mut self, depth: u8) {
        self.current.set_depth(depth);
        self.previous.set_depth(depth);
    }

    /// Returns true if neither the current nor the previous tree has leaves
    pub fn is_empty(&self) -> bool {
        self.current.is_empty() && self.previous.is_empty()
    }

    /// Makes the current tree the previous one and starts a new, empty current tree
    pub fn switch_buffers(&mut self) {
        std::mem::swap(&mut self.current, &mut self.previous);
        self.current.clear();
    }

    /// Clears both trees
    pub fn clear(&mut self) {
        self.current.clear();
        self.previous.clear();
    }

    /// Grows both trees by one level, see [Octree::grow_root]
    pub fn grow_root(&mut self, child_index: u8) {
        self.current.grow_root(child_index);
        self.previous.grow_root(child_index);
    }

    /// Writes the structure of the current tree relative to the previous tree. `leaf_fn` is called for every
    /// leaf of the current tree together with the leaf at the same key in the previous tree, if there is one
    pub fn serialize_tree_delta<F: FnMut(&OctreeKey, &L, Option<&L>)>(
        &self,
        out: &mut Vec<u8>,
        mut leaf_fn: F,
    ) {
        self.current
            .serialize_against(Some(&self.previous), out, &mut leaf_fn);
    }

    /// Rebuilds the current tree from data written by [serialize_tree_delta](DoubleBufferedOctree::serialize_tree_delta),
    /// using the previous tree as the reference. The previous tree must match the one the data was written against
    ///
    /// # Errors
    ///
    /// The same as [Octree::deserialize_tree]
    pub fn deserialize_tree_delta<F: FnMut(&OctreeKey, &mut L, Option<&L>) -> Result<()>>(
        &mut self,
        data: &[u8],
        mut leaf_fn: F,
    ) -> Result<()> {
        let Self { current, previous } = self;
        current.deserialize_against(Some(&*previous), data, &mut leaf_fn)
    }

    /// Keys of all leaves that exist in the current tree but not in the previous tree, in depth-first order
    pub fn new_leaf_keys(&self) -> Vec<OctreeKey> {
        self.current
            .leaves()
            .filter(|(key, _)| !self.previous.exists(key))
            .map(|(key, _)| key)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::octree::{EmptyLeaf, PointIndices};
    use nalgebra::Vector3;

    fn insert_all(octree: &mut DoubleBufferedOctree<EmptyLeaf>, keys: &[(u32, u32, u32)]) {
        for (x, y, z) in keys {
            octree.current_mut().insert(&OctreeKey::new(*x, *y, *z));
        }
    }

    #[test]
    fn test_switch_buffers() {
        let mut octree = DoubleBufferedOctree::<PointIndices>::new(3);
        octree
            .current_mut()
            .insert(&OctreeKey::new(1, 1, 1))
            .accumulate(0, &Vector3::zeros());
        octree.switch_buffers();
        assert!(octree.current().is_empty());
        assert!(octree.previous().exists(&OctreeKey::new(1, 1, 1)));
        assert!(!octree.is_empty());
    }

    #[test]
    fn test_identical_frames_produce_zero_delta() {
        let keys = [(0, 0, 0), (3, 5, 7), (7, 7, 7)];
        let mut octree = DoubleBufferedOctree::<EmptyLeaf>::new(3);
        insert_all(&mut octree, &keys);
        octree.switch_buffers();
        insert_all(&mut octree, &keys);

        let mut bytes = vec![];
        let mut leaves_with_reference = 0;
        octree.serialize_tree_delta(&mut bytes, |_, _, previous| {
            if previous.is_some() {
                leaves_with_reference += 1;
            }
        });
        assert_eq!(octree.current().branch_count(), bytes.len());
        assert!(bytes.iter().all(|mask| *mask == 0));
        assert_eq!(3, leaves_with_reference);
        assert!(octree.new_leaf_keys().is_empty());
    }

    #[test]
    fn test_delta_round_trip() {
        let first = [(0, 0, 0), (3, 5, 7), (7, 7, 7)];
        let second = [(0, 0, 1), (3, 5, 7), (6, 2, 1)];

        let mut encoder = DoubleBufferedOctree::<EmptyLeaf>::new(3);
        let mut decoder = DoubleBufferedOctree::<EmptyLeaf>::new(3);

        let mut first_bytes = vec![];
        insert_all(&mut encoder, &first);
        encoder.serialize_tree_delta(&mut first_bytes, |_, _, _| {});
        decoder
            .deserialize_tree_delta(&first_bytes, |_, _, _| Ok(()))
            .unwrap();

        encoder.switch_buffers();
        decoder.switch_buffers();

        let mut second_bytes = vec![];
        insert_all(&mut encoder, &second);
        encoder.serialize_tree_delta(&mut second_bytes, |_, _, _| {});
        let mut carried_over = vec![];
        decoder
            .deserialize_tree_delta(&second_bytes, |key, _, previous| {
                if previous.is_some() {
                    carried_over.push(*key);
                }
                Ok(())
            })
            .unwrap();

        assert_eq!(vec![OctreeKey::new(3, 5, 7)], carried_over);
        let expected = encoder.current().leaves().map(|(k, _)| k).collect::<Vec<_>>();
        let decoded = decoder.current().leaves().map(|(k, _)| k).collect::<Vec<_>>();
        assert_eq!(expected, decoded);
        assert_eq!(
            vec![OctreeKey::new(0, 0, 1), OctreeKey::new(6, 2, 1)],
            decoder.new_leaf_keys()
        );
    }

    #[test]
    fn test_grow_root_keeps_buffers_aligned() {
        let mut octree = DoubleBufferedOctree::<EmptyLeaf>::new(1);
        insert_all(&mut octree, &[(1, 1, 1)]);
        octree.switch_buffers();
        insert_all(&mut octree, &[(1, 1, 1)]);
        octree.grow_root(0);
        assert_eq!(2, octree.previous().depth());
        assert!(octree.previous().exists(&OctreeKey::new(1, 1, 1)));
        assert!(octree.new_leaf_keys().is_empty());
    }
}
