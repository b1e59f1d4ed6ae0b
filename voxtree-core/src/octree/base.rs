use anyhow::Result;

use super::{
    node_arena::{occupancy_mask, NodeArena, NodeId, EMPTY_CHILDREN, EMPTY_NODE},
    LeafContainer,
};
use crate::{math::OctreeKey, OctreeError};

/// Sparse octree of fixed depth with payload `L` in its leaves. All leaves are at the same depth; branch nodes
/// exist exactly where at least one leaf exists below them
///
/// Nodes live in an arena and refer to their children by index. The tree is serialized as one occupancy byte
/// per branch in depth-first order, children visited in ascending child index:
///
/// ```
/// # use voxtree_core::{math::OctreeKey, octree::{Octree, EmptyLeaf}};
/// let mut octree = Octree::<EmptyLeaf>::new(2);
/// octree.insert(&OctreeKey::new(0, 0, 0));
/// octree.insert(&OctreeKey::new(3, 3, 3));
/// let mut bytes = vec![];
/// octree.serialize_tree(&mut bytes, |_, _| {});
/// assert_eq!(vec![0b1000_0001, 0b0000_0001, 0b1000_0000], bytes);
/// ```
pub struct Octree<L> {
    arena: NodeArena<L>,
    root: NodeId,
    depth: u8,
    leaf_count: usize,
    branch_count: usize,
}

impl<L: LeafContainer> Octree<L> {
    /// Creates an empty octree whose leaves are `depth` levels below the root. Panics if `depth` is not in
    /// `[1;MAX_DEPTH]`
    pub fn new(depth: u8) -> Self {
        Self::assert_valid_depth(depth);
        Self {
            arena: Default::default(),
            root: EMPTY_NODE,
            depth,
            leaf_count: 0,
            branch_count: 0,
        }
    }

    fn assert_valid_depth(depth: u8) {
        if depth == 0 || depth > OctreeKey::MAX_DEPTH {
            panic!(
                "Octree: Depth must be in [1;{}], but was {}",
                OctreeKey::MAX_DEPTH,
                depth
            );
        }
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// Changes the depth of an empty octree. Panics if the octree has leaves or `depth` is invalid
    pub fn set_depth(&mut self, depth: u8) {
        Self::assert_valid_depth(depth);
        if !self.is_empty() {
            panic!("Octree::set_depth: Depth can only be changed while the octree is empty");
        }
        self.depth = depth;
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    pub fn branch_count(&self) -> usize {
        self.branch_count
    }

    pub fn is_empty(&self) -> bool {
        self.root == EMPTY_NODE
    }

    /// Removes all nodes. The depth is kept
    pub fn clear(&mut self) {
        self.arena.clear();
        self.root = EMPTY_NODE;
        self.leaf_count = 0;
        self.branch_count = 0;
    }

    /// Root node, [EMPTY_NODE] for an empty octree
    pub(crate) fn root_node(&self) -> NodeId {
        self.root
    }

    pub(crate) fn node_children(&self, node: NodeId) -> &[NodeId; 8] {
        self.arena.children(node)
    }

    pub(crate) fn node_leaf(&self, node: NodeId) -> &L {
        self.arena.leaf(node)
    }

    #[inline]
    fn depth_mask(&self, level: u8) -> u32 {
        1 << (self.depth - 1 - level)
    }

    /// Returns the leaf at `key`, creating it and all missing branches on the way if necessary. Panics if `key`
    /// does not fit the depth of this octree
    pub fn insert(&mut self, key: &OctreeKey) -> &mut L {
        if !key.fits_depth(self.depth) {
            panic!(
                "Octree::insert: Key {} does not fit into an octree of depth {}",
                key, self.depth
            );
        }
        if self.root == EMPTY_NODE {
            self.root = self.arena.insert_branch();
            self.branch_count += 1;
        }
        let mut node = self.root;
        for level in 0..self.depth {
            let child_index = key.child_index(self.depth_mask(level)) as usize;
            let is_leaf_level = level + 1 == self.depth;
            let mut child = self.arena.children(node)[child_index];
            if child == EMPTY_NODE {
                child = if is_leaf_level {
                    self.leaf_count += 1;
                    self.arena.insert_leaf(L::default())
                } else {
                    self.branch_count += 1;
                    self.arena.insert_branch()
                };
                self.arena.children_mut(node)[child_index] = child;
            }
            node = child;
        }
        self.arena.leaf_mut(node)
    }

    fn find_leaf_id(&self, key: &OctreeKey) -> Option<NodeId> {
        if self.root == EMPTY_NODE || !key.fits_depth(self.depth) {
            return None;
        }
        let mut node = self.root;
        for level in 0..self.depth {
            let child_index = key.child_index(self.depth_mask(level)) as usize;
            node = self.arena.children(node)[child_index];
            if node == EMPTY_NODE {
                return None;
            }
        }
        Some(node)
    }

    /// Returns the leaf at `key`, if it exists
    pub fn find(&self, key: &OctreeKey) -> Option<&L> {
        self.find_leaf_id(key).map(move |id| self.arena.leaf(id))
    }

    pub fn find_mut(&mut self, key: &OctreeKey) -> Option<&mut L> {
        let id = self.find_leaf_id(key)?;
        Some(self.arena.leaf_mut(id))
    }

    pub fn exists(&self, key: &OctreeKey) -> bool {
        self.find_leaf_id(key).is_some()
    }

    /// Removes the leaf at `key` and returns its payload. Branches that become empty are removed too, up to and
    /// including the root
    pub fn remove(&mut self, key: &OctreeKey) -> Option<L> {
        if self.root == EMPTY_NODE || !key.fits_depth(self.depth) {
            return None;
        }
        let mut path = Vec::with_capacity(self.depth as usize);
        let mut node = self.root;
        for level in 0..self.depth {
            let child_index = key.child_index(self.depth_mask(level)) as usize;
            path.push((node, child_index));
            node = self.arena.children(node)[child_index];
            if node == EMPTY_NODE {
                return None;
            }
        }

        let leaf = match self.arena.remove(node) {
            Some(super::node_arena::Node::Leaf(leaf)) => leaf,
            _ => unreachable!("Octree::remove: Node at leaf level is not a leaf"),
        };
        self.leaf_count -= 1;

        while let Some((parent, child_index)) = path.pop() {
            let children = self.arena.children_mut(parent);
            children[child_index] = EMPTY_NODE;
            if *children != EMPTY_CHILDREN {
                break;
            }
            self.arena.remove(parent);
            self.branch_count -= 1;
            if parent == self.root {
                self.root = EMPTY_NODE;
            }
        }
        Some(leaf)
    }

    /// Adds a new root above the current root and places the current root at `child_index` of the new root. The
    /// depth grows by one, so all existing keys gain a leading bit given by `child_index`
    pub fn grow_root(&mut self, child_index: u8) {
        if self.depth >= OctreeKey::MAX_DEPTH {
            panic!(
                "Octree::grow_root: Octree already has the maximum depth {}",
                OctreeKey::MAX_DEPTH
            );
        }
        if self.root != EMPTY_NODE {
            let new_root = self.arena.insert_branch();
            self.arena.children_mut(new_root)[child_index as usize & 7] = self.root;
            self.root = new_root;
            self.branch_count += 1;
        }
        self.depth += 1;
    }

    /// Iterates over all leaves in depth-first order
    pub fn leaves(&self) -> LeafIter<'_, L> {
        let mut stack = vec![];
        if self.root != EMPTY_NODE {
            stack.push((self.root, OctreeKey::default(), 0));
        }
        LeafIter {
            octree: self,
            stack,
        }
    }

    /// Calls `leaf_fn` for every leaf in depth-first order with mutable access to the leaf
    pub fn for_each_leaf_mut<F: FnMut(&OctreeKey, &mut L)>(&mut self, mut leaf_fn: F) {
        if self.root != EMPTY_NODE {
            self.for_each_leaf_mut_recursive(self.root, OctreeKey::default(), 0, &mut leaf_fn);
        }
    }

    fn for_each_leaf_mut_recursive<F: FnMut(&OctreeKey, &mut L)>(
        &mut self,
        node: NodeId,
        key: OctreeKey,
        level: u8,
        leaf_fn: &mut F,
    ) {
        let children = *self.arena.children(node);
        for (child_index, child) in children.iter().enumerate() {
            if *child == EMPTY_NODE {
                continue;
            }
            let child_key = key.child_key(child_index as u8);
            if level + 1 == self.depth {
                leaf_fn(&child_key, self.arena.leaf_mut(*child));
            } else {
                self.for_each_leaf_mut_recursive(*child, child_key, level + 1, leaf_fn);
            }
        }
    }

    /// Writes the structure of this octree to `out` and calls `leaf_fn` for every leaf in the order in which
    /// leaves are encountered. An empty octree produces no bytes
    pub fn serialize_tree<F: FnMut(&OctreeKey, &L)>(&self, out: &mut Vec<u8>, mut leaf_fn: F) {
        self.serialize_against(None, out, &mut |key, leaf, _| leaf_fn(key, leaf));
    }

    /// Calls `leaf_fn` for every leaf, in the same order as [serialize_tree](Octree::serialize_tree) does
    pub fn serialize_leaves<F: FnMut(&OctreeKey, &L)>(&self, mut leaf_fn: F) {
        for (key, leaf) in self.leaves() {
            leaf_fn(&key, leaf);
        }
    }

    /// Replaces the contents of this octree with the structure in `data`. For every leaf that is created,
    /// `leaf_fn` is called with the new (default) leaf, so that the payload can be read from elsewhere
    ///
    /// # Errors
    ///
    /// [OctreeError::TruncatedStructure] if `data` ends in the middle of the tree, [OctreeError::TrailingStructure]
    /// if bytes are left after the tree is complete and [OctreeError::EmptyBranch] if a branch has no children. Any
    /// error returned by `leaf_fn` is passed on. On error, the octree is left empty
    pub fn deserialize_tree<F: FnMut(&OctreeKey, &mut L) -> Result<()>>(
        &mut self,
        data: &[u8],
        mut leaf_fn: F,
    ) -> Result<()> {
        self.deserialize_against(None, data, &mut |key, leaf, _| leaf_fn(key, leaf))
    }

    /// Serializes this octree relative to `reference`: every branch is written as the XOR of its own occupancy
    /// byte and the occupancy byte of the node at the same position in `reference`. Both octrees must have the
    /// same depth
    pub(crate) fn serialize_against<F: FnMut(&OctreeKey, &L, Option<&L>)>(
        &self,
        reference: Option<&Octree<L>>,
        out: &mut Vec<u8>,
        leaf_fn: &mut F,
    ) {
        if self.root == EMPTY_NODE {
            return;
        }
        let reference_root = reference.map(|r| r.root).unwrap_or(EMPTY_NODE);
        self.serialize_recursive(
            reference,
            self.root,
            reference_root,
            OctreeKey::default(),
            0,
            out,
            leaf_fn,
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn serialize_recursive<F: FnMut(&OctreeKey, &L, Option<&L>)>(
        &self,
        reference: Option<&Octree<L>>,
        node: NodeId,
        reference_node: NodeId,
        key: OctreeKey,
        level: u8,
        out: &mut Vec<u8>,
        leaf_fn: &mut F,
    ) {
        let children = self.arena.children(node);
        let reference_children = match reference {
            Some(r) if reference_node != EMPTY_NODE => r.arena.children(reference_node),
            _ => &EMPTY_CHILDREN,
        };
        out.push(occupancy_mask(children) ^ occupancy_mask(reference_children));

        for (child_index, child) in children.iter().enumerate() {
            if *child == EMPTY_NODE {
                continue;
            }
            let child_key = key.child_key(child_index as u8);
            let reference_child = reference_children[child_index];
            if level + 1 == self.depth {
                let reference_leaf = match reference {
                    Some(r) if reference_child != EMPTY_NODE => Some(r.arena.leaf(reference_child)),
                    _ => None,
                };
                leaf_fn(&child_key, self.arena.leaf(*child), reference_leaf);
            } else {
                self.serialize_recursive(
                    reference,
                    *child,
                    reference_child,
                    child_key,
                    level + 1,
                    out,
                    leaf_fn,
                );
            }
        }
    }

    /// Inverse of [serialize_against](Octree::serialize_against). Clears this octree first
    pub(crate) fn deserialize_against<F: FnMut(&OctreeKey, &mut L, Option<&L>) -> Result<()>>(
        &mut self,
        reference: Option<&Octree<L>>,
        data: &[u8],
        leaf_fn: &mut F,
    ) -> Result<()> {
        self.clear();
        if data.is_empty() {
            return Ok(());
        }
        self.root = self.arena.insert_branch();
        self.branch_count = 1;
        let reference_root = reference.map(|r| r.root).unwrap_or(EMPTY_NODE);
        let mut cursor = data.iter();
        let result = self
            .deserialize_recursive(
                reference,
                &mut cursor,
                data.len(),
                self.root,
                reference_root,
                OctreeKey::default(),
                0,
                leaf_fn,
            )
            .and_then(|_| {
                if cursor.len() > 0 {
                    Err(OctreeError::TrailingStructure(cursor.len()).into())
                } else {
                    Ok(())
                }
            });
        if result.is_err() {
            self.clear();
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn deserialize_recursive<F: FnMut(&OctreeKey, &mut L, Option<&L>) -> Result<()>>(
        &mut self,
        reference: Option<&Octree<L>>,
        cursor: &mut std::slice::Iter<'_, u8>,
        data_len: usize,
        node: NodeId,
        reference_node: NodeId,
        key: OctreeKey,
        level: u8,
        leaf_fn: &mut F,
    ) -> Result<()> {
        let coded_mask = *cursor
            .next()
            .ok_or(OctreeError::TruncatedStructure(data_len))?;
        let reference_children = match reference {
            Some(r) if reference_node != EMPTY_NODE => *r.arena.children(reference_node),
            _ => EMPTY_CHILDREN,
        };
        let mask = coded_mask ^ occupancy_mask(&reference_children);
        if mask == 0 {
            return Err(OctreeError::EmptyBranch { depth: level }.into());
        }

        for child_index in (0..8_u8).filter(|idx| mask & (1 << idx) != 0) {
            let child_key = key.child_key(child_index);
            let reference_child = reference_children[child_index as usize];
            if level + 1 == self.depth {
                let child = self.arena.insert_leaf(L::default());
                self.arena.children_mut(node)[child_index as usize] = child;
                self.leaf_count += 1;
                let reference_leaf = match reference {
                    Some(r) if reference_child != EMPTY_NODE => Some(r.arena.leaf(reference_child)),
                    _ => None,
                };
                leaf_fn(&child_key, self.arena.leaf_mut(child), reference_leaf)?;
            } else {
                let child = self.arena.insert_branch();
                self.arena.children_mut(node)[child_index as usize] = child;
                self.branch_count += 1;
                self.deserialize_recursive(
                    reference,
                    cursor,
                    data_len,
                    child,
                    reference_child,
                    child_key,
                    level + 1,
                    leaf_fn,
                )?;
            }
        }
        Ok(())
    }
}

/// Iterator over the leaves of an [Octree] in depth-first order, yielding each leaf together with its key
pub struct LeafIter<'a, L> {
    octree: &'a Octree<L>,
    stack: Vec<(NodeId, OctreeKey, u8)>,
}

impl<'a, L: LeafContainer> Iterator for LeafIter<'a, L> {
    type Item = (OctreeKey, &'a L);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((node, key, level)) = self.stack.pop() {
            if level == self.octree.depth {
                return Some((key, self.octree.arena.leaf(node)));
            }
            let children = self.octree.arena.children(node);
            // Reverse, so that the lowest child index is popped first
            for child_index in (0..8).rev() {
                let child = children[child_index];
                if child != EMPTY_NODE {
                    self.stack
                        .push((child, key.child_key(child_index as u8), level + 1));
                }
            }
        }
        None
    }
}
