use slab::Slab;

/// Index of a node inside a [NodeArena]
pub(crate) type NodeId = u32;

/// A [NodeId] that doesn't point to anything
pub(crate) const EMPTY_NODE: NodeId = NodeId::MAX;

/// Child slots of a branch that has no children
pub(crate) const EMPTY_CHILDREN: [NodeId; 8] = [EMPTY_NODE; 8];

pub(crate) enum Node<L> {
    Branch([NodeId; 8]),
    Leaf(L),
}

/// Storage for the nodes of one octree. Nodes refer to their children by index, so the tree has a single owner
/// (the arena) and clearing it for the next frame keeps the allocation around
pub(crate) struct NodeArena<L> {
    nodes: Slab<Node<L>>,
}

impl<L> Default for NodeArena<L> {
    fn default() -> Self {
        Self {
            nodes: Default::default(),
        }
    }
}

impl<L> NodeArena<L> {
    #[inline]
    pub fn insert_branch(&mut self) -> NodeId {
        self.nodes.insert(Node::Branch(EMPTY_CHILDREN)) as NodeId
    }

    #[inline]
    pub fn insert_leaf(&mut self, leaf: L) -> NodeId {
        self.nodes.insert(Node::Leaf(leaf)) as NodeId
    }

    #[inline]
    pub fn remove(&mut self, id: NodeId) -> Option<Node<L>> {
        self.nodes.try_remove(id as usize)
    }

    #[inline]
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Child slots of the branch `id`. Panics if `id` is not a branch
    #[inline]
    pub fn children(&self, id: NodeId) -> &[NodeId; 8] {
        match self.nodes.get(id as usize) {
            Some(Node::Branch(children)) => children,
            _ => panic!("NodeArena::children: Node {} is not a branch", id),
        }
    }

    #[inline]
    pub fn children_mut(&mut self, id: NodeId) -> &mut [NodeId; 8] {
        match self.nodes.get_mut(id as usize) {
            Some(Node::Branch(children)) => children,
            _ => panic!("NodeArena::children_mut: Node {} is not a branch", id),
        }
    }

    /// Payload of the leaf `id`. Panics if `id` is not a leaf
    #[inline]
    pub fn leaf(&self, id: NodeId) -> &L {
        match self.nodes.get(id as usize) {
            Some(Node::Leaf(leaf)) => leaf,
            _ => panic!("NodeArena::leaf: Node {} is not a leaf", id),
        }
    }

    #[inline]
    pub fn leaf_mut(&mut self, id: NodeId) -> &mut L {
        match self.nodes.get_mut(id as usize) {
            Some(Node::Leaf(leaf)) => leaf,
            _ => panic!("NodeArena::leaf_mut: Node {} is not a leaf", id),
        }
    }
}

/// 8-bit existence mask of the given child slots. Bit `i` is set if child `i` exists
#[inline]
pub(crate) fn occupancy_mask(children: &[NodeId; 8]) -> u8 {
    children
        .iter()
        .enumerate()
        .filter(|(_, child)| **child != EMPTY_NODE)
        .fold(0, |mask, (index, _)| mask | (1 << index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occupancy_mask() {
        let mut children = EMPTY_CHILDREN;
        assert_eq!(0, occupancy_mask(&children));
        children[0] = 3;
        children[7] = 9;
        assert_eq!(0b1000_0001, occupancy_mask(&children));
    }

    #[test]
    fn test_removed_slots_are_reused() {
        let mut arena = NodeArena::<u32>::default();
        let a = arena.insert_leaf(1);
        let _b = arena.insert_branch();
        arena.remove(a);
        let c = arena.insert_leaf(2);
        assert_eq!(a, c);
        assert_eq!(2, *arena.leaf(c));
        assert_eq!(2, arena.len());
    }
}
