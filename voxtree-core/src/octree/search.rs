use std::{cmp::Reverse, collections::BinaryHeap};

use float_ord::FloatOrd;
use nalgebra::{Point3, Vector3};

use super::{
    node_arena::{NodeId, EMPTY_NODE},
    Octree, OctreeBuffer, OctreePointCloud, PointIndices,
};
use crate::{containers::PointCloud, math::OctreeKey};

/// A point found by a neighbour search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index of the point in the input cloud
    pub index: u32,
    /// Squared Euclidean distance between the point and the query position
    pub squared_distance: f64,
}

/// Node waiting to be visited during a nearest neighbour search, ordered by its distance to the query
#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct PendingNode {
    squared_distance: FloatOrd<f64>,
    node: NodeId,
    key: OctreeKey,
    level: u8,
}

/// Candidate for the k nearest neighbours. The max-heap keeps the farthest candidate on top
#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct Candidate {
    squared_distance: FloatOrd<f64>,
    index: u32,
}

/// Component of a ray direction that replaces exact zeros, so that slab parameters stay finite
const RAY_DIRECTION_EPSILON: f64 = 1e-10;

/// Parametric ray traversal (Revelles et al., "An Efficient Parametric Algorithm for Octree Traversal"). The ray is
/// mirrored into the positive octant, so children are visited in the order the ray enters them. `mirror` maps a
/// child position of the mirrored ray back to the child index in the tree
struct RayTraversal<'t> {
    octree: &'t Octree<PointIndices>,
    mirror: u8,
    max_voxels: usize,
    leaves: Vec<(NodeId, OctreeKey)>,
}

impl<'t> RayTraversal<'t> {
    /// Child of a node that the ray enters first. `t0` holds the entry parameters and `tm` the parameters of the
    /// node's mid planes
    fn first_child(t0: &Vector3<f64>, tm: &Vector3<f64>) -> u8 {
        let entry = t0.max();
        let mut child = 0;
        if t0.x >= t0.y && t0.x >= t0.z {
            // Enters through the YZ plane
            if tm.y < entry {
                child |= 2;
            }
            if tm.z < entry {
                child |= 1;
            }
        } else if t0.y >= t0.z {
            // XZ plane
            if tm.x < entry {
                child |= 4;
            }
            if tm.z < entry {
                child |= 1;
            }
        } else {
            // XY plane
            if tm.x < entry {
                child |= 4;
            }
            if tm.y < entry {
                child |= 2;
            }
        }
        child
    }

    /// Child entered after leaving `child` at the exit parameters `t1`, or `None` if the ray leaves the parent
    fn next_child(child: u8, t1: &Vector3<f64>) -> Option<u8> {
        let exit_axis_bit = if t1.x < t1.y {
            if t1.x < t1.z {
                4
            } else {
                1
            }
        } else if t1.y < t1.z {
            2
        } else {
            1
        };
        if child & exit_axis_bit != 0 {
            None
        } else {
            Some(child | exit_axis_bit)
        }
    }

    fn is_full(&self) -> bool {
        self.leaves.len() >= self.max_voxels
    }

    fn visit(&mut self, t0: Vector3<f64>, t1: Vector3<f64>, node: NodeId, key: OctreeKey, level: u8) {
        // Nodes that the ray leaves before its origin
        if t1.min() < 0.0 || self.is_full() {
            return;
        }
        if level == self.octree.depth() {
            self.leaves.push((node, key));
            return;
        }
        let tm = (t0 + t1) * 0.5;
        let mut next = Some(Self::first_child(&t0, &tm));
        while let Some(child) = next {
            let mut child_t0 = t0;
            let mut child_t1 = tm;
            for axis in 0..3 {
                if child & (4 >> axis) != 0 {
                    child_t0[axis] = tm[axis];
                    child_t1[axis] = t1[axis];
                }
            }
            let child_index = child ^ self.mirror;
            let child_node = self.octree.node_children(node)[child_index as usize];
            if child_node != EMPTY_NODE {
                self.visit(child_t0, child_t1, child_node, key.child_key(child_index), level + 1);
            }
            if self.is_full() {
                return;
            }
            next = Self::next_child(child, &child_t1);
        }
    }
}

impl<'a, C: PointCloud, T: OctreeBuffer<PointIndices>> OctreePointCloud<'a, C, PointIndices, T> {
    /// Indices of all points in the voxel that contains `position`. `None` if the voxel is empty or outside of the
    /// octree
    pub fn voxel_search(&self, position: &Vector3<f64>) -> Option<&[u32]> {
        self.find_leaf_at_point(position)
            .map(|leaf| leaf.indices())
    }

    fn squared_distance_to_point(&self, query: &Vector3<f64>, index: u32) -> Option<f64> {
        let cloud = self.input_cloud()?;
        if index as usize >= cloud.len() {
            return None;
        }
        Some((cloud.position(index as usize) - query).norm_squared())
    }

    /// All points within `radius` of `position`, sorted by increasing distance. If `max_neighbors` is given, only
    /// that many of the closest points are returned. Without an input cloud, nothing is found
    pub fn radius_search(
        &self,
        position: &Vector3<f64>,
        radius: f64,
        max_neighbors: Option<usize>,
    ) -> Vec<Neighbor> {
        let octree = self.tree().active();
        let root = octree.root_node();
        if root == EMPTY_NODE || self.input_cloud().is_none() || !(radius >= 0.0) {
            return vec![];
        }
        let squared_radius = radius * radius;
        let query = Point3::from(*position);
        let mut found = vec![];
        let mut stack = vec![(root, OctreeKey::default(), 0_u8)];
        while let Some((node, key, level)) = stack.pop() {
            if level == octree.depth() {
                for index in octree.node_leaf(node).indices() {
                    if let Some(squared_distance) = self.squared_distance_to_point(position, *index) {
                        if squared_distance <= squared_radius {
                            found.push(Neighbor {
                                index: *index,
                                squared_distance,
                            });
                        }
                    }
                }
                continue;
            }
            for (child_index, child) in octree.node_children(node).iter().enumerate() {
                if *child == EMPTY_NODE {
                    continue;
                }
                let child_key = key.child_key(child_index as u8);
                let bounds = self.geometry().node_bounds(&child_key, level + 1);
                if bounds.squared_distance_to(&query) <= squared_radius {
                    stack.push((*child, child_key, level + 1));
                }
            }
        }
        found.sort_by_key(|neighbor| (FloatOrd(neighbor.squared_distance), neighbor.index));
        if let Some(max_neighbors) = max_neighbors {
            found.truncate(max_neighbors);
        }
        found
    }

    /// The `k` points closest to `position`, sorted by increasing distance. Fewer points are returned if the octree
    /// holds fewer than `k` points
    pub fn nearest_k_search(&self, position: &Vector3<f64>, k: usize) -> Vec<Neighbor> {
        let octree = self.tree().active();
        let root = octree.root_node();
        if root == EMPTY_NODE || k == 0 || self.input_cloud().is_none() {
            return vec![];
        }
        let query = Point3::from(*position);
        let mut pending = BinaryHeap::new();
        pending.push(Reverse(PendingNode {
            squared_distance: FloatOrd(0.0),
            node: root,
            key: OctreeKey::default(),
            level: 0,
        }));
        let mut candidates = BinaryHeap::<Candidate>::with_capacity(k + 1);

        while let Some(Reverse(next)) = pending.pop() {
            if candidates.len() == k {
                if let Some(farthest) = candidates.peek() {
                    if next.squared_distance > farthest.squared_distance {
                        break;
                    }
                }
            }
            if next.level == octree.depth() {
                for index in octree.node_leaf(next.node).indices() {
                    if let Some(squared_distance) = self.squared_distance_to_point(position, *index) {
                        candidates.push(Candidate {
                            squared_distance: FloatOrd(squared_distance),
                            index: *index,
                        });
                        if candidates.len() > k {
                            candidates.pop();
                        }
                    }
                }
                continue;
            }
            for (child_index, child) in octree.node_children(next.node).iter().enumerate() {
                if *child == EMPTY_NODE {
                    continue;
                }
                let child_key = next.key.child_key(child_index as u8);
                let bounds = self.geometry().node_bounds(&child_key, next.level + 1);
                pending.push(Reverse(PendingNode {
                    squared_distance: FloatOrd(bounds.squared_distance_to(&query)),
                    node: *child,
                    key: child_key,
                    level: next.level + 1,
                }));
            }
        }

        candidates
            .into_sorted_vec()
            .into_iter()
            .map(|candidate| Neighbor {
                index: candidate.index,
                squared_distance: candidate.squared_distance.0,
            })
            .collect()
    }

    /// Fast approximation of the nearest neighbour of `position`: descends into the occupied child whose center is
    /// closest to the query and returns the closest point of the leaf reached that way
    pub fn approx_nearest_search(&self, position: &Vector3<f64>) -> Option<Neighbor> {
        let octree = self.tree().active();
        let mut node = octree.root_node();
        if node == EMPTY_NODE {
            return None;
        }
        let query = Point3::from(*position);
        let mut key = OctreeKey::default();
        for level in 0..octree.depth() {
            let (child_index, child) = octree
                .node_children(node)
                .iter()
                .enumerate()
                .filter(|(_, child)| **child != EMPTY_NODE)
                .min_by_key(|(child_index, _)| {
                    let child_key = key.child_key(*child_index as u8);
                    let center = self.geometry().node_bounds(&child_key, level + 1).center();
                    FloatOrd(nalgebra::distance_squared(&center, &query))
                })?;
            key = key.child_key(child_index as u8);
            node = *child;
        }
        octree
            .node_leaf(node)
            .indices()
            .iter()
            .filter_map(|index| {
                self.squared_distance_to_point(position, *index)
                    .map(|squared_distance| Neighbor {
                        index: *index,
                        squared_distance,
                    })
            })
            .min_by_key(|neighbor| FloatOrd(neighbor.squared_distance))
    }

    /// Occupied leaves hit by the ray from `origin` along `direction`, in the order the ray enters them. Voxels
    /// behind the origin are not reported. At most `max_voxels` leaves are returned if a limit is given
    fn intersected_leaves(
        &self,
        origin: &Vector3<f64>,
        direction: &Vector3<f64>,
        max_voxels: Option<usize>,
    ) -> Vec<(NodeId, OctreeKey)> {
        let octree = self.tree().active();
        let root = octree.root_node();
        let max_voxels = max_voxels.unwrap_or(usize::MAX);
        if root == EMPTY_NODE
            || max_voxels == 0
            || direction.norm_squared() == 0.0
            || !origin.iter().chain(direction.iter()).all(|c| c.is_finite())
        {
            return vec![];
        }

        let bounds = self.geometry().node_bounds(&OctreeKey::default(), 0);
        let mut origin = *origin;
        let mut direction = *direction;
        let mut mirror = 0_u8;
        for axis in 0..3 {
            if direction[axis] == 0.0 {
                direction[axis] = RAY_DIRECTION_EPSILON;
            }
            if direction[axis] < 0.0 {
                origin[axis] = bounds.min()[axis] + bounds.max()[axis] - origin[axis];
                direction[axis] = -direction[axis];
                mirror |= 4 >> axis;
            }
        }
        let t0 = (bounds.min().coords - origin).component_div(&direction);
        let t1 = (bounds.max().coords - origin).component_div(&direction);
        if t0.max() >= t1.min() {
            return vec![];
        }

        let mut traversal = RayTraversal {
            octree,
            mirror,
            max_voxels,
            leaves: vec![],
        };
        traversal.visit(t0, t1, root, OctreeKey::default(), 0);
        traversal.leaves
    }

    /// Centers of the occupied voxels hit by the ray from `origin` along `direction`, ordered along the ray.
    /// Voxels behind `origin` are skipped. With `max_voxels`, only the first voxels along the ray are returned
    pub fn intersected_voxel_centers(
        &self,
        origin: &Vector3<f64>,
        direction: &Vector3<f64>,
        max_voxels: Option<usize>,
    ) -> Vec<Point3<f64>> {
        self.intersected_leaves(origin, direction, max_voxels)
            .iter()
            .map(|(_, key)| self.geometry().voxel_center(key))
            .collect()
    }

    /// Indices of all points in the voxels that [intersected_voxel_centers](Self::intersected_voxel_centers)
    /// finds, voxel by voxel along the ray
    pub fn intersected_voxel_indices(
        &self,
        origin: &Vector3<f64>,
        direction: &Vector3<f64>,
        max_voxels: Option<usize>,
    ) -> Vec<u32> {
        let octree = self.tree().active();
        self.intersected_leaves(origin, direction, max_voxels)
            .iter()
            .flat_map(|(node, _)| octree.node_leaf(*node).indices().iter().copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{containers::VecPointCloud, math::AABB, octree::OctreePointCloudSearch};
    use rand::{thread_rng, Rng};

    fn random_cloud(count: usize) -> VecPointCloud {
        let mut rng = thread_rng();
        (0..count)
            .map(|_| {
                Vector3::new(
                    rng.gen::<f64>() * 10.0,
                    rng.gen::<f64>() * 10.0,
                    rng.gen::<f64>() * 10.0,
                )
            })
            .collect()
    }

    fn brute_force(cloud: &VecPointCloud, query: &Vector3<f64>) -> Vec<Neighbor> {
        let mut all = cloud
            .positions()
            .iter()
            .enumerate()
            .map(|(index, position)| Neighbor {
                index: index as u32,
                squared_distance: (position - query).norm_squared(),
            })
            .collect::<Vec<_>>();
        all.sort_by_key(|neighbor| (FloatOrd(neighbor.squared_distance), neighbor.index));
        all
    }

    #[test]
    fn test_nearest_k_matches_brute_force() {
        let cloud = random_cloud(2000);
        let mut octree = OctreePointCloudSearch::new(0.5).unwrap();
        octree.set_input_cloud(&cloud);
        octree.add_points_from_input_cloud().unwrap();

        let mut rng = thread_rng();
        for _ in 0..20 {
            let query = Vector3::new(
                rng.gen::<f64>() * 12.0 - 1.0,
                rng.gen::<f64>() * 12.0 - 1.0,
                rng.gen::<f64>() * 12.0 - 1.0,
            );
            let expected = brute_force(&cloud, &query);
            let found = octree.nearest_k_search(&query, 10);
            assert_eq!(10, found.len());
            for (expected, found) in expected.iter().zip(found.iter()) {
                assert_eq!(expected.squared_distance, found.squared_distance);
            }
        }
    }

    #[test]
    fn test_nearest_k_with_few_points() {
        let cloud = VecPointCloud::from_positions(vec![
            Vector3::new(1.0, 1.0, 1.0),
            Vector3::new(2.0, 2.0, 2.0),
        ]);
        let mut octree = OctreePointCloudSearch::new(0.1).unwrap();
        octree.set_input_cloud(&cloud);
        octree.add_points_from_input_cloud().unwrap();
        let found = octree.nearest_k_search(&Vector3::new(0.0, 0.0, 0.0), 5);
        assert_eq!(vec![0, 1], found.iter().map(|n| n.index).collect::<Vec<_>>());
        assert!(octree.nearest_k_search(&Vector3::zeros(), 0).is_empty());
    }

    #[test]
    fn test_radius_search_matches_brute_force() {
        let cloud = random_cloud(2000);
        let mut octree = OctreePointCloudSearch::new(0.25).unwrap();
        octree.set_input_cloud(&cloud);
        octree.add_points_from_input_cloud().unwrap();

        let query = Vector3::new(5.0, 5.0, 5.0);
        let radius = 1.5;
        let expected = brute_force(&cloud, &query)
            .into_iter()
            .filter(|neighbor| neighbor.squared_distance <= radius * radius)
            .collect::<Vec<_>>();
        let found = octree.radius_search(&query, radius, None);
        assert_eq!(expected, found);

        let limited = octree.radius_search(&query, radius, Some(3));
        assert_eq!(&expected[..3.min(expected.len())], &limited[..]);
    }

    #[test]
    fn test_approx_nearest_finds_point_in_same_voxel() {
        let cloud = random_cloud(500);
        let mut octree = OctreePointCloudSearch::new(0.5).unwrap();
        octree.set_input_cloud(&cloud);
        octree.add_points_from_input_cloud().unwrap();

        let query = cloud.position(17);
        let found = octree.approx_nearest_search(&query).unwrap();
        assert_eq!(0.0, found.squared_distance);
        assert!(octree.voxel_search(&query).unwrap().contains(&found.index));
    }

    /// Parameter at which the ray enters `bounds`, or `None` if it misses them or they lie behind the origin
    fn ray_entry(origin: &Vector3<f64>, direction: &Vector3<f64>, bounds: &AABB<f64>) -> Option<f64> {
        let mut t_enter = f64::NEG_INFINITY;
        let mut t_exit = f64::INFINITY;
        for axis in 0..3 {
            let t_a = (bounds.min()[axis] - origin[axis]) / direction[axis];
            let t_b = (bounds.max()[axis] - origin[axis]) / direction[axis];
            t_enter = t_enter.max(t_a.min(t_b));
            t_exit = t_exit.min(t_a.max(t_b));
        }
        if t_enter < t_exit && t_exit >= 0.0 {
            Some(t_enter)
        } else {
            None
        }
    }

    #[test]
    fn test_ray_intersection_matches_brute_force() {
        let cloud = random_cloud(3000);
        let mut octree = OctreePointCloudSearch::new(0.5).unwrap();
        octree.set_input_cloud(&cloud);
        octree.add_points_from_input_cloud().unwrap();
        let occupied = octree
            .tree()
            .active()
            .leaves()
            .map(|(key, _)| key)
            .collect::<Vec<_>>();

        let mut rng = thread_rng();
        for _ in 0..50 {
            let origin = Vector3::new(
                rng.gen_range(-5.0..15.0),
                rng.gen_range(-5.0..15.0),
                rng.gen_range(-5.0..15.0),
            );
            let target = Vector3::new(
                rng.gen_range(0.0..10.0),
                rng.gen_range(0.0..10.0),
                rng.gen_range(0.0..10.0),
            );
            let direction = target - origin;

            let mut expected = occupied
                .iter()
                .filter_map(|key| {
                    ray_entry(&origin, &direction, &octree.voxel_bounds(key))
                        .map(|t| (FloatOrd(t), octree.geometry().voxel_center(key)))
                })
                .collect::<Vec<_>>();
            expected.sort_by_key(|(t, _)| *t);

            let found = octree.intersected_voxel_centers(&origin, &direction, None);
            assert_eq!(expected.len(), found.len());
            for ((_, expected_center), found_center) in expected.iter().zip(found.iter()) {
                assert!(nalgebra::distance(expected_center, found_center) < 1e-9);
            }

            let limited = octree.intersected_voxel_centers(&origin, &direction, Some(2));
            assert_eq!(&found[..2.min(found.len())], &limited[..]);
        }
    }

    #[test]
    fn test_ray_intersection_indices() {
        let cloud = VecPointCloud::from_positions(vec![
            Vector3::new(0.05, 0.05, 0.05),
            Vector3::new(0.06, 0.04, 0.05),
            Vector3::new(0.55, 0.05, 0.05),
            Vector3::new(0.95, 0.05, 0.05),
            Vector3::new(0.55, 0.95, 0.95),
        ]);
        let mut octree = OctreePointCloudSearch::new(0.1).unwrap();
        octree.set_input_cloud(&cloud);
        octree.add_points_from_input_cloud().unwrap();

        // Along +x through the first row of voxels, then back along -x from beyond the cube
        let forward = octree.intersected_voxel_indices(
            &Vector3::new(-1.0, 0.05, 0.05),
            &Vector3::new(1.0, 0.0001, 0.0001),
            None,
        );
        assert_eq!(4, forward.len());
        let mut first_voxel = forward[..2].to_vec();
        first_voxel.sort();
        assert_eq!(vec![0, 1], first_voxel);
        assert_eq!(&[2, 3], &forward[2..]);

        let backward = octree.intersected_voxel_indices(
            &Vector3::new(2.0, 0.05, 0.05),
            &Vector3::new(-1.0, 0.0, 0.0),
            Some(2),
        );
        assert_eq!(vec![3, 2], backward);

        // Starting between the voxels skips the ones behind the origin
        let from_middle = octree.intersected_voxel_indices(
            &Vector3::new(0.3, 0.05, 0.05),
            &Vector3::new(1.0, 0.0, 0.0),
            None,
        );
        assert_eq!(vec![2, 3], from_middle);

        assert!(octree
            .intersected_voxel_indices(&Vector3::zeros(), &Vector3::zeros(), None)
            .is_empty());
        assert!(octree
            .intersected_voxel_indices(&Vector3::new(5.0, 5.0, 5.0), &Vector3::new(1.0, 1.0, 1.0), None)
            .is_empty());
    }

    #[test]
    fn test_searches_on_empty_octree() {
        let cloud = VecPointCloud::new();
        let mut octree = OctreePointCloudSearch::new(0.5).unwrap();
        octree.set_input_cloud(&cloud);
        octree.add_points_from_input_cloud().unwrap();
        assert!(octree.voxel_search(&Vector3::zeros()).is_none());
        assert!(octree.nearest_k_search(&Vector3::zeros(), 3).is_empty());
        assert!(octree.radius_search(&Vector3::zeros(), 1.0, None).is_empty());
        assert!(octree.approx_nearest_search(&Vector3::zeros()).is_none());
        assert!(octree
            .intersected_voxel_centers(&Vector3::zeros(), &Vector3::new(1.0, 0.0, 0.0), None)
            .is_empty());
    }
}
