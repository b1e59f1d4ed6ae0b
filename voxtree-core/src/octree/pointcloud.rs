use std::marker::PhantomData;

use anyhow::{bail, Result};
use log::debug;
use nalgebra::{Point3, Vector3};

use super::{
    CentroidAccumulator, DensityCounter, DoubleBufferedOctree, EmptyLeaf, LeafContainer, Octree,
    OctreeGeometry, PointIndices,
};
use crate::{
    containers::PointCloud,
    math::{OctreeKey, AABB},
    OctreeError,
};

/// What happens when a point outside of the current octree bounds is added
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BoundsPolicy {
    /// Adding the point fails with [OctreeError::PointOutOfBounds]
    Reject,
    /// The octree grows new root levels until the point is inside. Existing voxels keep their size
    Extend,
}

impl Default for BoundsPolicy {
    fn default() -> Self {
        BoundsPolicy::Reject
    }
}

/// Tree storage of an [OctreePointCloud]. Points are always inserted into the active tree
pub trait OctreeBuffer<L: LeafContainer> {
    fn with_depth(depth: u8) -> Self;
    fn active(&self) -> &Octree<L>;
    fn active_mut(&mut self) -> &mut Octree<L>;
    /// Returns true if no tree of this storage has leaves
    fn is_empty(&self) -> bool;
    fn set_depth(&mut self, depth: u8);
    fn grow_root(&mut self, child_index: u8);
    fn clear(&mut self);
}

impl<L: LeafContainer> OctreeBuffer<L> for Octree<L> {
    fn with_depth(depth: u8) -> Self {
        Octree::new(depth)
    }

    fn active(&self) -> &Octree<L> {
        self
    }

    fn active_mut(&mut self) -> &mut Octree<L> {
        self
    }

    fn is_empty(&self) -> bool {
        Octree::is_empty(self)
    }

    fn set_depth(&mut self, depth: u8) {
        Octree::set_depth(self, depth)
    }

    fn grow_root(&mut self, child_index: u8) {
        Octree::grow_root(self, child_index)
    }

    fn clear(&mut self) {
        Octree::clear(self)
    }
}

impl<L: LeafContainer> OctreeBuffer<L> for DoubleBufferedOctree<L> {
    fn with_depth(depth: u8) -> Self {
        DoubleBufferedOctree::new(depth)
    }

    fn active(&self) -> &Octree<L> {
        self.current()
    }

    fn active_mut(&mut self) -> &mut Octree<L> {
        self.current_mut()
    }

    fn is_empty(&self) -> bool {
        DoubleBufferedOctree::is_empty(self)
    }

    fn set_depth(&mut self, depth: u8) {
        DoubleBufferedOctree::set_depth(self, depth)
    }

    fn grow_root(&mut self, child_index: u8) {
        DoubleBufferedOctree::grow_root(self, child_index)
    }

    fn clear(&mut self) {
        DoubleBufferedOctree::clear(self)
    }
}

/// Octree over the points of a [PointCloud]. Leaves refer to points by their index in the input cloud, so the
/// octree borrows the cloud for as long as it is in use
///
/// Unless a bounding box is defined explicitly, the bounds are computed from the input cloud when the first points
/// are added to an empty octree. The cube is then chosen so that every voxel has the configured resolution
///
/// ```
/// # use voxtree_core::{containers::VecPointCloud, octree::OctreePointCloudSearch};
/// # use nalgebra::Vector3;
/// let cloud = VecPointCloud::from_positions(vec![
///     Vector3::new(0.02, 0.02, 0.02),
///     Vector3::new(0.07, 0.06, 0.05),
///     Vector3::new(0.95, 0.95, 0.95),
/// ]);
/// let mut octree = OctreePointCloudSearch::new(0.1).unwrap();
/// octree.set_input_cloud(&cloud);
/// octree.add_points_from_input_cloud().unwrap();
/// assert_eq!(2, octree.leaf_count());
/// assert_eq!(Some(&[0, 1][..]), octree.voxel_search(&Vector3::new(0.04, 0.04, 0.04)));
/// ```
pub struct OctreePointCloud<'a, C, L, T = Octree<L>> {
    tree: T,
    geometry: OctreeGeometry,
    bounds_defined: bool,
    bounds_policy: BoundsPolicy,
    input: Option<&'a C>,
    _leaf: PhantomData<L>,
}

/// Octree that stores point indices per voxel and supports neighbour searches
pub type OctreePointCloudSearch<'a, C> = OctreePointCloud<'a, C, PointIndices>;
/// Octree that only tracks which voxels are occupied
pub type OctreePointCloudOccupancy<'a, C> = OctreePointCloud<'a, C, EmptyLeaf>;
/// Octree that counts the points per voxel
pub type OctreePointCloudDensity<'a, C> = OctreePointCloud<'a, C, DensityCounter>;
/// Octree that computes the centroid of the points per voxel
pub type OctreePointCloudVoxelCentroid<'a, C> = OctreePointCloud<'a, C, CentroidAccumulator>;
/// Octree over two successive frames that finds the points in newly occupied voxels
pub type OctreePointCloudChangeDetector<'a, C> =
    OctreePointCloud<'a, C, PointIndices, DoubleBufferedOctree<PointIndices>>;

impl<'a, C: PointCloud, L: LeafContainer, T: OctreeBuffer<L>> OctreePointCloud<'a, C, L, T> {
    /// Creates an empty octree with voxels of size `resolution`
    ///
    /// # Errors
    ///
    /// [OctreeError::InvalidResolution] if `resolution` is not positive and finite
    pub fn new(resolution: f64) -> Result<Self> {
        let geometry = OctreeGeometry::new(Point3::origin(), resolution, 1)?;
        Ok(Self {
            tree: T::with_depth(geometry.depth()),
            geometry,
            bounds_defined: false,
            bounds_policy: BoundsPolicy::default(),
            input: None,
            _leaf: PhantomData,
        })
    }

    /// Sets what happens to points outside of the octree bounds
    pub fn with_bounds_policy(mut self, bounds_policy: BoundsPolicy) -> Self {
        self.bounds_policy = bounds_policy;
        self
    }

    pub fn bounds_policy(&self) -> BoundsPolicy {
        self.bounds_policy
    }

    /// Side length of a leaf voxel
    pub fn resolution(&self) -> f64 {
        self.geometry.resolution()
    }

    pub fn depth(&self) -> u8 {
        self.geometry.depth()
    }

    pub fn geometry(&self) -> &OctreeGeometry {
        &self.geometry
    }

    /// The cube covered by the octree
    pub fn bounding_box(&self) -> AABB<f64> {
        self.geometry.bounds()
    }

    /// Number of occupied voxels
    pub fn leaf_count(&self) -> usize {
        self.tree.active().leaf_count()
    }

    pub fn branch_count(&self) -> usize {
        self.tree.active().branch_count()
    }

    /// The tree storage
    pub fn tree(&self) -> &T {
        &self.tree
    }

    fn ensure_empty(&self) -> Result<()> {
        if !self.tree.is_empty() {
            bail!("The bounding box of an octree can only be changed while the octree is empty");
        }
        Ok(())
    }

    fn adopt_geometry(&mut self, geometry: OctreeGeometry) {
        self.tree.set_depth(geometry.depth());
        self.geometry = geometry;
    }

    /// Fixes the bounds of the octree so that they contain `bounds`. The resolution is kept and the depth is chosen
    /// as small as possible. Must be called on an empty octree
    pub fn define_bounding_box(&mut self, bounds: &AABB<f64>) -> Result<()> {
        self.ensure_empty()?;
        let geometry = OctreeGeometry::from_bounds_and_resolution(bounds, self.resolution())?;
        self.adopt_geometry(geometry);
        self.bounds_defined = true;
        Ok(())
    }

    /// Fixes the bounds of the octree to a cube at the minimum of `bounds` with the given depth. The resolution
    /// becomes the largest extent of `bounds` divided by `2^depth`. Must be called on an empty octree
    pub fn define_bounding_box_with_depth(&mut self, bounds: &AABB<f64>, depth: u8) -> Result<()> {
        self.ensure_empty()?;
        let geometry = OctreeGeometry::from_bounds_and_depth(bounds, depth)?;
        self.adopt_geometry(geometry);
        self.bounds_defined = true;
        Ok(())
    }

    /// Sets the point cloud whose points are added by [add_points_from_input_cloud](OctreePointCloud::add_points_from_input_cloud)
    /// and [add_point_from_cloud](OctreePointCloud::add_point_from_cloud). Leaves that already exist are kept
    pub fn set_input_cloud(&mut self, cloud: &'a C) {
        self.input = Some(cloud);
    }

    pub fn input_cloud(&self) -> Option<&'a C> {
        self.input
    }

    fn input_or_err(&self) -> Result<&'a C> {
        let cloud = self.input.ok_or(OctreeError::MissingInputCloud)?;
        if cloud.len() > u32::MAX as usize {
            bail!(
                "Point clouds with more than {} points are not supported",
                u32::MAX
            );
        }
        Ok(cloud)
    }

    /// Adds all points of the input cloud. Points with non-finite coordinates are skipped
    ///
    /// # Errors
    ///
    /// [OctreeError::MissingInputCloud] if no input cloud is set and [OctreeError::PointOutOfBounds] if a point lies
    /// outside of the defined bounds while the [BoundsPolicy] is `Reject`. Points up to the failing one stay in the
    /// octree
    pub fn add_points_from_input_cloud(&mut self) -> Result<()> {
        let cloud = self.input_or_err()?;
        if !self.bounds_defined && self.tree.is_empty() {
            if let Some(bounds) = AABB::from_positions((0..cloud.len()).map(|i| cloud.position(i))) {
                let geometry =
                    OctreeGeometry::from_bounds_and_resolution(&bounds, self.resolution())?;
                self.adopt_geometry(geometry);
            }
        }

        let mut skipped = 0;
        for index in 0..cloud.len() {
            let position = cloud.position(index);
            if !position.iter().all(|c| c.is_finite()) {
                skipped += 1;
                continue;
            }
            self.insert_point(index as u32, &position)?;
        }
        if skipped > 0 {
            debug!(
                "Skipped {} points with non-finite coordinates while building the octree",
                skipped
            );
        }
        Ok(())
    }

    /// Adds the point at `index` of the input cloud
    ///
    /// # Errors
    ///
    /// [OctreeError::IndexOutOfRange] if `index` is not a valid point index, [OctreeError::NonFinitePoint] if the
    /// point has non-finite coordinates, plus the errors of [add_points_from_input_cloud](OctreePointCloud::add_points_from_input_cloud)
    pub fn add_point_from_cloud(&mut self, index: usize) -> Result<()> {
        let cloud = self.input_or_err()?;
        if index >= cloud.len() {
            return Err(OctreeError::IndexOutOfRange {
                index,
                len: cloud.len(),
            }
            .into());
        }
        let position = cloud.position(index);
        self.insert_point(index as u32, &position)
    }

    fn insert_point(&mut self, index: u32, position: &Vector3<f64>) -> Result<()> {
        let key = self.key_for_insertion(position)?;
        self.tree.active_mut().insert(&key).accumulate(index, position);
        Ok(())
    }

    fn key_for_insertion(&mut self, position: &Vector3<f64>) -> Result<OctreeKey> {
        if self.bounds_policy == BoundsPolicy::Extend {
            if !position.iter().all(|c| c.is_finite()) {
                return Err(OctreeError::NonFinitePoint.into());
            }
            while !self.geometry.contains(position) {
                self.extend_bounds_towards(position)?;
            }
        }
        self.geometry.key_for_point(position)
    }

    fn extend_bounds_towards(&mut self, position: &Vector3<f64>) -> Result<()> {
        if self.tree.is_empty() {
            // Nothing to keep, so just move the cube to the point
            let point = Point3::from(*position);
            let geometry = OctreeGeometry::from_bounds_and_resolution(
                &AABB::from_min_max(point, point),
                self.resolution(),
            )?;
            self.adopt_geometry(geometry);
            return Ok(());
        }
        let (geometry, child_index) = self.geometry.grown_towards(position)?;
        self.tree.grow_root(child_index);
        self.geometry = geometry;
        debug!(
            "Octree grew to depth {} to include point {:?}",
            geometry.depth(),
            position
        );
        Ok(())
    }

    /// Key of the voxel that contains `position`, see [OctreeGeometry::key_for_point]
    pub fn key_for_point(&self, position: &Vector3<f64>) -> Result<OctreeKey> {
        self.geometry.key_for_point(position)
    }

    /// Leaf of the voxel that contains `position`. `None` if the voxel is empty or outside of the bounds
    pub fn find_leaf_at_point(&self, position: &Vector3<f64>) -> Option<&L> {
        let key = self.geometry.key_for_point(position).ok()?;
        self.tree.active().find(&key)
    }

    /// Returns true if the voxel containing `position` has at least one point
    pub fn is_voxel_occupied_at_point(&self, position: &Vector3<f64>) -> bool {
        self.find_leaf_at_point(position).is_some()
    }

    /// Removes the voxel containing `position`. Returns true if a voxel was removed
    pub fn delete_voxel_at_point(&mut self, position: &Vector3<f64>) -> bool {
        match self.geometry.key_for_point(position) {
            Ok(key) => self.tree.active_mut().remove(&key).is_some(),
            Err(_) => false,
        }
    }

    /// Centers of all occupied voxels, in depth-first order
    pub fn occupied_voxel_centers(&self) -> Vec<Point3<f64>> {
        self.tree
            .active()
            .leaves()
            .map(|(key, _)| self.geometry.voxel_center(&key))
            .collect()
    }

    /// Bounds of the voxel with the given key
    pub fn voxel_bounds(&self, key: &OctreeKey) -> AABB<f64> {
        self.geometry.voxel_bounds(key)
    }

    /// Removes all voxels. Bounds that were defined explicitly are kept, computed bounds are recomputed when points
    /// are added next
    pub fn clear(&mut self) {
        self.tree.clear();
    }
}

impl<'a, C: PointCloud, T: OctreeBuffer<DensityCounter>> OctreePointCloud<'a, C, DensityCounter, T> {
    /// Number of points in the voxel that contains `position`. Zero for empty voxels
    pub fn voxel_density_at_point(&self, position: &Vector3<f64>) -> u32 {
        self.find_leaf_at_point(position)
            .map(|leaf| leaf.density())
            .unwrap_or(0)
    }
}

impl<'a, C: PointCloud, T: OctreeBuffer<CentroidAccumulator>>
    OctreePointCloud<'a, C, CentroidAccumulator, T>
{
    /// Centroids of all occupied voxels, in depth-first order
    pub fn voxel_centroids(&self) -> Vec<Point3<f64>> {
        self.tree
            .active()
            .leaves()
            .filter_map(|(_, leaf)| leaf.centroid())
            .collect()
    }

    /// Centroid of the points in the voxel that contains `position`
    pub fn voxel_centroid_at_point(&self, position: &Vector3<f64>) -> Option<Point3<f64>> {
        self.find_leaf_at_point(position)
            .and_then(|leaf| leaf.centroid())
    }
}

impl<'a, C: PointCloud, L: LeafContainer> OctreePointCloud<'a, C, L, DoubleBufferedOctree<L>> {
    /// Keeps the current voxels as the previous frame and starts an empty current frame. The bounds stay the same
    pub fn switch_buffers(&mut self) {
        self.tree.switch_buffers();
    }

    /// Indices of the points in voxels that are occupied in the current frame, but were empty in the previous one.
    /// Voxels with fewer than `min_points_per_leaf` points are ignored
    pub fn point_indices_from_new_voxels(&self, min_points_per_leaf: usize) -> Vec<u32> {
        let previous = self.tree.previous();
        self.tree
            .current()
            .leaves()
            .filter(|(key, leaf)| {
                leaf.point_count() >= min_points_per_leaf && !previous.exists(key)
            })
            .flat_map(|(_, leaf)| leaf.point_indices().iter().copied())
            .collect()
    }
}
