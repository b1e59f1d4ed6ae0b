use anyhow::Result;
use nalgebra::{Point3, Vector3};

use crate::{
    math::{OctreeKey, AABB},
    OctreeError,
};

/// Maps between world coordinates and [OctreeKey]s. The octree covers the cube `[min, min + side_length)` on
/// every axis, with `side_length = resolution * 2^depth`. Cells are half-open: a point on the upper face of a
/// voxel belongs to the next voxel
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OctreeGeometry {
    min: Point3<f64>,
    resolution: f64,
    depth: u8,
}

fn check_resolution(resolution: f64) -> Result<()> {
    if !resolution.is_finite() || resolution <= 0.0 {
        return Err(OctreeError::InvalidResolution(resolution).into());
    }
    Ok(())
}

fn check_depth(depth: u32) -> Result<u8> {
    if depth == 0 || depth > OctreeKey::MAX_DEPTH as u32 {
        return Err(OctreeError::InvalidDepth {
            depth,
            max: OctreeKey::MAX_DEPTH,
        }
        .into());
    }
    Ok(depth as u8)
}

impl OctreeGeometry {
    /// Creates a geometry with the given minimum corner, leaf voxel size and depth
    pub fn new(min: Point3<f64>, resolution: f64, depth: u8) -> Result<Self> {
        check_resolution(resolution)?;
        let depth = check_depth(depth as u32)?;
        if !min.iter().all(|c| c.is_finite()) {
            return Err(OctreeError::NonFinitePoint.into());
        }
        Ok(Self {
            min,
            resolution,
            depth,
        })
    }

    /// Creates the smallest geometry with voxels of size `resolution` whose cube contains `bounds` (including its
    /// upper faces). The cube is centered on `bounds`
    ///
    /// ```
    /// # use voxtree_core::{math::AABB, octree::OctreeGeometry};
    /// # use nalgebra::Point3;
    /// let bounds = AABB::from_min_max(Point3::new(0.0, 0.0, 0.0), Point3::new(7.0, 7.0, 7.0));
    /// let geometry = OctreeGeometry::from_bounds_and_resolution(&bounds, 1.0).unwrap();
    /// assert_eq!(3, geometry.depth());
    /// assert_eq!(Point3::new(-0.5, -0.5, -0.5), *geometry.min());
    /// ```
    pub fn from_bounds_and_resolution(bounds: &AABB<f64>, resolution: f64) -> Result<Self> {
        check_resolution(resolution)?;
        let extent = bounds.extent();
        if !extent.iter().all(|c| c.is_finite()) {
            return Err(OctreeError::NonFinitePoint.into());
        }
        // One more cell than the extent strictly needs, so that the upper faces of `bounds` are inside
        let max_cells = extent
            .iter()
            .map(|e| (e / resolution).floor() + 1.0)
            .fold(2.0_f64, f64::max);
        let required_depth = max_cells.log2().ceil();
        if required_depth > OctreeKey::MAX_DEPTH as f64 {
            return Err(OctreeError::DepthExceeded {
                required: required_depth.min(u32::MAX as f64) as u32,
                max: OctreeKey::MAX_DEPTH,
            }
            .into());
        }
        let depth = required_depth as u8;
        let side_length = resolution * (1_u64 << depth) as f64;
        let cube = bounds.centered_cube(side_length);
        Self::new(*cube.min(), resolution, depth)
    }

    /// Creates a geometry of the given depth whose cube starts at the minimum of `bounds` and whose side length
    /// is the largest extent of `bounds`. Points on the upper faces of `bounds` are outside of this geometry
    ///
    /// ```
    /// # use voxtree_core::{math::AABB, octree::OctreeGeometry};
    /// # use nalgebra::Point3;
    /// let bounds = AABB::from_min_max(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
    /// let geometry = OctreeGeometry::from_bounds_and_depth(&bounds, 8).unwrap();
    /// assert_eq!(1.0 / 256.0, geometry.resolution());
    /// ```
    pub fn from_bounds_and_depth(bounds: &AABB<f64>, depth: u8) -> Result<Self> {
        let depth = check_depth(depth as u32)?;
        let resolution = bounds.max_extent() / (1_u64 << depth) as f64;
        Self::new(*bounds.min(), resolution, depth)
    }

    pub fn min(&self) -> &Point3<f64> {
        &self.min
    }

    /// Side length of a leaf voxel
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Number of levels below the root
    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// Number of voxels along each axis
    pub fn cells_per_axis(&self) -> u64 {
        1_u64 << self.depth
    }

    pub fn side_length(&self) -> f64 {
        self.resolution * self.cells_per_axis() as f64
    }

    /// The cube covered by this geometry. Its upper faces are not part of the octree
    pub fn bounds(&self) -> AABB<f64> {
        let side = self.side_length();
        AABB::from_min_max_unchecked(self.min, self.min + Vector3::new(side, side, side))
    }

    /// Computes the key of the leaf voxel that contains `position`
    ///
    /// # Errors
    ///
    /// [OctreeError::NonFinitePoint] if `position` has NaN or infinite components, [OctreeError::PointOutOfBounds]
    /// if it lies outside of the cube. Points are never clamped into the cube
    pub fn key_for_point(&self, position: &Vector3<f64>) -> Result<OctreeKey> {
        if !position.iter().all(|c| c.is_finite()) {
            return Err(OctreeError::NonFinitePoint.into());
        }
        let cells = self.cells_per_axis() as f64;
        let mut key = [0_u32; 3];
        for axis in 0..3 {
            let cell = ((position[axis] - self.min[axis]) / self.resolution).floor();
            if !(0.0..cells).contains(&cell) {
                return Err(OctreeError::PointOutOfBounds {
                    x: position.x,
                    y: position.y,
                    z: position.z,
                }
                .into());
            }
            key[axis] = cell as u32;
        }
        Ok(OctreeKey::new(key[0], key[1], key[2]))
    }

    /// Returns true if `position` maps to a voxel of this geometry
    pub fn contains(&self, position: &Vector3<f64>) -> bool {
        self.key_for_point(position).is_ok()
    }

    /// Lower corner of the leaf voxel with the given key
    pub fn voxel_min(&self, key: &OctreeKey) -> Point3<f64> {
        self.node_min(key, self.depth)
    }

    /// Center of the leaf voxel with the given key
    pub fn voxel_center(&self, key: &OctreeKey) -> Point3<f64> {
        let half = self.resolution * 0.5;
        self.voxel_min(key) + Vector3::new(half, half, half)
    }

    /// Bounds of the leaf voxel with the given key
    pub fn voxel_bounds(&self, key: &OctreeKey) -> AABB<f64> {
        self.node_bounds(key, self.depth)
    }

    /// Side length of a node at `level`, where the root is at level 0 and leaves are at level `depth`
    pub fn node_side_length(&self, level: u8) -> f64 {
        self.resolution * (1_u64 << (self.depth - level)) as f64
    }

    /// Lower corner of the node at `level` whose key has `level` significant bits
    pub fn node_min(&self, key: &OctreeKey, level: u8) -> Point3<f64> {
        let side = self.node_side_length(level);
        self.min + Vector3::new(key.x as f64, key.y as f64, key.z as f64) * side
    }

    pub fn node_bounds(&self, key: &OctreeKey, level: u8) -> AABB<f64> {
        let side = self.node_side_length(level);
        let min = self.node_min(key, level);
        AABB::from_min_max_unchecked(min, min + Vector3::new(side, side, side))
    }

    /// Returns the geometry of an octree that is one level deeper and whose cube extends this cube towards
    /// `position`, together with the child index under which the current root has to be placed in the new root.
    /// On axes where `position` is above the cube, the current cube becomes the lower half of the new cube. On all
    /// other axes it becomes the upper half
    pub fn grown_towards(&self, position: &Vector3<f64>) -> Result<(Self, u8)> {
        if self.depth >= OctreeKey::MAX_DEPTH {
            return Err(OctreeError::DepthExceeded {
                required: self.depth as u32 + 1,
                max: OctreeKey::MAX_DEPTH,
            }
            .into());
        }
        let side = self.side_length();
        let mut min = self.min;
        let mut child_index = 0_u8;
        for axis in 0..3 {
            let grows_upwards = position[axis] >= self.min[axis] + side;
            if !grows_upwards {
                min[axis] -= side;
                child_index |= 1 << (2 - axis);
            }
        }
        Ok((
            Self {
                min,
                resolution: self.resolution,
                depth: self.depth + 1,
            },
            child_index,
        ))
    }
}
