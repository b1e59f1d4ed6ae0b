#![warn(clippy::all)]

//! Octree spatial index for point cloud data
//!
//! voxtree buckets the points of a [PointCloud](crate::containers::PointCloud) into the voxels of a sparse octree.
//! The tree is generic over the payload stored in its leaves ([leaf containers](crate::octree::LeafContainer)), which
//! is how the same structure serves voxel search, density estimation, centroid computation and point cloud
//! compression. Start with [OctreePointCloud](crate::octree::OctreePointCloud) for queries on a single cloud, or
//! with [DoubleBufferedOctree](crate::octree::DoubleBufferedOctree) for working with successive frames.

pub extern crate nalgebra;

/// Point data containers
pub mod containers;
mod error;
pub use self::error::*;
/// Bounding boxes, octree keys and bit manipulation helpers
pub mod math;
/// The octree itself, its leaf containers and the point cloud adapters
pub mod octree;
