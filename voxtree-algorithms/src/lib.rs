#![warn(clippy::all)]
//! Algorithms that operate on point clouds.
//!
//! These build on the octree from `voxtree-core` to compute results from point cloud data or to derive new,
//! smaller point clouds from it.

// Algorithm to calculate the bounding box of a point cloud.
pub mod bounds;
// Downsampling of a point cloud to one point per occupied voxel.
pub mod voxel_grid;
