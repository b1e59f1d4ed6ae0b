//! Point data containers that the octree consumes.
//!
//! The octree never copies coordinates into its leaves. It only stores point indices (or aggregates like counts
//! and centroid sums) and reads positions and colors back through the [`PointCloud`] trait whenever it needs
//! them. [`VecPointCloud`] is the default implementation and is what decoders produce.

mod point_cloud;
pub use self::point_cloud::*;
