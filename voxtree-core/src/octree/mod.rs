//! Sparse octree over point data
//!
//! The building blocks are
//! - [Octree], a fixed-depth tree with a [LeafContainer] payload in every leaf,
//! - [DoubleBufferedOctree], two octrees for successive frames that can be serialized relative to each other,
//! - [OctreeGeometry], which maps world coordinates to [OctreeKey](crate::math::OctreeKey)s, and
//! - [OctreePointCloud], which fills an octree from a [PointCloud](crate::containers::PointCloud) and answers
//!   queries on it.

mod base;
pub use self::base::*;

mod double_buffer;
pub use self::double_buffer::*;

mod geometry;
pub use self::geometry::*;

mod leaf;
pub use self::leaf::*;

mod node_arena;

mod pointcloud;
pub use self::pointcloud::*;

mod search;
pub use self::search::*;
