use thiserror::Error;

/// Failures of octree construction, insertion and (de)serialization. Functions in this crate return
/// `anyhow::Result`; the concrete reason can be recovered with `err.downcast_ref::<OctreeError>()`
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OctreeError {
    #[error("Point ({x}, {y}, {z}) lies outside of the octree bounds")]
    PointOutOfBounds { x: f64, y: f64, z: f64 },
    #[error("Point has non-finite coordinates")]
    NonFinitePoint,
    #[error("Octree resolution must be positive and finite, but was {0}")]
    InvalidResolution(f64),
    #[error("Octree depth must be in [1;{max}], but was {depth}")]
    InvalidDepth { depth: u32, max: u8 },
    #[error("Octree bounds need {required} levels at the given resolution, but at most {max} are supported")]
    DepthExceeded { required: u32, max: u8 },
    #[error("Octree structure data ended after {0} bytes")]
    TruncatedStructure(usize),
    #[error("{0} bytes of octree structure data were left after deserialization")]
    TrailingStructure(usize),
    #[error("Branch node at depth {depth} has no children")]
    EmptyBranch { depth: u8 },
    #[error("Point index {index} is out of range for a point cloud with {len} points")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("Octree has no input point cloud")]
    MissingInputCloud,
}
