//! Octree based compression of point cloud sequences
//!
//! A compressed stream is a sequence of frames. Each frame stores the occupancy of an octree, the points within
//! each occupied voxel and optionally their colors, all entropy coded with a [StaticRangeCoder]. See
//! [PointCloudCompression] for the codec and [CompressionConfig] for its parameters.

mod codec;
pub use self::codec::*;

mod color_coding;
pub use self::color_coding::*;

mod config;
pub use self::config::*;

mod error;
pub use self::error::CompressionError;

mod frame;
pub use self::frame::{
    skip_streams, FrameGeometry, FrameHeader, FrameType, StreamInfo, StreamKind, FRAME_IDENTIFIER,
    FRAME_VERSION,
};

mod point_coding;
pub use self::point_coding::*;

mod range_coder;
pub use self::range_coder::*;
