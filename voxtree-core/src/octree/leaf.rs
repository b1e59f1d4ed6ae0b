use nalgebra::{Point3, Vector3};

/// Payload of an octree leaf. A leaf container is created empty when its voxel is first touched and then sees
/// every point that falls into the voxel through [accumulate](LeafContainer::accumulate)
pub trait LeafContainer: Default {
    /// Adds the point with the given index and position to this leaf
    fn accumulate(&mut self, point_index: u32, position: &Vector3<f64>);
    /// Number of points that went into this leaf
    fn point_count(&self) -> usize;
    /// Indices of the points in this leaf, for containers that keep them. Empty otherwise
    fn point_indices(&self) -> &[u32] {
        &[]
    }
}

/// Leaf that only records that its voxel is occupied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmptyLeaf;

impl LeafContainer for EmptyLeaf {
    fn accumulate(&mut self, _point_index: u32, _position: &Vector3<f64>) {}

    fn point_count(&self) -> usize {
        0
    }
}

/// Leaf that stores the indices of all points inside its voxel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointIndices {
    indices: Vec<u32>,
}

impl PointIndices {
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }
}

impl LeafContainer for PointIndices {
    fn accumulate(&mut self, point_index: u32, _position: &Vector3<f64>) {
        self.indices.push(point_index);
    }

    fn point_count(&self) -> usize {
        self.indices.len()
    }

    fn point_indices(&self) -> &[u32] {
        &self.indices
    }
}

/// Leaf that counts the points inside its voxel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DensityCounter {
    count: u32,
}

impl DensityCounter {
    pub fn density(&self) -> u32 {
        self.count
    }
}

impl LeafContainer for DensityCounter {
    fn accumulate(&mut self, _point_index: u32, _position: &Vector3<f64>) {
        self.count = self.count.saturating_add(1);
    }

    fn point_count(&self) -> usize {
        self.count as usize
    }
}

/// Leaf that sums up point positions to compute the centroid of its voxel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CentroidAccumulator {
    sum: Vector3<f64>,
    count: u32,
}

impl Default for CentroidAccumulator {
    fn default() -> Self {
        Self {
            sum: Vector3::zeros(),
            count: 0,
        }
    }
}

impl CentroidAccumulator {
    /// Mean position of all accumulated points, or `None` for a leaf without points
    pub fn centroid(&self) -> Option<Point3<f64>> {
        if self.count == 0 {
            None
        } else {
            Some(Point3::from(self.sum / self.count as f64))
        }
    }
}

impl LeafContainer for CentroidAccumulator {
    fn accumulate(&mut self, _point_index: u32, position: &Vector3<f64>) {
        self.sum += position;
        self.count += 1;
    }

    fn point_count(&self) -> usize {
        self.count as usize
    }
}

/// Leaf used by point cloud compression. While encoding, it collects the indices of its points and then holds the
/// coded form of those points: their count, their quantized positions relative to the voxel and their colors.
/// While decoding, only the coded form is filled in
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompressionResidual {
    indices: Vec<u32>,
    coded_point_count: u32,
    residuals: Vec<u8>,
    colors: Vec<u8>,
}

impl CompressionResidual {
    /// Number of points as coded in the stream. Differs from [point_count](LeafContainer::point_count) on the
    /// decoding side, where no point indices exist
    pub fn coded_point_count(&self) -> u32 {
        self.coded_point_count
    }

    /// Bytes of the quantized point positions relative to the voxel
    pub fn residuals(&self) -> &[u8] {
        &self.residuals
    }

    /// Bytes of the coded colors (average color and per-point differences)
    pub fn colors(&self) -> &[u8] {
        &self.colors
    }

    /// Replaces the coded form of this leaf
    pub fn set_payload(&mut self, coded_point_count: u32, residuals: Vec<u8>, colors: Vec<u8>) {
        self.coded_point_count = coded_point_count;
        self.residuals = residuals;
        self.colors = colors;
    }

    /// Copies the coded form of `other` into this leaf
    pub fn copy_payload_from(&mut self, other: &CompressionResidual) {
        self.coded_point_count = other.coded_point_count;
        self.residuals.clone_from(&other.residuals);
        self.colors.clone_from(&other.colors);
    }

    /// Returns true if both leaves carry the same coded form. Point indices are not compared
    pub fn payload_eq(&self, other: &CompressionResidual) -> bool {
        self.coded_point_count == other.coded_point_count
            && self.residuals == other.residuals
            && self.colors == other.colors
    }
}

impl LeafContainer for CompressionResidual {
    fn accumulate(&mut self, point_index: u32, _position: &Vector3<f64>) {
        self.indices.push(point_index);
    }

    fn point_count(&self) -> usize {
        self.indices.len()
    }

    fn point_indices(&self) -> &[u32] {
        &self.indices
    }
}
