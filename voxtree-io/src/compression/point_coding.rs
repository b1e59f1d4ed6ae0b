use anyhow::{ensure, Result};
use byteorder::{ByteOrder, LittleEndian};
use voxtree_core::nalgebra::{Point3, Vector3};

/// Largest number of quantization steps per voxel and axis. Residuals are stored in at most two bytes
pub const MAX_STEPS: u32 = 1 << 16;

/// Quantizes point positions relative to the lower corner of their voxel. Each coordinate becomes an integer
/// residual in `[0, steps)`, stored in one byte if there are at most 256 steps and in two little-endian bytes
/// otherwise. The voxel is split into `steps` equally sized steps no larger than the point resolution. Decoding places
/// the point in the center of its step, which keeps it inside its voxel and bounds the error per coordinate by half a
/// point resolution
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointCoder {
    point_resolution: f64,
    step_size: f64,
    steps: u32,
    bytes_per_component: usize,
}

impl PointCoder {
    /// Creates a coder for voxels of size `octree_resolution`. Both resolutions must be positive with
    /// `point_resolution <= octree_resolution`, which [CompressionConfig::validate](super::CompressionConfig::validate)
    /// ensures
    pub fn new(point_resolution: f64, octree_resolution: f64) -> Self {
        // The small epsilon keeps ratios like 0.01 / 0.0001 from rounding up to one step too many
        let steps = ((octree_resolution / point_resolution) - 1e-9).ceil().max(1.0) as u32;
        let steps = steps.min(MAX_STEPS);
        let bytes_per_component = if steps <= 256 { 1 } else { 2 };
        Self {
            point_resolution,
            step_size: octree_resolution / steps as f64,
            steps,
            bytes_per_component,
        }
    }

    pub fn point_resolution(&self) -> f64 {
        self.point_resolution
    }

    /// Size of a quantization step. Equal to the point resolution unless it does not divide the voxel size evenly,
    /// in which case the steps shrink so that exactly [steps](PointCoder::steps) of them fill a voxel
    pub fn step_size(&self) -> f64 {
        self.step_size
    }

    /// Number of quantization steps per voxel and axis
    pub fn steps(&self) -> u32 {
        self.steps
    }

    /// Number of bytes a single coded point takes up
    pub fn bytes_per_point(&self) -> usize {
        3 * self.bytes_per_component
    }

    /// Appends the residual of `position` relative to `voxel_min` to `out`
    pub fn encode_point(&self, position: &Vector3<f64>, voxel_min: &Point3<f64>, out: &mut Vec<u8>) {
        for axis in 0..3 {
            let step = ((position[axis] - voxel_min[axis]) / self.step_size).floor();
            let residual = step.max(0.0).min((self.steps - 1) as f64) as u16;
            if self.bytes_per_component == 1 {
                out.push(residual as u8);
            } else {
                let mut bytes = [0; 2];
                LittleEndian::write_u16(&mut bytes, residual);
                out.extend_from_slice(&bytes);
            }
        }
    }

    /// Reconstructs a position from the first [bytes_per_point](PointCoder::bytes_per_point) bytes of `bytes`
    pub fn decode_point(&self, bytes: &[u8], voxel_min: &Point3<f64>) -> Result<Vector3<f64>> {
        ensure!(
            bytes.len() >= self.bytes_per_point(),
            "Expected {} bytes for a point residual but got {}",
            self.bytes_per_point(),
            bytes.len()
        );
        let mut position = Vector3::zeros();
        for axis in 0..3 {
            let residual = if self.bytes_per_component == 1 {
                bytes[axis] as f64
            } else {
                LittleEndian::read_u16(&bytes[2 * axis..]) as f64
            };
            position[axis] = voxel_min[axis] + (residual + 0.5) * self.step_size;
        }
        Ok(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{thread_rng, Rng};

    #[test]
    fn test_component_width() {
        assert_eq!(3, PointCoder::new(0.01, 0.01).bytes_per_point());
        assert_eq!(1, PointCoder::new(0.01, 0.01).steps());
        assert_eq!(3, PointCoder::new(0.005, 0.01).bytes_per_point());
        assert_eq!(2, PointCoder::new(0.005, 0.01).steps());
        assert_eq!(6, PointCoder::new(0.0001, 0.01).bytes_per_point());
        assert_eq!(100, PointCoder::new(0.0001, 0.01).steps());
        assert_eq!(6, PointCoder::new(0.001, 1.0).bytes_per_point());
    }

    #[test]
    fn test_error_is_at_most_half_a_step() {
        let mut rng = thread_rng();
        for (point_resolution, octree_resolution) in [(0.001, 0.01), (0.0001, 0.05), (0.02, 0.02), (0.003, 0.01), (0.0007, 0.05)].iter() {
            let coder = PointCoder::new(*point_resolution, *octree_resolution);
            let voxel_min = Point3::new(-1.0, 2.0, 0.5);
            for _ in 0..1000 {
                let offset = Vector3::new(
                    rng.gen_range(0.0..*octree_resolution),
                    rng.gen_range(0.0..*octree_resolution),
                    rng.gen_range(0.0..*octree_resolution),
                );
                let position = voxel_min.coords + offset;
                let mut bytes = vec![];
                coder.encode_point(&position, &voxel_min, &mut bytes);
                assert_eq!(coder.bytes_per_point(), bytes.len());
                let decoded = coder.decode_point(&bytes, &voxel_min).unwrap();
                for axis in 0..3 {
                    assert!((decoded[axis] - position[axis]).abs() <= point_resolution * 0.5 + 1e-9);
                }
            }
        }
    }

    #[test]
    fn test_uneven_steps_stay_inside_voxel() {
        let octree_resolution = 0.01;
        let coder = PointCoder::new(0.003, octree_resolution);
        assert_eq!(4, coder.steps());
        assert!(coder.step_size() <= coder.point_resolution());

        let voxel_min = Point3::new(0.03, 0.03, 0.03);
        let position = Vector3::new(0.0399, 0.0399, 0.0399);
        let mut bytes = vec![];
        coder.encode_point(&position, &voxel_min, &mut bytes);
        assert_eq!(vec![3, 3, 3], bytes);
        let decoded = coder.decode_point(&bytes, &voxel_min).unwrap();
        for axis in 0..3 {
            assert!(decoded[axis] >= voxel_min[axis]);
            assert!(decoded[axis] < voxel_min[axis] + octree_resolution);
            assert!((decoded[axis] - position[axis]).abs() <= coder.point_resolution() * 0.5);
        }
    }

    #[test]
    fn test_residuals_are_clamped() {
        let coder = PointCoder::new(0.1, 1.0);
        let mut bytes = vec![];
        coder.encode_point(&Vector3::new(-0.5, 0.25, 3.0), &Point3::origin(), &mut bytes);
        assert_eq!(vec![0, 2, 9], bytes);
    }

    #[test]
    fn test_decode_needs_enough_bytes() {
        let coder = PointCoder::new(0.0001, 0.1);
        assert!(coder.decode_point(&[1, 2, 3], &Point3::origin()).is_err());
    }
}
