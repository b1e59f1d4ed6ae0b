use rand::{distributions::Uniform, prelude::Distribution, Rng};
use voxtree_core::{
    containers::{ColoredPoint, PointCloud, VecPointCloud},
    nalgebra::Vector3,
};

/// Random points on a few planar patches inside the box `[0, extent]^3`. Points cluster the way scanned surfaces
/// do, which gives the octree realistic occupancy
pub struct SurfacePointDistribution {
    extent: f64,
}

impl SurfacePointDistribution {
    pub fn new(extent: f64) -> Self {
        Self { extent }
    }
}

impl Distribution<ColoredPoint> for SurfacePointDistribution {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ColoredPoint {
        let u = rng.sample(Uniform::new(0.0, self.extent));
        let v = rng.sample(Uniform::new(0.0, self.extent));
        let position = match rng.sample(Uniform::new(0_u8, 3)) {
            0 => Vector3::new(u, v, self.extent * 0.1),
            1 => Vector3::new(u, self.extent * 0.75, v),
            _ => Vector3::new(self.extent * 0.5, u, v),
        };
        let color = Vector3::new(
            (u / self.extent * 255.0) as u8,
            (v / self.extent * 255.0) as u8,
            rng.gen::<u8>(),
        );
        ColoredPoint::new(position, color)
    }
}

pub fn random_surface_cloud<R: Rng>(rng: &mut R, count: usize, extent: f64) -> VecPointCloud {
    rng.sample_iter(SurfacePointDistribution::new(extent))
        .take(count)
        .collect()
}

/// Positions of `cloud`, sorted by their x coordinate
pub fn sorted_by_x<C: PointCloud>(cloud: &C) -> Vec<Vector3<f64>> {
    let mut positions = (0..cloud.len())
        .map(|index| cloud.position(index))
        .collect::<Vec<_>>();
    positions.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal));
    positions
}

/// Returns true if `sorted` (see [sorted_by_x]) holds a point within `tolerance` of `position` on every axis
pub fn has_point_within(sorted: &[Vector3<f64>], position: &Vector3<f64>, tolerance: f64) -> bool {
    let start = sorted.partition_point(|p| p.x < position.x - tolerance);
    sorted[start..]
        .iter()
        .take_while(|p| p.x <= position.x + tolerance)
        .any(|p| (p - position).amax() <= tolerance)
}

/// Returns true if both clouds have the same size and every point of `expected` has a point of `actual` within
/// `tolerance` on every axis
pub fn clouds_match_within<A: PointCloud, B: PointCloud>(expected: &A, actual: &B, tolerance: f64) -> bool {
    if expected.len() != actual.len() {
        return false;
    }
    let actual_sorted = sorted_by_x(actual);
    (0..expected.len()).all(|index| has_point_within(&actual_sorted, &expected.position(index), tolerance))
}
