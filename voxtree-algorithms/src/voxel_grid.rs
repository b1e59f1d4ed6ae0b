use std::collections::HashMap;

use anyhow::Result;
use voxtree_core::{
    containers::{PointCloud, VecPointCloud},
    math::OctreeKey,
    nalgebra::Vector3,
    octree::{OctreeGeometry, OctreePointCloudVoxelCentroid},
};

/// Downsamples `cloud` by applying a voxelgrid-filter with cubic voxels of size `leaf_size`. Every occupied voxel
/// is replaced by the centroid of its points. If the cloud has colors, the centroid gets the average color of the
/// points. Points with non-finite coordinates are dropped. The output points are in depth-first octree order
///
/// # Examples
/// ```
/// # use voxtree_algorithms::voxel_grid::voxelgrid_filter;
/// # use voxtree_core::{containers::{PointCloud, VecPointCloud}, nalgebra::Vector3};
/// let mut cloud = VecPointCloud::new();
/// // generate some points
/// for i in 0..100 {
///     for j in 0..100 {
///         cloud.push(Vector3::new(0.0, f64::from(i), f64::from(j)));
///     }
/// }
/// let filtered = voxelgrid_filter(&cloud, 1.5).unwrap();
/// // filtered now has fewer points than cloud
/// assert!(filtered.len() < cloud.len() / 2);
/// ```
///
/// # Errors
///
/// Fails if `leaf_size` is not positive and finite, or if the cloud is too large for voxels of that size
pub fn voxelgrid_filter<C: PointCloud>(cloud: &C, leaf_size: f64) -> Result<VecPointCloud> {
    let mut octree = OctreePointCloudVoxelCentroid::new(leaf_size)?;
    octree.set_input_cloud(cloud);
    octree.add_points_from_input_cloud()?;

    if !cloud.has_colors() {
        return Ok(octree
            .voxel_centroids()
            .into_iter()
            .map(|centroid| centroid.coords)
            .collect());
    }

    let color_sums = voxel_color_sums(cloud, octree.geometry());
    let mut filtered = VecPointCloud::with_capacity(octree.leaf_count(), true);
    for (key, leaf) in octree.tree().leaves() {
        let centroid = match leaf.centroid() {
            Some(centroid) => centroid,
            None => continue,
        };
        let color = color_sums
            .get(&key)
            .map(|(sum, count)| sum.map(|c| (c as f64 / *count as f64).round() as u8))
            .unwrap_or_else(Vector3::zeros);
        filtered.push_colored(centroid.coords, color);
    }
    Ok(filtered)
}

/// Per-voxel sums of the colors of all finite points, together with the number of points in the voxel
fn voxel_color_sums<C: PointCloud>(
    cloud: &C,
    geometry: &OctreeGeometry,
) -> HashMap<OctreeKey, (Vector3<u64>, u64)> {
    let mut sums = HashMap::<OctreeKey, (Vector3<u64>, u64)>::new();
    for index in 0..cloud.len() {
        let (key, color) = match (geometry.key_for_point(&cloud.position(index)), cloud.color(index)) {
            (Ok(key), Some(color)) => (key, color),
            _ => continue,
        };
        let entry = sums.entry(key).or_insert((Vector3::zeros(), 0));
        entry.0 += color.map(|c| c as u64);
        entry.1 += 1;
    }
    sums
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::{thread_rng, Rng};

    #[test]
    fn test_voxelgrid_filter_centroids() {
        let cloud = VecPointCloud::from_positions_and_colors(
            vec![
                Vector3::new(0.1, 0.1, 0.1),
                Vector3::new(0.3, 0.3, 0.3),
                Vector3::new(5.2, 5.2, 5.2),
            ],
            vec![
                Vector3::new(10, 20, 30),
                Vector3::new(20, 40, 60),
                Vector3::new(255, 255, 255),
            ],
        );
        let filtered = voxelgrid_filter(&cloud, 1.0).unwrap();
        assert_eq!(2, filtered.len());
        let first = filtered.position(0);
        assert_approx_eq!(0.2, first.x);
        assert_approx_eq!(0.2, first.z);
        assert_eq!(Some(Vector3::new(15, 30, 45)), filtered.color(0));
        assert_eq!(Some(Vector3::new(255, 255, 255)), filtered.color(1));
    }

    #[test]
    fn test_voxelgrid_filter_keeps_one_point_per_voxel() {
        let mut rng = thread_rng();
        let cloud = (0..5000)
            .map(|_| Vector3::new(rng.gen::<f64>(), rng.gen::<f64>(), rng.gen::<f64>()))
            .collect::<VecPointCloud>();
        let filtered = voxelgrid_filter(&cloud, 0.25).unwrap();
        // The unit cube touches at most 5 voxels per axis
        assert!(filtered.len() <= 125);
        assert!(!filtered.has_colors());
        for position in filtered.positions() {
            assert!(position.iter().all(|c| (0.0..=1.0).contains(c)));
        }
    }

    #[test]
    fn test_voxelgrid_filter_invalid_leaf_size() {
        let cloud = VecPointCloud::from_positions(vec![Vector3::zeros()]);
        assert!(voxelgrid_filter(&cloud, 0.0).is_err());
    }
}
