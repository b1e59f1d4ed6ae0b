use voxtree_core::{containers::PointCloud, math::AABB};

/// Calculate the bounding box of the points in the given `cloud`. Points with non-finite coordinates are ignored.
/// Returns `None` if the cloud contains no points with finite coordinates
pub fn calculate_bounds<C: PointCloud>(cloud: &C) -> Option<AABB<f64>> {
    if cloud.is_empty() {
        return None;
    }
    AABB::from_positions((0..cloud.len()).map(|index| cloud.position(index)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxtree_core::{
        containers::VecPointCloud,
        nalgebra::{Point3, Vector3},
    };

    #[test]
    fn test_calculate_bounds() {
        let cloud = VecPointCloud::from_positions(vec![
            Vector3::new(1.0, -2.0, 3.0),
            Vector3::new(-1.0, 4.0, 0.5),
            Vector3::new(f64::NAN, 100.0, 0.0),
        ]);
        let bounds = calculate_bounds(&cloud).unwrap();
        assert_eq!(Point3::new(-1.0, -2.0, 0.5), *bounds.min());
        assert_eq!(Point3::new(1.0, 4.0, 3.0), *bounds.max());
    }

    #[test]
    fn test_calculate_bounds_empty() {
        assert!(calculate_bounds(&VecPointCloud::new()).is_none());
    }
}
