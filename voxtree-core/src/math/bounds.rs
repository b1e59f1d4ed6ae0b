use nalgebra::{ClosedSub, Point3, Scalar, Vector3};

use super::MinMax;

/// 3D axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AABB<T: Scalar + PartialOrd> {
    min: Point3<T>,
    max: Point3<T>,
}

impl<T: Scalar + ClosedSub + PartialOrd + Copy> AABB<T> {
    /// Creates a new AABB from the given minimum and maximum coordinates. Panics if the minimum position is
    /// not less than or equal to the maximum position
    /// ```
    /// # use voxtree_core::math::AABB;
    /// let bounds = AABB::from_min_max(nalgebra::Point3::new(0.0, 0.0, 0.0), nalgebra::Point3::new(1.0, 1.0, 1.0));
    /// ```
    pub fn from_min_max(min: Point3<T>, max: Point3<T>) -> Self {
        if min.x > max.x || min.y > max.y || min.z > max.z {
            panic!("AABB::from_min_max: Minimum position must be <= maximum position!");
        }
        Self { min, max }
    }

    /// Like [from_min_max](AABB::from_min_max), but without checking that min <= max
    pub fn from_min_max_unchecked(min: Point3<T>, max: Point3<T>) -> Self {
        Self { min, max }
    }

    /// Returns the minimum point of this AABB
    pub fn min(&self) -> &Point3<T> {
        &self.min
    }

    /// Returns the maximum point of this AABB
    pub fn max(&self) -> &Point3<T> {
        &self.max
    }

    /// Returns the extent of this AABB, i.e. `max - min`
    /// ```
    /// # use voxtree_core::math::AABB;
    /// let bounds = AABB::from_min_max_unchecked(nalgebra::Point3::new(0.0, 0.0, 0.0), nalgebra::Point3::new(1.0, 2.0, 3.0));
    /// assert_eq!(bounds.extent(), nalgebra::Vector3::new(1.0, 2.0, 3.0));
    /// ```
    pub fn extent(&self) -> Vector3<T> {
        self.max - self.min
    }

    /// Returns true if the given point is inside this AABB. Points on the boundary count as inside
    pub fn contains(&self, point: &Point3<T>) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    /// Returns true if the given point is inside the half-open box `[min, max)`. This is the containment
    /// test that octree voxels use: a point on the upper boundary belongs to the neighbouring cell
    /// ```
    /// # use voxtree_core::math::AABB;
    /// # use nalgebra::Point3;
    /// let bounds = AABB::from_min_max_unchecked(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
    /// assert!(bounds.contains_half_open(&Point3::new(0.0, 0.5, 0.5)));
    /// assert!(!bounds.contains_half_open(&Point3::new(1.0, 0.5, 0.5)));
    /// ```
    pub fn contains_half_open(&self, point: &Point3<T>) -> bool {
        point.x >= self.min.x
            && point.x < self.max.x
            && point.y >= self.min.y
            && point.y < self.max.y
            && point.z >= self.min.z
            && point.z < self.max.z
    }
}

impl<T: Scalar + ClosedSub + PartialOrd + Copy + MinMax> AABB<T> {
    /// Smallest AABB that contains both `a` and `b`
    pub fn union(a: &AABB<T>, b: &AABB<T>) -> Self {
        Self {
            min: a.min.coords.infimum(&b.min.coords).into(),
            max: a.max.coords.supremum(&b.max.coords).into(),
        }
    }

    /// Extends the given AABB so that it contains the given point.
    /// ```
    /// # use voxtree_core::math::AABB;
    /// let bounds = AABB::from_min_max_unchecked(nalgebra::Point3::new(0.0, 0.0, 0.0), nalgebra::Point3::new(1.0, 1.0, 1.0));
    /// let extended_bounds = AABB::extend_with_point(&bounds, &nalgebra::Point3::new(2.0, -1.0, 0.5));
    /// assert_eq!(*extended_bounds.min(), nalgebra::Point3::new(0.0, -1.0, 0.0));
    /// assert_eq!(*extended_bounds.max(), nalgebra::Point3::new(2.0, 1.0, 1.0));
    /// ```
    pub fn extend_with_point(bounds: &AABB<T>, point: &Point3<T>) -> AABB<T> {
        Self {
            min: bounds.min.coords.infimum(&point.coords).into(),
            max: bounds.max.coords.supremum(&point.coords).into(),
        }
    }
}

impl AABB<f64> {
    /// Computes the bounding box of all finite positions yielded by `positions`. Returns `None` if there are none
    /// ```
    /// # use voxtree_core::math::AABB;
    /// # use nalgebra::{Point3, Vector3};
    /// let positions = vec![Vector3::new(1.0, 2.0, 3.0), Vector3::new(-1.0, 0.0, f64::NAN), Vector3::new(0.0, 4.0, 1.0)];
    /// let bounds = AABB::from_positions(positions.into_iter()).unwrap();
    /// assert_eq!(*bounds.min(), Point3::new(0.0, 2.0, 1.0));
    /// assert_eq!(*bounds.max(), Point3::new(1.0, 4.0, 3.0));
    /// ```
    pub fn from_positions<I: Iterator<Item = Vector3<f64>>>(positions: I) -> Option<Self> {
        let mut bounds: Option<Self> = None;
        for position in positions.filter(|p| p.iter().all(|c| c.is_finite())) {
            let point = Point3::from(position);
            bounds = Some(match bounds {
                None => Self::from_min_max_unchecked(point, point),
                Some(b) => Self::extend_with_point(&b, &point),
            });
        }
        bounds
    }

    /// Returns the center of this AABB
    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    /// Returns the largest of the three side lengths
    pub fn max_extent(&self) -> f64 {
        self.extent().max()
    }

    /// Returns the cube with side length `side_length` that has the same center as this AABB
    pub fn centered_cube(&self, side_length: f64) -> Self {
        let half = Vector3::new(side_length, side_length, side_length) * 0.5;
        let center = self.center();
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Squared distance from `point` to the closest point of this AABB. Zero if `point` is inside
    pub fn squared_distance_to(&self, point: &Point3<f64>) -> f64 {
        let mut distance = 0.0;
        for axis in 0..3 {
            let value = point[axis];
            if value < self.min[axis] {
                distance += (self.min[axis] - value).powi(2);
            } else if value > self.max[axis] {
                distance += (value - self.max[axis]).powi(2);
            }
        }
        distance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union() {
        let a = AABB::from_min_max(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        let b = AABB::from_min_max(Point3::new(2.0, -1.0, 0.5), Point3::new(3.0, 0.0, 4.0));
        let merged = AABB::union(&a, &b);
        assert_eq!(Point3::new(0.0, -1.0, 0.0), *merged.min());
        assert_eq!(Point3::new(3.0, 1.0, 4.0), *merged.max());
    }

    #[test]
    fn test_from_positions_empty() {
        assert!(AABB::from_positions(std::iter::empty()).is_none());
        let only_nan = vec![Vector3::new(f64::NAN, 0.0, 0.0)];
        assert!(AABB::from_positions(only_nan.into_iter()).is_none());
    }

    #[test]
    fn test_centered_cube() {
        let bounds = AABB::from_min_max(Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 1.0, 1.0));
        let cube = bounds.centered_cube(4.0);
        assert_eq!(Point3::new(-1.0, -1.5, -1.5), *cube.min());
        assert_eq!(Point3::new(3.0, 2.5, 2.5), *cube.max());
    }

    #[test]
    fn test_squared_distance() {
        let bounds = AABB::from_min_max(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        assert_eq!(0.0, bounds.squared_distance_to(&Point3::new(0.5, 0.5, 0.5)));
        assert_eq!(4.0, bounds.squared_distance_to(&Point3::new(3.0, 0.5, 0.5)));
        assert_eq!(2.0, bounds.squared_distance_to(&Point3::new(-1.0, 2.0, 0.5)));
    }
}
