use std::iter::FromIterator;

use nalgebra::Vector3;

/// Read access to a collection of points. This is the only thing the octree needs to know about point data: how
/// many points there are, where each point is and, optionally, what color it has
pub trait PointCloud {
    /// Number of points in this cloud
    fn len(&self) -> usize;
    /// Returns true if this cloud contains no points
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Position of the point at `index`. Panics if `index` is out of bounds
    fn position(&self, index: usize) -> Vector3<f64>;
    /// Returns true if the points of this cloud carry RGB colors
    fn has_colors(&self) -> bool;
    /// Color of the point at `index`, or `None` if this cloud has no colors. Panics if `index` is out of bounds
    fn color(&self, index: usize) -> Option<Vector3<u8>>;
}

/// A single point with position and RGB color
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColoredPoint {
    pub position: Vector3<f64>,
    pub color: Vector3<u8>,
}

impl ColoredPoint {
    pub fn new(position: Vector3<f64>, color: Vector3<u8>) -> Self {
        Self { position, color }
    }
}

/// `PointCloud` backed by `Vec`s. Colors are either present for all points or for none
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VecPointCloud {
    positions: Vec<Vector3<f64>>,
    colors: Option<Vec<Vector3<u8>>>,
}

impl VecPointCloud {
    /// Creates an empty cloud without colors
    pub fn new() -> Self {
        Default::default()
    }

    /// Creates an empty cloud that stores a color per point
    pub fn new_with_colors() -> Self {
        Self {
            positions: vec![],
            colors: Some(vec![]),
        }
    }

    /// Creates an empty cloud with room for `capacity` points
    pub fn with_capacity(capacity: usize, with_colors: bool) -> Self {
        Self {
            positions: Vec::with_capacity(capacity),
            colors: if with_colors {
                Some(Vec::with_capacity(capacity))
            } else {
                None
            },
        }
    }

    /// Creates a cloud without colors from the given positions
    pub fn from_positions(positions: Vec<Vector3<f64>>) -> Self {
        Self {
            positions,
            colors: None,
        }
    }

    /// Creates a colored cloud. Panics if `positions` and `colors` differ in length
    ///
    /// ```
    /// # use voxtree_core::containers::{PointCloud, VecPointCloud};
    /// # use nalgebra::Vector3;
    /// let cloud = VecPointCloud::from_positions_and_colors(
    ///     vec![Vector3::new(0.0, 1.0, 2.0)],
    ///     vec![Vector3::new(255, 0, 0)],
    /// );
    /// assert_eq!(Some(Vector3::new(255, 0, 0)), cloud.color(0));
    /// ```
    pub fn from_positions_and_colors(
        positions: Vec<Vector3<f64>>,
        colors: Vec<Vector3<u8>>,
    ) -> Self {
        assert_eq!(
            positions.len(),
            colors.len(),
            "VecPointCloud::from_positions_and_colors: Every position needs a color"
        );
        Self {
            positions,
            colors: Some(colors),
        }
    }

    /// Appends a point. If this cloud stores colors, the point gets black as its color
    pub fn push(&mut self, position: Vector3<f64>) {
        self.positions.push(position);
        if let Some(colors) = self.colors.as_mut() {
            colors.push(Vector3::zeros());
        }
    }

    /// Appends a colored point. If this cloud has no colors yet, all previous points are assigned black
    pub fn push_colored(&mut self, position: Vector3<f64>, color: Vector3<u8>) {
        let previous_len = self.positions.len();
        self.positions.push(position);
        self.colors
            .get_or_insert_with(|| vec![Vector3::zeros(); previous_len])
            .push(color);
    }

    /// Removes all points. Whether this cloud stores colors is unchanged
    pub fn clear(&mut self) {
        self.positions.clear();
        if let Some(colors) = self.colors.as_mut() {
            colors.clear();
        }
    }

    /// Removes all points and sets whether the cloud stores colors from now on
    pub fn reset(&mut self, with_colors: bool) {
        self.positions.clear();
        self.colors = if with_colors { Some(vec![]) } else { None };
    }

    /// Reserves room for at least `additional` more points
    pub fn reserve(&mut self, additional: usize) {
        self.positions.reserve(additional);
        if let Some(colors) = self.colors.as_mut() {
            colors.reserve(additional);
        }
    }

    pub fn positions(&self) -> &[Vector3<f64>] {
        &self.positions
    }

    pub fn colors(&self) -> Option<&[Vector3<u8>]> {
        self.colors.as_deref()
    }

    /// Iterates over all points as `ColoredPoint`s. Points of a cloud without colors are black
    pub fn iter(&self) -> impl Iterator<Item = ColoredPoint> + '_ {
        self.positions
            .iter()
            .enumerate()
            .map(move |(index, position)| ColoredPoint {
                position: *position,
                color: self
                    .colors
                    .as_ref()
                    .map(|colors| colors[index])
                    .unwrap_or_else(Vector3::zeros),
            })
    }
}

impl PointCloud for VecPointCloud {
    fn len(&self) -> usize {
        self.positions.len()
    }

    fn position(&self, index: usize) -> Vector3<f64> {
        self.positions[index]
    }

    fn has_colors(&self) -> bool {
        self.colors.is_some()
    }

    fn color(&self, index: usize) -> Option<Vector3<u8>> {
        self.colors.as_ref().map(|colors| colors[index])
    }
}

impl FromIterator<Vector3<f64>> for VecPointCloud {
    fn from_iter<T: IntoIterator<Item = Vector3<f64>>>(iter: T) -> Self {
        Self::from_positions(iter.into_iter().collect())
    }
}

impl FromIterator<ColoredPoint> for VecPointCloud {
    fn from_iter<T: IntoIterator<Item = ColoredPoint>>(iter: T) -> Self {
        let (positions, colors) = iter
            .into_iter()
            .map(|point| (point.position, point.color))
            .unzip();
        Self::from_positions_and_colors(positions, colors)
    }
}

impl<'a, C: PointCloud> PointCloud for &'a C {
    fn len(&self) -> usize {
        (*self).len()
    }

    fn position(&self, index: usize) -> Vector3<f64> {
        (*self).position(index)
    }

    fn has_colors(&self) -> bool {
        (*self).has_colors()
    }

    fn color(&self, index: usize) -> Option<Vector3<u8>> {
        (*self).color(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_colored_backfills_colors() {
        let mut cloud = VecPointCloud::new();
        cloud.push(Vector3::new(1.0, 2.0, 3.0));
        assert!(!cloud.has_colors());
        cloud.push_colored(Vector3::new(4.0, 5.0, 6.0), Vector3::new(10, 20, 30));
        assert!(cloud.has_colors());
        assert_eq!(Some(Vector3::zeros()), cloud.color(0));
        assert_eq!(Some(Vector3::new(10, 20, 30)), cloud.color(1));
    }

    #[test]
    fn test_collect_colored_points() {
        let cloud = (0..4)
            .map(|i| ColoredPoint::new(Vector3::new(i as f64, 0.0, 0.0), Vector3::new(i, i, i)))
            .collect::<VecPointCloud>();
        assert_eq!(4, cloud.len());
        let round_trip = cloud.iter().collect::<Vec<_>>();
        assert_eq!(Vector3::new(3, 3, 3), round_trip[3].color);
    }

    #[test]
    fn test_reset() {
        let mut cloud = VecPointCloud::new_with_colors();
        cloud.push(Vector3::zeros());
        cloud.reset(false);
        assert!(cloud.is_empty());
        assert!(!cloud.has_colors());
    }
}
