use std::cmp;

use nalgebra::{Scalar, Vector3};

/// Component-wise minimum and maximum. Used for growing bounding boxes, where scalar types use
/// `PartialOrd` and vector types work per component
pub trait MinMax {
    /// Computes the infimum of this value and `other`
    ///
    /// # Example
    /// ```
    /// use voxtree_core::math::MinMax;
    /// # use voxtree_core::nalgebra::Vector3;
    ///
    /// assert_eq!(5u32.infimum(&3u32), 3u32);
    /// assert_eq!(Vector3::new(1.0, 2.0, 3.0).infimum(&Vector3::new(2.0, 1.0, 0.0)), Vector3::new(1.0, 1.0, 0.0));
    /// ```
    fn infimum(&self, other: &Self) -> Self;
    /// Computes the supremum of this value and `other`
    ///
    /// # Example
    /// ```
    /// use voxtree_core::math::MinMax;
    /// # use voxtree_core::nalgebra::Vector3;
    ///
    /// assert_eq!(5u32.supremum(&3u32), 5u32);
    /// assert_eq!(Vector3::new(1.0, 2.0, 3.0).supremum(&Vector3::new(2.0, 1.0, 4.0)), Vector3::new(2.0, 2.0, 4.0));
    /// ```
    fn supremum(&self, other: &Self) -> Self;
}

macro_rules! impl_minmax_for_integer_type {
    ($type:tt) => {
        impl MinMax for $type {
            fn infimum(&self, other: &Self) -> Self {
                cmp::min(*self, *other)
            }

            fn supremum(&self, other: &Self) -> Self {
                cmp::max(*self, *other)
            }
        }
    };
}

impl_minmax_for_integer_type! {u8}
impl_minmax_for_integer_type! {u32}
impl_minmax_for_integer_type! {u64}
impl_minmax_for_integer_type! {i32}

impl MinMax for f64 {
    fn infimum(&self, other: &Self) -> Self {
        if *self < *other {
            *self
        } else {
            *other
        }
    }

    fn supremum(&self, other: &Self) -> Self {
        if *self > *other {
            *self
        } else {
            *other
        }
    }
}

impl<T: MinMax + Scalar> MinMax for Vector3<T> {
    fn infimum(&self, other: &Self) -> Self {
        Vector3::new(
            self.x.infimum(&other.x),
            self.y.infimum(&other.y),
            self.z.infimum(&other.z),
        )
    }

    fn supremum(&self, other: &Self) -> Self {
        Vector3::new(
            self.x.supremum(&other.x),
            self.y.supremum(&other.y),
            self.z.supremum(&other.z),
        )
    }
}
