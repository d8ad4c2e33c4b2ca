//! Geometric helpers for 3D collision tests and fit checks.
//!
//! Boxes are axis-aligned and described by their start (lowest) and end
//! (highest) corner. Items are never reoriented.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::types::{Coordinates, Dimensional};

/// Axis-aligned box occupied by a placed item, `end = start + dims`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub start_coordinates: Coordinates,
    pub end_coordinates: Coordinates,
}

impl Position {
    #[inline]
    pub const fn new(start: Coordinates, end: Coordinates) -> Self {
        Self {
            start_coordinates: start,
            end_coordinates: end,
        }
    }

    /// Creates the box spanned by `dims` from `start`.
    #[inline]
    pub fn from_start_and_dims(start: Coordinates, dims: Coordinates) -> Self {
        Self::new(start, start + dims)
    }

    #[inline]
    pub fn start(&self) -> Coordinates {
        self.start_coordinates
    }

    #[inline]
    pub fn end(&self) -> Coordinates {
        self.end_coordinates
    }

    /// Extent of the box (end - start).
    #[inline]
    pub fn dimensions(&self) -> Coordinates {
        self.end_coordinates - self.start_coordinates
    }

    /// Checks if the box intersects `other`.
    #[inline]
    pub fn intersects(&self, other: &Self) -> bool {
        overlaps(self, other)
    }

    /// Checks if the box lies inside a container of extent `bounds`.
    #[inline]
    pub fn is_within(&self, bounds: &Coordinates, tolerance: f64) -> bool {
        let start = self.start_coordinates;
        start.width >= -tolerance
            && start.depth >= -tolerance
            && start.height >= -tolerance
            && self.end_coordinates.fits_within(bounds, tolerance)
    }

    /// Lateral (width-axis) interval as `(start, end)`.
    #[inline]
    pub fn lateral_span(&self) -> (f64, f64) {
        (self.start_coordinates.width, self.end_coordinates.width)
    }

    /// Near (opening-side) edge along the access axis.
    #[inline]
    pub fn near_depth(&self) -> f64 {
        self.start_coordinates.depth
    }

    /// Far edge along the access axis.
    #[inline]
    pub fn far_depth(&self) -> f64 {
        self.end_coordinates.depth
    }
}

/// True iff each of the item's dimensions is `<=` the container's
/// corresponding dimension. No rotation is tried.
pub fn fits(container: &impl Dimensional, item_dims: &Coordinates, tolerance: f64) -> bool {
    item_dims.fits_within(&container.dimensions(), tolerance)
}

/// Checks whether two boxes intersect.
///
/// Separating Axis Theorem: the boxes do NOT overlap if they are disjoint
/// on at least one axis. Touching faces do not count as overlap.
pub fn overlaps(a: &Position, b: &Position) -> bool {
    let (a0, a1) = (a.start_coordinates, a.end_coordinates);
    let (b0, b1) = (b.start_coordinates, b.end_coordinates);

    !(a1.width <= b0.width
        || b1.width <= a0.width
        || a1.depth <= b0.depth
        || b1.depth <= a0.depth
        || a1.height <= b0.height
        || b1.height <= a0.height)
}

/// Length of the overlap of two intervals, at least 0.0.
///
/// ```
/// use stow_it_now::geometry::overlap_1d;
///
/// assert_eq!(overlap_1d(0.0, 5.0, 3.0, 8.0), 2.0);
/// ```
pub fn overlap_1d(a1: f64, a2: f64, b1: f64, b2: f64) -> f64 {
    (a2.min(b2) - a1.max(b1)).max(0.0)
}

/// Checks whether two boxes share a lateral (width-axis) band of positive length.
pub fn lateral_overlap(a: &Position, b: &Position, tolerance: f64) -> bool {
    let (a1, a2) = a.lateral_span();
    let (b1, b2) = b.lateral_span();
    overlap_1d(a1, a2, b1, b2) > tolerance
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EPSILON_GENERAL;

    struct Bin(Coordinates);

    impl Dimensional for Bin {
        fn dimensions(&self) -> Coordinates {
            self.0
        }
    }

    fn cube(x: f64, y: f64, z: f64, size: f64) -> Position {
        Position::from_start_and_dims(
            Coordinates::new(x, y, z),
            Coordinates::new(size, size, size),
        )
    }

    #[test]
    fn fits_is_componentwise() {
        let bin = Bin(Coordinates::new(10.0, 10.0, 10.0));
        assert!(fits(&bin, &Coordinates::new(10.0, 4.0, 4.0), EPSILON_GENERAL));
        assert!(!fits(&bin, &Coordinates::new(11.0, 1.0, 1.0), EPSILON_GENERAL));
    }

    #[test]
    fn overlapping_and_disjoint_boxes() {
        let a = cube(0.0, 0.0, 0.0, 4.0);
        assert!(overlaps(&a, &cube(2.0, 2.0, 2.0, 4.0)));
        assert!(!overlaps(&a, &cube(4.0, 0.0, 0.0, 4.0)));
        assert!(!overlaps(&a, &cube(0.0, 0.0, 4.0, 4.0)));
        // Disjoint on a single axis is enough.
        assert!(!overlaps(&a, &cube(1.0, 1.0, 9.0, 4.0)));
    }

    #[test]
    fn position_dimensions_and_bounds() {
        let p = cube(4.0, 0.0, 0.0, 4.0);
        assert_eq!(p.end(), Coordinates::new(8.0, 4.0, 4.0));
        assert_eq!(p.dimensions(), Coordinates::new(4.0, 4.0, 4.0));
        assert!(p.is_within(&Coordinates::new(10.0, 10.0, 10.0), EPSILON_GENERAL));
        assert!(!p.is_within(&Coordinates::new(7.0, 10.0, 10.0), EPSILON_GENERAL));
    }

    #[test]
    fn lateral_overlap_requires_positive_length() {
        let a = cube(0.0, 0.0, 0.0, 4.0);
        assert!(lateral_overlap(&a, &cube(3.0, 6.0, 0.0, 4.0), EPSILON_GENERAL));
        assert!(!lateral_overlap(&a, &cube(4.0, 6.0, 0.0, 4.0), EPSILON_GENERAL));
    }

    #[test]
    fn serializes_with_camel_case_corners() {
        let json = serde_json::to_value(cube(0.0, 0.0, 0.0, 1.0)).unwrap();
        assert!(json.get("startCoordinates").is_some());
        assert_eq!(json["endCoordinates"]["height"], 1.0);
    }
}
