//! Common types and traits for 3D storage geometry.
//!
//! Axis convention used throughout the crate:
//! - `width`  – lateral axis, scanned left to right by the planner
//! - `depth`  – access axis, `depth = 0` is the container opening
//! - `height` – vertical axis

use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Global numerical tolerance for floating-point comparisons.
pub const EPSILON_GENERAL: f64 = 1e-6;

/// A point or an extent in container space.
///
/// Used both for corners (`startCoordinates`/`endCoordinates`) and for
/// item/container dimensions.
///
/// # Examples
/// ```
/// use stow_it_now::types::Coordinates;
///
/// let start = Coordinates::new(4.0, 0.0, 0.0);
/// let dims = Coordinates::new(4.0, 4.0, 4.0);
/// assert_eq!(start + dims, Coordinates::new(8.0, 4.0, 4.0));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Coordinates {
    pub width: f64,
    pub depth: f64,
    pub height: f64,
}

impl Coordinates {
    #[inline]
    pub const fn new(width: f64, depth: f64, height: f64) -> Self {
        Self {
            width,
            depth,
            height,
        }
    }

    /// The container origin (front-left-bottom corner).
    #[inline]
    pub const fn origin() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    #[inline]
    pub const fn as_tuple(&self) -> (f64, f64, f64) {
        (self.width, self.depth, self.height)
    }

    /// Product of all components. Meaningful for extents only.
    #[inline]
    pub fn volume(&self) -> f64 {
        self.width * self.depth * self.height
    }

    /// Checks if all components are positive and finite.
    #[inline]
    pub fn is_valid_dimension(&self) -> bool {
        [self.width, self.depth, self.height]
            .iter()
            .all(|v| *v > 0.0 && v.is_finite())
    }

    /// Checks if all components are non-negative and finite.
    #[inline]
    pub fn is_valid_point(&self) -> bool {
        [self.width, self.depth, self.height]
            .iter()
            .all(|v| *v >= 0.0 && v.is_finite())
    }

    /// Component-wise `<=` with tolerance. No reorientation is attempted.
    #[inline]
    pub fn fits_within(&self, outer: &Self, tolerance: f64) -> bool {
        self.width <= outer.width + tolerance
            && self.depth <= outer.depth + tolerance
            && self.height <= outer.height + tolerance
    }

    /// Component-wise equality with tolerance.
    #[inline]
    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        (self.width - other.width).abs() <= tolerance
            && (self.depth - other.depth).abs() <= tolerance
            && (self.height - other.height).abs() <= tolerance
    }
}

impl Add for Coordinates {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        Self::new(
            self.width + rhs.width,
            self.depth + rhs.depth,
            self.height + rhs.height,
        )
    }
}

impl Sub for Coordinates {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(
            self.width - rhs.width,
            self.depth - rhs.depth,
            self.height - rhs.height,
        )
    }
}

impl From<(f64, f64, f64)> for Coordinates {
    #[inline]
    fn from(tuple: (f64, f64, f64)) -> Self {
        Self::new(tuple.0, tuple.1, tuple.2)
    }
}

impl From<Coordinates> for (f64, f64, f64) {
    #[inline]
    fn from(coords: Coordinates) -> Self {
        coords.as_tuple()
    }
}

/// Trait for records with a 3D extent.
pub trait Dimensional {
    /// Returns the extent (width, depth, height).
    fn dimensions(&self) -> Coordinates;

    fn volume(&self) -> f64 {
        self.dimensions().volume()
    }

    /// Checks if this extent fits into `outer` without rotation.
    fn fits_in(&self, outer: &Coordinates, tolerance: f64) -> bool {
        self.dimensions().fits_within(outer, tolerance)
    }
}

/// Validation helpers shared by the record constructors.
pub mod validation {
    use super::Coordinates;

    /// Validates a single dimension.
    pub fn validate_dimension(value: f64, name: &str) -> Result<(), String> {
        if value.is_nan() {
            return Err(format!("{} must not be NaN", name));
        }
        if value.is_infinite() {
            return Err(format!("{} must not be infinite", name));
        }
        if value <= 0.0 {
            return Err(format!("{} must be positive, got: {}", name, value));
        }
        Ok(())
    }

    /// Validates all three dimensions of an extent.
    pub fn validate_dimensions_3d(dims: &Coordinates, owner: &str) -> Result<(), String> {
        validate_dimension(dims.width, &format!("{owner} width"))?;
        validate_dimension(dims.depth, &format!("{owner} depth"))?;
        validate_dimension(dims.height, &format!("{owner} height"))?;
        Ok(())
    }

    /// Validates a coordinate (corner) value: finite and non-negative.
    pub fn validate_coordinate(point: &Coordinates, name: &str) -> Result<(), String> {
        if !point.is_valid_point() {
            return Err(format!(
                "{} must be finite and non-negative, got: ({}, {}, {})",
                name, point.width, point.depth, point.height
            ));
        }
        Ok(())
    }

    /// Validates an item priority (1–100).
    pub fn validate_priority(priority: u8) -> Result<(), String> {
        if !(1..=100).contains(&priority) {
            return Err(format!("Priority must be within 1..=100, got: {}", priority));
        }
        Ok(())
    }

    /// Validates a record id.
    pub fn validate_id(id: &str, name: &str) -> Result<(), String> {
        if id.trim().is_empty() {
            return Err(format!("{} must not be empty", name));
        }
        Ok(())
    }
}
