//! Data models for storage planning.
//!
//! This module defines the canonical in-memory records the engine works on:
//! - `Item`: cargo to be stowed, with priority and zone preference
//! - `Container`: a finite storage volume belonging to a zone
//! - `Placement`: the box an item occupies inside a container
//!
//! Conversion from wire or database shapes happens once, at the boundary
//! (serde), never inside the algorithms.

use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::error::{StowageError, StowageResult};
use crate::geometry::Position;
use crate::types::{Coordinates, Dimensional, EPSILON_GENERAL, validation};

/// Serde default for flags that are on unless stated otherwise.
fn default_true() -> bool {
    true
}

/// A cargo item.
///
/// Items are axis-aligned boxes and are never rotated: `width` runs along
/// the container opening, `depth` away from it and `height` upwards.
/// Usage and expiry fields are carried through unchanged; the engine only
/// reads `priority`, the zone fields and the dimensions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "itemId": "I1",
    "name": "Food packet",
    "width": 4.0,
    "depth": 4.0,
    "height": 4.0,
    "priority": 95,
    "preferredZone": "A"
}))]
pub struct Item {
    /// Unique identifier.
    pub item_id: String,
    /// Display name, searchable with a case-insensitive partial match.
    #[serde(default)]
    pub name: String,
    /// Extent along the opening.
    pub width: f64,
    /// Extent away from the opening.
    pub depth: f64,
    pub height: f64,
    /// Placement importance, 1–100.
    pub priority: u8,
    /// Expiry marker as given by the caller, e.g. an ISO date.
    #[serde(default)]
    pub expiry_date: Option<String>,
    /// Number of uses before the item is spent, if limited.
    #[serde(default)]
    pub usage_limit: Option<u32>,
    #[serde(default)]
    pub current_uses: u32,
    /// Zone whose containers are tried first.
    pub preferred_zone: String,
    /// Whether overflow may go to containers of other zones.
    #[serde(default = "default_true")]
    pub allow_non_preferred_zone: bool,
    /// Set once the item is flagged as waste; its slot is freed then.
    #[serde(default)]
    pub is_waste: bool,
    /// Why the item became waste, e.g. "Expired".
    #[serde(default)]
    pub waste_reason: Option<String>,
}

impl Item {
    /// Creates a validated item with default bookkeeping fields.
    ///
    /// # Examples
    /// ```
    /// use stow_it_now::model::Item;
    ///
    /// assert!(Item::new("I1", (4.0, 4.0, 4.0), 95, "A").is_ok());
    /// assert!(Item::new("I2", (-4.0, 4.0, 4.0), 95, "A").is_err());
    /// ```
    pub fn new(
        item_id: impl Into<String>,
        dims: (f64, f64, f64),
        priority: u8,
        preferred_zone: impl Into<String>,
    ) -> StowageResult<Self> {
        let item = Self {
            item_id: item_id.into(),
            name: String::new(),
            width: dims.0,
            depth: dims.1,
            height: dims.2,
            priority,
            expiry_date: None,
            usage_limit: None,
            current_uses: 0,
            preferred_zone: preferred_zone.into(),
            allow_non_preferred_zone: true,
            is_waste: false,
            waste_reason: None,
        };
        item.validate()?;
        Ok(item)
    }

    /// Sets whether the item may be stowed outside its preferred zone.
    pub fn with_allow_non_preferred(mut self, allow: bool) -> Self {
        self.allow_non_preferred_zone = allow;
        self
    }

    /// Sets the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Checks id, dimensions and priority.
    ///
    /// # Errors
    /// [`StowageError::Validation`] for an empty id, a non-positive or
    /// non-finite dimension, or a priority outside 1–100.
    pub fn validate(&self) -> StowageResult<()> {
        let subject = || format!("item '{}'", self.item_id);
        validation::validate_id(&self.item_id, "Item id")
            .and_then(|_| validation::validate_dimensions_3d(&self.dimensions(), "Item"))
            .and_then(|_| validation::validate_priority(self.priority))
            .map_err(|msg| StowageError::validation(subject(), msg))
    }

    /// Flags the item as waste. Freeing its placement is up to the caller.
    pub fn mark_waste(&mut self, reason: impl Into<String>) {
        self.is_waste = true;
        self.waste_reason = Some(reason.into());
    }
}

impl Dimensional for Item {
    fn dimensions(&self) -> Coordinates {
        Coordinates::new(self.width, self.depth, self.height)
    }
}

/// A storage container.
///
/// A container is a box open at depth 0. It belongs to exactly one zone;
/// zones exist only as the set of their containers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "containerId": "C1",
    "zone": "A",
    "width": 10.0,
    "depth": 10.0,
    "height": 10.0
}))]
pub struct Container {
    /// Unique identifier.
    pub container_id: String,
    /// Zone the container belongs to.
    pub zone: String,
    /// Width of the opening.
    pub width: f64,
    /// Distance from the opening to the back wall.
    pub depth: f64,
    pub height: f64,
}

impl Container {
    /// Creates a validated container.
    ///
    /// # Examples
    /// ```
    /// use stow_it_now::model::Container;
    ///
    /// assert!(Container::new("C1", "A", (10.0, 10.0, 10.0)).is_ok());
    /// assert!(Container::new("C2", "A", (10.0, 0.0, 10.0)).is_err());
    /// ```
    pub fn new(
        container_id: impl Into<String>,
        zone: impl Into<String>,
        dims: (f64, f64, f64),
    ) -> StowageResult<Self> {
        let container = Self {
            container_id: container_id.into(),
            zone: zone.into(),
            width: dims.0,
            depth: dims.1,
            height: dims.2,
        };
        container.validate()?;
        Ok(container)
    }

    /// Checks id and dimensions.
    pub fn validate(&self) -> StowageResult<()> {
        validation::validate_id(&self.container_id, "Container id")
            .and_then(|_| validation::validate_dimensions_3d(&self.dimensions(), "Container"))
            .map_err(|msg| {
                StowageError::validation(format!("container '{}'", self.container_id), msg)
            })
    }

    /// Checks if the item fits without rotation (ignores current occupancy).
    pub fn can_fit(&self, item: &Item) -> bool {
        item.fits_in(&self.dimensions(), EPSILON_GENERAL)
    }
}

impl Dimensional for Container {
    fn dimensions(&self) -> Coordinates {
        Coordinates::new(self.width, self.depth, self.height)
    }
}

/// A live placement of one item in one container.
///
/// There is at most one placement per item. The box is stored as both
/// corners, so it can be checked against the item's dimensions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub item_id: String,
    pub container_id: String,
    /// Occupied box in container coordinates.
    pub position: Position,
}

impl Placement {
    /// Creates a placement without checking it; see
    /// [`validate_against`](Self::validate_against).
    pub fn new(
        item_id: impl Into<String>,
        container_id: impl Into<String>,
        position: Position,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            container_id: container_id.into(),
            position,
        }
    }

    /// Checks corner consistency against the item and the container:
    /// `0 <= start`, `end = start + item dims`, `end <= container dims`.
    pub fn validate_against(
        &self,
        item: &Item,
        container: &Container,
        tolerance: f64,
    ) -> StowageResult<()> {
        let subject = || format!("placement of item '{}'", self.item_id);
        let start = self.position.start();

        validation::validate_coordinate(&start, "Start corner")
            .and_then(|_| validation::validate_coordinate(&self.position.end(), "End corner"))
            .map_err(|msg| StowageError::validation(subject(), msg))?;

        if !self
            .position
            .dimensions()
            .approx_eq(&item.dimensions(), tolerance)
        {
            return Err(StowageError::validation(
                subject(),
                "end corner must equal start corner plus item dimensions",
            ));
        }

        if !self.position.is_within(&container.dimensions(), tolerance) {
            return Err(StowageError::validation(
                subject(),
                format!(
                    "box exceeds container '{}' bounds",
                    container.container_id
                ),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container() -> Container {
        Container::new("C", "A", (10.0, 10.0, 10.0)).unwrap()
    }

    #[test]
    fn item_validation_rejects_bad_records() {
        assert!(Item::new("", (1.0, 1.0, 1.0), 50, "A").is_err());
        assert!(Item::new("I", (0.0, 1.0, 1.0), 50, "A").is_err());
        assert!(Item::new("I", (1.0, 1.0, 1.0), 0, "A").is_err());
        assert!(Item::new("I", (1.0, 1.0, 1.0), 101, "A").is_err());
        assert!(matches!(
            Item::new("I", (1.0, f64::NAN, 1.0), 50, "A"),
            Err(StowageError::Validation { .. })
        ));
    }

    #[test]
    fn container_validation_rejects_bad_dims() {
        assert!(Container::new("C", "A", (10.0, -1.0, 10.0)).is_err());
        assert!(Container::new(" ", "A", (10.0, 1.0, 10.0)).is_err());
    }

    #[test]
    fn item_deserializes_with_defaults() {
        let json = r#"{
            "itemId": "I1",
            "width": 4.0, "depth": 4.0, "height": 4.0,
            "priority": 95,
            "preferredZone": "A"
        }"#;
        let item: Item = serde_json::from_str(json).expect("Should parse valid JSON");
        assert!(item.allow_non_preferred_zone);
        assert!(!item.is_waste);
        assert_eq!(item.current_uses, 0);
        assert!(item.validate().is_ok());
    }

    #[test]
    fn mark_waste_sets_reason() {
        let mut item = Item::new("I1", (1.0, 1.0, 1.0), 10, "A").unwrap();
        item.mark_waste("Expired");
        assert!(item.is_waste);
        assert_eq!(item.waste_reason.as_deref(), Some("Expired"));
    }

    #[test]
    fn placement_validation_checks_corners() {
        let item = Item::new("I1", (4.0, 4.0, 4.0), 95, "A").unwrap();
        let c = container();

        let ok = Placement::new(
            "I1",
            "C",
            Position::from_start_and_dims(Coordinates::new(6.0, 0.0, 0.0), item.dimensions()),
        );
        assert!(ok.validate_against(&item, &c, EPSILON_GENERAL).is_ok());

        let outside = Placement::new(
            "I1",
            "C",
            Position::from_start_and_dims(Coordinates::new(7.0, 0.0, 0.0), item.dimensions()),
        );
        assert!(outside.validate_against(&item, &c, EPSILON_GENERAL).is_err());

        let wrong_end = Placement::new(
            "I1",
            "C",
            Position::new(Coordinates::origin(), Coordinates::new(4.0, 4.0, 5.0)),
        );
        assert!(wrong_end.validate_against(&item, &c, EPSILON_GENERAL).is_err());

        let negative = Placement::new(
            "I1",
            "C",
            Position::from_start_and_dims(Coordinates::new(-1.0, 0.0, 0.0), item.dimensions()),
        );
        assert!(negative.validate_against(&item, &c, EPSILON_GENERAL).is_err());
    }
}
