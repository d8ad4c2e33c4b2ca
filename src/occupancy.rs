//! Occupied-space index for a single container.
//!
//! Regions are kept as axis-aligned boxes keyed by the occupying item, so
//! "is region free" costs one box test per occupant instead of one lookup
//! per unit cell. The contract is the same as a unit-grid model: a region
//! is free iff it intersects no occupied region.

use std::collections::BTreeMap;

use crate::error::{StowageError, StowageResult};
use crate::geometry::{Position, overlaps};
use crate::model::Placement;

/// Occupied space of one container.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OccupancyIndex {
    container_id: String,
    regions: BTreeMap<String, Position>,
}

impl OccupancyIndex {
    pub fn new(container_id: impl Into<String>) -> Self {
        Self {
            container_id: container_id.into(),
            regions: BTreeMap::new(),
        }
    }

    /// Builds the index from the placements that belong to `container_id`.
    ///
    /// Placements of other containers are skipped. Fails with
    /// [`StowageError::Overlap`] if the given placements already collide.
    pub fn from_placements<'a>(
        container_id: &str,
        placements: impl IntoIterator<Item = &'a Placement>,
    ) -> StowageResult<Self> {
        let mut index = Self::new(container_id);
        for placement in placements
            .into_iter()
            .filter(|p| p.container_id == container_id)
        {
            index.occupy(&placement.item_id, placement.position)?;
        }
        Ok(index)
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// Returns true if no occupied region intersects `region`.
    pub fn is_free(&self, region: &Position) -> bool {
        self.first_collision(region).is_none()
    }

    /// Same as [`is_free`](Self::is_free) but ignores the region of `item_id`.
    pub fn is_free_except(&self, region: &Position, item_id: &str) -> bool {
        !self
            .regions
            .iter()
            .any(|(id, occupied)| id != item_id && overlaps(occupied, region))
    }

    /// Id of the first occupant (in id order) that intersects `region`.
    pub fn first_collision(&self, region: &Position) -> Option<&str> {
        self.regions
            .iter()
            .find(|(_, occupied)| overlaps(occupied, region))
            .map(|(id, _)| id.as_str())
    }

    /// Marks `region` as occupied by `item_id`.
    ///
    /// An item holds at most one region; occupying again moves it.
    pub fn occupy(&mut self, item_id: &str, region: Position) -> StowageResult<()> {
        if let Some((occupant, _)) = self
            .regions
            .iter()
            .find(|(id, occupied)| id.as_str() != item_id && overlaps(occupied, &region))
        {
            return Err(StowageError::Overlap {
                item_id: item_id.to_string(),
                container_id: self.container_id.clone(),
                occupant_id: occupant.clone(),
            });
        }
        self.regions.insert(item_id.to_string(), region);
        Ok(())
    }

    /// Frees the region held by `item_id`, returning it.
    pub fn release(&mut self, item_id: &str) -> Option<Position> {
        self.regions.remove(item_id)
    }

    pub fn region_of(&self, item_id: &str) -> Option<&Position> {
        self.regions.get(item_id)
    }

    /// Occupied regions in item-id order.
    pub fn regions(&self) -> impl Iterator<Item = (&str, &Position)> {
        self.regions.iter().map(|(id, pos)| (id.as_str(), pos))
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Sum of the occupied volumes.
    pub fn used_volume(&self) -> f64 {
        self.regions.values().map(|p| p.dimensions().volume()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Coordinates;

    fn cube(x: f64, y: f64, size: f64) -> Position {
        Position::from_start_and_dims(
            Coordinates::new(x, y, 0.0),
            Coordinates::new(size, size, size),
        )
    }

    #[test]
    fn occupy_and_query() {
        let mut index = OccupancyIndex::new("C");
        index.occupy("I1", cube(0.0, 0.0, 4.0)).unwrap();

        assert!(!index.is_free(&cube(2.0, 2.0, 4.0)));
        assert!(index.is_free(&cube(4.0, 0.0, 4.0)));
        assert_eq!(index.first_collision(&cube(1.0, 1.0, 1.0)), Some("I1"));
        assert!((index.used_volume() - 64.0).abs() < 1e-9);
    }

    #[test]
    fn occupy_rejects_collision() {
        let mut index = OccupancyIndex::new("C");
        index.occupy("I1", cube(0.0, 0.0, 4.0)).unwrap();

        let err = index.occupy("I2", cube(3.0, 3.0, 4.0)).unwrap_err();
        assert_eq!(
            err,
            StowageError::Overlap {
                item_id: "I2".into(),
                container_id: "C".into(),
                occupant_id: "I1".into(),
            }
        );
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn reoccupy_moves_the_same_item() {
        let mut index = OccupancyIndex::new("C");
        index.occupy("I1", cube(0.0, 0.0, 4.0)).unwrap();
        index.occupy("I1", cube(2.0, 0.0, 4.0)).unwrap();

        assert_eq!(index.len(), 1);
        assert_eq!(index.region_of("I1"), Some(&cube(2.0, 0.0, 4.0)));
        assert!(index.is_free_except(&cube(0.0, 0.0, 4.0), "I1"));
    }

    #[test]
    fn release_restores_free_space() {
        let mut index = OccupancyIndex::new("C");
        index.occupy("I1", cube(0.0, 0.0, 4.0)).unwrap();
        assert_eq!(index.release("I1"), Some(cube(0.0, 0.0, 4.0)));
        assert!(index.is_empty());
        assert!(index.is_free(&cube(0.0, 0.0, 4.0)));
        assert_eq!(index.release("I1"), None);
    }

    #[test]
    fn from_placements_filters_by_container() {
        let placements = vec![
            Placement::new("I1", "C", cube(0.0, 0.0, 4.0)),
            Placement::new("I2", "D", cube(0.0, 0.0, 4.0)),
        ];
        let index = OccupancyIndex::from_placements("C", &placements).unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.region_of("I2").is_none());
    }
}
