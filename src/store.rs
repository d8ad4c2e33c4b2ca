//! Persistence port for items, containers and live placements.
//!
//! The engine never talks to a database directly. Everything it needs is
//! expressed by [`PlacementStore`]; [`MemoryStore`] is the in-process
//! implementation used by the HTTP server and the tests.

use std::collections::BTreeMap;

use crate::action_log::LogEntry;
use crate::error::{EntityKind, StowageError, StowageResult};
use crate::model::{Container, Item, Placement};

/// Port for reading and writing the stowage state.
///
/// Implementations must return containers in registration order and
/// placements in a stable order; the planner's zone order and tie-breaks
/// depend on it.
///
/// The port has no transactions. A planning call reads every placement,
/// plans, then writes, so callers must serialise writes that touch the same
/// container. The server does this with one lock around the whole service.
pub trait PlacementStore: Send + Sync {
    fn list_containers(&self) -> StowageResult<Vec<Container>>;

    /// Every known item, ordered by id.
    fn list_items(&self) -> StowageResult<Vec<Item>>;

    fn list_current_placements(&self) -> StowageResult<Vec<Placement>>;

    /// Inserts or replaces the placement of each item.
    fn upsert_placements(&mut self, placements: Vec<Placement>) -> StowageResult<()>;

    /// Removes the placements of `item_ids`, returning how many existed.
    fn delete_placements(&mut self, item_ids: &[String]) -> StowageResult<usize>;

    fn upsert_items(&mut self, items: Vec<Item>) -> StowageResult<()>;

    /// Inserts new containers at the end, replaces known ones in place.
    fn upsert_containers(&mut self, containers: Vec<Container>) -> StowageResult<()>;

    fn get_item(&self, item_id: &str) -> StowageResult<Option<Item>>;

    fn get_container(&self, container_id: &str) -> StowageResult<Option<Container>>;

    fn get_placement(&self, item_id: &str) -> StowageResult<Option<Placement>>;

    /// Replaces a known item. Fails with `NotFound` for unknown ids.
    fn update_item(&mut self, item: Item) -> StowageResult<()>;

    /// Appends entries to the action log.
    fn append_logs(&mut self, entries: Vec<LogEntry>) -> StowageResult<()>;

    /// The action log in insertion order.
    fn list_logs(&self) -> StowageResult<Vec<LogEntry>>;

    /// Current placements of one container.
    fn list_container_placements(&self, container_id: &str) -> StowageResult<Vec<Placement>> {
        Ok(self
            .list_current_placements()?
            .into_iter()
            .filter(|p| p.container_id == container_id)
            .collect())
    }
}

/// In-memory store. Placements and items are ordered by id.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    items: BTreeMap<String, Item>,
    containers: Vec<Container>,
    placements: BTreeMap<String, Placement>,
    logs: Vec<LogEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn placement_count(&self) -> usize {
        self.placements.len()
    }

    pub fn log_count(&self) -> usize {
        self.logs.len()
    }
}

impl PlacementStore for MemoryStore {
    fn list_containers(&self) -> StowageResult<Vec<Container>> {
        Ok(self.containers.clone())
    }

    fn list_items(&self) -> StowageResult<Vec<Item>> {
        Ok(self.items.values().cloned().collect())
    }

    fn list_current_placements(&self) -> StowageResult<Vec<Placement>> {
        Ok(self.placements.values().cloned().collect())
    }

    fn upsert_placements(&mut self, placements: Vec<Placement>) -> StowageResult<()> {
        for placement in placements {
            self.placements.insert(placement.item_id.clone(), placement);
        }
        Ok(())
    }

    fn delete_placements(&mut self, item_ids: &[String]) -> StowageResult<usize> {
        Ok(item_ids
            .iter()
            .filter(|id| self.placements.remove(id.as_str()).is_some())
            .count())
    }

    fn upsert_items(&mut self, items: Vec<Item>) -> StowageResult<()> {
        for item in items {
            self.items.insert(item.item_id.clone(), item);
        }
        Ok(())
    }

    fn upsert_containers(&mut self, containers: Vec<Container>) -> StowageResult<()> {
        for container in containers {
            match self
                .containers
                .iter_mut()
                .find(|c| c.container_id == container.container_id)
            {
                Some(existing) => *existing = container,
                None => self.containers.push(container),
            }
        }
        Ok(())
    }

    fn get_item(&self, item_id: &str) -> StowageResult<Option<Item>> {
        Ok(self.items.get(item_id).cloned())
    }

    fn get_container(&self, container_id: &str) -> StowageResult<Option<Container>> {
        Ok(self
            .containers
            .iter()
            .find(|c| c.container_id == container_id)
            .cloned())
    }

    fn get_placement(&self, item_id: &str) -> StowageResult<Option<Placement>> {
        Ok(self.placements.get(item_id).cloned())
    }

    fn update_item(&mut self, item: Item) -> StowageResult<()> {
        match self.items.get_mut(&item.item_id) {
            Some(existing) => {
                *existing = item;
                Ok(())
            }
            None => Err(StowageError::not_found(EntityKind::Item, item.item_id)),
        }
    }

    fn append_logs(&mut self, entries: Vec<LogEntry>) -> StowageResult<()> {
        self.logs.extend(entries);
        Ok(())
    }

    fn list_logs(&self) -> StowageResult<Vec<LogEntry>> {
        Ok(self.logs.clone())
    }
}
