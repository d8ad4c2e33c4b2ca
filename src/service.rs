//! Stowage service: the operations the outside world calls.
//!
//! Loads state from a [`PlacementStore`], runs the pure planners and writes
//! the results back. This is the only layer that logs, and the only one that
//! appends to the action log.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::action_log::{ActionType, LogEntry, LogFilter};
use crate::error::{EntityKind, StowageError, StowageResult};
use crate::geometry::Position;
use crate::model::{Container, Item, Placement};
use crate::occupancy::OccupancyIndex;
use crate::planner::{PlacementPlan, PlanEvent, PlannerConfig};
use crate::rearrange::{RearrangementPlan, has_moved, relayout};
use crate::retrieval::{self, RetrievalPlan};
use crate::store::PlacementStore;
use crate::types::Dimensional;

/// Outcome of [`StowageService::ingest`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IngestReport {
    pub plan: PlacementPlan,
    pub rearrangement: RearrangementPlan,
}

impl IngestReport {
    pub fn placements(&self) -> &[Placement] {
        &self.plan.placements
    }
}

/// An item together with where it currently is.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ItemStatus {
    #[serde(flatten)]
    pub item: Item,
    pub is_placed: bool,
    pub placement: Option<Placement>,
    /// Zone of the container holding the item.
    pub zone: Option<String>,
}

/// A container together with how full it is.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContainerUsage {
    #[serde(flatten)]
    pub container: Container,
    pub item_count: usize,
    pub used_volume: f64,
    /// `used_volume` over container volume, in `[0, 1]`.
    pub utilization: f64,
}

/// Entry point for every stowage operation.
///
/// Each call reads the current state, plans and writes back without any
/// locking of its own. Callers must serialise writes that touch the same
/// container; the HTTP server keeps the whole service behind one async
/// mutex.
pub struct StowageService<S> {
    store: S,
    config: PlannerConfig,
}

impl<S: PlacementStore> StowageService<S> {
    pub fn new(store: S, config: PlannerConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> PlannerConfig {
        self.config
    }

    /// Registers `containers`, then plans `items` into every known container.
    pub fn ingest(
        &mut self,
        items: Vec<Item>,
        containers: Vec<Container>,
    ) -> StowageResult<IngestReport> {
        self.ingest_with_progress(items, containers, None, |_| {})
    }

    /// Like [`ingest`](Self::ingest), forwarding the planner events of the
    /// final planning pass to `on_event` and recording `user_id` in the
    /// action log.
    ///
    /// Nothing is written unless planning succeeds. Re-registering a known
    /// container with dimensions that no longer hold one of its current
    /// placements is a validation error.
    pub fn ingest_with_progress(
        &mut self,
        items: Vec<Item>,
        containers: Vec<Container>,
        user_id: Option<&str>,
        mut on_event: impl FnMut(&PlanEvent),
    ) -> StowageResult<IngestReport> {
        for item in &items {
            item.validate()?;
        }
        for container in &containers {
            container.validate()?;
        }
        self.check_resized_containers(&containers)?;

        let mut known = self.store.list_containers()?;
        for container in &containers {
            match known
                .iter_mut()
                .find(|c| c.container_id == container.container_id)
            {
                Some(existing) => *existing = container.clone(),
                None => known.push(container.clone()),
            }
        }
        let prior = self.store.list_current_placements()?;

        info!(
            items = items.len(),
            containers = known.len(),
            occupied = prior.len(),
            "📦 Planning placements"
        );

        let result = relayout(items.clone(), &known, &prior, self.config, |evt| {
            log_event(evt);
            on_event(evt);
        })?;

        self.store.upsert_containers(containers)?;
        self.store.upsert_items(items)?;
        self.store
            .upsert_placements(result.plan.placements.clone())?;
        self.store.append_logs(placement_entries(
            &prior,
            &result.plan.placements,
            user_id,
            self.config.epsilon,
        ))?;

        if !result.rearrangement.retained.is_empty() {
            warn!(
                retained = result.rearrangement.retained.len(),
                "Some items keep their previous placement"
            );
        }
        info!(
            placed = result.plan.placed_count(),
            unplaced = result.plan.unplaced_count(),
            steps = result.rearrangement.steps.len(),
            "✅ Placement finished"
        );

        Ok(IngestReport {
            plan: result.plan,
            rearrangement: result.rearrangement,
        })
    }

    /// Rejects re-registrations whose new dimensions would leave a current
    /// placement out of bounds.
    fn check_resized_containers(&self, containers: &[Container]) -> StowageResult<()> {
        let tolerance = self.config.epsilon;
        for container in containers {
            let Some(existing) = self.store.get_container(&container.container_id)? else {
                continue;
            };
            if existing
                .dimensions()
                .approx_eq(&container.dimensions(), tolerance)
            {
                continue;
            }

            for placement in self
                .store
                .list_container_placements(&container.container_id)?
            {
                let item = self.require_item(&placement.item_id)?;
                if placement
                    .validate_against(&item, container, tolerance)
                    .is_err()
                {
                    warn!(
                        container_id = %container.container_id,
                        item_id = %placement.item_id,
                        "Container resize rejected"
                    );
                    return Err(StowageError::validation(
                        format!("container '{}'", container.container_id),
                        format!(
                            "new dimensions do not hold the current placement of item '{}'",
                            placement.item_id
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Records a manual placement of a known item.
    ///
    /// The box must match the item's dimensions, lie inside the container and
    /// not intersect any other current placement.
    pub fn place_item(
        &mut self,
        item_id: &str,
        container_id: &str,
        position: Position,
        user_id: Option<&str>,
    ) -> StowageResult<Placement> {
        let item = self.require_item(item_id)?;
        let container = self
            .store
            .get_container(container_id)?
            .ok_or_else(|| StowageError::not_found(EntityKind::Container, container_id))?;

        let placement = Placement::new(item_id, container_id, position);
        placement.validate_against(&item, &container, self.config.epsilon)?;

        let others: Vec<Placement> = self
            .store
            .list_container_placements(container_id)?
            .into_iter()
            .filter(|p| p.item_id != item_id)
            .collect();
        let mut index = OccupancyIndex::from_placements(container_id, &others)?;
        index.occupy(item_id, position)?;

        self.store.upsert_placements(vec![placement.clone()])?;
        self.store.append_logs(vec![LogEntry::new(
            ActionType::Placement,
            item_id,
            user_id,
            json!({
                "operation": "manual",
                "containerId": container_id,
                "position": position,
            }),
        )])?;
        info!(
            item_id,
            container_id,
            volume = item.volume(),
            "Item placed manually"
        );
        Ok(placement)
    }

    /// Plans how to get `item_id` out of its container and logs the
    /// retrieval.
    ///
    /// Every step carries the moved item's name when it has one.
    pub fn plan_retrieval(
        &mut self,
        item_id: &str,
        user_id: Option<&str>,
    ) -> StowageResult<RetrievalPlan> {
        self.require_item(item_id)?;
        let target = self
            .store
            .get_placement(item_id)?
            .ok_or_else(|| StowageError::not_found(EntityKind::Placement, item_id))?;
        let neighbours = self
            .store
            .list_container_placements(&target.container_id)?;

        let mut plan =
            retrieval::plan_retrieval_with_epsilon(&target, &neighbours, self.config.epsilon)?;
        let store = &self.store;
        plan.name_steps(|id| {
            Ok::<_, StowageError>(
                store
                    .get_item(id)?
                    .map(|item| item.name)
                    .filter(|name| !name.is_empty()),
            )
        })?;

        self.store.append_logs(vec![LogEntry::new(
            ActionType::Retrieval,
            item_id,
            user_id,
            json!({
                "containerId": target.container_id,
                "itemsMoved": plan.moved_count(),
            }),
        )])?;
        debug!(
            item_id,
            container_id = %target.container_id,
            obstructions = plan.moved_count(),
            "🔎 Retrieval planned"
        );
        Ok(plan)
    }

    /// Items whose name contains `query`, ignoring case, ordered by id.
    pub fn find_items_by_name(&self, query: &str) -> StowageResult<Vec<Item>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Err(StowageError::validation(
                "name search",
                "query must not be empty",
            ));
        }
        Ok(self
            .store
            .list_items()?
            .into_iter()
            .filter(|item| item.name.to_lowercase().contains(&needle))
            .collect())
    }

    /// Every known item with its placement, ordered by id.
    pub fn list_items(&self) -> StowageResult<Vec<ItemStatus>> {
        let zones: HashMap<String, String> = self
            .store
            .list_containers()?
            .into_iter()
            .map(|c| (c.container_id, c.zone))
            .collect();
        let mut placements: HashMap<String, Placement> = self
            .store
            .list_current_placements()?
            .into_iter()
            .map(|p| (p.item_id.clone(), p))
            .collect();

        Ok(self
            .store
            .list_items()?
            .into_iter()
            .map(|item| {
                let placement = placements.remove(&item.item_id);
                ItemStatus {
                    is_placed: placement.is_some(),
                    zone: placement
                        .as_ref()
                        .and_then(|p| zones.get(&p.container_id).cloned()),
                    placement,
                    item,
                }
            })
            .collect())
    }

    /// Every container in registration order with its fill level.
    pub fn list_containers(&self) -> StowageResult<Vec<ContainerUsage>> {
        let placements = self.store.list_current_placements()?;
        self.store
            .list_containers()?
            .into_iter()
            .map(|container| {
                let index =
                    OccupancyIndex::from_placements(&container.container_id, &placements)?;
                let used_volume = index.used_volume();
                Ok(ContainerUsage {
                    item_count: index.len(),
                    utilization: used_volume / container.volume(),
                    used_volume,
                    container,
                })
            })
            .collect()
    }

    /// Log entries matching `filter`, newest first.
    pub fn logs(&self, filter: &LogFilter) -> StowageResult<Vec<LogEntry>> {
        let mut entries: Vec<LogEntry> = self
            .store
            .list_logs()?
            .into_iter()
            .rev()
            .filter(|entry| filter.matches(entry))
            .collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(entries)
    }

    /// Removes the placements of `item_ids`. Unknown ids are skipped.
    pub fn dispose(&mut self, item_ids: &[String], user_id: Option<&str>) -> StowageResult<usize> {
        let requested: BTreeSet<&str> = item_ids.iter().map(String::as_str).collect();
        let mut entries = Vec::new();
        for id in requested {
            if let Some(placement) = self.store.get_placement(id)? {
                entries.push(LogEntry::new(
                    ActionType::Disposal,
                    id,
                    user_id,
                    json!({
                        "operation": "disposed",
                        "containerId": placement.container_id,
                    }),
                ));
            }
        }

        let removed = self.store.delete_placements(item_ids)?;
        self.store.append_logs(entries)?;
        info!(requested = item_ids.len(), removed, "🗑️ Placements disposed");
        Ok(removed)
    }

    /// Flags `item_id` as waste and frees its slot.
    pub fn mark_waste(
        &mut self,
        item_id: &str,
        reason: &str,
        user_id: Option<&str>,
    ) -> StowageResult<Item> {
        let mut item = self.require_item(item_id)?;
        item.mark_waste(reason);
        self.store.update_item(item.clone())?;
        self.store.delete_placements(&[item_id.to_string()])?;
        self.store.append_logs(vec![LogEntry::new(
            ActionType::Disposal,
            item_id,
            user_id,
            json!({ "operation": "markedWaste", "reason": reason }),
        )])?;
        info!(item_id, reason, "Item marked as waste");
        Ok(item)
    }

    fn require_item(&self, item_id: &str) -> StowageResult<Item> {
        self.store
            .get_item(item_id)?
            .ok_or_else(|| StowageError::not_found(EntityKind::Item, item_id))
    }
}

/// One `placement` entry per newly stowed item, one `rearrangement` entry
/// per moved item. Items left where they were are not logged.
fn placement_entries(
    prior: &[Placement],
    placements: &[Placement],
    user_id: Option<&str>,
    epsilon: f64,
) -> Vec<LogEntry> {
    let before: HashMap<&str, &Placement> =
        prior.iter().map(|p| (p.item_id.as_str(), p)).collect();

    placements
        .iter()
        .filter_map(|to| match before.get(to.item_id.as_str()) {
            None => Some(LogEntry::new(
                ActionType::Placement,
                &to.item_id,
                user_id,
                json!({
                    "operation": "planned",
                    "containerId": to.container_id,
                    "position": to.position,
                }),
            )),
            Some(from) if has_moved(from, to, epsilon) => Some(LogEntry::new(
                ActionType::Rearrangement,
                &to.item_id,
                user_id,
                json!({
                    "fromContainer": from.container_id,
                    "fromPosition": from.position,
                    "toContainer": to.container_id,
                    "toPosition": to.position,
                }),
            )),
            Some(_) => None,
        })
        .collect()
}

fn log_event(event: &PlanEvent) {
    match event {
        PlanEvent::ItemRejected {
            item_id,
            reason_code,
            ..
        } => debug!(item_id = %item_id, reason = %reason_code, "Item not placed"),
        PlanEvent::RoundFinished { round, placed } => {
            debug!(round, placed, "Round-robin round finished")
        }
        _ => {}
    }
}
