//! Rearrangement differ: turns "prior layout → newly planned layout" into an
//! ordered, physically executable edit script.
//!
//! A moved item yields `remove` immediately followed by `place`; a new item
//! yields a single `place`. Moves are ordered so that no item is put into a
//! slot that another item still occupies. When moves block each other in a
//! cycle, the removes of the blocking items are emitted first.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use utoipa::ToSchema;

use crate::error::{StowageError, StowageResult};
use crate::geometry::Position;
use crate::model::{Container, Item, Placement};
use crate::occupancy::OccupancyIndex;
use crate::planner::{PlacementPlan, PlanEvent, PlannerConfig, plan_placements_with_progress};

/// Kind of a rearrangement step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum RearrangementAction {
    Remove,
    Place,
}

/// One step of a rearrangement script.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RearrangementStep {
    /// 1-based, monotonic across the whole script.
    pub step: usize,
    pub action: RearrangementAction,
    pub item_id: String,
    /// Set on `remove` steps and on `place` steps of moved items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_container: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_position: Option<Position>,
    /// Set on `place` steps only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_container: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_position: Option<Position>,
}

/// Ordered edit script plus the prior placements that stay untouched because
/// the new layout could not place their items.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RearrangementPlan {
    pub steps: Vec<RearrangementStep>,
    /// Prior placements kept as they were.
    pub retained: Vec<Placement>,
}

impl RearrangementPlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of items that change container or position.
    pub fn moved_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.action == RearrangementAction::Remove)
            .count()
    }
}

/// Diffs `prior` against `plan`.
///
/// Items the plan could not place are left out of the script; their prior
/// placement (if any) is reported in [`RearrangementPlan::retained`].
pub fn plan_rearrangement(
    prior: &[Placement],
    plan: &PlacementPlan,
    epsilon: f64,
) -> StowageResult<RearrangementPlan> {
    let steps = diff_layouts(prior, &plan.placements, epsilon)?;
    let unplaced: HashSet<&str> = plan
        .unplaced
        .iter()
        .map(|u| u.item.item_id.as_str())
        .collect();
    let retained = prior
        .iter()
        .filter(|p| unplaced.contains(p.item_id.as_str()))
        .cloned()
        .collect();
    Ok(RearrangementPlan { steps, retained })
}

/// Result of [`relayout`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Relayout {
    pub plan: PlacementPlan,
    pub rearrangement: RearrangementPlan,
}

/// Plans `items` afresh and diffs the result against `prior`.
///
/// Items that already have a prior placement but cannot be placed in the new
/// layout keep their old slot. Since the new layout must then avoid that slot,
/// they are pinned and the remaining population is planned again until no
/// previously placed item is left out. Only the events of the final pass
/// reach `on_event`; each pass buffers its events, so they are delivered
/// in one burst once that pass has completed.
pub fn relayout(
    items: Vec<Item>,
    containers: &[Container],
    prior: &[Placement],
    config: PlannerConfig,
    mut on_event: impl FnMut(&PlanEvent),
) -> StowageResult<Relayout> {
    let prior_ids: HashSet<&str> = prior.iter().map(|p| p.item_id.as_str()).collect();
    let mut pinned: HashSet<String> = HashSet::new();

    loop {
        let population: Vec<Item> = items
            .iter()
            .filter(|i| !pinned.contains(&i.item_id))
            .cloned()
            .collect();

        let mut events = Vec::new();
        let plan = plan_placements_with_progress(population, containers, prior, config, |evt| {
            events.push(evt.clone())
        })?;

        let newly_pinned: Vec<String> = plan
            .unplaced
            .iter()
            .map(|u| u.item.item_id.clone())
            .filter(|id| prior_ids.contains(id.as_str()))
            .collect();

        if newly_pinned.is_empty() {
            events.iter().for_each(&mut on_event);
            let mut rearrangement = plan_rearrangement(prior, &plan, config.epsilon)?;
            rearrangement.retained = prior
                .iter()
                .filter(|p| pinned.contains(&p.item_id))
                .cloned()
                .collect();
            return Ok(Relayout {
                plan,
                rearrangement,
            });
        }
        pinned.extend(newly_pinned);
    }
}

#[derive(Clone, Debug)]
struct Move<'a> {
    item_id: &'a str,
    from: Option<&'a Placement>,
    to: &'a Placement,
}

/// Emits the ordered step script for `prior → planned`.
///
/// Only items in `planned` are considered. Unchanged items produce no steps.
pub fn diff_layouts(
    prior: &[Placement],
    planned: &[Placement],
    epsilon: f64,
) -> StowageResult<Vec<RearrangementStep>> {
    let prior_by_item: HashMap<&str, &Placement> =
        prior.iter().map(|p| (p.item_id.as_str(), p)).collect();

    let mut pending: Vec<Move> = planned
        .iter()
        .filter_map(|to| {
            let from = prior_by_item.get(to.item_id.as_str()).copied();
            match from {
                Some(from) if !has_moved(from, to, epsilon) => None,
                _ => Some(Move {
                    item_id: &to.item_id,
                    from,
                    to,
                }),
            }
        })
        .collect();

    let mut sim = Simulation::new(prior)?;
    let mut script = Script::default();

    while !pending.is_empty() {
        if let Some(idx) = pending.iter().position(|m| sim.destination_clear(m)) {
            let m = pending.remove(idx);
            if let Some(from) = m.from.filter(|_| sim.holds(m.item_id)) {
                script.remove(m.item_id, from);
                sim.release(from);
            }
            sim.occupy(m.to)?;
            script.place(m.item_id, m.to);
            continue;
        }

        // Every pending move is blocked. Vacate the slots of pending items
        // that stand in the way, then try again.
        let blockers: HashSet<&str> = pending
            .iter()
            .filter_map(|m| sim.blocker_of(m))
            .collect();
        let hoist: Vec<&Placement> = pending
            .iter()
            .filter(|m| blockers.contains(m.item_id) && sim.holds(m.item_id))
            .filter_map(|m| m.from)
            .collect();

        if hoist.is_empty() {
            let m = &pending[0];
            return Err(StowageError::Overlap {
                item_id: m.item_id.to_string(),
                container_id: m.to.container_id.clone(),
                occupant_id: sim.blocker_of(m).unwrap_or_default().to_string(),
            });
        }
        for from in hoist {
            script.remove(&from.item_id, from);
            sim.release(from);
        }
    }

    Ok(script.steps)
}

/// True if `to` puts the item in another container or at another corner.
pub(crate) fn has_moved(from: &Placement, to: &Placement, epsilon: f64) -> bool {
    from.container_id != to.container_id
        || !from
            .position
            .start()
            .approx_eq(&to.position.start(), epsilon)
}

/// Occupancy of all containers while the script is being replayed.
struct Simulation {
    containers: BTreeMap<String, OccupancyIndex>,
    holder: HashMap<String, String>,
}

impl Simulation {
    fn new(prior: &[Placement]) -> StowageResult<Self> {
        let mut sim = Self {
            containers: BTreeMap::new(),
            holder: HashMap::new(),
        };
        for placement in prior {
            sim.occupy(placement)?;
        }
        Ok(sim)
    }

    fn index(&mut self, container_id: &str) -> &mut OccupancyIndex {
        self.containers
            .entry(container_id.to_string())
            .or_insert_with(|| OccupancyIndex::new(container_id))
    }

    fn holds(&self, item_id: &str) -> bool {
        self.holder.contains_key(item_id)
    }

    fn occupy(&mut self, placement: &Placement) -> StowageResult<()> {
        self.index(&placement.container_id)
            .occupy(&placement.item_id, placement.position)?;
        self.holder
            .insert(placement.item_id.clone(), placement.container_id.clone());
        Ok(())
    }

    fn release(&mut self, placement: &Placement) {
        if let Some(container_id) = self.holder.remove(&placement.item_id) {
            self.index(&container_id).release(&placement.item_id);
        }
    }

    /// Occupant (other than the mover itself) of the move's destination.
    fn blocker_of<'s>(&'s self, m: &Move) -> Option<&'s str> {
        let index = self.containers.get(&m.to.container_id)?;
        index
            .regions()
            .find(|(id, region)| *id != m.item_id && region.intersects(&m.to.position))
            .map(|(id, _)| id)
    }

    fn destination_clear(&self, m: &Move) -> bool {
        self.blocker_of(m).is_none()
    }
}

#[derive(Default)]
struct Script {
    steps: Vec<RearrangementStep>,
}

impl Script {
    fn next_step(&self) -> usize {
        self.steps.len() + 1
    }

    fn remove(&mut self, item_id: &str, from: &Placement) {
        self.steps.push(RearrangementStep {
            step: self.next_step(),
            action: RearrangementAction::Remove,
            item_id: item_id.to_string(),
            from_container: Some(from.container_id.clone()),
            from_position: Some(from.position),
            to_container: None,
            to_position: None,
        });
    }

    fn place(&mut self, item_id: &str, to: &Placement) {
        self.steps.push(RearrangementStep {
            step: self.next_step(),
            action: RearrangementAction::Place,
            item_id: item_id.to_string(),
            from_container: None,
            from_position: None,
            to_container: Some(to.container_id.clone()),
            to_position: Some(to.position),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Coordinates;

    const EPS: f64 = 1e-6;

    fn at(item: &str, container: &str, x: f64, y: f64) -> Placement {
        Placement::new(
            item,
            container,
            Position::from_start_and_dims(
                Coordinates::new(x, y, 0.0),
                Coordinates::new(4.0, 4.0, 4.0),
            ),
        )
    }

    fn actions(steps: &[RearrangementStep]) -> Vec<(RearrangementAction, &str)> {
        steps.iter().map(|s| (s.action, s.item_id.as_str())).collect()
    }

    #[test]
    fn moved_item_is_removed_then_placed() {
        let prior = vec![at("I1", "C", 0.0, 0.0)];
        let planned = vec![at("I1", "D", 0.0, 0.0)];

        let steps = diff_layouts(&prior, &planned, EPS).unwrap();
        assert_eq!(
            actions(&steps),
            vec![
                (RearrangementAction::Remove, "I1"),
                (RearrangementAction::Place, "I1")
            ]
        );
        assert_eq!(steps[0].step, 1);
        assert_eq!(steps[0].from_container.as_deref(), Some("C"));
        assert_eq!(steps[1].step, 2);
        assert_eq!(steps[1].to_container.as_deref(), Some("D"));
    }

    #[test]
    fn unchanged_items_emit_nothing_and_new_items_one_place() {
        let prior = vec![at("I1", "C", 0.0, 0.0)];
        let planned = vec![at("I1", "C", 0.0, 0.0), at("I2", "C", 4.0, 0.0)];

        let steps = diff_layouts(&prior, &planned, EPS).unwrap();
        assert_eq!(actions(&steps), vec![(RearrangementAction::Place, "I2")]);
        assert_eq!(steps[0].step, 1);
        assert!(steps[0].from_position.is_none());
    }

    #[test]
    fn move_into_vacated_slot_waits_for_the_vacating_item() {
        // I1 takes I2's old slot, I2 moves further right.
        let prior = vec![at("I1", "C", 0.0, 0.0), at("I2", "C", 4.0, 0.0)];
        let planned = vec![at("I1", "C", 4.0, 0.0), at("I2", "C", 8.0, 0.0)];

        let steps = diff_layouts(&prior, &planned, EPS).unwrap();
        assert_eq!(
            actions(&steps),
            vec![
                (RearrangementAction::Remove, "I2"),
                (RearrangementAction::Place, "I2"),
                (RearrangementAction::Remove, "I1"),
                (RearrangementAction::Place, "I1"),
            ]
        );
    }

    #[test]
    fn swap_cycle_hoists_removes() {
        let prior = vec![at("I1", "C", 0.0, 0.0), at("I2", "C", 4.0, 0.0)];
        let planned = vec![at("I1", "C", 4.0, 0.0), at("I2", "C", 0.0, 0.0)];

        let steps = diff_layouts(&prior, &planned, EPS).unwrap();
        assert_eq!(
            actions(&steps),
            vec![
                (RearrangementAction::Remove, "I1"),
                (RearrangementAction::Remove, "I2"),
                (RearrangementAction::Place, "I1"),
                (RearrangementAction::Place, "I2"),
            ]
        );
        let numbers: Vec<usize> = steps.iter().map(|s| s.step).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
    }

    #[test]
    fn destination_held_by_a_fixed_item_is_an_error() {
        let prior = vec![at("fixed", "C", 0.0, 0.0)];
        let planned = vec![at("I1", "C", 0.0, 0.0)];

        assert!(matches!(
            diff_layouts(&prior, &planned, EPS),
            Err(StowageError::Overlap { ref occupant_id, .. }) if occupant_id == "fixed"
        ));
    }

    #[test]
    fn relayout_keeps_unplaceable_items_in_their_old_slot() {
        let containers = vec![Container::new("C", "A", (8.0, 4.0, 4.0)).unwrap()];
        let prior = vec![at("old", "C", 4.0, 0.0)];
        let items = vec![
            Item::new("old", (4.0, 4.0, 4.0), 10, "A").unwrap(),
            Item::new("new1", (4.0, 4.0, 4.0), 99, "A").unwrap(),
            Item::new("new2", (4.0, 4.0, 4.0), 98, "A").unwrap(),
        ];

        let result = relayout(items, &containers, &prior, PlannerConfig::default(), |_| {})
            .unwrap();

        assert_eq!(result.rearrangement.retained, prior);
        let new1 = result.plan.placement_of("new1").unwrap();
        assert_eq!(new1.position.start().as_tuple(), (0.0, 0.0, 0.0));
        assert!(result.plan.placement_of("old").is_none());
        assert_eq!(result.plan.unplaced.len(), 1);
        assert_eq!(result.plan.unplaced[0].item.item_id, "new2");
        assert_eq!(
            actions(&result.rearrangement.steps),
            vec![(RearrangementAction::Place, "new1")]
        );
    }

    #[test]
    fn step_serializes_camel_case_without_empty_fields() {
        let steps = diff_layouts(&[], &[at("I1", "C", 0.0, 0.0)], EPS).unwrap();
        let json = serde_json::to_value(&steps[0]).unwrap();
        assert_eq!(json["action"], "place");
        assert_eq!(json["itemId"], "I1");
        assert_eq!(json["toContainer"], "C");
        assert!(json.get("fromContainer").is_none());
    }
}
