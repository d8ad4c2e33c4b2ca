//! Retrieval planning: which items block the way out, and in which order
//! they have to be moved.
//!
//! Containers open at depth 0. An item obstructs the target when it shares a
//! lateral band of positive width with the target and lies entirely between
//! the target and the opening.

use std::cmp::Ordering;

use serde::Serialize;
use utoipa::ToSchema;

use crate::error::{EntityKind, StowageError, StowageResult};
use crate::geometry::{Position, lateral_overlap};
use crate::model::Placement;
use crate::occupancy::OccupancyIndex;
use crate::types::{EPSILON_GENERAL, validation};

/// Kind of a retrieval step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum RetrievalAction {
    Remove,
    SetAside,
    Retrieve,
    PlaceBack,
}

/// One step of a retrieval script.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalStep {
    /// 1-based.
    pub step: usize,
    pub action: RetrievalAction,
    pub item_id: String,
    /// Display name, filled in by callers that know the item records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_name: Option<String>,
    pub container_id: String,
    /// Where the item sits; `placeBack` restores it here.
    pub position: Position,
}

/// Ordered steps to get one item out of its container.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalPlan {
    pub target: Placement,
    /// Obstructing placements, nearest to the opening first.
    pub obstructions: Vec<Placement>,
    pub steps: Vec<RetrievalStep>,
}

impl RetrievalPlan {
    /// Number of items that have to be moved out of the way.
    pub fn moved_count(&self) -> usize {
        self.obstructions.len()
    }

    /// True if the target can be taken out directly.
    pub fn is_direct(&self) -> bool {
        self.obstructions.is_empty()
    }

    /// Sets `item_name` on every step from `lookup`.
    ///
    /// Stops at the first lookup error.
    pub fn name_steps<E>(
        &mut self,
        mut lookup: impl FnMut(&str) -> Result<Option<String>, E>,
    ) -> Result<(), E> {
        for step in &mut self.steps {
            step.item_name = lookup(&step.item_id)?;
        }
        Ok(())
    }

    /// Applies the steps to `index`.
    ///
    /// Afterwards `index` holds every obstruction in its original slot and
    /// no longer holds the target.
    pub fn replay(&self, index: &mut OccupancyIndex) -> StowageResult<()> {
        for step in &self.steps {
            match step.action {
                RetrievalAction::Remove | RetrievalAction::Retrieve => {
                    if index.release(&step.item_id).is_none() {
                        return Err(StowageError::not_found(
                            EntityKind::Placement,
                            step.item_id.clone(),
                        ));
                    }
                }
                RetrievalAction::SetAside => {}
                RetrievalAction::PlaceBack => index.occupy(&step.item_id, step.position)?,
            }
        }
        Ok(())
    }
}

/// Placements of `container_placements` that block `target`, nearest to
/// the opening first. Ties keep the input order.
///
/// Placements of other containers and the target itself are ignored.
pub fn find_obstructions(
    target: &Placement,
    container_placements: &[Placement],
    epsilon: f64,
) -> Vec<Placement> {
    let near = target.position.near_depth();
    let mut blocking: Vec<Placement> = container_placements
        .iter()
        .filter(|p| p.container_id == target.container_id && p.item_id != target.item_id)
        .filter(|p| {
            lateral_overlap(&p.position, &target.position, epsilon)
                && p.position.far_depth() <= near + epsilon
        })
        .cloned()
        .collect();

    blocking.sort_by(|a, b| {
        a.position
            .near_depth()
            .partial_cmp(&b.position.near_depth())
            .unwrap_or(Ordering::Equal)
    });
    blocking
}

/// Builds the retrieval plan for `target`.
///
/// Steps: `remove` and `setAside` for every obstruction (nearest first),
/// `retrieve` for the target, then `placeBack` in reverse removal order.
pub fn plan_retrieval(
    target: &Placement,
    container_placements: &[Placement],
) -> StowageResult<RetrievalPlan> {
    plan_retrieval_with_epsilon(target, container_placements, EPSILON_GENERAL)
}

pub fn plan_retrieval_with_epsilon(
    target: &Placement,
    container_placements: &[Placement],
    epsilon: f64,
) -> StowageResult<RetrievalPlan> {
    validation::validate_coordinate(&target.position.start(), "Start corner")
        .and_then(|_| validation::validate_coordinate(&target.position.end(), "End corner"))
        .map_err(|msg| {
            StowageError::validation(format!("placement of item '{}'", target.item_id), msg)
        })?;

    let obstructions = find_obstructions(target, container_placements, epsilon);

    let mut steps = Vec::with_capacity(obstructions.len() * 3 + 1);
    let mut push = |action: RetrievalAction, placement: &Placement| {
        steps.push(RetrievalStep {
            step: steps.len() + 1,
            action,
            item_id: placement.item_id.clone(),
            item_name: None,
            container_id: placement.container_id.clone(),
            position: placement.position,
        });
    };

    for obstruction in &obstructions {
        push(RetrievalAction::Remove, obstruction);
        push(RetrievalAction::SetAside, obstruction);
    }
    push(RetrievalAction::Retrieve, target);
    for obstruction in obstructions.iter().rev() {
        push(RetrievalAction::PlaceBack, obstruction);
    }

    Ok(RetrievalPlan {
        target: target.clone(),
        obstructions,
        steps,
    })
}
