//! Placement planner: priority- and zone-aware greedy packing of items into
//! storage containers.
//!
//! Items are staged in buckets:
//! - (a) high priority with a matching zone,
//! - (b) any priority with a matching zone,
//! - (c) everything left, retried round-robin across all zones.
//!
//! Inside a container the free-slot search walks a skyline (maximum
//! occupied depth over each raised width span) from left to right and puts
//! the item at `(x, skyline depth, 0)` at the first offset whose box is free.
//! Candidate offsets are derived from the edges already present in the
//! container, so the search cost follows the number of occupants and never
//! the container width.
//!
//! The planner is a pure function over its inputs. Progress is reported
//! through an optional callback of [`PlanEvent`]s; it never logs itself.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::Serialize;
use utoipa::ToSchema;

use crate::error::{StowageError, StowageResult};
use crate::geometry::{Position, fits, overlap_1d};
use crate::model::{Container, Item, Placement};
use crate::occupancy::OccupancyIndex;
use crate::types::{Coordinates, Dimensional};

/// Tuning knobs of the placement planner.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PlannerConfig {
    /// Grid that candidate x-offsets are snapped to.
    pub grid_step: f64,
    /// General numerical tolerance.
    pub epsilon: f64,
    /// Minimum priority for bucket (a).
    pub high_priority_threshold: u8,
    /// Maximum number of items placed per container in one round-robin round.
    pub batch_size: usize,
}

impl PlannerConfig {
    pub const DEFAULT_GRID_STEP: f64 = 1.0;
    pub const DEFAULT_EPSILON: f64 = 1e-6;
    pub const DEFAULT_HIGH_PRIORITY_THRESHOLD: u8 = 90;
    pub const DEFAULT_BATCH_SIZE: usize = 10;

    pub fn builder() -> PlannerConfigBuilder {
        PlannerConfigBuilder::default()
    }

    fn validate(&self) -> StowageResult<()> {
        let fail = |msg: &str| Err(StowageError::validation("planner configuration", msg));
        if !(self.grid_step.is_finite() && self.grid_step > 0.0) {
            return fail("grid step must be a positive number");
        }
        if !(self.epsilon.is_finite() && self.epsilon >= 0.0) {
            return fail("epsilon must be a non-negative number");
        }
        if self.batch_size == 0 {
            return fail("batch size must be at least 1");
        }
        Ok(())
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            grid_step: Self::DEFAULT_GRID_STEP,
            epsilon: Self::DEFAULT_EPSILON,
            high_priority_threshold: Self::DEFAULT_HIGH_PRIORITY_THRESHOLD,
            batch_size: Self::DEFAULT_BATCH_SIZE,
        }
    }
}

/// Builder for [`PlannerConfig`].
#[derive(Clone, Debug, Default)]
pub struct PlannerConfigBuilder {
    config: PlannerConfig,
}

impl PlannerConfigBuilder {
    pub fn grid_step(mut self, step: f64) -> Self {
        self.config.grid_step = step;
        self
    }

    pub fn epsilon(mut self, epsilon: f64) -> Self {
        self.config.epsilon = epsilon;
        self
    }

    pub fn high_priority_threshold(mut self, threshold: u8) -> Self {
        self.config.high_priority_threshold = threshold;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    pub fn build(self) -> PlannerConfig {
        self.config
    }
}

/// Placement stage an item was placed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    HighPriorityZone,
    PreferredZone,
    AnyZone,
}

/// Result of one planning call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlacementPlan {
    /// New placements in the order they were made.
    pub placements: Vec<Placement>,
    /// Items that could not be placed, in input order.
    pub unplaced: Vec<UnplacedItem>,
    /// Number of round-robin rounds run for bucket (c).
    pub rounds: usize,
}

impl PlacementPlan {
    pub fn is_complete(&self) -> bool {
        self.unplaced.is_empty()
    }

    pub fn placed_count(&self) -> usize {
        self.placements.len()
    }

    pub fn unplaced_count(&self) -> usize {
        self.unplaced.len()
    }

    pub fn placement_of(&self, item_id: &str) -> Option<&Placement> {
        self.placements.iter().find(|p| p.item_id == item_id)
    }
}

/// Item that could not be placed.
#[derive(Clone, Debug, PartialEq)]
pub struct UnplacedItem {
    pub item: Item,
    pub reason: UnplacedReason,
}

impl UnplacedItem {
    /// Typed error describing why the item stayed unplaced.
    pub fn error(&self) -> StowageError {
        match self.reason {
            UnplacedReason::DimensionsExceedContainer => StowageError::Capacity {
                item_id: self.item.item_id.clone(),
                width: self.item.width,
                depth: self.item.depth,
                height: self.item.height,
            },
            UnplacedReason::NoFreeSlot { rounds } | UnplacedReason::ZoneRestricted { rounds } => {
                StowageError::RetryExhausted {
                    item_id: self.item.item_id.clone(),
                    rounds,
                }
            }
        }
    }
}

/// Reasons why an item could not be placed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnplacedReason {
    /// Larger than every container on some axis.
    DimensionsExceedContainer,
    /// Fits somewhere dimensionally, but no free slot was left.
    NoFreeSlot { rounds: usize },
    /// Restricted to its preferred zone, which had no room for it.
    ZoneRestricted { rounds: usize },
}

impl UnplacedReason {
    pub fn code(&self) -> &'static str {
        match self {
            UnplacedReason::DimensionsExceedContainer => "dimensions_exceed_container",
            UnplacedReason::NoFreeSlot { .. } => "no_free_slot",
            UnplacedReason::ZoneRestricted { .. } => "zone_restricted",
        }
    }
}

impl std::fmt::Display for UnplacedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnplacedReason::DimensionsExceedContainer => {
                write!(f, "Item exceeds every container in at least one dimension")
            }
            UnplacedReason::NoFreeSlot { rounds } => {
                write!(f, "No free slot found after {} round(s)", rounds)
            }
            UnplacedReason::ZoneRestricted { rounds } => write!(
                f,
                "Preferred zone has no free slot and other zones are not allowed ({} round(s))",
                rounds
            ),
        }
    }
}

/// Events emitted while planning, suitable for live visualisation or logs.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
#[serde(tag = "type")]
pub enum PlanEvent {
    /// First item is being placed into a container.
    ContainerOpened {
        container_id: String,
        zone: String,
        #[schema(value_type = [f64; 3])]
        dims: (f64, f64, f64),
    },
    /// An item was placed.
    ItemPlaced {
        item_id: String,
        container_id: String,
        position: Position,
        bucket: Bucket,
    },
    /// An item was given up on.
    ItemRejected {
        item_id: String,
        reason_code: String,
        reason_text: String,
    },
    /// A round-robin round of bucket (c) finished.
    RoundFinished { round: usize, placed: usize },
    /// Planning finished.
    Finished { placed: usize, unplaced: usize },
}

/// Plans placements with the default configuration.
///
/// `occupied` are the current placements of items outside `items`; they are
/// treated as fixed occupants. Placements of items in `items` are ignored.
pub fn plan_placements(
    items: Vec<Item>,
    containers: &[Container],
    occupied: &[Placement],
) -> StowageResult<PlacementPlan> {
    plan_placements_with_config(items, containers, occupied, PlannerConfig::default())
}

/// Like [`plan_placements`], with a custom configuration.
pub fn plan_placements_with_config(
    items: Vec<Item>,
    containers: &[Container],
    occupied: &[Placement],
    config: PlannerConfig,
) -> StowageResult<PlacementPlan> {
    plan_placements_with_progress(items, containers, occupied, config, |_| {})
}

/// Plans placements and reports every important step to `on_event`.
///
/// Fails only on invalid input (bad records, duplicate ids, colliding
/// occupants). Items that cannot be placed end up in
/// [`PlacementPlan::unplaced`].
pub fn plan_placements_with_progress(
    items: Vec<Item>,
    containers: &[Container],
    occupied: &[Placement],
    config: PlannerConfig,
    on_event: impl FnMut(&PlanEvent),
) -> StowageResult<PlacementPlan> {
    config.validate()?;
    validate_records(&items, containers)?;

    let population: HashSet<&str> = items.iter().map(|i| i.item_id.as_str()).collect();
    let fixed: Vec<&Placement> = occupied
        .iter()
        .filter(|p| !population.contains(p.item_id.as_str()))
        .collect();

    let states = containers
        .iter()
        .map(|c| ContainerState::new(c, fixed.iter().copied()))
        .collect::<StowageResult<Vec<_>>>()?;

    let mut planner = Planner {
        items: &items,
        zones: zone_order(containers),
        states,
        config,
        placed: vec![false; items.len()],
        rejected: vec![false; items.len()],
        placements: Vec::new(),
        unplaced: Vec::new(),
        on_event,
    };
    planner.run()
}

fn validate_records(items: &[Item], containers: &[Container]) -> StowageResult<()> {
    let mut seen = HashSet::new();
    for item in items {
        item.validate()?;
        if !seen.insert(item.item_id.as_str()) {
            return Err(StowageError::validation(
                format!("item '{}'", item.item_id),
                "duplicate item id in planning batch",
            ));
        }
    }

    let mut seen = HashSet::new();
    for container in containers {
        container.validate()?;
        if !seen.insert(container.container_id.as_str()) {
            return Err(StowageError::validation(
                format!("container '{}'", container.container_id),
                "duplicate container id",
            ));
        }
    }
    Ok(())
}

/// Zones in order of first appearance, each with its container indices.
fn zone_order(containers: &[Container]) -> Vec<(String, Vec<usize>)> {
    let mut zones: Vec<(String, Vec<usize>)> = Vec::new();
    for (idx, container) in containers.iter().enumerate() {
        match zones.iter_mut().find(|(zone, _)| *zone == container.zone) {
            Some((_, members)) => members.push(idx),
            None => zones.push((container.zone.clone(), vec![idx])),
        }
    }
    zones
}

/// Item indices by descending priority; ties keep input order.
fn priority_order(items: &[Item]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..items.len()).collect();
    order.sort_by(|&a, &b| items[b].priority.cmp(&items[a].priority));
    order
}

struct Planner<'a, F: FnMut(&PlanEvent)> {
    items: &'a [Item],
    zones: Vec<(String, Vec<usize>)>,
    states: Vec<ContainerState<'a>>,
    config: PlannerConfig,
    placed: Vec<bool>,
    rejected: Vec<bool>,
    placements: Vec<Placement>,
    unplaced: Vec<UnplacedItem>,
    on_event: F,
}

impl<F: FnMut(&PlanEvent)> Planner<'_, F> {
    fn run(&mut self) -> StowageResult<PlacementPlan> {
        self.reject_oversized();

        let order = priority_order(self.items);
        let zone_names: HashSet<String> = self.zones.iter().map(|(z, _)| z.clone()).collect();
        let threshold = self.config.high_priority_threshold;

        let high_priority: Vec<usize> = order
            .iter()
            .copied()
            .filter(|&i| self.is_open(i))
            .filter(|&i| self.items[i].priority >= threshold)
            .filter(|&i| zone_names.contains(&self.items[i].preferred_zone))
            .collect();
        self.place_in_preferred_zones(&high_priority, Bucket::HighPriorityZone)?;

        let preferred: Vec<usize> = order
            .iter()
            .copied()
            .filter(|&i| self.is_open(i))
            .filter(|&i| zone_names.contains(&self.items[i].preferred_zone))
            .collect();
        self.place_in_preferred_zones(&preferred, Bucket::PreferredZone)?;

        let remaining: Vec<usize> = order
            .iter()
            .copied()
            .filter(|&i| self.is_open(i))
            .collect();
        let rounds = self.place_round_robin(remaining)?;

        Ok(self.finish(rounds))
    }

    fn is_open(&self, idx: usize) -> bool {
        !self.placed[idx] && !self.rejected[idx]
    }

    /// Items larger than every container are unplaceable up front.
    fn reject_oversized(&mut self) {
        for idx in 0..self.items.len() {
            let item = &self.items[idx];
            let dims = item.dimensions();
            let fits_any = self
                .states
                .iter()
                .any(|s| fits(s.container, &dims, self.config.epsilon));
            if !fits_any {
                self.reject(idx, UnplacedReason::DimensionsExceedContainer);
            }
        }
    }

    /// Buckets (a) and (b): each item only sees the containers of its zone.
    fn place_in_preferred_zones(
        &mut self,
        bucket_items: &[usize],
        bucket: Bucket,
    ) -> StowageResult<()> {
        let zones = self.zones.clone();
        for (zone, members) in &zones {
            let mut pending: Vec<usize> = bucket_items
                .iter()
                .copied()
                .filter(|&i| self.is_open(i) && self.items[i].preferred_zone == *zone)
                .collect();

            for &container_idx in members {
                if pending.is_empty() {
                    break;
                }
                let mut left = Vec::with_capacity(pending.len());
                for item_idx in pending {
                    if !self.try_place(item_idx, container_idx, bucket)? {
                        left.push(item_idx);
                    }
                }
                pending = left;
            }
        }
        Ok(())
    }

    /// Bucket (c): rounds across all containers until a round places nothing.
    fn place_round_robin(&mut self, mut remaining: Vec<usize>) -> StowageResult<usize> {
        let zones = self.zones.clone();
        // A failed (item, container) pair is not offered again in later
        // rounds, so every round either places something or ends the loop.
        let mut exhausted: HashSet<(usize, usize)> = HashSet::new();
        let mut rounds = 0;

        while !remaining.is_empty() {
            rounds += 1;
            let mut placed_this_round = 0;

            for (zone, members) in &zones {
                for &container_idx in members {
                    if remaining.is_empty() {
                        break;
                    }
                    let mut placed_here = 0;
                    for &item_idx in &remaining {
                        if placed_here >= self.config.batch_size {
                            break;
                        }
                        if self.placed[item_idx] || exhausted.contains(&(item_idx, container_idx))
                        {
                            continue;
                        }
                        let item = &self.items[item_idx];
                        if !item.allow_non_preferred_zone && item.preferred_zone != *zone {
                            continue;
                        }
                        if self.try_place(item_idx, container_idx, Bucket::AnyZone)? {
                            placed_here += 1;
                        } else {
                            exhausted.insert((item_idx, container_idx));
                        }
                    }
                    placed_this_round += placed_here;
                    remaining.retain(|&i| !self.placed[i]);
                }
            }

            (self.on_event)(&PlanEvent::RoundFinished {
                round: rounds,
                placed: placed_this_round,
            });

            if placed_this_round == 0 {
                break;
            }
        }
        Ok(rounds)
    }

    /// Tries to place one item into one container; records it on success.
    ///
    /// `Ok(false)` means no free slot. A slot the search reported free but
    /// the index refuses is an `Overlap` error.
    fn try_place(
        &mut self,
        item_idx: usize,
        container_idx: usize,
        bucket: Bucket,
    ) -> StowageResult<bool> {
        let items = self.items;
        let item = &items[item_idx];
        let config = self.config;
        let state = &mut self.states[container_idx];

        let Some(position) = state.find_slot(item, &config) else {
            return Ok(false);
        };
        state.commit(&item.item_id, position)?;

        if !state.opened {
            state.opened = true;
            let container = state.container;
            (self.on_event)(&PlanEvent::ContainerOpened {
                container_id: container.container_id.clone(),
                zone: container.zone.clone(),
                dims: container.dimensions().as_tuple(),
            });
        }

        let placement = Placement::new(
            item.item_id.clone(),
            state.container.container_id.clone(),
            position,
        );
        (self.on_event)(&PlanEvent::ItemPlaced {
            item_id: placement.item_id.clone(),
            container_id: placement.container_id.clone(),
            position,
            bucket,
        });
        self.placements.push(placement);
        self.placed[item_idx] = true;
        Ok(true)
    }

    fn reject(&mut self, idx: usize, reason: UnplacedReason) {
        let items = self.items;
        let item = &items[idx];
        (self.on_event)(&PlanEvent::ItemRejected {
            item_id: item.item_id.clone(),
            reason_code: reason.code().to_string(),
            reason_text: reason.to_string(),
        });
        self.rejected[idx] = true;
        self.unplaced.push(UnplacedItem {
            item: item.clone(),
            reason,
        });
    }

    fn finish(&mut self, rounds: usize) -> PlacementPlan {
        for idx in 0..self.items.len() {
            if !self.is_open(idx) {
                continue;
            }
            let reason = if self.zone_restricted(idx) {
                UnplacedReason::ZoneRestricted { rounds }
            } else {
                UnplacedReason::NoFreeSlot { rounds }
            };
            self.reject(idx, reason);
        }

        let items = self.items;
        let item_order = |id: &str| items.iter().position(|i| i.item_id == id);
        let mut unplaced = std::mem::take(&mut self.unplaced);
        unplaced.sort_by_key(|u| item_order(&u.item.item_id));

        (self.on_event)(&PlanEvent::Finished {
            placed: self.placements.len(),
            unplaced: unplaced.len(),
        });

        PlacementPlan {
            placements: std::mem::take(&mut self.placements),
            unplaced,
            rounds,
        }
    }

    /// True if the item was kept out of other zones by its own flag.
    fn zone_restricted(&self, idx: usize) -> bool {
        !self.items[idx].allow_non_preferred_zone
    }
}

/// Per-container planning state.
struct ContainerState<'a> {
    container: &'a Container,
    index: OccupancyIndex,
    skyline: Skyline,
    opened: bool,
}

impl<'a> ContainerState<'a> {
    fn new<'p>(
        container: &'a Container,
        fixed: impl Iterator<Item = &'p Placement>,
    ) -> StowageResult<Self> {
        let index = OccupancyIndex::from_placements(&container.container_id, fixed)?;
        Ok(Self {
            container,
            index,
            skyline: Skyline::default(),
            opened: false,
        })
    }

    /// Finds the first free slot for `item`, or `None`.
    ///
    /// The skyline starts at the opening for every planning call; existing
    /// occupants only live in the index. If that scan fails, one more scan
    /// runs against a skyline settled behind all occupants.
    fn find_slot(&self, item: &Item, config: &PlannerConfig) -> Option<Position> {
        let dims = item.dimensions();
        if !fits(self.container, &dims, config.epsilon) {
            return None;
        }

        self.scan(&self.skyline, &dims, config).or_else(|| {
            let settled = Skyline::settled(&self.index);
            self.scan(&settled, &dims, config)
        })
    }

    fn scan(
        &self,
        skyline: &Skyline,
        dims: &Coordinates,
        config: &PlannerConfig,
    ) -> Option<Position> {
        let occupant_edges = self.index.regions().flat_map(|(_, region)| {
            let (start, end) = region.lateral_span();
            [start, end]
        });
        axis_positions(
            self.container.width,
            dims.width,
            config.grid_step,
            config.epsilon,
            skyline.edges().chain(occupant_edges),
        )
        .into_iter()
        .find_map(|x| {
            let y = skyline.depth_over(x, dims.width, config.epsilon);
            if y + dims.depth > self.container.depth + config.epsilon {
                return None;
            }
            let region = Position::from_start_and_dims(Coordinates::new(x, y, 0.0), *dims);
            self.index.is_free(&region).then_some(region)
        })
    }

    fn commit(&mut self, item_id: &str, position: Position) -> StowageResult<()> {
        self.index.occupy(item_id, position)?;
        let (start, end) = position.lateral_span();
        self.skyline.raise(start, end, position.far_depth());
        Ok(())
    }
}

/// Raised width spans as `(start, end, depth)`, in commit order.
///
/// Spans may overlap; the depth over an offset is the maximum of every span
/// it touches.
#[derive(Clone, Debug, Default, PartialEq)]
struct Skyline {
    spans: Vec<(f64, f64, f64)>,
}

impl Skyline {
    /// Skyline raised behind every occupied region of `index`.
    fn settled(index: &OccupancyIndex) -> Self {
        let mut skyline = Self::default();
        for (_, region) in index.regions() {
            let (start, end) = region.lateral_span();
            skyline.raise(start, end, region.far_depth());
        }
        skyline
    }

    fn depth_over(&self, x: f64, w: f64, epsilon: f64) -> f64 {
        self.spans
            .iter()
            .filter(|&&(start, end, _)| overlap_1d(x, x + w, start, end) > epsilon)
            .map(|&(_, _, depth)| depth)
            .fold(0.0, f64::max)
    }

    fn raise(&mut self, start: f64, end: f64, depth: f64) {
        self.spans.push((start, end, depth));
    }

    /// Both lateral edges of every span.
    fn edges(&self) -> impl Iterator<Item = f64> + '_ {
        self.spans.iter().flat_map(|&(start, end, _)| [start, end])
    }
}

/// Candidate x-offsets for an object of `object_len`, ascending.
///
/// The first free grid offset always sits at `0`, at the last fitting
/// offset, or at the first one or two grid points from an edge `e` or from
/// `e - object_len`, for some edge `e` in `edges`. Those are the only offsets
/// returned.
fn axis_positions(
    container_len: f64,
    object_len: f64,
    step: f64,
    epsilon: f64,
    edges: impl IntoIterator<Item = f64>,
) -> Vec<f64> {
    let max_pos = (container_len - object_len).max(0.0);
    if max_pos <= epsilon {
        return vec![0.0];
    }

    let snap = |offset: f64| ((offset / step) - epsilon).ceil().max(0.0) * step;
    let mut positions = vec![0.0, max_pos];
    for edge in edges {
        for offset in [edge, edge - object_len] {
            let grid = snap(offset);
            positions.extend(
                [grid, grid + step]
                    .into_iter()
                    .filter(|&p| p <= max_pos + epsilon)
                    .map(|p| p.min(max_pos)),
            );
        }
    }

    positions.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    positions.dedup_by(|a, b| (*a - *b).abs() < epsilon);
    positions
}
