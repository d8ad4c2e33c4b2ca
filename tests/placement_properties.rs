//! Property-based tests for the planners.
//!
//! Dimensions are small integers so that every comparison is exact.

use std::collections::{BTreeMap, HashSet};

use proptest::prelude::*;
use stow_it_now::occupancy::OccupancyIndex;
use stow_it_now::planner::{UnplacedReason, plan_placements_with_config};
use stow_it_now::rearrange::{RearrangementAction, diff_layouts};
use stow_it_now::types::Dimensional;
use stow_it_now::{Container, Item, Placement, PlannerConfig, plan_placements, plan_retrieval};

const EPS: f64 = 1e-6;

// =============================================================================
// Strategies
// =============================================================================

fn arb_zone() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["A", "B", "C"])
}

fn arb_dims(min: u32, max: u32) -> impl Strategy<Value = (f64, f64, f64)> {
    prop::array::uniform3(min..=max).prop_map(|[w, d, h]| (w as f64, d as f64, h as f64))
}

fn arb_containers() -> impl Strategy<Value = Vec<Container>> {
    prop::collection::vec((arb_zone(), arb_dims(4, 12)), 1..=3).prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(idx, (zone, dims))| {
                Container::new(format!("C{idx}"), zone, dims).expect("valid container")
            })
            .collect()
    })
}

fn arb_items() -> impl Strategy<Value = Vec<Item>> {
    prop::collection::vec((arb_dims(1, 6), 1u8..=100, arb_zone(), any::<bool>()), 1..=15)
        .prop_map(|specs| {
            specs
                .into_iter()
                .enumerate()
                .map(|(idx, (dims, priority, zone, allow))| {
                    Item::new(format!("I{idx:02}"), dims, priority, zone)
                        .expect("valid item")
                        .with_allow_non_preferred(allow)
                })
                .collect()
        })
}

fn assert_layout_valid(placements: &[Placement], items: &[Item], containers: &[Container]) {
    for placement in placements {
        let item = items
            .iter()
            .find(|i| i.item_id == placement.item_id)
            .expect("placement of a known item");
        let container = containers
            .iter()
            .find(|c| c.container_id == placement.container_id)
            .expect("placement in a known container");
        placement
            .validate_against(item, container, EPS)
            .expect("placement inside container with matching corners");
    }

    for (i, a) in placements.iter().enumerate() {
        for b in &placements[i + 1..] {
            if a.container_id == b.container_id {
                assert!(
                    !a.position.intersects(&b.position),
                    "{} and {} overlap in {}",
                    a.item_id,
                    b.item_id,
                    a.container_id
                );
            }
        }
    }
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn placements_never_overlap_and_stay_inside(
        items in arb_items(),
        containers in arb_containers(),
    ) {
        let plan = plan_placements(items.clone(), &containers, &[]).unwrap();
        assert_layout_valid(&plan.placements, &items, &containers);
    }

    #[test]
    fn every_item_is_placed_or_reported_once(
        items in arb_items(),
        containers in arb_containers(),
    ) {
        let plan = plan_placements(items.clone(), &containers, &[]).unwrap();

        let mut seen = HashSet::new();
        for id in plan
            .placements
            .iter()
            .map(|p| p.item_id.as_str())
            .chain(plan.unplaced.iter().map(|u| u.item.item_id.as_str()))
        {
            prop_assert!(seen.insert(id), "{} reported twice", id);
        }
        prop_assert_eq!(seen.len(), items.len());
    }

    #[test]
    fn planning_is_deterministic(
        items in arb_items(),
        containers in arb_containers(),
    ) {
        let first = plan_placements(items.clone(), &containers, &[]).unwrap();
        let second = plan_placements(items, &containers, &[]).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn items_larger_than_every_container_are_rejected(
        mut items in arb_items(),
        containers in arb_containers(),
        axis in 0usize..3,
    ) {
        let widest = containers
            .iter()
            .map(|c| c.dimensions().as_tuple())
            .fold(0.0_f64, |acc, (w, d, h)| acc.max([w, d, h][axis]));
        let mut dims = (1.0, 1.0, 1.0);
        match axis {
            0 => dims.0 = widest + 1.0,
            1 => dims.1 = widest + 1.0,
            _ => dims.2 = widest + 1.0,
        }
        items.push(Item::new("oversized", dims, 100, "A").unwrap());

        let plan = plan_placements(items, &containers, &[]).unwrap();
        prop_assert!(plan.placement_of("oversized").is_none());
        let entry = plan
            .unplaced
            .iter()
            .find(|u| u.item.item_id == "oversized")
            .expect("oversized item reported");
        prop_assert_eq!(entry.reason, UnplacedReason::DimensionsExceedContainer);
    }

    #[test]
    fn retrieval_replay_only_removes_the_target(
        items in arb_items(),
        containers in arb_containers(),
    ) {
        let plan = plan_placements(items, &containers, &[]).unwrap();

        for target in &plan.placements {
            let retrieval = plan_retrieval(target, &plan.placements).unwrap();
            for obstruction in &retrieval.obstructions {
                prop_assert!(obstruction.position.far_depth() <= target.position.near_depth() + EPS);
            }

            let mut index =
                OccupancyIndex::from_placements(&target.container_id, &plan.placements).unwrap();
            let mut expected = index.clone();
            expected.release(&target.item_id);

            retrieval.replay(&mut index).unwrap();
            prop_assert_eq!(index, expected);
        }
    }

    #[test]
    fn rearrangement_script_is_executable(
        items in arb_items(),
        containers in arb_containers(),
        step in prop::sample::select(vec![1.0, 2.0]),
    ) {
        let before = plan_placements(items.clone(), &containers, &[]).unwrap();
        let mut reversed = containers.clone();
        reversed.reverse();
        let config = PlannerConfig::builder().grid_step(step).build();
        let after = plan_placements_with_config(items, &reversed, &[], config).unwrap();

        let still_placed: HashSet<&str> =
            after.placements.iter().map(|p| p.item_id.as_str()).collect();
        let prior: Vec<Placement> = before
            .placements
            .iter()
            .filter(|p| still_placed.contains(p.item_id.as_str()))
            .cloned()
            .collect();

        let steps = diff_layouts(&prior, &after.placements, EPS).unwrap();

        let mut world: BTreeMap<String, OccupancyIndex> = BTreeMap::new();
        for p in &prior {
            world
                .entry(p.container_id.clone())
                .or_insert_with(|| OccupancyIndex::new(p.container_id.as_str()))
                .occupy(&p.item_id, p.position)
                .unwrap();
        }
        for s in &steps {
            match s.action {
                RearrangementAction::Remove => {
                    let from = s.from_container.as_deref().expect("remove has a source");
                    prop_assert!(world.get_mut(from).and_then(|i| i.release(&s.item_id)).is_some());
                }
                RearrangementAction::Place => {
                    let to = s.to_container.clone().expect("place has a target");
                    let position = s.to_position.expect("place has a position");
                    let index = world
                        .entry(to.clone())
                        .or_insert_with(|| OccupancyIndex::new(to.as_str()));
                    prop_assert!(index.occupy(&s.item_id, position).is_ok());
                }
            }
        }

        for p in &after.placements {
            let region = world.get(&p.container_id).and_then(|i| i.region_of(&p.item_id));
            prop_assert_eq!(region, Some(&p.position));
        }
    }
}
