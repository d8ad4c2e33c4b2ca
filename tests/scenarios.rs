use stow_it_now::geometry::Position;
use stow_it_now::planner::UnplacedReason;
use stow_it_now::rearrange::RearrangementAction;
use stow_it_now::retrieval::RetrievalAction;
use stow_it_now::types::{Coordinates, Dimensional};
use stow_it_now::{
    ActionType, Container, EntityKind, Item, LogFilter, MemoryStore, PlacementStore,
    PlannerConfig, StowageError, StowageService,
};

fn service() -> StowageService<MemoryStore> {
    StowageService::new(MemoryStore::new(), PlannerConfig::default())
}

fn cube(id: &str, priority: u8, zone: &str) -> Item {
    Item::new(id, (4.0, 4.0, 4.0), priority, zone).expect("valid item")
}

fn container_c() -> Container {
    Container::new("C", "A", (10.0, 10.0, 10.0)).expect("valid container")
}

#[test]
fn high_priority_item_lands_in_the_corner() {
    let mut svc = service();
    let report = svc
        .ingest(vec![cube("I1", 95, "A")], vec![container_c()])
        .unwrap();

    let placement = report.plan.placement_of("I1").expect("I1 placed");
    assert_eq!(placement.container_id, "C");
    assert_eq!(placement.position.start().as_tuple(), (0.0, 0.0, 0.0));
    assert_eq!(placement.position.end().as_tuple(), (4.0, 4.0, 4.0));
    assert!(report.plan.unplaced.is_empty());
}

#[test]
fn second_ingest_uses_the_next_free_column() {
    let mut svc = service();
    svc.ingest(vec![cube("I1", 95, "A")], vec![container_c()])
        .unwrap();
    let report = svc.ingest(vec![cube("I2", 50, "A")], Vec::new()).unwrap();

    let placement = report.plan.placement_of("I2").expect("I2 placed");
    assert_eq!(placement.position.start().as_tuple(), (4.0, 0.0, 0.0));
    assert_eq!(placement.position.end().as_tuple(), (8.0, 4.0, 4.0));

    let i1 = svc.store().get_placement("I1").unwrap().expect("I1 kept");
    assert!(!i1.position.intersects(&placement.position));
    assert_eq!(report.rearrangement.steps.len(), 1);
    assert_eq!(
        report.rearrangement.steps[0].action,
        RearrangementAction::Place
    );
}

#[test]
fn occluded_item_needs_the_blocker_moved_out_and_back() {
    let mut svc = service();
    // A 4-wide container forces the second item behind the first.
    svc.ingest(
        vec![cube("I2", 95, "A"), cube("target", 50, "A")],
        vec![Container::new("narrow", "A", (4.0, 10.0, 4.0)).unwrap()],
    )
    .unwrap();

    let plan = svc.plan_retrieval("target", None).unwrap();
    let script: Vec<(RetrievalAction, &str)> = plan
        .steps
        .iter()
        .map(|s| (s.action, s.item_id.as_str()))
        .collect();
    assert_eq!(
        script,
        vec![
            (RetrievalAction::Remove, "I2"),
            (RetrievalAction::SetAside, "I2"),
            (RetrievalAction::Retrieve, "target"),
            (RetrievalAction::PlaceBack, "I2"),
        ]
    );
    let numbers: Vec<usize> = plan.steps.iter().map(|s| s.step).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
}

#[test]
fn oversized_item_is_reported_unplaceable() {
    let mut svc = service();
    let wide = Item::new("wide", (11.0, 1.0, 1.0), 50, "A").unwrap();
    let report = svc.ingest(vec![wide], vec![container_c()]).unwrap();

    assert!(report.plan.placements.is_empty());
    assert_eq!(report.plan.unplaced.len(), 1);
    assert_eq!(
        report.plan.unplaced[0].reason,
        UnplacedReason::DimensionsExceedContainer
    );
    assert!(matches!(
        report.plan.unplaced[0].error(),
        StowageError::Capacity { ref item_id, .. } if item_id == "wide"
    ));
    assert!(svc.store().get_placement("wide").unwrap().is_none());
}

#[test]
fn reingesting_placed_items_reuses_their_slots() {
    let mut svc = service();
    let items = vec![cube("I1", 95, "A"), cube("I2", 50, "A")];
    svc.ingest(items.clone(), vec![container_c()]).unwrap();

    let report = svc.ingest(items, Vec::new()).unwrap();
    assert!(report.rearrangement.is_empty());
    assert!(report.rearrangement.retained.is_empty());
}

#[test]
fn manual_placement_is_visible_to_the_next_plan() {
    let mut svc = service();
    svc.ingest(vec![cube("I1", 95, "A")], vec![container_c()])
        .unwrap();
    svc.place_item(
        "I1",
        "C",
        Position::from_start_and_dims(
            Coordinates::new(6.0, 0.0, 0.0),
            Coordinates::new(4.0, 4.0, 4.0),
        ),
        None,
    )
    .unwrap();

    let report = svc.ingest(vec![cube("I2", 50, "A")], Vec::new()).unwrap();
    let placement = report.plan.placement_of("I2").unwrap();
    assert_eq!(placement.position.start().as_tuple(), (0.0, 0.0, 0.0));
}

#[test]
fn search_for_unknown_item_is_not_found() {
    let mut svc = service();
    assert!(matches!(
        svc.plan_retrieval("nope", None),
        Err(StowageError::NotFound {
            kind: EntityKind::Item,
            ..
        })
    ));
}

#[test]
fn disposed_items_free_their_space() {
    let mut svc = service();
    svc.ingest(
        vec![cube("I1", 95, "A")],
        vec![Container::new("tiny", "A", (4.0, 4.0, 4.0)).unwrap()],
    )
    .unwrap();

    let blocked = svc.ingest(vec![cube("I2", 50, "A")], Vec::new()).unwrap();
    assert_eq!(blocked.plan.unplaced.len(), 1);

    assert_eq!(svc.dispose(&["I1".to_string()], None).unwrap(), 1);
    let report = svc.ingest(vec![cube("I2", 50, "A")], Vec::new()).unwrap();
    assert!(report.plan.placement_of("I2").is_some());
}

#[test]
fn shrinking_a_container_below_its_contents_is_rejected() {
    let mut svc = service();
    svc.ingest(vec![cube("I1", 95, "A")], vec![container_c()])
        .unwrap();

    let shrunk = Container::new("C", "A", (2.0, 2.0, 2.0)).unwrap();
    let small = Item::new("I2", (1.0, 1.0, 1.0), 50, "A").unwrap();
    let err = svc.ingest(vec![small], vec![shrunk]).unwrap_err();
    assert!(matches!(err, StowageError::Validation { .. }));
    assert!(err.to_string().contains("I1"));

    let container = svc.store().get_container("C").unwrap().expect("C kept");
    assert_eq!(container.dimensions().as_tuple(), (10.0, 10.0, 10.0));
    assert!(svc.store().get_item("I2").unwrap().is_none());

    let i1 = svc.store().get_placement("I1").unwrap().expect("I1 kept");
    assert!(i1.validate_against(&cube("I1", 95, "A"), &container, 1e-6).is_ok());
}

#[test]
fn shrinking_a_container_around_its_contents_is_allowed() {
    let mut svc = service();
    svc.ingest(vec![cube("I1", 95, "A")], vec![container_c()])
        .unwrap();

    let snug = Container::new("C", "A", (4.0, 4.0, 4.0)).unwrap();
    let report = svc
        .ingest(vec![Item::new("I2", (1.0, 1.0, 1.0), 50, "A").unwrap()], vec![snug])
        .unwrap();
    assert!(report.plan.placement_of("I2").is_none());
    assert_eq!(svc.store().get_container("C").unwrap().unwrap().width, 4.0);
}

#[test]
fn action_log_follows_a_placement_and_its_retrieval() {
    let mut svc = service();
    svc.ingest_with_progress(
        vec![cube("I2", 95, "A"), cube("target", 50, "A").with_name("Medical kit")],
        vec![Container::new("narrow", "A", (4.0, 10.0, 4.0)).unwrap()],
        Some("commander"),
        |_| {},
    )
    .unwrap();
    svc.plan_retrieval("target", Some("engineer")).unwrap();

    let placements = svc
        .logs(&LogFilter {
            action_type: Some(ActionType::Placement),
            ..LogFilter::default()
        })
        .unwrap();
    assert_eq!(placements.len(), 2);
    assert!(placements
        .iter()
        .all(|e| e.user_id.as_deref() == Some("commander")));

    let retrievals = svc
        .logs(&LogFilter {
            item_id: Some("target".into()),
            action_type: Some(ActionType::Retrieval),
            ..LogFilter::default()
        })
        .unwrap();
    assert_eq!(retrievals.len(), 1);
    assert_eq!(retrievals[0].user_id.as_deref(), Some("engineer"));
    assert_eq!(retrievals[0].details["itemsMoved"], 1);

    let found = svc.find_items_by_name("medical").unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].item_id, "target");
}
