//! Stowage planning engine.
//!
//! Places cargo items into storage containers by priority and zone
//! preference, computes the moves needed to reach a new layout and plans
//! retrievals from the container opening.
//!
//! The planners in [`planner`], [`rearrange`] and [`retrieval`] are pure
//! functions over in-memory records. [`service`] wires them to a
//! [`store::PlacementStore`] and records every change in the
//! [`action_log`]; [`api`] exposes the service over HTTP.

pub mod action_log;
pub mod api;
pub mod config;
pub mod error;
pub mod geometry;
pub mod model;
pub mod occupancy;
pub mod planner;
pub mod rearrange;
pub mod retrieval;
pub mod service;
pub mod store;
pub mod types;

pub use action_log::{ActionType, LogEntry, LogFilter};
pub use error::{EntityKind, StowageError, StowageResult};
pub use model::{Container, Item, Placement};
pub use planner::{PlacementPlan, PlannerConfig, plan_placements};
pub use rearrange::{RearrangementPlan, diff_layouts};
pub use retrieval::{RetrievalPlan, plan_retrieval};
pub use service::{ContainerUsage, ItemStatus, StowageService};
pub use store::{MemoryStore, PlacementStore};
