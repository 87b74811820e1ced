//! Orchestration engine: event channel, timeline merge, coordinator and
//! planner service. Collaborators are injected as trait objects from
//! `taskweave_core::collaborators`.

pub mod bus;
pub mod orchestrator;
pub mod planner;
pub mod timeline;

pub use bus::{EventChannel, EventHandler, HandlerError, PublishReport};
pub use orchestrator::Coordinator;
pub use planner::{PlannerService, PlanOutcome};
pub use timeline::merge_blocks;
