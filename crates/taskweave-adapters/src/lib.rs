//! Concrete collaborators for the engine.
//!
//! Every capability has a deterministic stand-in; preference storage,
//! planning and calendar also have a second backend. [`Backends`] picks
//! one implementation per capability from settings.

pub mod backends;
pub mod calendar;
pub mod memory;
pub mod planner;
pub mod proposals;

pub use backends::Backends;
pub use calendar::{DryRunCalendar, InMemoryCalendar};
pub use memory::{InMemoryPreferenceStore, SqlitePreferenceStore};
pub use planner::{AnthropicPlanner, MockPlanner};
pub use proposals::MockProposalOracle;
