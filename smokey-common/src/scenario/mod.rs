//! Multi-component scenarios that do not fit the single-instance smoke test.

pub mod ranger;

pub use ranger::{RangerScenario, ScenarioError};
