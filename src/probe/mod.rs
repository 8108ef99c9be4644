//! Workspace-recognition probe
//!
//! Layered the same way the harness runs: a scenario is handed to the
//! sequencer, which drives one server session through the fixed conversation
//! and feeds the captured stderr to the classifier.
//!
//! - **config**: run-wide timing and server-command settings
//! - **error**: scenario-local failure taxonomy
//! - **classifier**: verdict from captured stderr text
//! - **sequencer**: the initialize/initialized/didOpen conversation
//! - **scenario**: named workspace configurations and the sequential runner

pub mod classifier;
pub mod config;
pub mod error;
pub mod scenario;
pub mod sequencer;

pub use classifier::Verdict;
pub use config::ProbeConfig;
pub use error::ProbeError;
pub use scenario::{ScenarioRunner, WorkspaceScenario, default_scenarios, scenarios_from_uris};
pub use sequencer::{ProbeOutcome, run_probe};
