//! CLI command implementations.

pub mod classify;
pub mod run;
pub mod status;

pub use classify::{classify_inputs, ClassifyRow};
pub use run::{RunCommand, RunOptions, RunOutcome, RunSummary, Services};
pub use status::{StatusCommand, StatusReport};
