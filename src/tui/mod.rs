//! TUI module for watching a probe run live

mod run_view;

pub use run_view::{RunView, RunViewOutcome};
