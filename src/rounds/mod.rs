//! Round scheduling for the crawl pipeline
//!
//! # Components
//!
//! - `RoundScheduler`: sequences the engine stages of every round and decides when to stop
//! - `RoundState`: the round counter, selected segment and history of completed rounds
//! - `Termination`: why a run ended gracefully

mod scheduler;
mod state;

// Re-export main types
pub use scheduler::{RoundScheduler, GENERATE_NO_URLS, STOP_FILE};
pub use state::{RoundPhase, RoundState, RoundSummary, Termination};
