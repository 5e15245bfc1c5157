//! Training module
//!
//! - `supervised`: the training loop
//! - `history`: per-epoch metrics, history CSV and charts

pub mod history;
pub mod supervised;

pub use history::{EpochMetrics, PassStats, TrainingHistory};
pub use supervised::{evaluate, run_training, TrainingReport};
