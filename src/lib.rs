//! # ASL Recognition
//!
//! An American Sign Language hand-sign recognition pipeline built on the Burn
//! framework: background augmentation of captured hand images, CNN training,
//! and live classification of a fixed hand region of a camera feed.
//!
//! ## Modules
//!
//! - `dataset`: Background augmentation, label CSV, label encoder, split and Burn dataset
//! - `model`: CNN architecture built with Burn
//! - `training`: Training loop, per-epoch history and charts
//! - `inference`: Prediction and the live loop (webcam and preview behind features)
//! - `config`: TOML-backed configuration of every stage
//! - `utils`: Logging, charts, errors and helper functions
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use asl_recognition::backend::{default_device, TrainingBackend};
//! use asl_recognition::config::AppConfig;
//! use asl_recognition::training::run_training;
//!
//! let config = AppConfig::default();
//! let report = run_training::<TrainingBackend>(&config.train, &default_device())?;
//! println!("final validation accuracy: {:?}", report.final_metrics());
//! ```

pub mod backend;
pub mod config;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use config::{AppConfig, AugmentConfig, LabelConfig, LiveConfig, TrainConfig};
pub use dataset::{BackgroundAugmenter, BorderKeyCompositor, LabelEncoder, TrainValSplit};
pub use inference::{HandRegion, LiveSession, PredictionResult, SignPredictor};
pub use model::cnn::{SignClassifier, SignClassifierConfig};
pub use training::{run_training, TrainingHistory, TrainingReport};
pub use utils::error::{AslError, Result};

/// Side of the square model input, in pixels
pub const IMAGE_SIZE: usize = 224;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
