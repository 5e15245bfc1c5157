//! Inference module
//!
//! This module provides:
//! - Single image prediction with a trained classifier
//! - The live loop over camera or replayed frames
//! - Webcam capture (feature `webcam`) and a preview window (feature `preview`)

pub mod live;
pub mod predictor;

#[cfg(feature = "webcam")]
pub mod camera;

#[cfg(feature = "preview")]
pub mod preview;

pub use live::{
    run_live, FrameSink, FrameSource, HandRegion, ImageDirSource, LiveFrame, LiveSession,
    LiveSummary, LogSink, QuitSignal, SinkControl,
};
pub use predictor::{PredictionResult, SignPredictor};

#[cfg(feature = "webcam")]
pub use camera::WebcamSource;

#[cfg(feature = "preview")]
pub use preview::run_preview;
