//! Model module: the hand-sign CNN and its persistence helpers

pub mod cnn;

pub use cnn::{load_classifier, save_classifier, SignClassifier, SignClassifierConfig};
