//! Inference Predictor Module
//!
//! Loads a trained classifier together with its label encoder and classifies
//! single RGB images with the training preprocessing.

use std::path::Path;
use std::time::{Duration, Instant};

use burn::prelude::*;
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::dataset::{LabelEncoder, SignBatcher, SignItem};
use crate::model::cnn::{load_classifier, SignClassifier};
use crate::utils::error::{AslError, Result};

/// Number of ranked alternatives kept per prediction
pub const TOP_K: usize = 3;

/// Result of a single prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Predicted class index
    pub class_index: usize,

    /// Predicted class name
    pub label: String,

    /// Probability of the predicted class
    pub confidence: f32,

    /// Full probability distribution over all classes
    pub probabilities: Vec<f32>,

    /// Best classes with their probabilities, most likely first
    pub top_k: Vec<(String, f32)>,

    /// Inference time in milliseconds
    pub inference_time_ms: f64,
}

impl PredictionResult {
    fn new(probabilities: Vec<f32>, encoder: &LabelEncoder, elapsed: Duration) -> Result<Self> {
        let mut ranked: Vec<(usize, f32)> = probabilities.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let &(class_index, confidence) = ranked
            .first()
            .ok_or_else(|| AslError::shape("at least one class", "empty output"))?;

        let top_k = ranked
            .iter()
            .take(TOP_K)
            .map(|&(i, p)| Ok((encoder.decode(i)?.to_string(), p)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            class_index,
            label: encoder.decode(class_index)?.to_string(),
            confidence,
            probabilities,
            top_k,
            inference_time_ms: elapsed.as_secs_f64() * 1000.0,
        })
    }

    /// Overlay caption, e.g. `A (97.3%)`
    pub fn caption(&self) -> String {
        format!("{} ({:.1}%)", self.label, self.confidence * 100.0)
    }
}

/// A trained classifier ready for single-image prediction
pub struct SignPredictor<B: Backend> {
    model: SignClassifier<B>,
    encoder: LabelEncoder,
    batcher: SignBatcher<B>,
    device: B::Device,
}

impl<B: Backend> SignPredictor<B> {
    /// Load weights, model config and label encoder
    ///
    /// Fails if the encoder does not list exactly one class per model output.
    pub fn load(
        weights_path: &Path,
        model_config_path: &Path,
        encoder_path: &Path,
        device: &B::Device,
    ) -> Result<Self> {
        let encoder = LabelEncoder::load(encoder_path)?;
        let (model, config) = load_classifier::<B>(weights_path, model_config_path, device)?;
        Self::from_parts(model, encoder, config.input_size, device)
    }

    pub fn from_parts(
        model: SignClassifier<B>,
        encoder: LabelEncoder,
        image_size: usize,
        device: &B::Device,
    ) -> Result<Self> {
        if model.num_classes() != encoder.num_classes() {
            return Err(AslError::shape(
                format!("{} model outputs", encoder.num_classes()),
                format!("{} model outputs", model.num_classes()),
            ));
        }

        Ok(Self {
            model,
            encoder,
            batcher: SignBatcher::new(image_size),
            device: device.clone(),
        })
    }

    pub fn encoder(&self) -> &LabelEncoder {
        &self.encoder
    }

    pub fn image_size(&self) -> usize {
        self.batcher.image_size()
    }

    /// Classify one image
    pub fn predict(&self, image: &RgbImage) -> Result<PredictionResult> {
        let started = Instant::now();

        let item = SignItem::from_image(image, 0, self.batcher.image_size(), String::new());
        let input = self.batcher.images(&[item], &self.device);
        let probabilities = self
            .model
            .forward_softmax(input)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| AslError::Model(format!("Failed to read model output: {:?}", e)))?;

        PredictionResult::new(probabilities, &self.encoder, started.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;
    use crate::model::cnn::{save_classifier, SignClassifierConfig};
    use image::Rgb;
    use tempfile::tempdir;

    type TestBackend = DefaultBackend;

    fn tiny_model(num_classes: usize) -> (SignClassifier<TestBackend>, SignClassifierConfig) {
        let config = SignClassifierConfig::new()
            .with_num_classes(num_classes)
            .with_input_size(16)
            .with_base_filters(2);
        (SignClassifier::new(&config, &Default::default()), config)
    }

    #[test]
    fn test_ranking_and_caption() {
        let encoder = LabelEncoder::fit(["A", "B", "C", "D"]).unwrap();
        let result = PredictionResult::new(
            vec![0.1, 0.6, 0.05, 0.25],
            &encoder,
            Duration::from_millis(2),
        )
        .unwrap();

        assert_eq!(result.class_index, 1);
        assert_eq!(result.label, "B");
        assert_eq!(result.top_k.len(), TOP_K);
        assert_eq!(result.top_k[1].0, "D");
        assert_eq!(result.caption(), "B (60.0%)");
        assert!((result.inference_time_ms - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_class_count_mismatch() {
        let (model, _) = tiny_model(3);
        let encoder = LabelEncoder::fit(["A", "B"]).unwrap();
        let result = SignPredictor::from_parts(model, encoder, 16, &Default::default());
        assert!(matches!(result, Err(AslError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_predict_any_frame_size() {
        let dir = tempdir().unwrap();
        let weights = dir.path().join("model.mpk");
        let config_path = dir.path().join("model_config.json");
        let encoder_path = dir.path().join("encoder.json");

        let (model, config) = tiny_model(3);
        save_classifier(&model, &config, &weights, &config_path).unwrap();
        LabelEncoder::fit(["A", "B", "C"]).unwrap().save(&encoder_path).unwrap();

        let predictor =
            SignPredictor::<TestBackend>::load(&weights, &config_path, &encoder_path, &Default::default())
                .unwrap();
        assert_eq!(predictor.image_size(), 16);

        let frame = RgbImage::from_pixel(40, 25, Rgb([120, 80, 60]));
        let result = predictor.predict(&frame).unwrap();
        assert!(result.class_index < 3);
        let total: f32 = result.probabilities.iter().sum();
        assert!((total - 1.0).abs() < 1e-4);
        assert!(["A", "B", "C"].contains(&result.label.as_str()));
    }
}
