//! CNN Model Architecture for hand-sign classification
//!
//! A VGG-style network built with Burn. The number of downsampling stages is
//! derived from the input size so the last feature map is about 7x7 at the
//! default 224 resolution, and global average pooling before the head keeps
//! the classifier independent of the exact resolution.

use std::path::{Path, PathBuf};

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
        Relu,
    },
    record::CompactRecorder,
    tensor::{backend::Backend, Tensor},
};
use tracing::{debug, info};

// No `Result` alias in scope: the `Config` derive expands to the std two-argument form.
use crate::utils::error::AslError;
use crate::utils::format_number;

/// Stop downsampling once the feature map would drop below this side length
const MIN_FEATURE_SIZE: usize = 14;
const MAX_STAGES: usize = 5;

/// Configuration for the SignClassifier CNN model
#[derive(Config, Debug)]
pub struct SignClassifierConfig {
    /// Number of output classes (29 for the ASL alphabet with del/nothing/space)
    #[config(default = "29")]
    pub num_classes: usize,

    /// Input image size (assumes square images)
    #[config(default = "224")]
    pub input_size: usize,

    /// Dropout rate for regularization
    #[config(default = "0.3")]
    pub dropout_rate: f64,

    /// Number of input channels (3 for RGB)
    #[config(default = "3")]
    pub in_channels: usize,

    /// Filters in the first stage, doubled by every following stage
    #[config(default = "32")]
    pub base_filters: usize,

    /// Width of the hidden fully connected layer
    #[config(default = "256")]
    pub hidden_units: usize,
}

impl SignClassifierConfig {
    /// Number of 2x downsampling stages for this input size
    ///
    /// 224 gives 5 stages (224 -> 7), 32 gives 2 and anything below 28 gives 1.
    pub fn stage_count(&self) -> usize {
        let mut size = self.input_size;
        let mut stages = 0;
        while size >= MIN_FEATURE_SIZE && stages < MAX_STAGES {
            size /= 2;
            stages += 1;
        }
        stages.max(1)
    }

    /// Output channels of each stage
    pub fn stage_widths(&self) -> Vec<usize> {
        (0..self.stage_count())
            .map(|i| self.base_filters << i)
            .collect()
    }
}

/// Two 3x3 convolutions with batch norm, then a 2x2 max pool
#[derive(Module, Debug)]
pub struct ConvStage<B: Backend> {
    first: Conv2d<B>,
    first_norm: BatchNorm<B>,
    second: Conv2d<B>,
    second_norm: BatchNorm<B>,
    activation: Relu,
    downsample: MaxPool2d,
}

impl<B: Backend> ConvStage<B> {
    fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv3x3 = |channels: [usize; 2]| {
            Conv2dConfig::new(channels, [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device)
        };

        Self {
            first: conv3x3([in_channels, out_channels]),
            first_norm: BatchNormConfig::new(out_channels).init(device),
            second: conv3x3([out_channels, out_channels]),
            second_norm: BatchNormConfig::new(out_channels).init(device),
            activation: Relu::new(),
            downsample: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.activation.forward(self.first_norm.forward(self.first.forward(x)));
        let x = self
            .activation
            .forward(self.second_norm.forward(self.second.forward(x)));
        self.downsample.forward(x)
    }
}

/// Hand-sign classifier CNN
///
/// `stage_count` conv stages, global average pooling, then a hidden
/// fully connected layer with dropout in front of the class logits.
#[derive(Module, Debug)]
pub struct SignClassifier<B: Backend> {
    stages: Vec<ConvStage<B>>,
    pool: AdaptiveAvgPool2d,
    hidden: Linear<B>,
    dropout: Dropout,
    logits: Linear<B>,
    num_classes: usize,
}

impl<B: Backend> SignClassifier<B> {
    pub fn new(config: &SignClassifierConfig, device: &B::Device) -> Self {
        let widths = config.stage_widths();
        let mut in_channels = config.in_channels;
        let mut stages = Vec::with_capacity(widths.len());
        for &width in &widths {
            stages.push(ConvStage::new(in_channels, width, device));
            in_channels = width;
        }
        debug!(
            "Building classifier: input {}px, stage widths {:?}",
            config.input_size, widths
        );

        Self {
            stages,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            hidden: LinearConfig::new(in_channels, config.hidden_units).init(device),
            dropout: DropoutConfig::new(config.dropout_rate).init(),
            logits: LinearConfig::new(config.hidden_units, config.num_classes).init(device),
            num_classes: config.num_classes,
        }
    }

    /// Logits of shape `[batch, num_classes]` for images `[batch, C, H, W]`
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self
            .stages
            .iter()
            .fold(images, |x, stage| stage.forward(x));

        let pooled = self.pool.forward(features);
        let [batch_size, channels, _, _] = pooled.dims();
        let x = pooled.reshape([batch_size, channels]);

        let x = Relu::new().forward(self.hidden.forward(x));
        self.logits.forward(self.dropout.forward(x))
    }

    /// Class probabilities for inference
    pub fn forward_softmax(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        burn::tensor::activation::softmax(self.forward(images), 1)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn num_stages(&self) -> usize {
        self.stages.len()
    }
}

/// File actually written by the compact recorder for `weights_path`
pub fn weights_file(weights_path: &Path) -> PathBuf {
    weights_path.with_extension("mpk")
}

/// Save weights and the architecture config next to each other
pub fn save_classifier<B: Backend>(
    model: &SignClassifier<B>,
    config: &SignClassifierConfig,
    weights_path: &Path,
    config_path: &Path,
) -> crate::utils::error::Result<()> {
    for path in [weights_path, config_path] {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }

    model
        .clone()
        .save_file(weights_path, &CompactRecorder::new())
        .map_err(|e| AslError::Model(format!("Failed to save model: {:?}", e)))?;
    config.save(config_path)?;

    info!(
        "Saved weights to {:?} and model config to {:?}",
        weights_file(weights_path),
        config_path
    );
    Ok(())
}

/// Rebuild the architecture from its config and restore the weights
pub fn load_classifier<B: Backend>(
    weights_path: &Path,
    config_path: &Path,
    device: &B::Device,
) -> crate::utils::error::Result<(SignClassifier<B>, SignClassifierConfig)> {
    if !config_path.exists() {
        return Err(AslError::NotFound(config_path.to_path_buf()));
    }
    let weights = weights_file(weights_path);
    if !weights.exists() {
        return Err(AslError::NotFound(weights));
    }

    let config = SignClassifierConfig::load(config_path)
        .map_err(|e| AslError::Model(format!("Failed to read model config: {:?}", e)))?;

    let model = SignClassifier::<B>::new(&config, device)
        .load_file(weights_path, &CompactRecorder::new(), device)
        .map_err(|e| AslError::Model(format!("Failed to load model: {:?}", e)))?;

    info!(
        "Loaded {} parameter model ({} classes) from {:?}",
        format_number(model.num_params()),
        config.num_classes,
        weights
    );

    Ok((model, config))
}
