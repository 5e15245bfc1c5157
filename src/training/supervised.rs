//! Supervised Training Implementation
//!
//! A custom training loop over Burn's primitives rather than the high-level
//! `LearnerBuilder`: Adam with cross-entropy, reshuffled mini-batches every
//! epoch and a full validation pass after each one.

use std::path::PathBuf;
use std::time::Instant;

use burn::{
    data::dataloader::batcher::Batcher,
    module::{AutodiffModule, Module},
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor,
    },
};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use super::history::{EpochMetrics, PassStats, TrainingHistory};
use crate::config::TrainConfig;
use crate::dataset::{read_label_csv, LabelEncoder, SignBatcher, SignImageDataset, TrainValSplit};
use crate::model::cnn::{save_classifier, weights_file, SignClassifier, SignClassifierConfig};
use crate::utils::error::{AslError, Result};
use crate::utils::logging::progress_bar;
use crate::utils::{format_duration, format_number};

/// What a finished training run produced
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub history: TrainingHistory,
    pub train_samples: usize,
    pub val_samples: usize,
    pub num_classes: usize,
    pub num_params: usize,
    pub elapsed_secs: f64,
    /// Weights file as written by the recorder
    pub weights_path: PathBuf,
}

impl TrainingReport {
    pub fn final_metrics(&self) -> Option<EpochMetrics> {
        self.history.epochs().last().copied()
    }
}

/// Train a fresh classifier as described by `config`
///
/// Reads the label CSV and encoder, splits with `split_seed`, trains for
/// `epochs` epochs and writes the weights, the model config, both charts and
/// the history CSV.
///
/// # Type Parameters
/// * `B` - The autodiff backend to use (e.g., `Autodiff<NdArray>` or `Autodiff<Cuda>`)
pub fn run_training<B>(config: &TrainConfig, device: &B::Device) -> Result<TrainingReport>
where
    B: AutodiffBackend,
{
    config.validate()?;
    let started = Instant::now();

    let encoder = LabelEncoder::load(&config.encoder_path)?;
    let records = read_label_csv(&config.csv_path, &encoder, &config.data_root)?;
    if records.is_empty() {
        return Err(AslError::EmptyDataset(format!(
            "no rows in {:?}",
            config.csv_path
        )));
    }

    let split = TrainValSplit::new(records.len(), config.validation_fraction, config.split_seed)?;
    let (train_records, val_records) = split.apply(&records);
    if train_records.is_empty() {
        return Err(AslError::EmptyDataset(format!(
            "{} records leave nothing to train on after the validation split",
            records.len()
        )));
    }

    info!(
        "Dataset: {} records, {} classes ({} train / {} validation)",
        records.len(),
        encoder.num_classes(),
        train_records.len(),
        val_records.len()
    );

    let train_dataset = SignImageDataset::new(&train_records, config.image_size);
    let val_dataset = SignImageDataset::new(&val_records, config.image_size);

    B::seed(device, config.seed);

    let model_config = SignClassifierConfig::new()
        .with_num_classes(encoder.num_classes())
        .with_input_size(config.image_size)
        .with_dropout_rate(config.dropout_rate)
        .with_base_filters(config.base_filters);
    let mut model = SignClassifier::<B>::new(&model_config, device);
    let num_params = model.num_params();
    info!("Model has {} trainable parameters", format_number(num_params));

    let mut optimizer = AdamConfig::new().init::<B, SignClassifier<B>>();
    let batcher = SignBatcher::<B>::new(config.image_size);
    let mut epoch_rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut history = TrainingHistory::default();

    info!(
        "Training for {} epochs, batch size {}, learning rate {}",
        config.epochs, config.batch_size, config.learning_rate
    );

    for epoch in 1..=config.epochs {
        let mut indices: Vec<usize> = (0..train_records.len()).collect();
        indices.shuffle(&mut epoch_rng);

        let (trained, train_stats) = train_epoch(
            model,
            &mut optimizer,
            &train_dataset,
            &batcher,
            &indices,
            config,
            device,
            epoch,
        )?;
        model = trained;

        let val_stats = evaluate::<B::InnerBackend>(
            &model.valid(),
            &val_dataset,
            config.batch_size,
            device,
        )?;

        let metrics = EpochMetrics::from_passes(epoch, &train_stats, &val_stats);
        info!(
            "Epoch {}/{}: train loss {:.4}, train acc {:.2}% | val loss {:.4}, val acc {:.2}%",
            epoch,
            config.epochs,
            metrics.train_loss,
            metrics.train_accuracy,
            metrics.val_loss,
            metrics.val_accuracy
        );
        history.push(&metrics);
    }

    save_classifier(
        &model,
        &model_config,
        &config.weights_path,
        &config.model_config_path,
    )?;
    history.plot(&config.accuracy_chart, &config.loss_chart)?;
    history.save_csv(&config.history_path)?;

    let elapsed_secs = started.elapsed().as_secs_f64();
    info!("Training finished in {}", format_duration(elapsed_secs));

    Ok(TrainingReport {
        history,
        train_samples: train_records.len(),
        val_samples: val_records.len(),
        num_classes: encoder.num_classes(),
        num_params,
        elapsed_secs,
        weights_path: weights_file(&config.weights_path),
    })
}

/// One pass over the training indices, batch by batch
#[allow(clippy::too_many_arguments)]
fn train_epoch<B, O>(
    mut model: SignClassifier<B>,
    optimizer: &mut O,
    dataset: &SignImageDataset,
    batcher: &SignBatcher<B>,
    indices: &[usize],
    config: &TrainConfig,
    device: &B::Device,
    epoch: usize,
) -> Result<(SignClassifier<B>, PassStats)>
where
    B: AutodiffBackend,
    O: Optimizer<SignClassifier<B>, B>,
{
    let loss_fn = CrossEntropyLossConfig::new().init(device);
    let num_batches = indices.len().div_ceil(config.batch_size);
    let pb = progress_bar(num_batches, &format!("epoch {}", epoch));
    let mut stats = PassStats::default();

    for chunk in indices.chunks(config.batch_size) {
        // Images are loaded per batch to keep memory flat
        let items = dataset.load_items(chunk)?;
        let batch = batcher.batch(items, device);
        let batch_size = chunk.len();

        let output = model.forward(batch.images);
        let loss = loss_fn.forward(output.clone(), batch.targets.clone());
        let loss_value = loss.clone().into_scalar().elem::<f64>();
        let correct = count_correct(output, batch.targets);
        stats.add_batch(loss_value, correct, batch_size);

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &model);
        model = optimizer.step(config.learning_rate, model, grads);

        pb.inc(1);
    }
    pb.finish_and_clear();

    debug!(
        "Epoch {} training pass: {} samples, loss {:.4}",
        epoch,
        stats.samples,
        stats.loss()
    );
    Ok((model, stats))
}

/// Loss and accuracy of `model` over a whole dataset, in order
pub fn evaluate<B: Backend>(
    model: &SignClassifier<B>,
    dataset: &SignImageDataset,
    batch_size: usize,
    device: &B::Device,
) -> Result<PassStats> {
    let batcher = SignBatcher::<B>::new(dataset.image_size());
    let loss_fn = CrossEntropyLossConfig::new().init(device);
    let indices: Vec<usize> = (0..burn::data::dataset::Dataset::len(dataset)).collect();
    let mut stats = PassStats::default();

    for chunk in indices.chunks(batch_size.max(1)) {
        let items = dataset.load_items(chunk)?;
        let batch = batcher.batch(items, device);

        let output = model.forward(batch.images);
        let loss = loss_fn.forward(output.clone(), batch.targets.clone());
        let loss_value = loss.into_scalar().elem::<f64>();
        let correct = count_correct(output, batch.targets);
        stats.add_batch(loss_value, correct, chunk.len());
    }

    Ok(stats)
}

fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let predictions = logits.argmax(1).flatten::<1>(0, 1);
    let correct = predictions
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>();
    correct.max(0) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;
    use burn::tensor::TensorData;

    type TestBackend = DefaultBackend;

    #[test]
    fn test_count_correct() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_floats(
            TensorData::new(vec![0.9f32, 0.1, 0.2, 0.8, 0.7, 0.3], [3, 2]),
            &device,
        );
        let targets =
            Tensor::<TestBackend, 1, Int>::from_data(TensorData::new(vec![0i64, 1, 1], [3]), &device);

        assert_eq!(count_correct(logits, targets), 2);
    }

    #[test]
    fn test_evaluate_empty_dataset() {
        let device = Default::default();
        let config = SignClassifierConfig::new()
            .with_num_classes(3)
            .with_input_size(16)
            .with_base_filters(2);
        let model = SignClassifier::<TestBackend>::new(&config, &device);
        let dataset = SignImageDataset::new(&[], 16);

        let stats = evaluate(&model, &dataset, 4, &device).unwrap();
        assert_eq!(stats.samples, 0);
        assert_eq!(stats.accuracy(), 0.0);
    }

    #[test]
    fn test_missing_encoder_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrainConfig {
            encoder_path: dir.path().join("missing.json"),
            ..TrainConfig::default()
        };
        let result = run_training::<crate::backend::TrainingBackend>(&config, &Default::default());
        assert!(matches!(result, Err(AslError::NotFound(_))));
    }
}
