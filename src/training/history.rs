//! Per-epoch training metrics

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::utils::charts::{plot_accuracy, plot_loss};
use crate::utils::error::Result;

/// Running totals of one pass over a dataset
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PassStats {
    /// Sum of per-sample losses
    pub loss_sum: f64,
    pub correct: usize,
    pub samples: usize,
}

impl PassStats {
    /// Add a batch given its mean loss
    pub fn add_batch(&mut self, mean_loss: f64, correct: usize, batch_size: usize) {
        self.loss_sum += mean_loss * batch_size as f64;
        self.correct += correct;
        self.samples += batch_size;
    }

    /// Mean loss per sample
    pub fn loss(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.loss_sum / self.samples as f64
        }
    }

    /// Accuracy in percent
    pub fn accuracy(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            100.0 * self.correct as f64 / self.samples as f64
        }
    }
}

/// Metrics of one epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
}

impl EpochMetrics {
    pub fn from_passes(epoch: usize, train: &PassStats, validation: &PassStats) -> Self {
        Self {
            epoch,
            train_loss: train.loss(),
            train_accuracy: train.accuracy(),
            val_loss: validation.loss(),
            val_accuracy: validation.accuracy(),
        }
    }
}

/// The four per-epoch sequences collected during training
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingHistory {
    pub train_loss: Vec<f64>,
    pub train_accuracy: Vec<f64>,
    pub val_loss: Vec<f64>,
    pub val_accuracy: Vec<f64>,
}

impl TrainingHistory {
    pub fn push(&mut self, metrics: &EpochMetrics) {
        self.train_loss.push(metrics.train_loss);
        self.train_accuracy.push(metrics.train_accuracy);
        self.val_loss.push(metrics.val_loss);
        self.val_accuracy.push(metrics.val_accuracy);
    }

    pub fn len(&self) -> usize {
        self.train_loss.len()
    }

    pub fn is_empty(&self) -> bool {
        self.train_loss.is_empty()
    }

    /// Rows of the history, epochs numbered from 1
    pub fn epochs(&self) -> Vec<EpochMetrics> {
        (0..self.len())
            .map(|i| EpochMetrics {
                epoch: i + 1,
                train_loss: self.train_loss[i],
                train_accuracy: self.train_accuracy[i],
                val_loss: self.val_loss[i],
                val_accuracy: self.val_accuracy[i],
            })
            .collect()
    }

    /// Write the history as CSV, one row per epoch
    pub fn save_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut writer = csv::Writer::from_path(path)?;
        for row in self.epochs() {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Draw the accuracy and loss charts
    pub fn plot(&self, accuracy_path: &Path, loss_path: &Path) -> Result<()> {
        plot_accuracy(&self.train_accuracy, &self.val_accuracy, accuracy_path)?;
        plot_loss(&self.train_loss, &self.val_loss, loss_path)
    }
}
