//! Train/validation split
//!
//! The split shuffles indices with its own seeded ChaCha8 generator, so the
//! same record count and seed always yield the same partition regardless of
//! the seed used for training.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::utils::error::{AslError, Result};

/// Index partition of a record list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainValSplit {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

impl TrainValSplit {
    /// Split `len` records, holding out `ceil(len * validation_fraction)` for validation
    pub fn new(len: usize, validation_fraction: f64, seed: u64) -> Result<Self> {
        if !(validation_fraction > 0.0 && validation_fraction < 1.0) {
            return Err(AslError::Config(format!(
                "validation fraction must be in (0, 1), got {}",
                validation_fraction
            )));
        }
        if len == 0 {
            return Err(AslError::EmptyDataset("nothing to split".to_string()));
        }

        let mut indices: Vec<usize> = (0..len).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        indices.shuffle(&mut rng);

        // 100 * 0.15 is 15.000000000000002 in f64
        let n_validation = ((len as f64) * validation_fraction - 1e-9).ceil() as usize;
        let n_validation = n_validation.clamp(1, len);
        let validation = indices.split_off(len - n_validation);

        Ok(Self {
            train: indices,
            validation,
        })
    }

    /// Pick the items of `records` belonging to each side of the split
    pub fn apply<T: Clone>(&self, records: &[T]) -> (Vec<T>, Vec<T>) {
        let pick = |indices: &[usize]| indices.iter().map(|&i| records[i].clone()).collect();
        (pick(&self.train), pick(&self.validation))
    }
}
