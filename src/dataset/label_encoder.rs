//! Label encoder artifact
//!
//! A fitted, ordered list of class names. Index `i` of the list is the class
//! index the network predicts. The encoder is fitted once by the label step and
//! loaded read-only by the trainer and the live runner.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::utils::error::{AslError, Result};

/// Mapping between class names and contiguous indices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Fit on a label set; classes are deduplicated and sorted
    pub fn fit<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let classes: BTreeSet<String> = labels
            .into_iter()
            .map(|label| label.as_ref().to_string())
            .collect();

        if classes.is_empty() {
            return Err(AslError::EmptyDataset(
                "cannot fit a label encoder on zero labels".to_string(),
            ));
        }

        Ok(Self {
            classes: classes.into_iter().collect(),
        })
    }

    /// Ordered class list
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Class name to index
    pub fn encode(&self, label: &str) -> Result<usize> {
        self.classes
            .binary_search_by(|class| class.as_str().cmp(label))
            .map_err(|_| AslError::UnknownLabel(label.to_string()))
    }

    /// Index to class name
    pub fn decode(&self, index: usize) -> Result<&str> {
        self.classes
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| {
                AslError::shape(
                    format!("class index < {}", self.classes.len()),
                    format!("index {}", index),
                )
            })
    }

    /// Write the encoder as JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        info!("Label encoder with {} classes saved to {:?}", self.num_classes(), path);
        Ok(())
    }

    /// Load a previously saved encoder
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AslError::NotFound(path.to_path_buf()));
        }
        let json = fs::read_to_string(path)?;
        let encoder: LabelEncoder = serde_json::from_str(&json)?;

        if encoder.classes.is_empty() {
            return Err(AslError::EmptyDataset(format!(
                "label encoder at {:?} has no classes",
                path
            )));
        }
        if encoder.classes.windows(2).any(|w| w[0] >= w[1]) {
            return Err(AslError::Serialization(format!(
                "label encoder at {:?} is not sorted and deduplicated",
                path
            )));
        }

        Ok(encoder)
    }
}
