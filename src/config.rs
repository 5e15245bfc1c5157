//! Pipeline configuration
//!
//! One explicit structure per component, grouped in [`AppConfig`]. Defaults
//! reproduce the stock pipeline; any subset can be overridden from a TOML file:
//!
//! ```toml
//! [augment]
//! kelvin = 6500
//! max_images_per_dir = 200
//!
//! [train]
//! epochs = 10
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::dataset::background::{kelvin_to_rgb, FailurePolicy};
use crate::inference::live::HandRegion;
use crate::utils::error::{AslError, Result};

/// Background augmenter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentConfig {
    /// Foreground images, one subdirectory per class
    pub input_dir: PathBuf,
    /// Pool of background images
    pub background_dir: PathBuf,
    /// Output root, mirrors the class subdirectories
    pub output_dir: PathBuf,
    pub crop_width: u32,
    pub crop_height: u32,
    /// Colour temperature applied to the foreground; must be a table entry
    pub kelvin: u32,
    /// Cap on images written per class directory
    pub max_images_per_dir: usize,
    /// First numeric suffix of the output file names
    pub start_index: u32,
    /// Backdrop colour distance for the default compositor
    pub key_tolerance: f32,
    /// Seed for background choice and crop offsets; unseeded runs differ
    pub seed: Option<u64>,
    pub failure_policy: FailurePolicy,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("images/prep"),
            background_dir: PathBuf::from("images/all_bgs/all"),
            output_dir: PathBuf::from("images/rng_background"),
            crop_width: 400,
            crop_height: 400,
            kelvin: 7500,
            max_images_per_dir: 1000,
            start_index: 5000,
            key_tolerance: 60.0,
            seed: None,
            failure_policy: FailurePolicy::Abort,
        }
    }
}

impl AugmentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.crop_width == 0 || self.crop_height == 0 {
            return Err(AslError::Config("crop size must be non-zero".to_string()));
        }
        if self.max_images_per_dir == 0 {
            return Err(AslError::Config(
                "max_images_per_dir must be at least 1".to_string(),
            ));
        }
        if !(self.key_tolerance >= 0.0) {
            return Err(AslError::Config(
                "key_tolerance must be non-negative".to_string(),
            ));
        }
        kelvin_to_rgb(self.kelvin)?;
        Ok(())
    }
}

/// Label step settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    /// Dataset root scanned for `<class>/<image>`
    pub dataset_dir: PathBuf,
    pub csv_path: PathBuf,
    pub encoder_path: PathBuf,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            dataset_dir: PathBuf::from("images/rng_background"),
            csv_path: PathBuf::from("labels/data.csv"),
            encoder_path: PathBuf::from("labels/label_encoder.json"),
        }
    }
}

/// Trainer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub csv_path: PathBuf,
    pub encoder_path: PathBuf,
    /// Root the CSV `sub_path` column is relative to
    pub data_root: PathBuf,
    pub weights_path: PathBuf,
    pub model_config_path: PathBuf,
    pub accuracy_chart: PathBuf,
    pub loss_chart: PathBuf,
    pub history_path: PathBuf,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Seed for weight init, dropout and batch shuffling
    pub seed: u64,
    /// Seed for the train/validation split only
    pub split_seed: u64,
    pub validation_fraction: f64,
    pub image_size: usize,
    pub base_filters: usize,
    pub dropout_rate: f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::from("labels/data.csv"),
            encoder_path: PathBuf::from("labels/label_encoder.json"),
            data_root: PathBuf::from("images/rng_background"),
            weights_path: PathBuf::from("models/model.mpk"),
            model_config_path: PathBuf::from("models/model_config.json"),
            accuracy_chart: PathBuf::from("diagrams/accuracy.png"),
            loss_chart: PathBuf::from("diagrams/loss.png"),
            history_path: PathBuf::from("diagrams/history.csv"),
            epochs: 30,
            batch_size: 32,
            learning_rate: 0.0005,
            seed: 69,
            split_seed: 42,
            validation_fraction: 0.15,
            image_size: crate::IMAGE_SIZE,
            base_filters: 32,
            dropout_rate: 0.3,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(AslError::Config("epochs must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(AslError::Config("batch_size must be at least 1".to_string()));
        }
        if !(self.learning_rate > 0.0) {
            return Err(AslError::Config("learning_rate must be positive".to_string()));
        }
        if !(self.validation_fraction > 0.0 && self.validation_fraction < 1.0) {
            return Err(AslError::Config(
                "validation_fraction must be in (0, 1)".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(AslError::Config("dropout_rate must be in [0, 1)".to_string()));
        }
        if self.image_size < 16 || self.base_filters == 0 {
            return Err(AslError::Config(
                "image_size must be at least 16 and base_filters non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Live inference settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub weights_path: PathBuf,
    pub model_config_path: PathBuf,
    pub encoder_path: PathBuf,
    /// Camera device index
    pub camera_index: u32,
    /// Replay frames from this directory instead of the camera
    pub frames_dir: Option<PathBuf>,
    /// Stop after this many frames in headless mode
    pub max_frames: Option<usize>,
    /// Key that closes the preview window
    pub quit_key: char,
    /// Region of the frame fed to the classifier
    pub region: HandRegion,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            weights_path: PathBuf::from("models/model.mpk"),
            model_config_path: PathBuf::from("models/model_config.json"),
            encoder_path: PathBuf::from("labels/label_encoder.json"),
            camera_index: 1,
            frames_dir: None,
            max_frames: None,
            quit_key: 'q',
            region: HandRegion::default(),
        }
    }
}

/// Full pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub augment: AugmentConfig,
    pub labels: LabelConfig,
    pub train: TrainConfig,
    pub live: LiveConfig,
}

impl AppConfig {
    /// Load from a TOML file; missing keys keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        load_toml_config(path)
    }

    pub fn validate(&self) -> Result<()> {
        self.augment.validate()?;
        self.train.validate()
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| AslError::Serialization(e.to_string()))
    }
}

/// Read and parse a TOML file into `T`
pub fn load_toml_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    if !path.exists() {
        return Err(AslError::NotFound(path.to_path_buf()));
    }
    let content = fs::read_to_string(path)?;

    toml::from_str(&content)
        .map_err(|e| AslError::Config(format!("Failed to parse config {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.augment.crop_width, 400);
        assert_eq!(config.augment.kelvin, 7500);
        assert_eq!(config.augment.max_images_per_dir, 1000);
        assert_eq!(config.augment.start_index, 5000);
        assert_eq!(config.train.epochs, 30);
        assert_eq!(config.train.batch_size, 32);
        assert_eq!(config.train.seed, 69);
        assert_eq!(config.train.split_seed, 42);
        assert_eq!(config.live.region, HandRegion::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("asl.toml");
        fs::write(
            &path,
            "[augment]\nkelvin = 6500\nfailure_policy = \"skip\"\n\n[train]\nepochs = 3\n",
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.augment.kelvin, 6500);
        assert_eq!(config.augment.failure_policy, FailurePolicy::Skip);
        assert_eq!(config.augment.crop_height, 400);
        assert_eq!(config.train.epochs, 3);
        assert_eq!(config.train.learning_rate, 0.0005);
    }

    #[test]
    fn test_retry_policy_from_toml() {
        let config: AugmentConfig =
            toml::from_str("failure_policy = { retry = { attempts = 2 } }").unwrap();
        assert_eq!(config.failure_policy, FailurePolicy::Retry { attempts: 2 });
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = AppConfig::default();
        let text = config.to_toml().unwrap();
        let parsed: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.augment.kelvin = 7250;
        assert!(matches!(
            config.validate(),
            Err(AslError::UnsupportedTemperature(7250))
        ));

        let mut config = AppConfig::default();
        config.train.validation_fraction = 1.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.train.epochs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let result = AppConfig::load(&dir.path().join("nope.toml"));
        assert!(matches!(result, Err(AslError::NotFound(_))));
    }
}
