//! Labeled image records
//!
//! Scans a class-per-subdirectory image tree and reads/writes the label CSV
//! consumed by the trainer. The CSV has a header row with the columns
//! `sub_path` (image path relative to the dataset root) and `target_image`
//! (encoded class index).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::is_image_file;
use super::label_encoder::LabelEncoder;
use crate::utils::error::{AslError, Result};

/// A (file path, class label) pair found by scanning the dataset tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledImage {
    /// Path relative to the scanned root
    pub sub_path: PathBuf,
    /// Class label, taken from the subdirectory name
    pub label: String,
}

/// A record ready for training: absolute image path and class index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedRecord {
    pub path: PathBuf,
    pub label: usize,
}

/// One CSV row
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LabelRow {
    sub_path: String,
    target_image: String,
}

/// Scan `root/<class>/<image>` and return records ordered by class then file name
pub fn scan_labeled_tree(root: &Path) -> Result<Vec<LabeledImage>> {
    if !root.is_dir() {
        return Err(AslError::NotFound(root.to_path_buf()));
    }

    let mut class_dirs: Vec<String> = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                class_dirs.push(name.to_string());
            }
        }
    }
    class_dirs.sort();

    let mut records = Vec::new();
    for class_name in &class_dirs {
        let class_dir = root.join(class_name);
        let mut files: Vec<PathBuf> = WalkDir::new(&class_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| is_image_file(p))
            .collect();
        files.sort();

        if files.is_empty() {
            warn!("Class directory {:?} contains no images", class_dir);
        }
        debug!("Class '{}': {} images", class_name, files.len());

        for file in files {
            let sub_path = file
                .strip_prefix(root)
                .map(Path::to_path_buf)
                .unwrap_or(file.clone());
            records.push(LabeledImage {
                sub_path,
                label: class_name.clone(),
            });
        }
    }

    info!(
        "Scanned {} images in {} classes under {:?}",
        records.len(),
        class_dirs.len(),
        root
    );

    Ok(records)
}

/// Write the label CSV, encoding every label through `encoder`
pub fn write_label_csv(
    records: &[LabeledImage],
    encoder: &LabelEncoder,
    csv_path: &Path,
) -> Result<()> {
    if let Some(parent) = csv_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut writer = csv::Writer::from_path(csv_path)?;
    for record in records {
        let index = encoder.encode(&record.label)?;
        let sub_path = record
            .sub_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        writer.serialize(LabelRow {
            sub_path,
            target_image: index.to_string(),
        })?;
    }
    writer.flush()?;

    info!("Wrote {} rows to {:?}", records.len(), csv_path);
    Ok(())
}

/// Read the label CSV
///
/// `target_image` is always an encoded class index, as written by
/// [`write_label_csv`], and must be below `encoder.num_classes()`. Class
/// names, digits included, are rejected. Paths are resolved against
/// `data_root`.
pub fn read_label_csv(
    csv_path: &Path,
    encoder: &LabelEncoder,
    data_root: &Path,
) -> Result<Vec<EncodedRecord>> {
    if !csv_path.exists() {
        return Err(AslError::NotFound(csv_path.to_path_buf()));
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut records = Vec::new();

    for row in reader.deserialize() {
        let row: LabelRow = row?;
        let target = row.target_image.trim();
        let label = match target.parse::<usize>() {
            Ok(index) if index < encoder.num_classes() => index,
            _ => {
                return Err(AslError::shape(
                    format!("class index < {}", encoder.num_classes()),
                    format!("'{}' for '{}'", target, row.sub_path),
                ))
            }
        };

        records.push(EncodedRecord {
            path: data_root.join(&row.sub_path),
            label,
        });
    }

    debug!("Read {} labeled records from {:?}", records.len(), csv_path);
    Ok(records)
}

/// Summary of a label step run
#[derive(Debug, Clone)]
pub struct LabelIndex {
    pub encoder: LabelEncoder,
    pub num_images: usize,
}

/// Scan `dataset_root`, fit the encoder on its classes and write both artifacts
pub fn build_label_index(
    dataset_root: &Path,
    csv_path: &Path,
    encoder_path: &Path,
) -> Result<LabelIndex> {
    let records = scan_labeled_tree(dataset_root)?;
    if records.is_empty() {
        return Err(AslError::EmptyDataset(format!(
            "no images found under {:?}",
            dataset_root
        )));
    }

    let encoder = LabelEncoder::fit(records.iter().map(|r| r.label.as_str()))?;
    encoder.save(encoder_path)?;
    write_label_csv(&records, &encoder, csv_path)?;

    Ok(LabelIndex {
        encoder,
        num_images: records.len(),
    })
}
