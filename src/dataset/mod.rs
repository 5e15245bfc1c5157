//! Dataset module
//!
//! - `background`: background augmentation of foreground hand images
//! - `records`: directory scanning and the label CSV
//! - `label_encoder`: class name <-> index artifact
//! - `split`: seeded train/validation split
//! - `burn_dataset`: Burn `Dataset` and `Batcher` for training and inference

pub mod background;
pub mod burn_dataset;
pub mod label_encoder;
pub mod records;
pub mod split;

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use image::{ImageError, ImageReader, RgbImage};

use crate::utils::error::{AslError, Result};

pub use background::{
    adjust_temperature, choose_crop, kelvin_to_rgb, random_crop, AugmentReport,
    BackgroundAugmenter, BorderKeyCompositor, Compositor, CropRegion, FailurePolicy,
};
pub use burn_dataset::{SignBatch, SignBatcher, SignImageDataset, SignItem};
pub use label_encoder::LabelEncoder;
pub use records::{build_label_index, read_label_csv, scan_labeled_tree, EncodedRecord};
pub use split::TrainValSplit;

/// File extensions treated as images
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// Whether `path` has an image extension
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Regular files directly inside `dir`, sorted by path
pub fn list_files_sorted(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(AslError::NotFound(dir.to_path_buf()));
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Open and decode an image as 8-bit RGB
pub fn load_rgb(path: &Path) -> Result<RgbImage> {
    let reader = ImageReader::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => AslError::NotFound(path.to_path_buf()),
        _ => AslError::Io(e),
    })?;
    let reader = reader
        .with_guessed_format()
        .map_err(AslError::Io)?;

    match reader.decode() {
        Ok(image) => Ok(image.to_rgb8()),
        Err(ImageError::IoError(e)) if e.kind() == ErrorKind::NotFound => {
            Err(AslError::NotFound(path.to_path_buf()))
        }
        Err(e) => Err(AslError::decode(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("prep/A/a1.JPG")));
        assert!(is_image_file(Path::new("bg.png")));
        assert!(!is_image_file(Path::new("labels/data.csv")));
        assert!(!is_image_file(Path::new("README")));
    }

    #[test]
    fn test_load_rgb_missing() {
        let dir = tempdir().unwrap();
        let result = load_rgb(&dir.path().join("missing.jpg"));
        assert!(matches!(result, Err(AslError::NotFound(_))));
    }

    #[test]
    fn test_load_rgb_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        fs::write(&path, b"definitely not a jpeg").unwrap();

        let result = load_rgb(&path);
        assert!(matches!(result, Err(AslError::Decode { .. })));
    }

    #[test]
    fn test_list_files_sorted() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.png"), b"").unwrap();
        fs::write(dir.path().join("a.png"), b"").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let files = list_files_sorted(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.png"));
    }
}
