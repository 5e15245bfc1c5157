//! Burn Dataset Integration
//!
//! Implements Burn's `Dataset` and `Batcher` for the sign images. The same
//! preprocessing (resize, CHW layout, ImageNet normalization) is used for
//! training batches and for live frames, so a frame is classified exactly the
//! way the training images were seen.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::imageops::{self, FilterType};
use image::RgbImage;

use super::load_rgb;
use super::records::EncodedRecord;
use crate::utils::error::{AslError, Result};

/// ImageNet channel means
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// A single sign image ready for Burn
#[derive(Clone, Debug)]
pub struct SignItem {
    /// Image data as flattened CHW float array [3 * H * W], values in [0, 1]
    pub image: Vec<f32>,
    /// Class index
    pub label: usize,
    /// Image path (for logging)
    pub path: String,
}

impl SignItem {
    /// Resize an RGB image to `image_size x image_size` and lay it out as CHW
    pub fn from_image(img: &RgbImage, label: usize, image_size: usize, path: String) -> Self {
        let size = image_size as u32;
        let resized;
        let img = if img.dimensions() == (size, size) {
            img
        } else {
            resized = imageops::resize(img, size, size, FilterType::Triangle);
            &resized
        };

        let plane = image_size * image_size;
        let mut image = vec![0.0f32; 3 * plane];

        for (x, y, pixel) in img.enumerate_pixels() {
            let offset = y as usize * image_size + x as usize;
            image[offset] = pixel[0] as f32 / 255.0;
            image[plane + offset] = pixel[1] as f32 / 255.0;
            image[2 * plane + offset] = pixel[2] as f32 / 255.0;
        }

        Self { image, label, path }
    }

    /// Load and preprocess an image file
    pub fn from_path(path: &Path, label: usize, image_size: usize) -> Result<Self> {
        let img = load_rgb(path)?;
        Ok(Self::from_image(
            &img,
            label,
            image_size,
            path.to_string_lossy().to_string(),
        ))
    }
}

/// Sign image dataset, loading images lazily from disk
#[derive(Debug, Clone)]
pub struct SignImageDataset {
    samples: Vec<(PathBuf, usize)>,
    image_size: usize,
}

impl SignImageDataset {
    pub fn new(records: &[EncodedRecord], image_size: usize) -> Self {
        Self {
            samples: records.iter().map(|r| (r.path.clone(), r.label)).collect(),
            image_size,
        }
    }

    /// Load item `index`, reporting why it failed
    pub fn try_get(&self, index: usize) -> Result<SignItem> {
        let (path, label) = self.samples.get(index).ok_or_else(|| {
            AslError::shape(
                format!("index < {}", self.samples.len()),
                format!("index {}", index),
            )
        })?;
        SignItem::from_path(path, *label, self.image_size)
    }

    /// Load several items, failing on the first unreadable image
    pub fn load_items(&self, indices: &[usize]) -> Result<Vec<SignItem>> {
        indices.iter().map(|&i| self.try_get(i)).collect()
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }
}

impl Dataset<SignItem> for SignImageDataset {
    fn get(&self, index: usize) -> Option<SignItem> {
        self.try_get(index).ok()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// A batch of sign images
#[derive(Clone, Debug)]
pub struct SignBatch<B: Backend> {
    /// Images with shape [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher turning sign items into normalized tensors
#[derive(Clone, Debug)]
pub struct SignBatcher<B: Backend> {
    image_size: usize,
    _backend: PhantomData<B>,
}

impl<B: Backend> SignBatcher<B> {
    pub fn new(image_size: usize) -> Self {
        Self {
            image_size,
            _backend: PhantomData,
        }
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }

    /// Stack and normalize the images of `items` into [N, 3, H, W]
    pub fn images(&self, items: &[SignItem], device: &B::Device) -> Tensor<B, 4> {
        let batch_size = items.len();
        let size = self.image_size;

        let data: Vec<f32> = items
            .iter()
            .flat_map(|item| item.image.iter().copied())
            .collect();

        let images =
            Tensor::<B, 4>::from_floats(TensorData::new(data, [batch_size, 3, size, size]), device);

        let mean = Tensor::<B, 4>::from_floats(
            TensorData::new(IMAGENET_MEAN.to_vec(), [1, 3, 1, 1]),
            device,
        );
        let std = Tensor::<B, 4>::from_floats(
            TensorData::new(IMAGENET_STD.to_vec(), [1, 3, 1, 1]),
            device,
        );

        (images - mean) / std
    }
}

impl<B: Backend> Batcher<B, SignItem, SignBatch<B>> for SignBatcher<B> {
    fn batch(&self, items: Vec<SignItem>, device: &B::Device) -> SignBatch<B> {
        let images = self.images(&items, device);

        let targets: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets, [items.len()]), device);

        SignBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;
    use image::Rgb;
    use tempfile::tempdir;

    type TestBackend = DefaultBackend;

    #[test]
    fn test_item_is_chw() {
        let mut img = RgbImage::new(2, 2);
        img.put_pixel(1, 0, Rgb([255, 0, 51]));

        let item = SignItem::from_image(&img, 3, 2, "mem".to_string());
        assert_eq!(item.image.len(), 12);
        // red plane, pixel (1, 0)
        assert_eq!(item.image[1], 1.0);
        // green plane
        assert_eq!(item.image[4 + 1], 0.0);
        // blue plane
        assert!((item.image[8 + 1] - 0.2).abs() < 1e-6);
        assert_eq!(item.label, 3);
    }

    #[test]
    fn test_item_resized() {
        let img = RgbImage::from_pixel(30, 10, Rgb([10, 20, 30]));
        let item = SignItem::from_image(&img, 0, 8, "mem".to_string());
        assert_eq!(item.image.len(), 3 * 8 * 8);
    }

    #[test]
    fn test_dataset_reports_missing_file() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("good.png");
        RgbImage::from_pixel(5, 5, Rgb([1, 2, 3])).save(&good).unwrap();

        let records = vec![
            EncodedRecord { path: good, label: 1 },
            EncodedRecord { path: dir.path().join("gone.png"), label: 0 },
        ];
        let dataset = SignImageDataset::new(&records, 4);

        assert_eq!(dataset.len(), 2);
        assert!(dataset.get(0).is_some());
        assert!(dataset.get(1).is_none());
        assert!(matches!(dataset.try_get(1), Err(AslError::NotFound(_))));
        assert!(dataset.load_items(&[0, 1]).is_err());
    }

    #[test]
    fn test_batch_shapes_and_normalization() {
        let device = Default::default();
        let batcher = SignBatcher::<TestBackend>::new(4);

        let white = RgbImage::from_pixel(4, 4, Rgb([255, 255, 255]));
        let items = vec![
            SignItem::from_image(&white, 2, 4, "a".to_string()),
            SignItem::from_image(&white, 0, 4, "b".to_string()),
        ];
        let batch = batcher.batch(items, &device);

        assert_eq!(batch.images.dims(), [2, 3, 4, 4]);
        assert_eq!(batch.targets.dims(), [2]);

        let values = batch.images.into_data().to_vec::<f32>().unwrap();
        let expected_red = (1.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        assert!((values[0] - expected_red).abs() < 1e-5);

        let targets = batch.targets.into_data().convert::<i64>().to_vec::<i64>().unwrap();
        assert_eq!(targets, vec![2, 0]);
    }
}
