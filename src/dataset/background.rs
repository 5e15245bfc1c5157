//! Background augmentation
//!
//! Produces composited training images: every foreground hand image gets a
//! warmer/cooler colour temperature and is placed over a random crop of a
//! randomly chosen background. Output files are written per class directory as
//! `<class><n>.jpg` with `n` counting up from the configured start index.
//!
//! Randomness comes from the generator handed to [`BackgroundAugmenter::new`];
//! seed it for reproducible runs or build it from entropy otherwise.

use std::fs;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{ImageBuffer, ImageFormat, Rgb, RgbImage};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{is_image_file, list_files_sorted, load_rgb};
use crate::config::AugmentConfig;
use crate::utils::error::{AslError, Result};
use crate::utils::logging::progress_bar;

/// Colour temperature calibration points: Kelvin -> RGB white point
pub const KELVIN_TABLE: [(u32, [u8; 3]); 19] = [
    (1000, [255, 56, 0]),
    (1500, [255, 109, 0]),
    (2000, [255, 137, 18]),
    (2500, [255, 161, 72]),
    (3000, [255, 180, 107]),
    (3500, [255, 196, 137]),
    (4000, [255, 209, 163]),
    (4500, [255, 219, 186]),
    (5000, [255, 228, 206]),
    (5500, [255, 236, 224]),
    (6000, [255, 243, 239]),
    (6500, [255, 249, 253]),
    (7000, [245, 243, 255]),
    (7500, [235, 238, 255]),
    (8000, [227, 233, 255]),
    (8500, [220, 229, 255]),
    (9000, [214, 225, 255]),
    (9500, [208, 222, 255]),
    (10000, [204, 219, 255]),
];

/// Look up the RGB white point of a table temperature
pub fn kelvin_to_rgb(kelvin: u32) -> Result<[u8; 3]> {
    KELVIN_TABLE
        .iter()
        .find(|(k, _)| *k == kelvin)
        .map(|(_, rgb)| *rgb)
        .ok_or(AslError::UnsupportedTemperature(kelvin))
}

/// Scale `value` by `factor / 255`, rounded to nearest
fn scale_channel(value: u8, factor: u8) -> u8 {
    ((value as u32 * factor as u32 + 127) / 255) as u8
}

/// Apply a colour temperature to an image
///
/// Each channel is multiplied by the table entry's channel value over 255.
pub fn adjust_temperature(image: &RgbImage, kelvin: u32) -> Result<RgbImage> {
    let [r, g, b] = kelvin_to_rgb(kelvin)?;
    let (width, height) = image.dimensions();

    Ok(ImageBuffer::from_fn(width, height, |x, y| {
        let pixel = image.get_pixel(x, y);
        Rgb([
            scale_channel(pixel[0], r),
            scale_channel(pixel[1], g),
            scale_channel(pixel[2], b),
        ])
    }))
}

/// Region chosen for a background crop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// The region runs past the background edge
    pub exceeds_bounds: bool,
}

fn crop_offset<R: Rng + ?Sized>(extent: u32, crop: u32, rng: &mut R) -> (u32, bool) {
    if extent > crop {
        (rng.gen_range(0..extent - crop), false)
    } else if extent == crop {
        (0, false)
    } else {
        // Background smaller than the crop: the offset is drawn over the whole
        // extent, so the region overhangs the image. Kept as-is and flagged.
        (rng.gen_range(0..extent.max(1)), true)
    }
}

/// Choose a uniformly random crop of `crop_width x crop_height`
///
/// Offsets are drawn from `[0, bg - crop)` on each axis. When the background is
/// smaller than the crop on an axis, the whole background extent is used as
/// the bound instead and the region is marked `exceeds_bounds`.
pub fn choose_crop<R: Rng + ?Sized>(
    bg_width: u32,
    bg_height: u32,
    crop_width: u32,
    crop_height: u32,
    rng: &mut R,
) -> CropRegion {
    let (x, x_over) = crop_offset(bg_width, crop_width, rng);
    let (y, y_over) = crop_offset(bg_height, crop_height, rng);

    CropRegion {
        x,
        y,
        width: crop_width,
        height: crop_height,
        exceeds_bounds: x_over || y_over,
    }
}

/// Crop a random region of `background`
///
/// An overhanging region is clipped at the image edge, so the returned crop can
/// be smaller than requested.
pub fn random_crop<R: Rng + ?Sized>(
    background: &RgbImage,
    crop_width: u32,
    crop_height: u32,
    rng: &mut R,
) -> (RgbImage, CropRegion) {
    let (bg_width, bg_height) = background.dimensions();
    let region = choose_crop(bg_width, bg_height, crop_width, crop_height, rng);

    if region.exceeds_bounds {
        warn!(
            "Background {}x{} is smaller than the {}x{} crop, crop at ({}, {}) is clipped",
            bg_width, bg_height, crop_width, crop_height, region.x, region.y
        );
    }

    let crop = imageops::crop_imm(background, region.x, region.y, region.width, region.height)
        .to_image();
    (crop, region)
}

/// Places a subject over a background
///
/// Implementations must return an image with the subject's dimensions.
pub trait Compositor {
    fn composite(&self, subject: &RgbImage, background: &RgbImage) -> Result<RgbImage>;
}

/// Replaces the subject's backdrop with the background
///
/// The backdrop colour is the mean of the subject's border pixels; every pixel
/// within `tolerance` (Euclidean RGB distance) of it is taken from the
/// background, stretched to the subject's size.
#[derive(Debug, Clone, Copy)]
pub struct BorderKeyCompositor {
    pub tolerance: f32,
}

impl BorderKeyCompositor {
    pub fn new(tolerance: f32) -> Self {
        Self { tolerance }
    }

    fn backdrop_colour(subject: &RgbImage) -> [f32; 3] {
        let (width, height) = subject.dimensions();
        let mut sum = [0.0f64; 3];
        let mut count = 0u64;

        for (x, y, pixel) in subject.enumerate_pixels() {
            if x == 0 || y == 0 || x + 1 == width || y + 1 == height {
                for c in 0..3 {
                    sum[c] += pixel[c] as f64;
                }
                count += 1;
            }
        }

        let count = count.max(1) as f64;
        [
            (sum[0] / count) as f32,
            (sum[1] / count) as f32,
            (sum[2] / count) as f32,
        ]
    }
}

impl Default for BorderKeyCompositor {
    fn default() -> Self {
        Self::new(60.0)
    }
}

impl Compositor for BorderKeyCompositor {
    fn composite(&self, subject: &RgbImage, background: &RgbImage) -> Result<RgbImage> {
        let (width, height) = subject.dimensions();
        if width == 0 || height == 0 {
            return Err(AslError::shape("non-empty subject", "0-sized subject"));
        }
        if background.width() == 0 || background.height() == 0 {
            return Err(AslError::shape("non-empty background", "0-sized background"));
        }

        let backdrop = imageops::resize(background, width, height, FilterType::Triangle);
        let key = Self::backdrop_colour(subject);
        let tolerance_sq = self.tolerance * self.tolerance;

        Ok(ImageBuffer::from_fn(width, height, |x, y| {
            let pixel = subject.get_pixel(x, y);
            let distance_sq: f32 = (0..3)
                .map(|c| {
                    let d = pixel[c] as f32 - key[c];
                    d * d
                })
                .sum();

            if distance_sq <= tolerance_sq {
                *backdrop.get_pixel(x, y)
            } else {
                *pixel
            }
        }))
    }
}

/// What to do when one image fails to augment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the whole run on the first failure
    #[default]
    Abort,
    /// Log the failure and continue with the next image
    Skip,
    /// Try again with a fresh background, then abort
    Retry { attempts: u32 },
}

/// Per-class augmentation outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryReport {
    pub class_name: String,
    pub written: Vec<PathBuf>,
    pub skipped: usize,
}

/// Whole-run augmentation outcome
#[derive(Debug, Clone, Default)]
pub struct AugmentReport {
    pub directories: Vec<DirectoryReport>,
}

impl AugmentReport {
    pub fn total_written(&self) -> usize {
        self.directories.iter().map(|d| d.written.len()).sum()
    }

    pub fn total_skipped(&self) -> usize {
        self.directories.iter().map(|d| d.skipped).sum()
    }
}

/// Background augmenter over a `<input>/<class>/<image>` tree
pub struct BackgroundAugmenter<C, R> {
    config: AugmentConfig,
    compositor: C,
    rng: R,
}

impl<C: Compositor, R: Rng> BackgroundAugmenter<C, R> {
    pub fn new(config: AugmentConfig, compositor: C, rng: R) -> Self {
        Self {
            config,
            compositor,
            rng,
        }
    }

    /// Augment every class directory under the input root
    pub fn run(&mut self) -> Result<AugmentReport> {
        kelvin_to_rgb(self.config.kelvin)?;

        let input_dir = self.config.input_dir.clone();
        if !input_dir.is_dir() {
            return Err(AslError::NotFound(input_dir));
        }

        let backgrounds = self.background_pool()?;

        let mut classes: Vec<String> = Vec::new();
        for entry in fs::read_dir(&input_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                classes.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        classes.sort();

        info!(
            "Augmenting {} class directories from {:?} with {} backgrounds",
            classes.len(),
            input_dir,
            backgrounds.len()
        );

        let pb = progress_bar(classes.len(), "augment");
        let mut report = AugmentReport::default();
        for class_name in classes {
            pb.set_message(class_name.clone());
            let directory = self.augment_directory(&class_name, &backgrounds)?;
            info!(
                "{}: wrote {} images, skipped {}",
                class_name,
                directory.written.len(),
                directory.skipped
            );
            report.directories.push(directory);
            pb.inc(1);
        }
        pb.finish_and_clear();

        Ok(report)
    }

    fn background_pool(&self) -> Result<Vec<PathBuf>> {
        let dir = &self.config.background_dir;
        if !dir.is_dir() {
            return Err(AslError::NotFound(dir.clone()));
        }
        let backgrounds: Vec<PathBuf> = list_files_sorted(dir)?
            .into_iter()
            .filter(|p| is_image_file(p))
            .collect();
        if backgrounds.is_empty() {
            return Err(AslError::EmptyDataset(format!(
                "no background images in {:?}",
                dir
            )));
        }
        Ok(backgrounds)
    }

    fn augment_directory(
        &mut self,
        class_name: &str,
        backgrounds: &[PathBuf],
    ) -> Result<DirectoryReport> {
        let source_dir = self.config.input_dir.join(class_name);
        let target_dir = self.config.output_dir.join(class_name);
        fs::create_dir_all(&target_dir)?;

        let subjects: Vec<PathBuf> = list_files_sorted(&source_dir)?
            .into_iter()
            .filter(|p| is_image_file(p))
            .collect();

        let mut report = DirectoryReport {
            class_name: class_name.to_string(),
            written: Vec::new(),
            skipped: 0,
        };
        let mut number = self.config.start_index;

        for subject in subjects {
            if report.written.len() >= self.config.max_images_per_dir {
                debug!("{}: reached cap of {}", class_name, self.config.max_images_per_dir);
                break;
            }

            let output = target_dir.join(format!("{}{}.jpg", class_name, number));
            match self.augment_with_policy(&subject, backgrounds, &output) {
                Ok(()) => {
                    report.written.push(output);
                    number += 1;
                }
                Err(e) if self.config.failure_policy == FailurePolicy::Skip => {
                    warn!("Skipping {:?}: {}", subject, e);
                    report.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }

    fn augment_with_policy(
        &mut self,
        subject: &Path,
        backgrounds: &[PathBuf],
        output: &Path,
    ) -> Result<()> {
        let attempts = match self.config.failure_policy {
            FailurePolicy::Retry { attempts } => attempts + 1,
            _ => 1,
        };

        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.augment_one(subject, backgrounds, output) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    if attempt < attempts {
                        warn!("Attempt {}/{} for {:?} failed: {}", attempt, attempts, subject, e);
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AslError::Config("zero attempts".to_string())))
    }

    /// Temperature-adjust one subject, composite it over a random crop, write it
    fn augment_one(&mut self, subject: &Path, backgrounds: &[PathBuf], output: &Path) -> Result<()> {
        let subject_image = load_rgb(subject)?;

        let background_path = backgrounds
            .choose(&mut self.rng)
            .ok_or_else(|| AslError::EmptyDataset("background pool".to_string()))?;
        let background = load_rgb(background_path)?;

        let (crop, _) = random_crop(
            &background,
            self.config.crop_width,
            self.config.crop_height,
            &mut self.rng,
        );
        let warmed = adjust_temperature(&subject_image, self.config.kelvin)?;
        let composited = self.compositor.composite(&warmed, &crop)?;

        if composited.dimensions() != subject_image.dimensions() {
            return Err(AslError::shape(
                format!("{:?}", subject_image.dimensions()),
                format!("{:?}", composited.dimensions()),
            ));
        }

        composited
            .save_with_format(output, ImageFormat::Jpeg)
            .map_err(|e| AslError::encode(output, e))?;

        debug!("{:?} + {:?} -> {:?}", subject, background_path, output);
        Ok(())
    }
}
