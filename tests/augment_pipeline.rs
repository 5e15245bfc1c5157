use std::fs;
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tempfile::tempdir;

use asl_recognition::config::AugmentConfig;
use asl_recognition::dataset::{BackgroundAugmenter, BorderKeyCompositor, FailurePolicy};

fn hand_image(width: u32, height: u32, shade: u8) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        if x > width / 4 && x < 3 * width / 4 && y > height / 4 && y < 3 * height / 4 {
            Rgb([200, 150, shade])
        } else {
            Rgb([0, 180, 0])
        }
    })
}

fn setup(root: &Path, images_per_class: &[(&str, usize)]) -> AugmentConfig {
    let prep = root.join("prep");
    for (class, count) in images_per_class {
        let dir = prep.join(class);
        fs::create_dir_all(&dir).unwrap();
        for i in 0..*count {
            hand_image(64 + i as u32 * 8, 48, (i * 40) as u8)
                .save(dir.join(format!("raw_{i}.png")))
                .unwrap();
        }
    }

    let backgrounds = root.join("all_bgs");
    fs::create_dir_all(&backgrounds).unwrap();
    RgbImage::from_fn(520, 480, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]))
        .save(backgrounds.join("room.png"))
        .unwrap();
    // smaller than the 400x400 crop
    RgbImage::from_pixel(300, 260, Rgb([30, 30, 200]))
        .save(backgrounds.join("wall.png"))
        .unwrap();

    AugmentConfig {
        input_dir: prep,
        background_dir: backgrounds,
        output_dir: root.join("rng_background"),
        seed: Some(7),
        ..AugmentConfig::default()
    }
}

fn run(config: &AugmentConfig, seed: u64) -> asl_recognition::dataset::AugmentReport {
    let mut augmenter = BackgroundAugmenter::new(
        config.clone(),
        BorderKeyCompositor::new(config.key_tolerance),
        ChaCha8Rng::seed_from_u64(seed),
    );
    augmenter.run().unwrap()
}

fn sorted_outputs(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    files.sort();
    files
}

#[test]
fn test_three_images_numbered_from_5000() {
    let root = tempdir().unwrap();
    let config = setup(root.path(), &[("A", 3)]);

    let report = run(&config, 1);
    assert_eq!(report.total_written(), 3);
    assert_eq!(report.total_skipped(), 0);

    let names: Vec<String> = sorted_outputs(&config.output_dir.join("A"))
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec!["A5000.jpg", "A5001.jpg", "A5002.jpg"]);
}

#[test]
fn test_outputs_keep_subject_dimensions() {
    let root = tempdir().unwrap();
    let config = setup(root.path(), &[("A", 3)]);
    run(&config, 2);

    let expected = [(64, 48), (72, 48), (80, 48)];
    for (path, dims) in sorted_outputs(&config.output_dir.join("A")).iter().zip(expected) {
        let image = image::open(path).unwrap();
        assert_eq!((image.width(), image.height()), dims, "{:?}", path);
    }
}

#[test]
fn test_repeated_runs_agree_on_count_and_size() {
    let root = tempdir().unwrap();
    let config = setup(root.path(), &[("A", 3), ("B", 2)]);
    let second = AugmentConfig {
        output_dir: root.path().join("second"),
        ..config.clone()
    };

    run(&config, 10);
    run(&second, 99);

    for class in ["A", "B"] {
        let first_files = sorted_outputs(&config.output_dir.join(class));
        let second_files = sorted_outputs(&second.output_dir.join(class));
        assert_eq!(first_files.len(), second_files.len());

        for (a, b) in first_files.iter().zip(&second_files) {
            assert_eq!(a.file_name(), b.file_name());
            let a = image::open(a).unwrap();
            let b = image::open(b).unwrap();
            assert_eq!((a.width(), a.height()), (b.width(), b.height()));
        }
    }
}

#[test]
fn test_cap_limits_each_directory() {
    let root = tempdir().unwrap();
    let config = AugmentConfig {
        max_images_per_dir: 2,
        ..setup(root.path(), &[("A", 3), ("B", 1)])
    };

    let report = run(&config, 3);
    assert_eq!(sorted_outputs(&config.output_dir.join("A")).len(), 2);
    assert_eq!(sorted_outputs(&config.output_dir.join("B")).len(), 1);
    assert!(report.directories.iter().all(|d| d.written.len() <= 2));
}

#[test]
fn test_unreadable_subject_aborts_or_skips() {
    let root = tempdir().unwrap();
    let config = setup(root.path(), &[("A", 2)]);
    fs::write(config.input_dir.join("A").join("broken.jpg"), b"not a jpeg").unwrap();

    let mut aborting = BackgroundAugmenter::new(
        config.clone(),
        BorderKeyCompositor::default(),
        ChaCha8Rng::seed_from_u64(4),
    );
    assert!(aborting.run().is_err());

    let skipping_config = AugmentConfig {
        output_dir: root.path().join("skipped"),
        failure_policy: FailurePolicy::Skip,
        ..config
    };
    let report = run(&skipping_config, 4);
    assert_eq!(report.total_written(), 2);
    assert_eq!(report.total_skipped(), 1);
}

#[test]
fn test_unsupported_temperature_is_rejected() {
    let root = tempdir().unwrap();
    let config = AugmentConfig {
        kelvin: 7300,
        ..setup(root.path(), &[("A", 1)])
    };

    let mut augmenter = BackgroundAugmenter::new(
        config,
        BorderKeyCompositor::default(),
        ChaCha8Rng::seed_from_u64(0),
    );
    assert!(augmenter.run().is_err());
}
