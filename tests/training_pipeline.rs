use std::fs;
use std::path::Path;

use burn::module::Module;
use image::{Rgb, RgbImage};
use tempfile::tempdir;

use asl_recognition::backend::{default_device, DefaultBackend, TrainingBackend};
use asl_recognition::config::TrainConfig;
use asl_recognition::dataset::records::build_label_index;
use asl_recognition::dataset::{read_label_csv, LabelEncoder, TrainValSplit};
use asl_recognition::model::cnn::{load_classifier, SignClassifier, SignClassifierConfig};
use asl_recognition::training::run_training;

const CLASSES: [&str; 5] = ["A", "B", "C", "D", "E"];

/// 20 images per class, each class a different dominant colour
fn write_dataset(root: &Path) {
    for (c, class) in CLASSES.iter().enumerate() {
        let dir = root.join(class);
        fs::create_dir_all(&dir).unwrap();
        for i in 0..20u32 {
            let base = (c as u32 * 50) as u8;
            RgbImage::from_fn(24, 24, |x, y| {
                Rgb([base, ((x + i) * 8 % 256) as u8, ((y * 8 + i) % 256) as u8])
            })
            .save(dir.join(format!("{}{}.png", class, 5000 + i)))
            .unwrap();
        }
    }
}

fn small_config(root: &Path) -> TrainConfig {
    TrainConfig {
        csv_path: root.join("labels").join("data.csv"),
        encoder_path: root.join("labels").join("label_encoder.json"),
        data_root: root.join("rng_background"),
        weights_path: root.join("models").join("model.mpk"),
        model_config_path: root.join("models").join("model_config.json"),
        accuracy_chart: root.join("diagrams").join("accuracy.png"),
        loss_chart: root.join("diagrams").join("loss.png"),
        history_path: root.join("diagrams").join("history.csv"),
        epochs: 2,
        batch_size: 16,
        image_size: 32,
        base_filters: 4,
        ..TrainConfig::default()
    }
}

#[test]
fn test_hundred_rows_five_classes_end_to_end() {
    let root = tempdir().unwrap();
    let config = small_config(root.path());
    write_dataset(&config.data_root);

    let index = build_label_index(&config.data_root, &config.csv_path, &config.encoder_path).unwrap();
    assert_eq!(index.num_images, 100);
    assert_eq!(index.encoder.num_classes(), 5);

    let device = default_device();
    let report = run_training::<TrainingBackend>(&config, &device).unwrap();

    assert_eq!(report.train_samples, 85);
    assert_eq!(report.val_samples, 15);
    assert_eq!(report.num_classes, 5);
    assert_eq!(report.history.len(), 2);

    for metrics in report.history.epochs() {
        for accuracy in [metrics.train_accuracy, metrics.val_accuracy] {
            assert!((0.0..=100.0).contains(&accuracy), "accuracy {}", accuracy);
        }
        for loss in [metrics.train_loss, metrics.val_loss] {
            assert!(loss.is_finite() && loss >= 0.0, "loss {}", loss);
        }
    }

    assert!(report.weights_path.exists());
    assert!(config.accuracy_chart.exists());
    assert!(config.loss_chart.exists());
    let history = fs::read_to_string(&config.history_path).unwrap();
    assert_eq!(history.lines().count(), 3);

    // weights restore into a freshly built model of the same architecture
    let (model, model_config) =
        load_classifier::<DefaultBackend>(&config.weights_path, &config.model_config_path, &device)
            .unwrap();
    assert_eq!(model_config.num_classes, 5);
    assert_eq!(model_config.input_size, 32);

    let fresh = SignClassifier::<DefaultBackend>::new(
        &SignClassifierConfig::new()
            .with_num_classes(5)
            .with_input_size(32)
            .with_base_filters(4),
        &device,
    );
    assert_eq!(model.num_params(), fresh.num_params());
}

#[test]
fn test_split_is_stable_for_the_same_csv() {
    let root = tempdir().unwrap();
    let config = small_config(root.path());
    write_dataset(&config.data_root);
    build_label_index(&config.data_root, &config.csv_path, &config.encoder_path).unwrap();

    let encoder = LabelEncoder::load(&config.encoder_path).unwrap();
    let first = read_label_csv(&config.csv_path, &encoder, &config.data_root).unwrap();
    let second = read_label_csv(&config.csv_path, &encoder, &config.data_root).unwrap();
    assert_eq!(first, second);

    let a = TrainValSplit::new(first.len(), config.validation_fraction, config.split_seed).unwrap();
    let b = TrainValSplit::new(second.len(), config.validation_fraction, config.split_seed).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.apply(&first), b.apply(&second));
}

#[test]
fn test_missing_image_aborts_training() {
    let root = tempdir().unwrap();
    let config = TrainConfig {
        epochs: 1,
        ..small_config(root.path())
    };
    write_dataset(&config.data_root);
    build_label_index(&config.data_root, &config.csv_path, &config.encoder_path).unwrap();
    fs::remove_file(config.data_root.join("C").join("C5003.png")).unwrap();

    let result = run_training::<TrainingBackend>(&config, &default_device());
    assert!(result.is_err());
}
