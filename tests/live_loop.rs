use std::fs;
use std::path::Path;

use image::{Rgb, RgbImage};
use tempfile::tempdir;

use asl_recognition::backend::{default_device, DefaultBackend};
use asl_recognition::dataset::LabelEncoder;
use asl_recognition::inference::{
    run_live, FrameSink, HandRegion, ImageDirSource, LiveFrame, LiveSession, LogSink,
    SignPredictor, SinkControl,
};
use asl_recognition::model::cnn::{save_classifier, SignClassifier, SignClassifierConfig};
use asl_recognition::Result;

/// Keeps what it was shown, quits after `quit_after` frames if set
#[derive(Default)]
struct RecordingSink {
    frames: Vec<LiveFrame>,
    quit_after: Option<usize>,
}

impl FrameSink for RecordingSink {
    fn present(&mut self, frame: &LiveFrame) -> Result<SinkControl> {
        self.frames.push(frame.clone());
        match self.quit_after {
            Some(n) if self.frames.len() >= n => Ok(SinkControl::Quit),
            _ => Ok(SinkControl::Continue),
        }
    }
}

fn predictor(root: &Path) -> SignPredictor<DefaultBackend> {
    let device = default_device();
    let config = SignClassifierConfig::new()
        .with_num_classes(3)
        .with_input_size(32)
        .with_base_filters(2);
    let model = SignClassifier::<DefaultBackend>::new(&config, &device);

    let weights = root.join("models").join("model.mpk");
    let config_path = root.join("models").join("model_config.json");
    let encoder_path = root.join("labels").join("label_encoder.json");
    save_classifier(&model, &config, &weights, &config_path).unwrap();
    LabelEncoder::fit(["A", "B", "C"]).unwrap().save(&encoder_path).unwrap();

    SignPredictor::load(&weights, &config_path, &encoder_path, &device).unwrap()
}

fn write_frames(dir: &Path, count: usize) {
    fs::create_dir_all(dir).unwrap();
    for i in 0..count {
        RgbImage::from_pixel(480, 360, Rgb([(i * 60) as u8, 40, 90]))
            .save(dir.join(format!("frame_{i:03}.png")))
            .unwrap();
    }
}

#[test]
fn test_every_frame_is_classified_until_source_ends() {
    let root = tempdir().unwrap();
    let frames = root.path().join("frames");
    write_frames(&frames, 3);

    let source = ImageDirSource::open(&frames).unwrap();
    let mut session = LiveSession::new(predictor(root.path()), source, HandRegion::default());
    let mut sink = RecordingSink::default();

    let summary = run_live(&mut session, &mut sink).unwrap();
    assert_eq!(summary.frames, 3);
    assert!(!summary.quit_requested);
    assert_eq!(sink.frames.len(), 3);

    for (i, frame) in sink.frames.iter().enumerate() {
        assert_eq!(frame.index, i);
        assert_eq!(frame.display.dimensions(), (480, 360));
        assert_eq!(*frame.display.get_pixel(100, 100), Rgb([0, 255, 0]));
        assert!(["A", "B", "C"].contains(&frame.prediction.label.as_str()));
        assert!(frame.prediction.class_index < 3);
    }
}

#[test]
fn test_quit_stops_the_loop() {
    let root = tempdir().unwrap();
    let frames = root.path().join("frames");
    write_frames(&frames, 5);

    let source = ImageDirSource::open(&frames).unwrap();
    let mut session = LiveSession::new(predictor(root.path()), source, HandRegion::default());
    let mut sink = RecordingSink {
        quit_after: Some(2),
        ..RecordingSink::default()
    };

    let summary = run_live(&mut session, &mut sink).unwrap();
    assert!(summary.quit_requested);
    assert_eq!(summary.frames, 2);
}

#[test]
fn test_log_sink_honours_max_frames() {
    let root = tempdir().unwrap();
    let frames = root.path().join("frames");
    write_frames(&frames, 4);

    let source = ImageDirSource::open(&frames).unwrap();
    let mut session = LiveSession::new(predictor(root.path()), source, HandRegion::default());
    let mut sink = LogSink::new(Some(3));

    let summary = run_live(&mut session, &mut sink).unwrap();
    assert_eq!(summary.frames, 3);
    assert_eq!(sink.presented(), 3);
}

#[test]
fn test_unopened_source_still_enters_the_loop() {
    let root = tempdir().unwrap();
    let source = ImageDirSource::open(&root.path().join("no_camera")).unwrap();

    let mut session = LiveSession::new(predictor(root.path()), source, HandRegion::default());
    let mut sink = RecordingSink::default();

    let summary = run_live(&mut session, &mut sink).unwrap();
    assert_eq!(summary.frames, 0);
    assert!(!summary.quit_requested);
    assert!(sink.frames.is_empty());
}

#[test]
fn test_frame_smaller_than_region_is_an_error() {
    let root = tempdir().unwrap();
    let frames = root.path().join("frames");
    fs::create_dir_all(&frames).unwrap();
    RgbImage::new(64, 64).save(frames.join("tiny.png")).unwrap();

    let source = ImageDirSource::open(&frames).unwrap();
    let mut session = LiveSession::new(predictor(root.path()), source, HandRegion::default());
    assert!(run_live(&mut session, &mut RecordingSink::default()).is_err());
}
