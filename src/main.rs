//! ASL Recognition CLI
//!
//! Entry point for the three pipeline stages: background augmentation,
//! training and live inference, plus the label step between the first two.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use asl_recognition::backend::{backend_name, default_device, DefaultBackend, TrainingBackend};
use asl_recognition::config::AppConfig;
use asl_recognition::dataset::records::build_label_index;
use asl_recognition::dataset::{BackgroundAugmenter, BorderKeyCompositor};
use asl_recognition::inference::{
    run_live, FrameSource, ImageDirSource, LiveSession, LogSink, QuitSignal, SignPredictor,
};
use asl_recognition::training::run_training;
use asl_recognition::utils::logging::{init_logging, LogConfig};
use asl_recognition::utils::{format_duration, format_number};

/// American Sign Language hand-sign recognition
///
/// Augments captured hand images with random backgrounds, trains a CNN on
/// them and classifies a fixed region of a live camera feed.
#[derive(Parser, Debug)]
#[command(name = "asl_recognition")]
#[command(version)]
#[command(about = "ASL hand-sign recognition with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// TOML configuration file; built-in defaults are used without one
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Composite foreground hand images over random backgrounds
    Augment {
        /// Seed for background and crop choice (random when omitted)
        #[arg(long)]
        seed: Option<u64>,

        /// Colour temperature in Kelvin (multiple of 500 in 1000..=10000)
        #[arg(long)]
        kelvin: Option<u32>,

        /// Maximum images written per class directory
        #[arg(long)]
        max_per_dir: Option<usize>,
    },

    /// Scan the augmented dataset and write the label CSV and encoder
    Label {
        /// Dataset root with one subdirectory per class
        #[arg(short, long)]
        dataset_dir: Option<PathBuf>,
    },

    /// Train the classifier on the labeled dataset
    Train {
        /// Number of training epochs
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Batch size for training
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Learning rate
        #[arg(short, long)]
        learning_rate: Option<f64>,

        /// Random seed for weights and shuffling
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Classify the hand region of a live camera feed
    Live {
        /// Camera device index
        #[arg(long)]
        camera: Option<u32>,

        /// Replay images from this directory instead of the camera
        #[arg(long)]
        frames_dir: Option<PathBuf>,

        /// Stop after this many frames
        #[arg(long)]
        max_frames: Option<usize>,

        /// Log predictions instead of opening a window; type the quit key and Enter to stop
        #[arg(long, default_value = "false")]
        headless: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config);

    let config = match &cli.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => AppConfig::default(),
    };

    if !matches!(cli.command, Commands::Config) {
        print_banner();
    }

    match cli.command {
        Commands::Augment {
            seed,
            kelvin,
            max_per_dir,
        } => {
            let mut config = config;
            if seed.is_some() {
                config.augment.seed = seed;
            }
            if let Some(kelvin) = kelvin {
                config.augment.kelvin = kelvin;
            }
            if let Some(max) = max_per_dir {
                config.augment.max_images_per_dir = max;
            }
            cmd_augment(&config)?;
        }

        Commands::Label { dataset_dir } => {
            let mut config = config;
            if let Some(dir) = dataset_dir {
                config.labels.dataset_dir = dir;
            }
            cmd_label(&config)?;
        }

        Commands::Train {
            epochs,
            batch_size,
            learning_rate,
            seed,
        } => {
            let mut config = config;
            if let Some(epochs) = epochs {
                config.train.epochs = epochs;
            }
            if let Some(batch_size) = batch_size {
                config.train.batch_size = batch_size;
            }
            if let Some(lr) = learning_rate {
                config.train.learning_rate = lr;
            }
            if let Some(seed) = seed {
                config.train.seed = seed;
            }
            cmd_train(&config)?;
        }

        Commands::Live {
            camera,
            frames_dir,
            max_frames,
            headless,
        } => {
            let mut config = config;
            if let Some(camera) = camera {
                config.live.camera_index = camera;
            }
            if frames_dir.is_some() {
                config.live.frames_dir = frames_dir;
            }
            if max_frames.is_some() {
                config.live.max_frames = max_frames;
            }
            cmd_live(&config, headless)?;
        }

        Commands::Config => {
            config.validate()?;
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 +--------------------------------------------------------------+
 |   ASL Recognition                                            |
 |   Hand-sign classification with Burn + Rust                  |
 +--------------------------------------------------------------+
  "#
        .green()
    );
}

fn cmd_augment(config: &AppConfig) -> Result<()> {
    let augment = &config.augment;
    augment.validate()?;

    println!("{}", "Background Augmentation".cyan().bold());
    println!("  Input:        {:?}", augment.input_dir);
    println!("  Backgrounds:  {:?}", augment.background_dir);
    println!("  Output:       {:?}", augment.output_dir);
    println!("  Temperature:  {}K", augment.kelvin);
    println!("  Crop:         {}x{}", augment.crop_width, augment.crop_height);
    println!("  Cap per dir:  {}", augment.max_images_per_dir);
    println!();

    let rng = match augment.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };
    let compositor = BorderKeyCompositor::new(augment.key_tolerance);
    let mut augmenter = BackgroundAugmenter::new(augment.clone(), compositor, rng);
    let report = augmenter.run()?;

    for directory in &report.directories {
        println!(
            "  {:<12} {:>6} written {:>4} skipped",
            directory.class_name,
            directory.written.len(),
            directory.skipped
        );
    }
    println!();
    println!(
        "{} {} images written, {} skipped",
        "Augmentation Complete!".green().bold(),
        format_number(report.total_written()),
        report.total_skipped()
    );
    Ok(())
}

fn cmd_label(config: &AppConfig) -> Result<()> {
    let labels = &config.labels;
    info!("Labeling dataset at {:?}", labels.dataset_dir);

    let index = build_label_index(&labels.dataset_dir, &labels.csv_path, &labels.encoder_path)?;

    println!("{}", "Label Index:".cyan().bold());
    println!("  Images:   {}", format_number(index.num_images));
    println!("  Classes:  {}", index.encoder.num_classes());
    println!("  CSV:      {:?}", labels.csv_path);
    println!("  Encoder:  {:?}", labels.encoder_path);
    Ok(())
}

fn cmd_train(config: &AppConfig) -> Result<()> {
    let train = &config.train;

    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Backend:        {}", backend_name());
    println!("  Epochs:         {}", train.epochs);
    println!("  Batch size:     {}", train.batch_size);
    println!("  Learning rate:  {}", train.learning_rate);
    println!("  Seed:           {} (split {})", train.seed, train.split_seed);
    println!();

    let device = default_device();
    let report = run_training::<TrainingBackend>(train, &device)?;

    println!();
    println!("{}", "Training Complete!".green().bold());
    println!(
        "  Samples:     {} train / {} validation",
        report.train_samples, report.val_samples
    );
    println!("  Parameters:  {}", format_number(report.num_params));
    if let Some(last) = report.final_metrics() {
        println!(
            "  Final:       train {:.2}% / validation {:.2}%",
            last.train_accuracy, last.val_accuracy
        );
    }
    println!("  Duration:    {}", format_duration(report.elapsed_secs));
    println!("  Weights:     {:?}", report.weights_path);
    println!(
        "  Charts:      {:?}, {:?}",
        train.accuracy_chart, train.loss_chart
    );
    Ok(())
}

fn cmd_live(config: &AppConfig, headless: bool) -> Result<()> {
    let live = &config.live;
    let device = default_device();
    let predictor = SignPredictor::<DefaultBackend>::load(
        &live.weights_path,
        &live.model_config_path,
        &live.encoder_path,
        &device,
    )?;
    info!(
        "Loaded classifier for {} classes",
        predictor.encoder().num_classes()
    );

    if let Some(dir) = &live.frames_dir {
        let source = ImageDirSource::open(dir)?;
        return present(LiveSession::new(predictor, source, live.region), config, headless);
    }

    #[cfg(feature = "webcam")]
    {
        let source = asl_recognition::inference::WebcamSource::open(live.camera_index);
        present(LiveSession::new(predictor, source, live.region), config, headless)
    }

    #[cfg(not(feature = "webcam"))]
    {
        let _ = predictor;
        anyhow::bail!("built without the `webcam` feature; pass --frames-dir to replay images")
    }
}

fn present<S>(
    mut session: LiveSession<DefaultBackend, S>,
    config: &AppConfig,
    headless: bool,
) -> Result<()>
where
    S: FrameSource + 'static,
{
    #[cfg(feature = "preview")]
    if !headless {
        asl_recognition::inference::run_preview(session, config.live.quit_key)?;
        return Ok(());
    }

    #[cfg(not(feature = "preview"))]
    if !headless {
        info!("Built without the `preview` feature, logging predictions instead");
    }

    let quit = QuitSignal::new();
    quit.watch_stdin(config.live.quit_key);
    info!("Type '{}' and press Enter to stop", config.live.quit_key);

    let mut sink = LogSink::new(config.live.max_frames).with_quit_signal(quit);
    let summary = run_live(&mut session, &mut sink)?;
    println!(
        "{} {} frames classified",
        "Live Session Ended.".green().bold(),
        summary.frames
    );
    Ok(())
}
