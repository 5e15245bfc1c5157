//! Live inference loop
//!
//! Frames come from a [`FrameSource`] (webcam, replayed directory), the fixed
//! hand region of each frame is classified and the annotated frame goes to a
//! [`FrameSink`] (preview window, log). The loop ends when the source runs dry
//! or the sink asks to quit. Without a window, the quit key is read from
//! stdin by a [`QuitSignal`] watcher.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use burn::prelude::Backend;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::predictor::{PredictionResult, SignPredictor};
use crate::dataset::{is_image_file, list_files_sorted, load_rgb};
use crate::utils::error::{AslError, Result};

/// Outline colour of the hand region
pub const REGION_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Square region of a frame that holds the hand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandRegion {
    pub x: u32,
    pub y: u32,
    pub size: u32,
}

impl Default for HandRegion {
    /// Rows and columns 100..324 of the frame
    fn default() -> Self {
        Self {
            x: 100,
            y: 100,
            size: 224,
        }
    }
}

impl HandRegion {
    /// Crop the region out of `frame` and resize it to the model input size
    ///
    /// A frame that only partly covers the region is cropped at its edge; a
    /// frame that misses it entirely is an error.
    pub fn extract(&self, frame: &RgbImage) -> Result<RgbImage> {
        let (width, height) = frame.dimensions();
        if self.x >= width || self.y >= height || self.size == 0 {
            return Err(AslError::shape(
                format!(
                    "frame covering ({}, {}) + {}",
                    self.x, self.y, self.size
                ),
                format!("{}x{} frame", width, height),
            ));
        }

        let crop = imageops::crop_imm(frame, self.x, self.y, self.size, self.size).to_image();
        let target = crate::IMAGE_SIZE as u32;
        if crop.dimensions() == (target, target) {
            return Ok(crop);
        }
        Ok(imageops::resize(&crop, target, target, FilterType::Triangle))
    }

    /// Draw the region outline onto `frame`, clipped to the frame
    pub fn outline(&self, frame: &mut RgbImage, color: Rgb<u8>) {
        let (width, height) = frame.dimensions();
        if self.size == 0 || self.x >= width || self.y >= height {
            return;
        }
        let right = (self.x + self.size - 1).min(width - 1);
        let bottom = (self.y + self.size - 1).min(height - 1);

        for x in self.x..=right {
            frame.put_pixel(x, self.y, color);
            frame.put_pixel(x, bottom, color);
        }
        for y in self.y..=bottom {
            frame.put_pixel(self.x, y, color);
            frame.put_pixel(right, y, color);
        }
    }
}

/// Anything that yields RGB frames
pub trait FrameSource {
    /// Whether the device or directory was opened successfully
    fn is_opened(&self) -> bool;

    /// Next frame; `None` once no more frames can be read
    fn read_frame(&mut self) -> Result<Option<RgbImage>>;
}

/// Replays the images of a directory in name order
#[derive(Debug, Clone)]
pub struct ImageDirSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next: usize,
    opened: bool,
}

impl ImageDirSource {
    /// Open `dir`; a missing directory gives an unopened source
    pub fn open(dir: &Path) -> Result<Self> {
        let opened = dir.is_dir();
        let files = if opened {
            list_files_sorted(dir)?
                .into_iter()
                .filter(|p| is_image_file(p))
                .collect()
        } else {
            warn!("Could not open frame directory {:?}", dir);
            Vec::new()
        };

        Ok(Self {
            dir: dir.to_path_buf(),
            files,
            next: 0,
            opened,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageDirSource {
    fn is_opened(&self) -> bool {
        self.opened
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        let Some(path) = self.files.get(self.next) else {
            debug!("No more frames in {:?}", self.dir);
            return Ok(None);
        };
        self.next += 1;
        load_rgb(path).map(Some)
    }
}

/// A classified frame, ready to show
#[derive(Debug, Clone)]
pub struct LiveFrame {
    /// Position in the stream, from 0
    pub index: usize,
    /// The full frame with the region outlined
    pub display: RgbImage,
    pub region: HandRegion,
    pub prediction: PredictionResult,
}

/// Returned by a sink after each frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkControl {
    Continue,
    Quit,
}

/// Where classified frames go
pub trait FrameSink {
    fn present(&mut self, frame: &LiveFrame) -> Result<SinkControl>;
}

/// Shared flag raised when the user asks to stop
#[derive(Debug, Clone, Default)]
pub struct QuitSignal(Arc<AtomicBool>);

impl QuitSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Raise the flag once a line of `input` equals `quit_key`
    ///
    /// The reader runs on its own thread and stops at the quit line or at
    /// end of input.
    pub fn watch<R>(&self, input: R, quit_key: char) -> JoinHandle<()>
    where
        R: BufRead + Send + 'static,
    {
        let signal = self.clone();
        let key = quit_key.to_string();
        thread::spawn(move || {
            for line in input.lines() {
                match line {
                    Ok(line) if line.trim() == key => {
                        debug!("Quit key '{}' read from input", key);
                        signal.request();
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Stopped reading quit key: {}", e);
                        return;
                    }
                }
            }
        })
    }

    /// Watch stdin for the quit key followed by Enter
    pub fn watch_stdin(&self, quit_key: char) -> JoinHandle<()> {
        self.watch(std::io::BufReader::new(std::io::stdin()), quit_key)
    }
}

/// Headless sink: logs each prediction
///
/// Stops after `max_frames` or once the attached [`QuitSignal`] is raised.
#[derive(Debug, Clone, Default)]
pub struct LogSink {
    pub max_frames: Option<usize>,
    presented: usize,
    quit: Option<QuitSignal>,
}

impl LogSink {
    pub fn new(max_frames: Option<usize>) -> Self {
        Self {
            max_frames,
            presented: 0,
            quit: None,
        }
    }

    pub fn with_quit_signal(mut self, quit: QuitSignal) -> Self {
        self.quit = Some(quit);
        self
    }

    pub fn presented(&self) -> usize {
        self.presented
    }
}

impl FrameSink for LogSink {
    fn present(&mut self, frame: &LiveFrame) -> Result<SinkControl> {
        self.presented += 1;
        info!(
            "frame {}: {} [{:.1} ms]",
            frame.index,
            frame.prediction.caption(),
            frame.prediction.inference_time_ms
        );

        if self.quit.as_ref().is_some_and(QuitSignal::is_requested) {
            return Ok(SinkControl::Quit);
        }
        match self.max_frames {
            Some(max) if self.presented >= max => Ok(SinkControl::Quit),
            _ => Ok(SinkControl::Continue),
        }
    }
}

/// A predictor bound to a frame source
pub struct LiveSession<B: Backend, S> {
    predictor: SignPredictor<B>,
    source: S,
    region: HandRegion,
    frames: usize,
}

impl<B: Backend, S: FrameSource> LiveSession<B, S> {
    pub fn new(predictor: SignPredictor<B>, source: S, region: HandRegion) -> Self {
        Self {
            predictor,
            source,
            region,
            frames: 0,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn region(&self) -> HandRegion {
        self.region
    }

    /// Frames classified so far
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Read, classify and annotate one frame; `None` when the source is done
    pub fn step(&mut self) -> Result<Option<LiveFrame>> {
        let Some(mut frame) = self.source.read_frame()? else {
            return Ok(None);
        };

        let hand = self.region.extract(&frame)?;
        let prediction = self.predictor.predict(&hand)?;
        self.region.outline(&mut frame, REGION_COLOR);

        let index = self.frames;
        self.frames += 1;
        Ok(Some(LiveFrame {
            index,
            display: frame,
            region: self.region,
            prediction,
        }))
    }
}

/// How a live run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveSummary {
    pub frames: usize,
    /// The sink asked to stop, as opposed to the source running out
    pub quit_requested: bool,
}

/// Classify frames until the source fails to deliver or the sink quits
///
/// An unopened source is only reported; the loop is entered regardless and
/// ends on the first empty read.
pub fn run_live<B, S, K>(session: &mut LiveSession<B, S>, sink: &mut K) -> Result<LiveSummary>
where
    B: Backend,
    S: FrameSource,
    K: FrameSink + ?Sized,
{
    if !session.source().is_opened() {
        warn!("Frame source is not open");
    }

    loop {
        let Some(frame) = session.step()? else {
            info!("Frame source returned no frame, stopping");
            return Ok(LiveSummary {
                frames: session.frames(),
                quit_requested: false,
            });
        };

        if sink.present(&frame)? == SinkControl::Quit {
            info!("Quit requested after {} frames", session.frames());
            return Ok(LiveSummary {
                frames: session.frames(),
                quit_requested: true,
            });
        }
    }
}
