//! Webcam capture using nokhwa

use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use tracing::{debug, info, warn};

use super::live::FrameSource;
use crate::utils::error::{AslError, Result};

/// Camera frame source
///
/// A camera that fails to open still yields a source; it reports itself as not
/// opened and never delivers a frame.
pub struct WebcamSource {
    camera: Option<Camera>,
    index: u32,
    frame_count: u64,
}

impl WebcamSource {
    /// Open camera `index` at its default format
    pub fn open(index: u32) -> Self {
        match Self::open_camera(index) {
            Ok(camera) => Self {
                camera: Some(camera),
                index,
                frame_count: 0,
            },
            Err(e) => {
                warn!("Could not open camera {}: {}", index, e);
                Self {
                    camera: None,
                    index,
                    frame_count: 0,
                }
            }
        }
    }

    fn open_camera(index: u32) -> Result<Camera> {
        info!("Opening camera {}", index);
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
        let mut camera = Camera::new(CameraIndex::Index(index), requested)
            .map_err(|e| AslError::Camera(e.to_string()))?;
        camera
            .open_stream()
            .map_err(|e| AslError::Camera(e.to_string()))?;

        let resolution = camera.resolution();
        info!(
            "Camera {} opened: {}x{} @ {} fps",
            index,
            resolution.width(),
            resolution.height(),
            camera.frame_rate()
        );
        Ok(camera)
    }
}

impl FrameSource for WebcamSource {
    fn is_opened(&self) -> bool {
        self.camera.is_some()
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        let Some(camera) = self.camera.as_mut() else {
            return Ok(None);
        };

        let frame = match camera.frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Camera {} read failed: {}", self.index, e);
                return Ok(None);
            }
        };
        let decoded = frame
            .decode_image::<RgbFormat>()
            .map_err(|e| AslError::Camera(e.to_string()))?;

        let (width, height) = (decoded.width(), decoded.height());
        let image = RgbImage::from_raw(width, height, decoded.into_raw())
            .ok_or_else(|| AslError::Camera("frame buffer size mismatch".to_string()))?;

        self.frame_count += 1;
        debug!("Captured frame {} ({}x{})", self.frame_count, width, height);
        Ok(Some(image))
    }
}

impl Drop for WebcamSource {
    fn drop(&mut self) {
        if let Some(camera) = self.camera.as_mut() {
            if let Err(e) = camera.stop_stream() {
                warn!("Failed to stop camera {}: {}", self.index, e);
            }
            info!("Camera {} stopped after {} frames", self.index, self.frame_count);
        }
    }
}
