//! Preview window for the live loop
//!
//! eframe drives the event loop here, so each repaint pulls one frame through
//! [`LiveSession::step`] instead of going through [`run_live`](super::live::run_live).

use burn::prelude::Backend;
use eframe::egui::{self, Align2, Color32, ColorImage, FontId, Rect, Sense, TextureHandle, TextureOptions};
use tracing::{error, info, warn};

use super::live::{FrameSource, LiveFrame, LiveSession};
use crate::utils::error::{AslError, Result};

const WINDOW_TITLE: &str = "ASL Recognition";

struct PreviewApp<B: Backend, S> {
    session: LiveSession<B, S>,
    quit_key: egui::Key,
    texture: Option<TextureHandle>,
    caption: String,
    finished: bool,
}

impl<B: Backend, S: FrameSource> PreviewApp<B, S> {
    fn show(&mut self, ctx: &egui::Context, frame: LiveFrame) {
        let (width, height) = frame.display.dimensions();
        let image = ColorImage::from_rgb([width as usize, height as usize], frame.display.as_raw());

        match self.texture.as_mut() {
            Some(texture) => texture.set(image, TextureOptions::LINEAR),
            None => {
                self.texture = Some(ctx.load_texture("live-frame", image, TextureOptions::LINEAR))
            }
        }
        self.caption = frame.prediction.caption();
    }
}

impl<B: Backend, S: FrameSource> eframe::App for PreviewApp<B, S> {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if ctx.input(|i| i.key_pressed(self.quit_key)) {
            info!("Quit key pressed after {} frames", self.session.frames());
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            return;
        }

        if !self.finished {
            match self.session.step() {
                Ok(Some(frame)) => self.show(ctx, frame),
                Ok(None) => {
                    info!("Frame source returned no frame, stopping");
                    self.finished = true;
                    ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                }
                Err(e) => {
                    error!("Live frame failed: {}", e);
                    self.finished = true;
                    ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                }
            }
        }

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(Color32::BLACK))
            .show(ctx, |ui| {
                let Some(texture) = &self.texture else {
                    ui.label("Waiting for camera...");
                    return;
                };

                let (response, painter) = ui.allocate_painter(texture.size_vec2(), Sense::hover());
                let rect = response.rect;
                painter.image(
                    texture.id(),
                    rect,
                    Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                    Color32::WHITE,
                );
                painter.text(
                    rect.min + egui::vec2(10.0, 30.0),
                    Align2::LEFT_BOTTOM,
                    &self.caption,
                    FontId::proportional(24.0),
                    Color32::from_rgb(255, 0, 0),
                );
            });

        ctx.request_repaint();
    }
}

fn key_for(quit_key: char) -> egui::Key {
    egui::Key::from_name(&quit_key.to_ascii_uppercase().to_string()).unwrap_or_else(|| {
        warn!("Unsupported quit key {:?}, using 'q'", quit_key);
        egui::Key::Q
    })
}

/// Show the live feed in a window until the quit key is pressed or frames run out
pub fn run_preview<B, S>(session: LiveSession<B, S>, quit_key: char) -> Result<()>
where
    B: Backend,
    S: FrameSource + 'static,
{
    if !session.source().is_opened() {
        warn!("Frame source is not open");
    }

    let app = PreviewApp {
        session,
        quit_key: key_for(quit_key),
        texture: None,
        caption: String::new(),
        finished: false,
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([800.0, 600.0])
            .with_title(WINDOW_TITLE),
        ..Default::default()
    };

    eframe::run_native(WINDOW_TITLE, options, Box::new(|_cc| Box::new(app)))
        .map_err(|e| AslError::Display(e.to_string()))
}
