//! The desktop window: live video with both overlays, the parameter panel
//! and the generated image gallery.

use eframe::egui;
use std::path::PathBuf;

use crate::camera::{CameraStream, OpenCvCamera};
use crate::config::AppConfig;
use crate::detector::MediaPipeDetector;
use crate::generation::GenerationWorker;
use crate::overlay::{Layer, OverlayStyle};
use crate::params::{GUIDANCE_SCALE, IMAGE_RESOLUTION, NUM_IMAGES, NUM_STEPS, SEED};
use crate::session::{Phase, Session};
use crate::state::GenerateStatus;

const GALLERY_THUMB_WIDTH: f32 = 240.0;

/// A texture that follows a layer, re-uploaded only when the layer changes
struct LayerTexture {
    name: &'static str,
    handle: Option<egui::TextureHandle>,
    revision: Option<u64>,
}

impl LayerTexture {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            handle: None,
            revision: None,
        }
    }

    fn sync(&mut self, ctx: &egui::Context, layer: &Layer) -> Option<egui::TextureId> {
        if layer.width() == 0 || layer.height() == 0 {
            return None;
        }
        if self.revision != Some(layer.revision()) {
            let image = egui::ColorImage::from_rgba_unmultiplied(
                [layer.width() as usize, layer.height() as usize],
                layer.image().as_raw(),
            );
            match self.handle.as_mut() {
                Some(texture) => texture.set(image, egui::TextureOptions::LINEAR),
                None => {
                    self.handle = Some(ctx.load_texture(self.name, image, egui::TextureOptions::LINEAR));
                }
            }
            self.revision = Some(layer.revision());
        }
        self.handle.as_ref().map(|texture| texture.id())
    }
}

pub struct ScribbleApp {
    session: Session<OpenCvCamera, MediaPipeDetector>,
    worker: GenerationWorker,
    save_dir: PathBuf,
    video: Option<egui::TextureHandle>,
    video_sequence: Option<u64>,
    markers: LayerTexture,
    path: LayerTexture,
    /// Start-up failure, shown in place of the video
    fatal: Option<String>,
}

impl ScribbleApp {
    pub fn new(config: &AppConfig, worker: GenerationWorker) -> Self {
        let mut session = Session::new(OverlayStyle::from(&config.overlay));
        let fatal = session
            .start(
                || OpenCvCamera::open(&config.camera),
                || MediaPipeDetector::spawn(&config.detector),
            )
            .err()
            .map(|e| e.to_string());

        Self {
            session,
            worker,
            save_dir: config.save_dir.clone(),
            video: None,
            video_sequence: None,
            markers: LayerTexture::new("marker_layer"),
            path: LayerTexture::new("path_layer"),
            fatal,
        }
    }

    fn apply_finished_generations(&mut self) {
        while let Some(done) = self.worker.poll() {
            self.session.finish_generation(done.id, done.result);
        }
    }

    fn controls(&mut self, ui: &mut egui::Ui) {
        let params = &mut self.session.state.params;

        ui.heading("Prompt");
        ui.add(egui::TextEdit::singleline(&mut params.prompt).hint_text("Prompt"));
        ui.add(egui::TextEdit::singleline(&mut params.additional_prompt).hint_text("Additional prompt"));
        ui.add(egui::TextEdit::singleline(&mut params.negative_prompt).hint_text("Negative prompt"));

        ui.separator();
        ui.heading("Options");
        ui.add(
            egui::Slider::new(&mut params.num_images, NUM_IMAGES.min..=NUM_IMAGES.max)
                .step_by(NUM_IMAGES.step as f64)
                .text("Images"),
        );
        ui.add(
            egui::Slider::new(&mut params.image_resolution, IMAGE_RESOLUTION.min..=IMAGE_RESOLUTION.max)
                .step_by(IMAGE_RESOLUTION.step as f64)
                .text("Image resolution"),
        );
        ui.add(
            egui::Slider::new(&mut params.num_steps, NUM_STEPS.min..=NUM_STEPS.max)
                .step_by(NUM_STEPS.step as f64)
                .text("Steps"),
        );
        ui.add(
            egui::Slider::new(&mut params.guidance_scale, GUIDANCE_SCALE.min..=GUIDANCE_SCALE.max)
                .step_by(GUIDANCE_SCALE.step as f64)
                .text("Guidance scale"),
        );
        ui.add_enabled(
            !params.random_seed,
            egui::Slider::new(&mut params.seed, SEED.min..=SEED.max)
                .step_by(SEED.step as f64)
                .text("Seed"),
        );
        ui.checkbox(&mut params.random_seed, "Randomize seed");
        params.clamp_to_ranges();

        ui.separator();
        ui.horizontal(|ui| {
            if ui.button("Clear").clicked() {
                self.session.clear();
            }
            if ui.button("Save").clicked() {
                self.save();
            }
            let idle = self.session.state.generate_status() == GenerateStatus::Idle;
            let label = self.session.state.generate_label();
            if ui.add_enabled(idle, egui::Button::new(label)).clicked() {
                self.generate();
            }
            if ui.button("Reset").clicked() {
                self.session.reset();
            }
        });

        ui.separator();
        ui.heading("Results");
        if self.session.state.gallery.is_empty() {
            ui.label("No images yet");
        }
        for url in &self.session.state.gallery {
            ui.add(egui::Image::new(url.as_str()).max_width(GALLERY_THUMB_WIDTH));
            ui.hyperlink(url);
        }
    }

    fn save(&mut self) {
        let notice = match self.session.save_scribble(&self.save_dir) {
            Ok(path) => format!("Saved {}", path.display()),
            Err(e) => {
                log::warn!("Save failed: {}", e);
                format!("Save failed: {}", e)
            }
        };
        self.session.state.notice = Some(notice);
    }

    fn generate(&mut self) {
        match self.session.prepare_generation() {
            Ok(Some((id, request))) => self.worker.submit(id, request),
            Ok(None) => {}
            Err(e) => {
                log::warn!("Cannot generate: {}", e);
                self.session.state.notice = Some(e.to_string());
            }
        }
    }

    fn status_line(&self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let phase = self.session.phase();
            ui.label(format!("{:?}", phase));
            if phase == Phase::Running {
                let (width, height) = self.session.state.frame_size;
                ui.label(format!("{}x{}", width, height));
                if let Some(score) = self.session.state.right_hand_score {
                    ui.colored_label(egui::Color32::GREEN, format!("Right hand ({:.0}%)", score * 100.0));
                } else if self.session.state.hand_present {
                    ui.colored_label(egui::Color32::YELLOW, "Hand detected");
                } else {
                    ui.colored_label(egui::Color32::GRAY, "No hand");
                }
                ui.label(format!("{} points", self.session.state.tracker.len()));
            }
            if let Some(notice) = &self.session.state.notice {
                ui.separator();
                ui.label(notice);
            }
        });
    }

    fn upload_video(&mut self, ctx: &egui::Context) -> Option<egui::TextureId> {
        let frame = self.session.camera()?.latest_frame()?;
        if !frame.is_ready() {
            return None;
        }
        if self.video_sequence != Some(frame.sequence) {
            let image = egui::ColorImage::from_rgb([frame.width as usize, frame.height as usize], &frame.rgb);
            match self.video.as_mut() {
                Some(texture) => texture.set(image, egui::TextureOptions::LINEAR),
                None => {
                    self.video = Some(ctx.load_texture("camera_frame", image, egui::TextureOptions::LINEAR));
                }
            }
            self.video_sequence = Some(frame.sequence);
        }
        self.video.as_ref().map(|texture| texture.id())
    }

    fn video_view(&mut self, ctx: &egui::Context, ui: &mut egui::Ui) {
        if let Some(error) = &self.fatal {
            ui.centered_and_justified(|ui| {
                ui.colored_label(egui::Color32::RED, error);
            });
            return;
        }

        let Some(video) = self.upload_video(ctx) else {
            ui.centered_and_justified(|ui| {
                ui.label("Waiting for camera feed...");
            });
            return;
        };
        let overlay = self.session.overlay();
        let markers = self.markers.sync(ctx, overlay.markers());
        let path = self.path.sync(ctx, overlay.path());

        // Every layer shares the capture size, so one rect fits them all
        let (width, height) = self.session.state.frame_size;
        let available_size = ui.available_size();
        let aspect = width as f32 / height as f32;
        let display_size = if available_size.x / available_size.y > aspect {
            egui::vec2(available_size.y * aspect, available_size.y)
        } else {
            egui::vec2(available_size.x, available_size.x / aspect)
        };
        let offset_x = (available_size.x - display_size.x) / 2.0;
        let offset_y = (available_size.y - display_size.y) / 2.0;

        let (rect, _response) = ui.allocate_exact_size(available_size, egui::Sense::hover());
        let image_rect = egui::Rect::from_min_size(
            egui::pos2(rect.min.x + offset_x, rect.min.y + offset_y),
            display_size,
        );
        let uv = egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0));

        for texture in [Some(video), markers, path].into_iter().flatten() {
            ui.painter().image(texture, image_rect, uv, egui::Color32::WHITE);
        }
    }
}

impl eframe::App for ScribbleApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.apply_finished_generations();

        if self.session.phase() == Phase::Running {
            self.session.tick();
        }
        // Keep refreshing while running or while a request is outstanding
        if self.session.phase() == Phase::Running
            || self.session.state.generate_status() != GenerateStatus::Idle
        {
            ctx.request_repaint();
        }

        egui::SidePanel::right("controls")
            .resizable(true)
            .default_width(300.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    self.controls(ui);
                });
            });

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            self.status_line(ui);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.video_view(ctx, ui);
        });
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.session.teardown();
    }
}
