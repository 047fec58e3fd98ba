mod app;
mod args;
mod camera;
mod capture;
mod config;
mod detector;
mod generation;
mod overlay;
mod params;
mod session;
mod state;
mod tracker;
mod transform;

use anyhow::Result;
use clap::Parser;
use eframe::egui;

use crate::app::ScribbleApp;
use crate::args::Args;
use crate::config::AppConfig;
use crate::generation::{GenerationWorker, HttpGenerator};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = AppConfig::load(&args.config)?;
    args.apply(&mut config);

    log::info!("Starting Air Scribble");
    log::info!("Camera device: {}", config.camera.device);
    log::info!("Generation endpoint: {}", config.generation.endpoint);

    let worker = GenerationWorker::spawn(HttpGenerator::new(&config.generation)?);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 720.0])
            .with_title("Air Scribble"),
        ..Default::default()
    };

    eframe::run_native(
        "Air Scribble",
        options,
        Box::new(move |cc| {
            egui_extras::install_image_loaders(&cc.egui_ctx);
            Ok(Box::new(ScribbleApp::new(&config, worker)))
        }),
    )
    .map_err(|e| anyhow::anyhow!("Failed to run application: {}", e))?;

    Ok(())
}
