use anyhow::{Context, Result};
use embedded_graphics::pixelcolor::Rgb888;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub camera: CameraConfig,
    pub detector: DetectorConfig,
    pub generation: GenerationConfig,
    pub overlay: OverlayConfig,
    pub save_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Device path (e.g. "/dev/video4") or numeric index
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub python: PathBuf,
    pub script: PathBuf,
    pub model: PathBuf,
    pub num_hands: u32,
    pub min_confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub marker_radius: u32,
    pub marker_color: String, // e.g. "#FFFFFF"
    pub stroke_color: String,
    pub stroke_width: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "0".to_string(),
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            python: PathBuf::from(".venv/bin/python"),
            script: PathBuf::from("hand_detect.py"),
            model: PathBuf::from("models/hand_landmarker.task"),
            num_hands: 2,
            min_confidence: 0.5,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8000/generate".to_string(),
            timeout_secs: 120,
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            marker_radius: 5,
            marker_color: "#FFFFFF".to_string(),
            stroke_color: "#0000FF".to_string(),
            stroke_width: 1,
        }
    }
}

impl OverlayConfig {
    pub fn marker_rgb(&self) -> Rgb888 {
        parse_hex(&self.marker_color).unwrap_or(Rgb888::new(255, 255, 255))
    }

    pub fn stroke_rgb(&self) -> Rgb888 {
        parse_hex(&self.stroke_color).unwrap_or(Rgb888::new(0, 0, 255))
    }
}

impl AppConfig {
    pub const DEFAULT_PATH: &'static str = "config.json";

    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            // Missing fields fall back to Default thanks to #[serde(default)]
            match serde_json::from_str::<AppConfig>(&content) {
                Ok(c) => {
                    log::info!("Loaded configuration from {}", path.display());
                    c
                }
                Err(e) => {
                    log::warn!("Error parsing config: {}. Loading defaults.", e);
                    Self::default()
                }
            }
        } else {
            log::info!("Configuration file not found. Creating default at {}", path.display());
            Self::default()
        };

        // Always save back to ensure new fields are populated in the file
        config.save(path)?;

        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            detector: DetectorConfig::default(),
            generation: GenerationConfig::default(),
            overlay: OverlayConfig::default(),
            save_dir: PathBuf::from("scribbles"),
        }
    }
}

/// Parse "#RRGGBB"
pub fn parse_hex(hex: &str) -> Option<Rgb888> {
    if hex.len() != 7 || !hex.starts_with('#') {
        return None;
    }
    let r = u8::from_str_radix(&hex[1..3], 16).ok()?;
    let g = u8::from_str_radix(&hex[3..5], 16).ok()?;
    let b = u8::from_str_radix(&hex[5..7], 16).ok()?;
    Some(Rgb888::new(r, g, b))
}
