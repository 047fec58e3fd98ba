use clap::Parser;
use std::path::PathBuf;

use crate::config::AppConfig;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Config file (created with defaults if missing)
    #[arg(short, long, default_value = AppConfig::DEFAULT_PATH)]
    pub config: PathBuf,

    /// Camera device path or index, overrides camera.device
    #[arg(short, long)]
    pub device: Option<String>,

    /// Generation endpoint URL, overrides generation.endpoint
    #[arg(long)]
    pub endpoint: Option<String>,
}

impl Args {
    /// Apply command line overrides on top of the loaded config
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(device) = &self.device {
            config.camera.device = device.clone();
        }
        if let Some(endpoint) = &self.endpoint {
            config.generation.endpoint = endpoint.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_config_json() {
        let args = Args::parse_from(["air-scribble"]);
        assert_eq!(args.config, PathBuf::from("config.json"));
        assert!(args.device.is_none());
    }

    #[test]
    fn overrides_replace_config_values() {
        let args = Args::parse_from([
            "air-scribble",
            "--device",
            "/dev/video2",
            "--endpoint",
            "http://gpu-box:9000/generate",
        ]);
        let mut config = AppConfig::default();
        args.apply(&mut config);
        assert_eq!(config.camera.device, "/dev/video2");
        assert_eq!(config.generation.endpoint, "http://gpu-box:9000/generate");
        assert_eq!(config.camera.width, 640);
    }
}
