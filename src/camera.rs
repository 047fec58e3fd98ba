//! Camera capture thread and the latest-frame slot it feeds.

use anyhow::{anyhow, Context, Result};
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::CameraConfig;

/// A decoded RGB camera frame
#[derive(Clone, Debug)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGB8, `width * height * 3` bytes
    pub rgb: Vec<u8>,
    /// Increases by one for every frame the camera delivers
    pub sequence: u64,
}

impl Frame {
    /// A frame is usable once it has pixels and a matching buffer.
    pub fn is_ready(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.rgb.len() == self.width as usize * self.height as usize * 3
    }
}

/// A live video stream.
pub trait CameraStream {
    /// Negotiated capture size, fixed for the lifetime of the stream
    fn dimensions(&self) -> (u32, u32);

    /// Most recent frame, `None` until the first one arrives
    fn latest_frame(&self) -> Option<Arc<Frame>>;

    /// Stop capturing. Calling it more than once is a no-op.
    fn stop(&mut self);
}

type FrameSlot = Arc<Mutex<Option<Arc<Frame>>>>;

/// Camera backed by an OpenCV capture thread
pub struct OpenCvCamera {
    width: u32,
    height: u32,
    latest: FrameSlot,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

fn open_capture(device: &str) -> Result<VideoCapture> {
    let cap = match device.parse::<i32>() {
        Ok(index) => VideoCapture::new(index, videoio::CAP_ANY),
        Err(_) => VideoCapture::from_file(device, videoio::CAP_ANY),
    }
    .with_context(|| format!("Failed to open camera {}", device))?;

    if !cap.is_opened().unwrap_or(false) {
        anyhow::bail!("Camera {} is not opened", device);
    }
    Ok(cap)
}

impl OpenCvCamera {
    /// Open the device and start the capture thread.
    ///
    /// Blocks until the device is open so that access failures surface here.
    pub fn open(config: &CameraConfig) -> Result<Self> {
        log::info!("Opening camera at {}", config.device);

        let latest: FrameSlot = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(u32, u32)>>(1);

        let thread = {
            let config = config.clone();
            let latest = latest.clone();
            let running = running.clone();
            thread::Builder::new()
                .name("camera".into())
                .spawn(move || camera_thread(config, latest, running, ready_tx))
                .context("Failed to spawn camera thread")?
        };

        let (width, height) = match ready_rx.recv() {
            Ok(Ok(dims)) => dims,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(anyhow!("Camera thread exited before opening the device"));
            }
        };

        log::info!("Camera opened successfully ({}x{})", width, height);

        Ok(Self {
            width,
            height,
            latest,
            running,
            thread: Some(thread),
        })
    }
}

impl CameraStream for OpenCvCamera {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn latest_frame(&self) -> Option<Arc<Frame>> {
        self.latest.lock().unwrap().clone()
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
            *self.latest.lock().unwrap() = None;
        }
    }
}

impl Drop for OpenCvCamera {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Camera capture thread: keeps the newest RGB frame in `latest`
fn camera_thread(
    config: CameraConfig,
    latest: FrameSlot,
    running: Arc<AtomicBool>,
    ready: mpsc::SyncSender<Result<(u32, u32)>>,
) {
    let mut cap = match open_capture(&config.device) {
        Ok(cap) => cap,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let _ = cap.set(videoio::CAP_PROP_FRAME_WIDTH, config.width as f64);
    let _ = cap.set(videoio::CAP_PROP_FRAME_HEIGHT, config.height as f64);
    let _ = cap.set(videoio::CAP_PROP_FPS, config.fps as f64);

    // Read back what the driver actually granted
    let width = cap.get(videoio::CAP_PROP_FRAME_WIDTH).unwrap_or(0.0) as u32;
    let height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT).unwrap_or(0.0) as u32;
    if width == 0 || height == 0 {
        let _ = ready.send(Err(anyhow!(
            "Camera {} reported an empty frame size",
            config.device
        )));
        return;
    }
    let _ = ready.send(Ok((width, height)));

    let mut frame = Mat::default();
    let mut rgb_frame = Mat::default();
    let mut sequence = 0u64;

    while running.load(Ordering::SeqCst) {
        match cap.read(&mut frame) {
            Ok(true) if !frame.empty() => {
                if imgproc::cvt_color(&frame, &mut rgb_frame, imgproc::COLOR_BGR2RGB, 0).is_err() {
                    continue;
                }
                let (Ok(size), Ok(data)) = (rgb_frame.size(), rgb_frame.data_bytes()) else {
                    continue;
                };
                sequence += 1;
                let decoded = Frame {
                    width: size.width as u32,
                    height: size.height as u32,
                    rgb: data.to_vec(),
                    sequence,
                };
                *latest.lock().unwrap() = Some(Arc::new(decoded));
            }
            Ok(_) => {
                // Empty frame or read failed
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => {
                log::warn!("Failed to read frame: {}", e);
                thread::sleep(Duration::from_millis(100));
            }
        }
    }

    log::info!("Camera thread stopped");
}
