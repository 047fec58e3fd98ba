//! Hand landmark detection using MediaPipe via Python subprocess
//!
//! The hand landmarker runs in `VIDEO` mode inside `hand_detect.py`. Each call
//! ships one RGB frame plus its timestamp to the subprocess and reads back
//! every detected hand with its handedness label and 21 normalized landmarks.
//!
//! # Model Setup
//!
//! Download the MediaPipe hand landmarker model:
//! wget https://storage.googleapis.com/mediapipe-models/hand_landmarker/hand_landmarker/float16/latest/hand_landmarker.task
//! Place it at: models/hand_landmarker.task

use anyhow::{Context, Result};
use serde::Deserialize;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::camera::Frame;
use crate::config::DetectorConfig;

/// Hand landmark indices (MediaPipe hand landmark model convention)
/// See: https://google.github.io/mediapipe/solutions/hands.html
#[allow(dead_code)]
pub mod landmarks {
    pub const WRIST: usize = 0;
    pub const THUMB_CMC: usize = 1;
    pub const THUMB_MCP: usize = 2;
    pub const THUMB_IP: usize = 3;
    pub const THUMB_TIP: usize = 4;
    pub const INDEX_FINGER_MCP: usize = 5;
    pub const INDEX_FINGER_PIP: usize = 6;
    pub const INDEX_FINGER_DIP: usize = 7;
    pub const INDEX_FINGER_TIP: usize = 8;
    pub const MIDDLE_FINGER_MCP: usize = 9;
    pub const MIDDLE_FINGER_PIP: usize = 10;
    pub const MIDDLE_FINGER_DIP: usize = 11;
    pub const MIDDLE_FINGER_TIP: usize = 12;
    pub const RING_FINGER_MCP: usize = 13;
    pub const RING_FINGER_PIP: usize = 14;
    pub const RING_FINGER_DIP: usize = 15;
    pub const RING_FINGER_TIP: usize = 16;
    pub const PINKY_MCP: usize = 17;
    pub const PINKY_PIP: usize = 18;
    pub const PINKY_DIP: usize = 19;
    pub const PINKY_TIP: usize = 20;

    pub const COUNT: usize = 21;
}

/// A single hand landmark
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Landmark {
    /// X coordinate (0.0 to 1.0, normalized to image width)
    pub x: f32,
    /// Y coordinate (0.0 to 1.0, normalized to image height)
    pub y: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Handedness as labelled by the detector (camera perspective, not mirrored)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
    Unknown,
}

impl Handedness {
    pub fn from_label(label: &str) -> Self {
        match label {
            "Left" => Handedness::Left,
            "Right" => Handedness::Right,
            _ => Handedness::Unknown,
        }
    }
}

/// One detected hand with all 21 landmarks
#[derive(Clone, Debug)]
pub struct HandObservation {
    /// Top-ranked handedness label
    pub handedness: Handedness,
    /// Confidence of the handedness label (0.0 to 1.0)
    pub score: f32,
    pub landmarks: [Landmark; landmarks::COUNT],
}

impl HandObservation {
    pub fn index_finger_tip(&self) -> Landmark {
        self.landmarks[landmarks::INDEX_FINGER_TIP]
    }
}

/// Per-frame hand landmark inference.
///
/// Implementations are stateful and timestamp-ordered: callers must pass a
/// strictly increasing `timestamp_ms` on every call.
pub trait HandDetector {
    fn detect_for_video(&mut self, frame: &Frame, timestamp_ms: u64) -> Result<Vec<HandObservation>>;

    /// Release the detector. Calling it more than once is a no-op.
    fn close(&mut self);
}

/// JSON structures for parsing Python output
#[derive(Deserialize, Debug)]
struct LandmarkJson {
    x: f32,
    y: f32,
}

#[derive(Deserialize, Debug)]
struct HandJson {
    handedness: String,
    score: f32,
    landmarks: Vec<LandmarkJson>,
}

#[derive(Deserialize, Debug)]
struct DetectionResult {
    hands: Vec<HandJson>,
    #[serde(default)]
    error: Option<String>,
}

/// Parse one response line from the detector subprocess.
fn parse_detection(line: &str) -> Result<Vec<HandObservation>> {
    let result: DetectionResult = serde_json::from_str(line)
        .with_context(|| format!("Failed to parse JSON response: {}", line.trim()))?;

    if let Some(error) = result.error {
        anyhow::bail!("Python detector error: {}", error);
    }

    let mut hands = Vec::with_capacity(result.hands.len());
    for hand in result.hands {
        if hand.landmarks.len() != landmarks::COUNT {
            log::warn!("Expected {} landmarks, got {}", landmarks::COUNT, hand.landmarks.len());
            continue;
        }

        let mut points = [Landmark::default(); landmarks::COUNT];
        for (slot, lm) in points.iter_mut().zip(&hand.landmarks) {
            *slot = Landmark::new(lm.x, lm.y);
        }

        log::debug!(
            "Hand detected: {} (score={:.2}), index_tip=({:.3},{:.3})",
            hand.handedness,
            hand.score,
            points[landmarks::INDEX_FINGER_TIP].x,
            points[landmarks::INDEX_FINGER_TIP].y
        );

        hands.push(HandObservation {
            handedness: Handedness::from_label(&hand.handedness),
            score: hand.score,
            landmarks: points,
        });
    }

    Ok(hands)
}

/// How long the script gets to release the model after stdin closes
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Close the child's stdin and wait up to `grace` for it to exit, killing it
/// afterwards. Returns whether it exited on its own.
fn shut_down(process: &mut Child, grace: Duration) -> bool {
    drop(process.stdin.take());

    let deadline = Instant::now() + grace;
    loop {
        match process.try_wait() {
            Ok(Some(_)) => return true,
            Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(10)),
            _ => break,
        }
    }
    let _ = process.kill();
    let _ = process.wait();
    false
}

/// Hand landmarker hosted in a Python subprocess
pub struct MediaPipeDetector {
    /// Python subprocess, `None` once closed
    process: Option<Child>,
    /// Buffered reader for stdout
    stdout_reader: Option<BufReader<ChildStdout>>,
}

impl MediaPipeDetector {
    /// Start the subprocess and wait for its READY signal
    pub fn spawn(config: &DetectorConfig) -> Result<Self> {
        if !config.script.exists() {
            anyhow::bail!("Python hand detection script not found at {:?}", config.script);
        }
        if !config.python.exists() {
            anyhow::bail!(
                "Python interpreter not found at {:?}. Run: python3 -m venv .venv && .venv/bin/pip install mediapipe numpy",
                config.python
            );
        }
        if !config.model.exists() {
            anyhow::bail!("Hand landmarker model not found at {:?}", config.model);
        }

        log::info!("Starting MediaPipe hand detector subprocess...");

        let mut process = Command::new(&config.python)
            .arg(&config.script)
            .arg("--model")
            .arg(&config.model)
            .arg("--num-hands")
            .arg(config.num_hands.to_string())
            .arg("--min-confidence")
            .arg(config.min_confidence.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .context("Failed to start Python subprocess")?;

        let stdout = process.stdout.take().context("Failed to get stdout")?;
        let mut stdout_reader = BufReader::new(stdout);

        let mut ready_line = String::new();
        stdout_reader.read_line(&mut ready_line)?;

        if ready_line.trim() != "READY" {
            let _ = process.kill();
            let _ = process.wait();
            anyhow::bail!("Python subprocess did not signal ready, got: {:?}", ready_line);
        }

        log::info!("MediaPipe hand detector ready");

        Ok(Self {
            process: Some(process),
            stdout_reader: Some(stdout_reader),
        })
    }
}

impl HandDetector for MediaPipeDetector {
    fn detect_for_video(&mut self, frame: &Frame, timestamp_ms: u64) -> Result<Vec<HandObservation>> {
        let (Some(process), Some(reader)) = (self.process.as_mut(), self.stdout_reader.as_mut()) else {
            anyhow::bail!("Detector has been closed");
        };
        let stdin = process.stdin.as_mut().context("Failed to get stdin")?;

        // Header (width, height, channels, timestamp) + raw RGB data
        stdin.write_all(&frame.width.to_le_bytes())?;
        stdin.write_all(&frame.height.to_le_bytes())?;
        stdin.write_all(&3u32.to_le_bytes())?;
        stdin.write_all(&timestamp_ms.to_le_bytes())?;
        stdin.write_all(&frame.rgb)?;
        stdin.flush()?;

        let mut response = String::new();
        let read = reader.read_line(&mut response)?;
        if read == 0 {
            anyhow::bail!("Detector subprocess closed its output");
        }

        parse_detection(&response)
    }

    fn close(&mut self) {
        self.stdout_reader = None;
        if let Some(mut process) = self.process.take() {
            if !shut_down(&mut process, SHUTDOWN_GRACE) {
                log::warn!("Detector subprocess did not exit in time; killed it");
            }
            log::info!("MediaPipe hand detector released");
        }
    }
}

impl Drop for MediaPipeDetector {
    fn drop(&mut self) {
        self.close();
    }
}
