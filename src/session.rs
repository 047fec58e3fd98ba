//! Session lifecycle: camera and detector ownership, the per-refresh tick,
//! and the user actions that touch the drawing.

use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::camera::CameraStream;
use crate::capture::{CaptureLoop, Cycle};
use crate::detector::HandDetector;
use crate::generation::{GenerationError, GenerationRequest};
use crate::overlay::{Overlay, OverlayStyle};
use crate::state::SessionState;
use crate::tracker::right_hand;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("camera unavailable: {0:#}")]
    Camera(anyhow::Error),
    #[error("hand detector failed to start: {0:#}")]
    Detector(anyhow::Error),
    #[error("cannot {action} while {phase:?}")]
    InvalidState { action: &'static str, phase: Phase },
    #[error("scribble surface is not available: {0:#}")]
    EmptySurface(anyhow::Error),
    #[error("could not save scribble: {0:#}")]
    Save(anyhow::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Starting,
    Running,
    Stopped,
}

/// What a tick did to the surfaces
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub markers_redrawn: bool,
    pub path_extended: bool,
}

pub struct Session<C: CameraStream, D: HandDetector> {
    phase: Phase,
    camera: Option<C>,
    detector: Option<D>,
    capture: Option<CaptureLoop>,
    overlay: Overlay,
    pub state: SessionState,
}

impl<C: CameraStream, D: HandDetector> Session<C, D> {
    pub fn new(style: OverlayStyle) -> Self {
        Self {
            phase: Phase::Idle,
            camera: None,
            detector: None,
            capture: None,
            overlay: Overlay::new(style),
            state: SessionState::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    pub fn camera(&self) -> Option<&C> {
        self.camera.as_ref()
    }

    /// Acquire the camera, size the surfaces, then bring up the detector.
    ///
    /// Either failure is fatal: whatever was acquired is released and the
    /// session ends up `Stopped`.
    pub fn start<OpenCamera, OpenDetector>(
        &mut self,
        open_camera: OpenCamera,
        open_detector: OpenDetector,
    ) -> Result<(), SessionError>
    where
        OpenCamera: FnOnce() -> anyhow::Result<C>,
        OpenDetector: FnOnce() -> anyhow::Result<D>,
    {
        if self.phase != Phase::Idle {
            return Err(SessionError::InvalidState {
                action: "start",
                phase: self.phase,
            });
        }
        self.phase = Phase::Starting;
        log::info!("Starting session");

        let camera = match open_camera() {
            Ok(camera) => camera,
            Err(e) => {
                log::error!("Error accessing camera: {:#}", e);
                self.phase = Phase::Stopped;
                return Err(SessionError::Camera(e));
            }
        };

        let (width, height) = camera.dimensions();
        self.state.frame_size = (width, height);
        self.overlay.resize(width, height);
        self.camera = Some(camera);

        match open_detector() {
            Ok(detector) => self.detector = Some(detector),
            Err(e) => {
                log::error!("Error initializing hand detection: {:#}", e);
                self.teardown();
                return Err(SessionError::Detector(e));
            }
        }

        self.capture = Some(CaptureLoop::start());
        self.phase = Phase::Running;
        log::info!("Session running at {}x{}", width, height);
        Ok(())
    }

    /// One capture cycle. Call once per display refresh.
    pub fn tick(&mut self) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        let (Some(capture), Some(camera), Some(detector)) =
            (self.capture.as_mut(), self.camera.as_ref(), self.detector.as_mut())
        else {
            return outcome;
        };

        match capture.cycle(camera, detector) {
            Cycle::Detected(hands) => {
                self.state.hand_present = !hands.is_empty();
                self.state.right_hand_score = right_hand(&hands).map(|hand| hand.score);
                self.overlay.draw_markers(&hands);
                outcome.markers_redrawn = true;

                if self.state.tracker.on_frame(&hands) {
                    self.overlay.draw_path(self.state.tracker.points());
                    outcome.path_extended = true;
                }
            }
            Cycle::Halted | Cycle::NotReady | Cycle::Stale | Cycle::Failed => {}
        }
        outcome
    }

    /// Forget the drawing. Camera and detector keep running.
    ///
    /// No-op once the session has stopped.
    pub fn clear(&mut self) {
        if self.phase == Phase::Stopped {
            return;
        }
        self.state.tracker.clear();
        self.overlay.draw_path(self.state.tracker.points());
    }

    /// Clear plus parameter defaults, an empty gallery and the idle label.
    pub fn reset(&mut self) {
        if self.phase == Phase::Stopped {
            return;
        }
        self.state.reset();
        self.overlay.draw_path(self.state.tracker.points());
    }

    /// Export the scribble and mark a request outstanding.
    ///
    /// `Ok(None)` when a request is already in flight.
    pub fn prepare_generation(&mut self) -> Result<Option<(u64, GenerationRequest)>, SessionError> {
        let image = self
            .overlay
            .path()
            .to_data_url()
            .map_err(SessionError::EmptySurface)?;
        let Some(id) = self.state.begin_generation() else {
            return Ok(None);
        };
        Ok(Some((id, GenerationRequest::new(image, &self.state.params))))
    }

    pub fn finish_generation(&mut self, id: u64, result: Result<Vec<String>, GenerationError>) -> bool {
        self.state.finish_generation(id, result)
    }

    /// Write the scribble to `dir` as a timestamped PNG
    pub fn save_scribble(&self, dir: &Path) -> Result<PathBuf, SessionError> {
        let png = self.overlay.path().to_png().map_err(SessionError::EmptySurface)?;
        let name = format!("scribble-{}.png", chrono::Local::now().format("%Y%m%d-%H%M%S%.3f"));
        let path = dir.join(name);

        fs::create_dir_all(dir)
            .and_then(|_| fs::write(&path, png))
            .with_context(|| format!("Failed to write {}", path.display()))
            .map_err(SessionError::Save)?;

        log::info!("Saved scribble to {}", path.display());
        Ok(path)
    }

    /// End the session: cancel the loop, stop the camera, release the
    /// detector. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        if let Some(capture) = self.capture.as_mut() {
            capture.cancel();
        }
        self.capture = None;
        if let Some(mut camera) = self.camera.take() {
            camera.stop();
        }
        if let Some(mut detector) = self.detector.take() {
            detector.close();
        }
        if self.phase != Phase::Stopped {
            log::info!("Session stopped");
            self.phase = Phase::Stopped;
        }
    }
}

impl<C: CameraStream, D: HandDetector> Drop for Session<C, D> {
    fn drop(&mut self) {
        self.teardown();
    }
}
