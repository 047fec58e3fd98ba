//! Everything the user can see or edit, in one place.

use crate::generation::GenerationError;
use crate::params::GenerationParams;
use crate::tracker::PathTracker;

pub const GENERATE_IDLE_LABEL: &str = "Generate";
pub const GENERATE_BUSY_LABEL: &str = "Generating...";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenerateStatus {
    Idle,
    InProgress { id: u64 },
}

#[derive(Debug)]
pub struct SessionState {
    pub params: GenerationParams,
    pub tracker: PathTracker,
    /// Capture size of the video, shared by every surface
    pub frame_size: (u32, u32),
    /// Whether the last processed frame contained any hand
    pub hand_present: bool,
    /// Handedness confidence of the right hand in the last processed frame
    pub right_hand_score: Option<f32>,
    /// URLs of the most recent successful generation
    pub gallery: Vec<String>,
    /// One-line message for the status bar
    pub notice: Option<String>,
    generate: GenerateStatus,
    next_request_id: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            params: GenerationParams::default(),
            tracker: PathTracker::new(),
            frame_size: (0, 0),
            hand_present: false,
            right_hand_score: None,
            gallery: Vec::new(),
            notice: None,
            generate: GenerateStatus::Idle,
            next_request_id: 1,
        }
    }
}

impl SessionState {
    pub fn generate_status(&self) -> GenerateStatus {
        self.generate
    }

    pub fn generate_label(&self) -> &'static str {
        match self.generate {
            GenerateStatus::Idle => GENERATE_IDLE_LABEL,
            GenerateStatus::InProgress { .. } => GENERATE_BUSY_LABEL,
        }
    }

    /// Mark a request as outstanding. `None` while another one is in flight.
    pub fn begin_generation(&mut self) -> Option<u64> {
        if self.generate != GenerateStatus::Idle {
            return None;
        }
        let id = self.next_request_id;
        self.next_request_id += 1;
        self.generate = GenerateStatus::InProgress { id };
        Some(id)
    }

    /// Apply a finished request.
    ///
    /// Only the outstanding request counts; anything else (for instance a
    /// request abandoned by Reset) is dropped. Returns whether it was applied.
    pub fn finish_generation(&mut self, id: u64, result: Result<Vec<String>, GenerationError>) -> bool {
        if self.generate != (GenerateStatus::InProgress { id }) {
            log::info!("Discarding result of abandoned generation request {}", id);
            return false;
        }
        self.generate = GenerateStatus::Idle;

        match result {
            Ok(urls) => {
                log::info!("Generation request {} returned {} image(s)", id, urls.len());
                self.gallery = urls;
                self.notice = None;
            }
            Err(e) => {
                log::warn!("Generation request {} failed: {}", id, e);
                self.notice = Some(format!("Generation failed: {}", e));
            }
        }
        true
    }

    /// Back to the idle form: defaults, no path, no gallery, idle label
    pub fn reset(&mut self) {
        self.params = GenerationParams::default();
        self.tracker.clear();
        self.gallery.clear();
        self.notice = None;
        self.generate = GenerateStatus::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_follows_request_lifecycle() {
        let mut state = SessionState::default();
        assert_eq!(state.generate_label(), "Generate");

        let id = state.begin_generation().unwrap();
        assert_eq!(state.generate_label(), "Generating...");
        assert!(state.begin_generation().is_none());

        assert!(state.finish_generation(id, Ok(vec!["a.png".into()])));
        assert_eq!(state.generate_label(), "Generate");
        assert_eq!(state.gallery, vec!["a.png"]);
    }

    #[test]
    fn failure_keeps_gallery_and_reverts_label() {
        let mut state = SessionState::default();
        state.gallery = vec!["old.png".into()];

        let id = state.begin_generation().unwrap();
        state.finish_generation(id, Err(GenerationError::Status(503)));

        assert_eq!(state.gallery, vec!["old.png"]);
        assert_eq!(state.generate_status(), GenerateStatus::Idle);
        assert!(state.notice.as_deref().unwrap().contains("503"));
    }

    #[test]
    fn results_after_reset_are_discarded() {
        let mut state = SessionState::default();
        let id = state.begin_generation().unwrap();
        state.reset();
        assert_eq!(state.generate_label(), GENERATE_IDLE_LABEL);

        assert!(!state.finish_generation(id, Ok(vec!["late.png".into()])));
        assert!(state.gallery.is_empty());

        let next = state.begin_generation().unwrap();
        assert_ne!(next, id);
    }
}
