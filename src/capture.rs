//! One detection cycle per display refresh.

use std::time::{Duration, Instant};

use crate::camera::CameraStream;
use crate::detector::{HandDetector, HandObservation};

/// Session-relative millisecond timestamps that never repeat or go backwards
#[derive(Debug)]
pub struct VideoClock {
    started: Instant,
    last: Option<u64>,
}

impl VideoClock {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            last: None,
        }
    }

    pub fn next_timestamp(&mut self) -> u64 {
        self.timestamp_at(self.started.elapsed())
    }

    fn timestamp_at(&mut self, elapsed: Duration) -> u64 {
        let ms = elapsed.as_millis() as u64;
        let ts = match self.last {
            Some(last) if ms <= last => last + 1,
            _ => ms,
        };
        self.last = Some(ts);
        ts
    }
}

/// Result of a single capture cycle
#[derive(Debug)]
pub enum Cycle {
    /// The loop has been cancelled; nothing ran
    Halted,
    /// No usable frame yet
    NotReady,
    /// The newest frame was already processed
    Stale,
    /// Detection ran; the list may be empty
    Detected(Vec<HandObservation>),
    /// Detection failed on this frame; the loop carries on
    Failed,
}

/// Per-frame detection driver.
///
/// Cycles are invoked by the UI's refresh callback; the loop itself never
/// spawns work. `cancel` is checked before anything else in every cycle.
#[derive(Debug)]
pub struct CaptureLoop {
    alive: bool,
    clock: VideoClock,
    last_sequence: Option<u64>,
}

impl CaptureLoop {
    pub fn start() -> Self {
        Self {
            alive: true,
            clock: VideoClock::start(),
            last_sequence: None,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn cancel(&mut self) {
        self.alive = false;
    }

    pub fn cycle<C, D>(&mut self, camera: &C, detector: &mut D) -> Cycle
    where
        C: CameraStream + ?Sized,
        D: HandDetector + ?Sized,
    {
        if !self.alive {
            return Cycle::Halted;
        }

        let Some(frame) = camera.latest_frame() else {
            return Cycle::NotReady;
        };
        if !frame.is_ready() {
            return Cycle::NotReady;
        }
        if self.last_sequence == Some(frame.sequence) {
            return Cycle::Stale;
        }
        self.last_sequence = Some(frame.sequence);

        let timestamp = self.clock.next_timestamp();
        match detector.detect_for_video(&frame, timestamp) {
            Ok(hands) => Cycle::Detected(hands),
            Err(e) => {
                log::warn!("Hand detection failed on frame {}: {:#}", frame.sequence, e);
                Cycle::Failed
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::camera::Frame;
    use crate::detector::Handedness;
    use crate::tracker::tests::hand;
    use anyhow::Result;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::sync::Arc;

    /// Camera whose next frame is set by the test
    #[derive(Clone)]
    pub(crate) struct FakeCamera {
        pub(crate) width: u32,
        pub(crate) height: u32,
        pub(crate) frame: Rc<RefCell<Option<Arc<Frame>>>>,
        pub(crate) stops: Rc<RefCell<u32>>,
    }

    impl FakeCamera {
        pub(crate) fn new(width: u32, height: u32) -> Self {
            Self {
                width,
                height,
                frame: Rc::new(RefCell::new(None)),
                stops: Rc::new(RefCell::new(0)),
            }
        }

        /// Publish a fresh frame with the given sequence number
        pub(crate) fn push(&self, sequence: u64) {
            *self.frame.borrow_mut() = Some(Arc::new(Frame {
                width: self.width,
                height: self.height,
                rgb: vec![0; (self.width * self.height * 3) as usize],
                sequence,
            }));
        }
    }

    impl CameraStream for FakeCamera {
        fn dimensions(&self) -> (u32, u32) {
            (self.width, self.height)
        }

        fn latest_frame(&self) -> Option<Arc<Frame>> {
            self.frame.borrow().clone()
        }

        fn stop(&mut self) {
            *self.stops.borrow_mut() += 1;
        }
    }

    /// Detector that replays scripted results and records timestamps
    #[derive(Clone, Default)]
    pub(crate) struct FakeDetector {
        pub(crate) script: Rc<RefCell<VecDeque<Result<Vec<HandObservation>>>>>,
        pub(crate) timestamps: Rc<RefCell<Vec<u64>>>,
        pub(crate) closes: Rc<RefCell<u32>>,
    }

    impl FakeDetector {
        pub(crate) fn queue(&self, result: Result<Vec<HandObservation>>) {
            self.script.borrow_mut().push_back(result);
        }
    }

    impl HandDetector for FakeDetector {
        fn detect_for_video(&mut self, _frame: &Frame, timestamp_ms: u64) -> Result<Vec<HandObservation>> {
            self.timestamps.borrow_mut().push(timestamp_ms);
            self.script.borrow_mut().pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }

        fn close(&mut self) {
            *self.closes.borrow_mut() += 1;
        }
    }

    #[test]
    fn clock_is_strictly_increasing() {
        let mut clock = VideoClock::start();
        assert_eq!(clock.timestamp_at(Duration::from_millis(5)), 5);
        assert_eq!(clock.timestamp_at(Duration::from_millis(5)), 6);
        assert_eq!(clock.timestamp_at(Duration::from_millis(3)), 7);
        assert_eq!(clock.timestamp_at(Duration::from_millis(40)), 40);
    }

    #[test]
    fn no_frame_is_not_ready() {
        let camera = FakeCamera::new(4, 4);
        let mut detector = FakeDetector::default();
        let mut capture = CaptureLoop::start();

        assert!(matches!(capture.cycle(&camera, &mut detector), Cycle::NotReady));
        assert!(detector.timestamps.borrow().is_empty());
    }

    #[test]
    fn each_frame_is_detected_once() {
        let camera = FakeCamera::new(4, 4);
        let mut detector = FakeDetector::default();
        let mut capture = CaptureLoop::start();

        camera.push(1);
        assert!(matches!(capture.cycle(&camera, &mut detector), Cycle::Detected(_)));
        assert!(matches!(capture.cycle(&camera, &mut detector), Cycle::Stale));
        camera.push(2);
        assert!(matches!(capture.cycle(&camera, &mut detector), Cycle::Detected(_)));

        let timestamps = detector.timestamps.borrow();
        assert_eq!(timestamps.len(), 2);
        assert!(timestamps[1] > timestamps[0]);
    }

    #[test]
    fn detector_failure_does_not_stop_the_loop() {
        let camera = FakeCamera::new(4, 4);
        let mut detector = FakeDetector::default();
        detector.queue(Err(anyhow::anyhow!("model hiccup")));
        detector.queue(Ok(vec![hand(Handedness::Right, (0.5, 0.5))]));
        let mut capture = CaptureLoop::start();

        camera.push(1);
        assert!(matches!(capture.cycle(&camera, &mut detector), Cycle::Failed));
        camera.push(2);
        match capture.cycle(&camera, &mut detector) {
            Cycle::Detected(hands) => assert_eq!(hands.len(), 1),
            other => panic!("expected detection, got {:?}", other),
        }
        assert!(capture.is_alive());
    }

    #[test]
    fn cancelled_loop_never_detects() {
        let camera = FakeCamera::new(4, 4);
        let mut detector = FakeDetector::default();
        let mut capture = CaptureLoop::start();

        capture.cancel();
        camera.push(1);
        assert!(matches!(capture.cycle(&camera, &mut detector), Cycle::Halted));
        assert!(detector.timestamps.borrow().is_empty());
    }
}
