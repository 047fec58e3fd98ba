//! Fingertip path accumulation.

use crate::detector::{Handedness, HandObservation, Landmark};

/// First hand labelled `Right`, scanning in detector order.
///
/// Detector output order is not stable between frames, so hands are matched
/// by label. If several hands carry the label the first one wins.
pub fn right_hand(hands: &[HandObservation]) -> Option<&HandObservation> {
    hands.iter().find(|hand| hand.handedness == Handedness::Right)
}

/// Append-only record of right index fingertip positions
#[derive(Debug, Default, Clone)]
pub struct PathTracker {
    points: Vec<Landmark>,
}

impl PathTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record this frame's right index fingertip, if a right hand is present.
    ///
    /// Returns whether a point was appended.
    pub fn on_frame(&mut self, hands: &[HandObservation]) -> bool {
        match right_hand(hands) {
            Some(hand) => {
                self.points.push(hand.index_finger_tip());
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn points(&self) -> &[Landmark] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::detector::landmarks;

    /// A hand with every landmark at the frame centre except the index fingertip
    pub(crate) fn hand(handedness: Handedness, tip: (f32, f32)) -> HandObservation {
        let mut points = [Landmark::new(0.5, 0.5); landmarks::COUNT];
        points[landmarks::INDEX_FINGER_TIP] = Landmark::new(tip.0, tip.1);
        HandObservation {
            handedness,
            score: 0.95,
            landmarks: points,
        }
    }

    #[test]
    fn right_hand_frames_append_left_only_frames_do_not() {
        let frames = vec![
            vec![hand(Handedness::Right, (0.1, 0.1))],
            vec![hand(Handedness::Right, (0.2, 0.1))],
            vec![hand(Handedness::Right, (0.3, 0.1))],
            vec![hand(Handedness::Left, (0.9, 0.9))],
        ];

        let mut tracker = PathTracker::new();
        for frame in &frames {
            tracker.on_frame(frame);
        }

        assert_eq!(
            tracker.points(),
            &[
                Landmark::new(0.1, 0.1),
                Landmark::new(0.2, 0.1),
                Landmark::new(0.3, 0.1)
            ]
        );
    }

    #[test]
    fn length_equals_number_of_frames_with_a_right_hand() {
        let frames: Vec<Vec<HandObservation>> = vec![
            vec![],
            vec![hand(Handedness::Left, (0.1, 0.1)), hand(Handedness::Right, (0.2, 0.2))],
            vec![hand(Handedness::Unknown, (0.3, 0.3))],
            vec![hand(Handedness::Right, (0.4, 0.4)), hand(Handedness::Right, (0.5, 0.5))],
            vec![],
            vec![hand(Handedness::Right, (0.6, 0.6))],
        ];

        let mut tracker = PathTracker::new();
        for (n, frame) in frames.iter().enumerate() {
            tracker.on_frame(frame);
            let expected = frames[..=n].iter().filter(|f| right_hand(f).is_some()).count();
            assert_eq!(tracker.len(), expected);
        }
        assert_eq!(tracker.len(), 3);
    }

    #[test]
    fn order_of_hands_does_not_matter() {
        let mut tracker = PathTracker::new();
        tracker.on_frame(&[hand(Handedness::Right, (0.2, 0.3)), hand(Handedness::Left, (0.8, 0.8))]);
        tracker.on_frame(&[hand(Handedness::Left, (0.8, 0.8)), hand(Handedness::Right, (0.25, 0.3))]);
        assert_eq!(
            tracker.points(),
            &[Landmark::new(0.2, 0.3), Landmark::new(0.25, 0.3)]
        );
    }

    #[test]
    fn first_right_hand_wins() {
        let hands = [hand(Handedness::Right, (0.1, 0.2)), hand(Handedness::Right, (0.7, 0.8))];
        let chosen = right_hand(&hands).unwrap();
        assert_eq!(chosen.index_finger_tip(), Landmark::new(0.1, 0.2));
    }

    #[test]
    fn clear_empties_any_path() {
        let mut tracker = PathTracker::new();
        for i in 0..50 {
            tracker.on_frame(&[hand(Handedness::Right, (i as f32 / 50.0, 0.5))]);
        }
        tracker.clear();
        assert!(tracker.is_empty());
        tracker.clear();
        assert!(tracker.is_empty());
    }
}
