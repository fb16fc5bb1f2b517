//! Binary erase masks built from detections of the target class

use crate::types::{Detection, Mask, ERASE};
use image::Luma;
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};

/// How a detection label is compared with the target class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LabelMatch {
    /// Byte-for-byte equality ("Person" does not match "person")
    #[default]
    Exact,
    /// Unicode case-insensitive equality
    CaseInsensitive,
}

impl LabelMatch {
    #[must_use]
    pub fn matches(self, label: &str, target: &str) -> bool {
        match self {
            Self::Exact => label == target,
            Self::CaseInsensitive => label.to_lowercase() == target.to_lowercase(),
        }
    }
}

/// Which detections contribute to a mask
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct MaskPolicy {
    /// Detections below this confidence are ignored; `None` keeps all
    pub min_confidence: Option<f32>,
    pub label_match: LabelMatch,
}

impl MaskPolicy {
    #[must_use]
    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = Some(min_confidence);
        self
    }

    #[must_use]
    pub fn with_label_match(mut self, label_match: LabelMatch) -> Self {
        self.label_match = label_match;
        self
    }

    /// Whether a detection should be erased when removing `target`
    #[must_use]
    pub fn accepts(&self, detection: &Detection, target: &str) -> bool {
        self.label_match.matches(&detection.label, target)
            && self
                .min_confidence
                .map_or(true, |min| detection.confidence >= min)
    }
}

/// Builds per-frame masks under a fixed [`MaskPolicy`]
#[derive(Debug, Clone, Copy, Default)]
pub struct MaskBuilder {
    policy: MaskPolicy,
}

impl MaskBuilder {
    #[must_use]
    pub fn new(policy: MaskPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub fn policy(&self) -> &MaskPolicy {
        &self.policy
    }

    /// Rasterize every accepted detection box into an erase mask.
    ///
    /// The mask always has `dimensions`. Box corners are truncated toward zero
    /// and clamped to the frame; overlapping boxes simply union. Boxes that end
    /// up empty after clamping contribute nothing.
    #[must_use]
    pub fn build(&self, detections: &[Detection], target: &str, dimensions: (u32, u32)) -> Mask {
        let (width, height) = dimensions;
        let mut mask = Mask::new(width, height);
        for detection in detections.iter().filter(|d| self.policy.accepts(d, target)) {
            if let Some((x1, y1, x2, y2)) = detection.bbox.pixel_span(width, height) {
                let rect = Rect::at(x1 as i32, y1 as i32).of_size(x2 - x1, y2 - y1);
                draw_filled_rect_mut(mask.image_mut(), rect, Luma([ERASE]));
            }
        }
        mask
    }

    /// Number of detections the policy accepts for `target`
    #[must_use]
    pub fn matched_count(&self, detections: &[Detection], target: &str) -> usize {
        detections
            .iter()
            .filter(|d| self.policy.accepts(d, target))
            .count()
    }
}

/// Build a mask with the default policy (exact label match, no confidence floor)
#[must_use]
pub fn build_mask(detections: &[Detection], target: &str, dimensions: (u32, u32)) -> Mask {
    MaskBuilder::default().build(detections, target, dimensions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;

    fn det(label: &str, confidence: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection::new(BoundingBox::new(x1, y1, x2, y2), confidence, 0, label)
    }

    #[test]
    fn test_no_detections_gives_empty_mask() {
        let mask = build_mask(&[], "person", (64, 48));
        assert_eq!(mask.dimensions(), (64, 48));
        assert!(mask.is_empty());
    }

    #[test]
    fn test_matching_box_is_filled_exactly() {
        let mask = build_mask(&[det("person", 0.9, 10.0, 10.0, 50.0, 50.0)], "person", (100, 100));
        assert_eq!(mask.erased_count(), 40 * 40);
        assert!(mask.is_erased(10, 10));
        assert!(mask.is_erased(49, 49));
        assert!(!mask.is_erased(50, 50));
        assert!(!mask.is_erased(9, 10));
    }

    #[test]
    fn test_fractional_coordinates_truncate() {
        let mask = build_mask(&[det("car", 0.5, 2.9, 3.7, 6.2, 5.99)], "car", (10, 10));
        assert!(mask.is_erased(2, 3));
        assert!(mask.is_erased(5, 4));
        assert!(!mask.is_erased(6, 4));
        assert!(!mask.is_erased(2, 5));
        assert_eq!(mask.erased_count(), 4 * 2);
    }

    #[test]
    fn test_other_classes_ignored() {
        let detections = [
            det("dog", 0.9, 0.0, 0.0, 20.0, 20.0),
            det("person", 0.4, 30.0, 30.0, 40.0, 40.0),
        ];
        let mask = build_mask(&detections, "person", (64, 64));
        assert_eq!(mask.erased_count(), 100);
        assert!(!mask.is_erased(5, 5));
    }

    #[test]
    fn test_overlapping_boxes_union() {
        let detections = [
            det("person", 0.9, 0.0, 0.0, 10.0, 10.0),
            det("person", 0.8, 5.0, 5.0, 15.0, 15.0),
        ];
        let mask = build_mask(&detections, "person", (20, 20));
        assert_eq!(mask.erased_count(), 100 + 100 - 25);
    }

    #[test]
    fn test_out_of_frame_box_is_clamped() {
        let detections = [det("person", 0.9, -10.0, 30.0, 25.0, 200.0)];
        let mask = build_mask(&detections, "person", (20, 40));
        assert_eq!(mask.dimensions(), (20, 40));
        assert_eq!(mask.erased_count(), 20 * 10);
    }

    #[test]
    fn test_degenerate_boxes_contribute_nothing() {
        let detections = [
            det("person", 0.9, 10.0, 10.0, 10.0, 30.0),
            det("person", 0.9, 30.0, 30.0, 20.0, 20.0),
            det("person", 0.9, 100.0, 100.0, 120.0, 120.0),
        ];
        assert!(build_mask(&detections, "person", (50, 50)).is_empty());
    }

    #[test]
    fn test_exact_match_is_case_sensitive() {
        let detections = [det("person", 0.9, 0.0, 0.0, 10.0, 10.0)];
        assert!(build_mask(&detections, "Person", (16, 16)).is_empty());

        let builder =
            MaskBuilder::new(MaskPolicy::default().with_label_match(LabelMatch::CaseInsensitive));
        assert_eq!(builder.build(&detections, "Person", (16, 16)).erased_count(), 100);
        assert_eq!(builder.matched_count(&detections, "PERSON"), 1);
    }

    #[test]
    fn test_confidence_floor() {
        let detections = [
            det("person", 0.2, 0.0, 0.0, 4.0, 4.0),
            det("person", 0.6, 8.0, 8.0, 12.0, 12.0),
        ];
        assert_eq!(build_mask(&detections, "person", (16, 16)).erased_count(), 32);

        let builder = MaskBuilder::new(MaskPolicy::default().with_min_confidence(0.5));
        let mask = builder.build(&detections, "person", (16, 16));
        assert_eq!(mask.erased_count(), 16);
        assert!(mask.is_erased(8, 8));
        assert_eq!(builder.matched_count(&detections, "person"), 1);
    }

    #[test]
    fn test_mask_dimensions_follow_frame() {
        for count in [0usize, 1, 7] {
            let detections: Vec<_> = (0..count)
                .map(|i| det("cat", 0.9, i as f32 * 3.0, 0.0, i as f32 * 3.0 + 5.0, 9.0))
                .collect();
            let mask = build_mask(&detections, "cat", (33, 17));
            assert_eq!(mask.dimensions(), (33, 17));
        }
    }
}
