//! Box geometry and non-maximum suppression.
//!
//! Both inference stages (plate detection and character recognition) produce
//! scored boxes in the pixel space of their input image. This module owns the
//! shared primitives: `BoundingBox`, `ScoredDetection`, IoU, and the greedy
//! suppression pass that collapses overlapping candidates.

use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel coordinates of the frame it was produced from.
/// Always non-negative; callers clip to frame bounds via [`BoundingBox::clip_to`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Clip this box to a frame of the given dimensions.
    /// Boxes entirely outside the frame collapse to zero size.
    pub fn clip_to(&self, frame_width: u32, frame_height: u32) -> Self {
        let x = self.x.min(frame_width);
        let y = self.y.min(frame_height);
        Self {
            x,
            y,
            width: self.width.min(frame_width - x),
            height: self.height.min(frame_height - y),
        }
    }

    /// Intersection over union with another box, in 0..=1.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }
        let intersection = (x2 - x1) as u64 * (y2 - y1) as u64;
        let union = self.area() + other.area() - intersection;
        if union == 0 {
            return 0.0;
        }
        intersection as f32 / union as f32
    }
}

/// One scored candidate region from an inference stage.
///
/// `class_id` indexes into the stage's label vocabulary: the plate class for
/// detection, a character for recognition. Never persisted beyond one tick
/// except inside an `Observation`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoredDetection {
    pub bbox: BoundingBox,
    pub score: f32,
    pub class_id: usize,
}

/// Greedy non-maximum suppression.
///
/// Candidates below `score_threshold` are dropped before suppression. The
/// survivors are processed in descending score order (stable sort, so the
/// earlier candidate wins exact ties) and a candidate is kept only if its IoU
/// with every already-kept box is at most `iou_threshold`. Output is ordered
/// by descending score and is always a subset of the input.
pub fn non_max_suppression(
    detections: &[ScoredDetection],
    score_threshold: f32,
    iou_threshold: f32,
) -> Vec<ScoredDetection> {
    let mut candidates: Vec<ScoredDetection> = detections
        .iter()
        .filter(|d| d.score >= score_threshold)
        .copied()
        .collect();
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut kept: Vec<ScoredDetection> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let suppressed = kept
            .iter()
            .any(|k| k.bbox.iou(&candidate.bbox) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}
