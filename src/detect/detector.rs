use std::sync::Arc;

use anyhow::Result;

use crate::detect::backend::ModelBackend;
use crate::frame::Frame;
use crate::geometry::{non_max_suppression, ScoredDetection};

/// Plate detection stage: backend inference plus thresholding and NMS.
///
/// Stateless per call; the backend is shared read-only across all camera
/// pipelines, so one loaded model serves the whole process.
pub struct PlateDetector {
    backend: Arc<dyn ModelBackend>,
    confidence_floor: f32,
    iou_threshold: f32,
}

impl PlateDetector {
    pub fn new(backend: Arc<dyn ModelBackend>, confidence_floor: f32, iou_threshold: f32) -> Self {
        Self {
            backend,
            confidence_floor,
            iou_threshold,
        }
    }

    /// Detect candidate plate regions in a frame.
    ///
    /// Candidates below the confidence floor are dropped, boxes are clipped
    /// to frame bounds, and overlaps are suppressed. An empty result means
    /// nothing qualifying was observed this tick; it is not an error.
    pub fn detect(&self, frame: &Frame) -> Result<Vec<ScoredDetection>> {
        let raw = self
            .backend
            .infer(frame.pixels(), frame.width(), frame.height())?;

        let clipped: Vec<ScoredDetection> = raw
            .into_iter()
            .map(|mut det| {
                det.bbox = det.bbox.clip_to(frame.width(), frame.height());
                det
            })
            .filter(|det| !det.bbox.is_empty())
            .collect();

        // The confidence floor doubles as the suppression score threshold,
        // matching the single-knob behavior of the deployed models.
        Ok(non_max_suppression(
            &clipped,
            self.confidence_floor,
            self.iou_threshold,
        ))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;

    struct FixedBackend(Vec<ScoredDetection>);

    impl ModelBackend for FixedBackend {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn infer(&self, _pixels: &[u8], _w: u32, _h: u32) -> Result<Vec<ScoredDetection>> {
            Ok(self.0.clone())
        }
    }

    fn frame(width: u32, height: u32) -> Frame {
        Frame::new(vec![0u8; (width * height * 3) as usize], width, height).unwrap()
    }

    #[test]
    fn detect_applies_floor_and_suppression() {
        let backend = Arc::new(FixedBackend(vec![
            ScoredDetection {
                bbox: BoundingBox::new(10, 10, 40, 15),
                score: 0.92,
                class_id: 0,
            },
            // Overlaps the first, lower score: suppressed.
            ScoredDetection {
                bbox: BoundingBox::new(12, 11, 40, 15),
                score: 0.85,
                class_id: 0,
            },
            // Below the floor: dropped.
            ScoredDetection {
                bbox: BoundingBox::new(100, 40, 40, 15),
                score: 0.40,
                class_id: 0,
            },
        ]));
        let detector = PlateDetector::new(backend, 0.7, 0.4);

        let kept = detector.detect(&frame(160, 120)).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].score, 0.92);
    }

    #[test]
    fn detect_clips_boxes_to_frame() {
        let backend = Arc::new(FixedBackend(vec![ScoredDetection {
            bbox: BoundingBox::new(150, 110, 40, 40),
            score: 0.9,
            class_id: 0,
        }]));
        let detector = PlateDetector::new(backend, 0.7, 0.4);

        let kept = detector.detect(&frame(160, 120)).unwrap();
        assert_eq!(kept.len(), 1);
        assert!(kept[0].bbox.x + kept[0].bbox.width <= 160);
        assert!(kept[0].bbox.y + kept[0].bbox.height <= 120);
    }

    #[test]
    fn detect_empty_backend_output_is_not_an_error() {
        let detector = PlateDetector::new(Arc::new(FixedBackend(Vec::new())), 0.7, 0.4);
        assert!(detector.detect(&frame(160, 120)).unwrap().is_empty());
    }
}
