use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use crate::detect::backend::ModelBackend;
use crate::frame::Frame;
use crate::geometry::{non_max_suppression, ScoredDetection};

/// Character recognition stage.
///
/// Runs per-character detection over a plate crop, suppresses overlapping
/// character boxes, then orders the survivors by ascending x-coordinate —
/// left-to-right reading order is what turns an unordered set of character
/// boxes into a plate string — and concatenates their vocabulary labels.
pub struct PlateRecognizer {
    backend: Arc<dyn ModelBackend>,
    vocabulary: Vec<String>,
    confidence_floor: f32,
    score_threshold: f32,
    iou_threshold: f32,
}

impl PlateRecognizer {
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        vocabulary: Vec<String>,
        confidence_floor: f32,
        score_threshold: f32,
        iou_threshold: f32,
    ) -> Result<Self> {
        if vocabulary.is_empty() {
            return Err(anyhow!("character vocabulary must not be empty"));
        }
        Ok(Self {
            backend,
            vocabulary,
            confidence_floor,
            score_threshold,
            iou_threshold,
        })
    }

    /// Load a character vocabulary from a names file (one label per line,
    /// blank lines ignored), the format the recognition models ship with.
    pub fn load_vocabulary<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read vocabulary file {}", path.display()))?;
        Ok(raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Decode the text on a plate crop.
    ///
    /// Never fails on malformed input: an empty or degenerate crop, or a crop
    /// in which no character box survives suppression, yields an empty
    /// string. Characters with out-of-vocabulary class ids are skipped.
    pub fn recognize(&self, crop: &Frame) -> Result<String> {
        if crop.pixels().is_empty() {
            return Ok(String::new());
        }

        let raw = self
            .backend
            .infer(crop.pixels(), crop.width(), crop.height())?;
        let candidates: Vec<ScoredDetection> = raw
            .into_iter()
            .filter(|det| det.score >= self.confidence_floor)
            .collect();

        let mut survivors =
            non_max_suppression(&candidates, self.score_threshold, self.iou_threshold);
        survivors.sort_by_key(|det| det.bbox.x);

        let mut text = String::with_capacity(survivors.len());
        for det in &survivors {
            match self.vocabulary.get(det.class_id) {
                Some(label) => text.push_str(label),
                None => log::warn!(
                    "recognizer produced class id {} outside vocabulary of {}",
                    det.class_id,
                    self.vocabulary.len()
                ),
            }
        }
        Ok(text)
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

    fn vocab() -> Vec<String> {
        "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789"
            .chars()
            .map(|c| c.to_string())
            .collect()
    }

    fn char_det(x: u32, class_id: usize, score: f32) -> ScoredDetection {
        ScoredDetection {
            bbox: BoundingBox::new(x, 4, 12, 18),
            score,
            class_id,
        }
    }

    fn recognizer(dets: Vec<ScoredDetection>) -> PlateRecognizer {
        PlateRecognizer::new(Arc::new(FixedBackend(dets)), vocab(), 0.7, 0.6, 0.4).unwrap()
    }

    fn crop() -> Frame {
        Frame::new(vec![0u8; 120 * 40 * 3], 120, 40).unwrap()
    }

    #[test]
    fn characters_ordered_by_ascending_x() {
        // Boxes arrive out of reading order; x-ascending decode spells "ABC"
        // (x=10 -> A, x=30 -> B, x=50 -> C).
        let r = recognizer(vec![
            char_det(50, 2, 0.9),
            char_det(10, 0, 0.9),
            char_det(30, 1, 0.9),
        ]);
        assert_eq!(r.recognize(&crop()).unwrap(), "ABC");
    }

    #[test]
    fn empty_crop_yields_empty_string() {
        let r = recognizer(vec![char_det(10, 0, 0.9)]);
        let empty = crop().crop(&BoundingBox::new(500, 500, 4, 4));
        assert_eq!(r.recognize(&empty).unwrap(), "");
    }

    #[test]
    fn no_surviving_characters_yields_empty_string() {
        let r = recognizer(vec![char_det(10, 0, 0.5)]);
        assert_eq!(r.recognize(&crop()).unwrap(), "");
    }

    #[test]
    fn overlapping_characters_are_suppressed() {
        // Two boxes on the same glyph; only the higher-scoring survives.
        let r = recognizer(vec![
            char_det(10, 0, 0.95),
            ScoredDetection {
                bbox: BoundingBox::new(11, 5, 12, 18),
                score: 0.8,
                class_id: 5,
            },
            char_det(40, 1, 0.9),
        ]);
        assert_eq!(r.recognize(&crop()).unwrap(), "AB");
    }

    #[test]
    fn out_of_vocabulary_class_is_skipped() {
        let r = recognizer(vec![char_det(10, 0, 0.9), char_det(30, 999, 0.9)]);
        assert_eq!(r.recognize(&crop()).unwrap(), "A");
    }

    #[test]
    fn empty_vocabulary_is_rejected() {
        let result = PlateRecognizer::new(Arc::new(FixedBackend(Vec::new())), Vec::new(), 0.7, 0.6, 0.4);
        assert!(result.is_err());
    }
}
