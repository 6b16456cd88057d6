use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::detect::backend::ModelBackend;
use crate::geometry::{BoundingBox, ScoredDetection};

/// Stub backend for testing and `stub://` demo runs.
///
/// Derives pseudo-detections from a hash of the pixel content, so identical
/// frames always produce identical candidates and roughly a third of
/// distinct frames produce one plate-like box. No model file required.
pub struct StubBackend;

impl StubBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn infer(&self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<ScoredDetection>> {
        if pixels.is_empty() || width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        let digest: [u8; 32] = Sha256::digest(pixels).into();
        if digest[0] >= 96 {
            return Ok(Vec::new());
        }

        // Plate-shaped box somewhere in the middle of the frame.
        let w = (width / 4).max(1);
        let h = (height / 10).max(1);
        let x = (digest[1] as u32 % width.saturating_sub(w).max(1)).min(width - w);
        let y = (digest[2] as u32 % height.saturating_sub(h).max(1)).min(height - h);
        let score = 0.70 + (digest[3] as f32 / 255.0) * 0.25;

        Ok(vec![ScoredDetection {
            bbox: BoundingBox::new(x, y, w, h),
            score,
            class_id: 0,
        }])
    }
}
