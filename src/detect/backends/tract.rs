#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::ModelBackend;
use crate::geometry::{BoundingBox, ScoredDetection};

/// Candidates below this are never worth surfacing; the stage wrappers apply
/// the real configured floors on top.
const RAW_SCORE_FLOOR: f32 = 0.05;

/// Tract-based backend for ONNX inference.
///
/// Loads a local YOLO-style model file with a fixed input size and performs
/// inference on RGB frames of any size: input is resampled to the model
/// dimensions and decoded boxes are scaled back to the source image. It does
/// not perform any I/O beyond model loading.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>,
    input_width: u32,
    input_height: u32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_width: u32, input_height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, input_height as usize, input_width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_width,
            input_height,
        })
    }

    fn build_input(&self, pixels: &[u8], width: u32, height: u32) -> Result<Tensor> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected,
                pixels.len()
            ));
        }

        let source = image::RgbImage::from_raw(width, height, pixels.to_vec())
            .ok_or_else(|| anyhow!("frame bytes do not form an RGB image"))?;
        let resized = image::imageops::resize(
            &source,
            self.input_width,
            self.input_height,
            image::imageops::FilterType::Triangle,
        );

        let w = self.input_width as usize;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.input_height as usize, w),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );

        Ok(input.into_tensor())
    }

    /// Decode YOLO-style rows `[cx, cy, w, h, obj, class scores...]` with
    /// coordinates normalized to 0..1, scaled back to the source image.
    fn decode_output(
        &self,
        outputs: TVec<TValue>,
        frame_width: u32,
        frame_height: u32,
    ) -> Result<Vec<ScoredDetection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;

        let shape = view.shape();
        let cols = *shape
            .last()
            .ok_or_else(|| anyhow!("model output has no dimensions"))?;
        if cols < 6 {
            return Err(anyhow!(
                "model output row has {} columns, expected at least 6",
                cols
            ));
        }

        let flat: Vec<f32> = view.iter().copied().collect();
        let mut detections = Vec::new();
        for row in flat.chunks_exact(cols) {
            let (class_id, score) = row[5..]
                .iter()
                .enumerate()
                .fold((0usize, f32::NEG_INFINITY), |best, (idx, &s)| {
                    if s > best.1 {
                        (idx, s)
                    } else {
                        best
                    }
                });
            if !score.is_finite() || score <= RAW_SCORE_FLOOR {
                continue;
            }

            let cx = row[0] * frame_width as f32;
            let cy = row[1] * frame_height as f32;
            let w = row[2] * frame_width as f32;
            let h = row[3] * frame_height as f32;
            let x = (cx - w / 2.0).max(0.0) as u32;
            let y = (cy - h / 2.0).max(0.0) as u32;

            detections.push(ScoredDetection {
                bbox: BoundingBox::new(x, y, w.max(0.0) as u32, h.max(0.0) as u32)
                    .clip_to(frame_width, frame_height),
                score: score.min(1.0),
                class_id,
            });
        }

        Ok(detections)
    }
}

impl ModelBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn infer(&self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<ScoredDetection>> {
        if pixels.is_empty() || width == 0 || height == 0 {
            return Ok(Vec::new());
        }
        let input = self.build_input(pixels, width, height)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode_output(outputs, width, height)
    }
}
