//! Frame container.
//!
//! A `Frame` is an owned RGB image as produced by a frame source. Frames are
//! transient per-tick values; the only frames that outlive a tick are the two
//! held inside the current `Observation` (full frame and plate crop), which
//! bounds memory per camera regardless of transit length.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;

use crate::geometry::BoundingBox;

/// Owned RGB frame (3 bytes per pixel, row-major, no padding).
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Copy out the region covered by `bbox`, clipped to frame bounds.
    /// A box with no overlap yields an empty (0x0) frame.
    pub fn crop(&self, bbox: &BoundingBox) -> Frame {
        let clipped = bbox.clip_to(self.width, self.height);
        if clipped.is_empty() {
            return Frame {
                data: Vec::new(),
                width: 0,
                height: 0,
            };
        }

        let row_bytes = clipped.width as usize * 3;
        let mut data = Vec::with_capacity(row_bytes * clipped.height as usize);
        for row in clipped.y..clipped.y + clipped.height {
            let start = (row as usize * self.width as usize + clipped.x as usize) * 3;
            data.extend_from_slice(&self.data[start..start + row_bytes]);
        }
        Frame {
            data,
            width: clipped.width,
            height: clipped.height,
        }
    }

    /// Encode as JPEG for outbound reporting. Empty frames cannot be encoded.
    pub fn encode_jpeg(&self) -> Result<Vec<u8>> {
        if self.data.is_empty() {
            return Err(anyhow!("cannot encode empty frame"));
        }
        let mut out = Vec::new();
        JpegEncoder::new(&mut out)
            .encode(
                &self.data,
                self.width,
                self.height,
                image::ExtendedColorType::Rgb8,
            )
            .context("encode frame as JPEG")?;
        Ok(out)
    }
}
