//! Frame ingestion sources.
//!
//! One source owns one camera's stream handle for the lifetime of a pipeline
//! run: opened on pipeline start, released when the source is dropped on
//! pipeline stop. Sources yield decoded RGB frames at the pipeline's tick
//! rate and signal end of stream with `Ok(None)`.
//!
//! Available sources:
//! - `stub://` synthetic streams (tests, demo runs)
//! - RTSP via GStreamer (feature: rtsp-gstreamer)

pub mod rtsp;

pub use rtsp::{RtspSource, SourceStats};

use anyhow::Result;

use crate::cameras::Camera;
use crate::frame::Frame;

/// A single camera's frame stream.
pub trait FrameSource: Send {
    /// Open the underlying stream. Called once, before the first frame.
    fn connect(&mut self) -> Result<()>;

    /// Produce the next frame, blocking up to roughly one poll interval.
    ///
    /// `Ok(None)` means the stream has ended; the pipeline runs one final
    /// finalize evaluation and terminates. Errors are transient read
    /// failures, which the pipeline also treats as terminal for this run.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Whether the source is currently producing frames at a healthy rate.
    fn is_healthy(&self) -> bool {
        true
    }

    /// Capture statistics, for periodic health logging.
    fn stats(&self) -> SourceStats;
}

/// Build the frame source for a camera from its stream address.
pub fn source_for_camera(camera: &Camera) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(RtspSource::new(rtsp::RtspConfig {
        url: camera.url.clone(),
        ..rtsp::RtspConfig::default()
    })?))
}
