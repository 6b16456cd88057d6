use anyhow::Result;

use crate::geometry::ScoredDetection;

/// Inference backend trait: an opaque, trained model capability.
///
/// Given RGB pixels, a backend returns scored candidate regions with class
/// ids. Both pipeline stages use the same contract: the detection model's
/// classes are plate types, the recognition model's classes are characters.
/// Thresholding and suppression are the caller's job; backends report every
/// candidate the model produces.
///
/// Model loading is the expensive part, so a backend is constructed once at
/// startup and shared read-only across every camera pipeline. `infer` takes
/// `&self`; implementations must be safe to call concurrently.
///
/// Implementations must treat the pixel slice as read-only and ephemeral and
/// must not perform I/O during `infer`.
pub trait ModelBackend: Send + Sync {
    /// Backend identifier, for logs.
    fn name(&self) -> &'static str;

    /// Run inference on an RGB image.
    ///
    /// Returns candidate regions in the pixel space of the input. An empty
    /// result means "nothing qualifying observed" and is not an error.
    fn infer(&self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<ScoredDetection>>;
}
