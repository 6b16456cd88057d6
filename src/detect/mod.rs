mod backend;
mod backends;
mod detector;
mod recognizer;

pub use backend::ModelBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use detector::PlateDetector;
pub use recognizer::PlateRecognizer;
