//! platewatch - parking-lot license plate recognition pipelines.
//!
//! The crate runs one processing pipeline per camera in a parking lot:
//! frames are pulled from the camera's stream, license plates are located by
//! a detection model, each plate crop is decoded character by character by a
//! recognition model, and the best observation of each vehicle transit is
//! reported to the lot's backend exactly once.
//!
//! Crate layout:
//! - [`geometry`] - bounding boxes, IoU, non-maximum suppression
//! - [`frame`] - decoded RGB frames, cropping, JPEG encoding
//! - [`detect`] - model backends, [`detect::PlateDetector`],
//!   [`detect::PlateRecognizer`]
//! - [`ingest`] - per-camera frame sources (synthetic `stub://`, RTSP)
//! - [`observe`] - per-transit observation accumulation and debounce
//! - [`report`] - event queue and multipart delivery to the backend
//! - [`cameras`] - backend camera directory client
//! - [`pipeline`] / [`orchestrator`] - per-camera loops and their lifecycle
//! - [`config`] - daemon configuration (file + env + validation)

pub mod cameras;
pub mod config;
pub mod detect;
pub mod frame;
pub mod geometry;
pub mod ingest;
pub mod observe;
pub mod orchestrator;
pub mod pipeline;
pub mod report;

pub use cameras::{fetch_cameras, validate_camera_id, Camera};
pub use config::PlatewatchConfig;
pub use detect::{ModelBackend, PlateDetector, PlateRecognizer, StubBackend};
pub use frame::Frame;
pub use geometry::{non_max_suppression, BoundingBox, ScoredDetection};
pub use ingest::{FrameSource, RtspSource};
pub use observe::{Observation, ObservationAccumulator, TrackState};
pub use orchestrator::Orchestrator;
pub use pipeline::CameraPipeline;
pub use report::{DetectionEvent, EventReporter, EventSink};
