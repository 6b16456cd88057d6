//! Event reporting.
//!
//! Finalized observations are handed to an [`EventSink`]. The production sink
//! posts a multipart form to the backend's `/data` endpoint; the
//! [`EventReporter`] worker decouples that network call from the camera
//! pipelines so a slow or unreachable backend never stalls frame processing.

use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};
use rand::Rng;

use crate::cameras::Camera;
use crate::frame::Frame;

/// One finalized vehicle transit, ready for delivery.
#[derive(Clone, Debug)]
pub struct DetectionEvent {
    pub camera: Camera,
    pub text: String,
    pub frame: Frame,
    pub plate: Frame,
}

/// Delivery seam for finalized events.
///
/// Pipelines call `submit` from their own threads; implementations must not
/// block on network I/O (queue and return, or deliver synchronously only in
/// tests).
pub trait EventSink: Send + Sync {
    fn submit(&self, event: DetectionEvent) -> Result<()>;
}

/// HTTP sink posting `multipart/form-data` to `{backend}/data`.
pub struct HttpSink {
    endpoint: String,
}

impl HttpSink {
    pub fn new(backend_url: &str) -> Self {
        Self {
            endpoint: format!("{}/data", backend_url.trim_end_matches('/')),
        }
    }

    /// Deliver one event synchronously. Runs on the reporter worker thread.
    pub fn deliver(&self, event: &DetectionEvent) -> Result<()> {
        let frame_jpeg = event.frame.encode_jpeg().context("encode vehicle jpeg")?;
        let plate_jpeg = event.plate.encode_jpeg().context("encode plate jpeg")?;

        // Field names follow the backend's intake contract: `lot` carries the
        // camera id and `camera` carries the stream url.
        let form = MultipartForm::new()
            .field("lot", &event.camera.id)
            .field("plateNumber", &event.text)
            .field("camera", &event.camera.url)
            .field("direction", &event.camera.direction)
            .file("vehicle", "vehicle.jpg", "image/jpeg", &frame_jpeg)
            .file("plate", "plate.jpg", "image/jpeg", &plate_jpeg);

        let content_type = form.content_type();
        let body = form.finish();

        let response = ureq::post(&self.endpoint)
            .set("Content-Type", &content_type)
            .send_bytes(&body)
            .with_context(|| format!("post detection to {}", self.endpoint))?;
        log::info!(
            "reported plate {:?} from camera {} ({})",
            event.text,
            event.camera.id,
            response.status()
        );
        Ok(())
    }
}

/// Minimal `multipart/form-data` body builder.
///
/// ureq 2.x has no multipart support, so the body is assembled by hand with a
/// random boundary.
pub struct MultipartForm {
    boundary: String,
    body: Vec<u8>,
}

impl MultipartForm {
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        let suffix: u64 = rng.gen();
        Self {
            boundary: format!("----platewatch-{:016x}", suffix),
            body: Vec::new(),
        }
    }

    pub fn field(mut self, name: &str, value: &str) -> Self {
        self.body
            .extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
        self.body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
        );
        self.body.extend_from_slice(value.as_bytes());
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn file(mut self, name: &str, filename: &str, mime: &str, bytes: &[u8]) -> Self {
        self.body
            .extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
        self.body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                name, filename
            )
            .as_bytes(),
        );
        self.body
            .extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime).as_bytes());
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        self.body
    }
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

/// Queue-backed sink handle held by the camera pipelines.
///
/// `submit` never blocks: when the bounded queue is full the event is dropped
/// with a warning. Event loss is acceptable; stalled pipelines are not.
#[derive(Clone)]
pub struct ReporterHandle {
    tx: SyncSender<DetectionEvent>,
}

impl EventSink for ReporterHandle {
    fn submit(&self, event: DetectionEvent) -> Result<()> {
        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(event)) => {
                log::warn!(
                    "report queue full; dropping event for camera {} (plate {:?})",
                    event.camera.id,
                    event.text
                );
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err(anyhow!("reporter worker has shut down")),
        }
    }
}

/// Background delivery worker.
///
/// Owns the receiving end of the event queue and a single [`HttpSink`].
/// Delivery failures are logged and the event is dropped; there is no retry.
pub struct EventReporter {
    tx: SyncSender<DetectionEvent>,
    worker: Option<JoinHandle<()>>,
}

impl EventReporter {
    pub fn spawn(backend_url: &str, queue_depth: usize) -> Result<Self> {
        let (tx, rx) = mpsc::sync_channel(queue_depth.max(1));
        let sink = HttpSink::new(backend_url);
        let worker = thread::Builder::new()
            .name("reporter".to_string())
            .spawn(move || Self::run(sink, rx))
            .context("spawn reporter worker")?;
        Ok(Self {
            tx,
            worker: Some(worker),
        })
    }

    fn run(sink: HttpSink, rx: Receiver<DetectionEvent>) {
        // Exits when every sender handle is gone.
        while let Ok(event) = rx.recv() {
            if let Err(e) = sink.deliver(&event) {
                log::warn!(
                    "failed to report plate {:?} from camera {}: {:#}",
                    event.text,
                    event.camera.id,
                    e
                );
            }
        }
        log::debug!("reporter worker exiting");
    }

    /// Cheap cloneable handle for pipeline threads.
    pub fn handle(&self) -> ReporterHandle {
        ReporterHandle {
            tx: self.tx.clone(),
        }
    }

    /// Drop the queue and wait for in-flight deliveries to finish.
    ///
    /// Pipeline handles must already be gone, otherwise their senders keep
    /// the worker alive and this blocks.
    pub fn shutdown(self) {
        let EventReporter { tx, worker } = self;
        drop(tx);
        if let Some(worker) = worker {
            if worker.join().is_err() {
                log::warn!("reporter worker panicked during shutdown");
            }
        }
    }
}
