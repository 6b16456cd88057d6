//! Per-camera processing pipeline.
//!
//! One pipeline owns one camera end to end: its frame source, a handle to
//! the shared detector/recognizer, and its private observation accumulator.
//! Pipelines never touch each other's state; the only shared pieces are the
//! read-only models and the reporter queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};

use crate::cameras::Camera;
use crate::config::PlatewatchConfig;
use crate::detect::{PlateDetector, PlateRecognizer};
use crate::ingest::FrameSource;
use crate::observe::{Observation, ObservationAccumulator};
use crate::report::{DetectionEvent, EventSink};

const STATS_LOG_EVERY_TICKS: u64 = 1_000;

pub struct CameraPipeline {
    camera: Camera,
    detector: Arc<PlateDetector>,
    recognizer: Arc<PlateRecognizer>,
    accumulator: ObservationAccumulator,
    config: PlatewatchConfig,
}

impl CameraPipeline {
    pub fn new(
        camera: Camera,
        detector: Arc<PlateDetector>,
        recognizer: Arc<PlateRecognizer>,
        config: PlatewatchConfig,
    ) -> Self {
        let accumulator = ObservationAccumulator::new(config.finalize_timeout);
        Self {
            camera,
            detector,
            recognizer,
            accumulator,
            config,
        }
    }

    /// Run the tick loop until the stream ends, a read fails, or `stop` is
    /// raised. Always leaves the accumulator flushed; the source's stream
    /// handle is released when `source` drops on return.
    pub fn run(
        mut self,
        mut source: Box<dyn FrameSource>,
        sink: &dyn EventSink,
        stop: &AtomicBool,
    ) -> Result<()> {
        source
            .connect()
            .with_context(|| format!("camera {}: open stream", self.camera.id))?;
        log::info!("camera {}: pipeline started", self.camera.id);

        let mut ticks: u64 = 0;
        loop {
            if stop.load(Ordering::Relaxed) {
                self.finalize(sink, Instant::now());
                log::info!("camera {}: pipeline stopped", self.camera.id);
                return Ok(());
            }

            let tick_started = Instant::now();
            match source.next_frame() {
                Ok(Some(frame)) => {
                    self.process_frame(&frame, sink, tick_started);
                }
                Ok(None) => {
                    self.finalize(sink, Instant::now());
                    log::info!("camera {}: stream ended", self.camera.id);
                    return Ok(());
                }
                Err(e) => {
                    self.finalize(sink, Instant::now());
                    return Err(e)
                        .with_context(|| format!("camera {}: stream read failed", self.camera.id));
                }
            }

            ticks += 1;
            if ticks % STATS_LOG_EVERY_TICKS == 0 {
                let stats = source.stats();
                if source.is_healthy() {
                    log::debug!(
                        "camera {}: {} frames captured from {}",
                        self.camera.id,
                        stats.frames_captured,
                        stats.url
                    );
                } else {
                    log::warn!(
                        "camera {}: source unhealthy after {} frames ({})",
                        self.camera.id,
                        stats.frames_captured,
                        stats.url
                    );
                }
            }

            // Sleep only the remainder of the poll interval; inference time
            // counts against it.
            let elapsed = tick_started.elapsed();
            if let Some(remaining) = self.config.poll_interval.checked_sub(elapsed) {
                std::thread::sleep(remaining);
            }
        }
    }

    /// One tick with a frame in hand: detect, recognize each plate, feed the
    /// accumulator. A tick that yields no detections instead evaluates the
    /// debounce timeout.
    fn process_frame(&mut self, frame: &crate::frame::Frame, sink: &dyn EventSink, now: Instant) {
        let detections = match self.detector.detect(frame) {
            Ok(detections) => detections,
            Err(e) => {
                // Inference failure on one frame is not fatal to the run, but
                // it does not count as a detection either.
                log::warn!("camera {}: detection failed: {:#}", self.camera.id, e);
                Vec::new()
            }
        };

        if detections.is_empty() {
            if let Some(observation) = self.accumulator.tick(now) {
                self.emit(sink, observation);
            }
            return;
        }

        for detection in detections {
            let plate = frame.crop(&detection.bbox);
            let text = match self.recognizer.recognize(&plate) {
                Ok(text) => text,
                Err(e) => {
                    log::warn!("camera {}: recognition failed: {:#}", self.camera.id, e);
                    continue;
                }
            };
            self.accumulator.record(
                Observation {
                    confidence: detection.score,
                    text,
                    plate,
                    frame: frame.clone(),
                },
                now,
            );
        }
    }

    fn finalize(&mut self, sink: &dyn EventSink, now: Instant) {
        if let Some(observation) = self.accumulator.flush(now) {
            self.emit(sink, observation);
        }
    }

    fn emit(&self, sink: &dyn EventSink, observation: Observation) {
        log::info!(
            "camera {}: vehicle passed, plate {:?} (confidence {:.2})",
            self.camera.id,
            observation.text,
            observation.confidence
        );
        let event = DetectionEvent {
            camera: self.camera.clone(),
            text: observation.text,
            frame: observation.frame,
            plate: observation.plate,
        };
        if let Err(e) = sink.submit(event) {
            log::warn!("camera {}: event submission failed: {:#}", self.camera.id, e);
        }
    }
}
