//! Pipeline lifecycle management.
//!
//! The orchestrator owns the map of running pipelines, keyed by camera id,
//! and reconciles it against the camera directory on every refresh. The
//! directory is the single source of truth: cameras appearing there start,
//! cameras disabled or gone stop, cameras whose record changed are torn down
//! and recreated with the new record.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{Context, Result};

use crate::cameras::Camera;
use crate::config::PlatewatchConfig;
use crate::detect::{PlateDetector, PlateRecognizer};
use crate::ingest;
use crate::pipeline::CameraPipeline;
use crate::report::EventSink;

struct PipelineHandle {
    camera: Camera,
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl PipelineHandle {
    fn stop_and_join(self) {
        self.stop.store(true, Ordering::Relaxed);
        if self.thread.join().is_err() {
            log::error!("camera {}: pipeline thread panicked", self.camera.id);
        }
    }
}

pub struct Orchestrator {
    pipelines: HashMap<String, PipelineHandle>,
    detector: Arc<PlateDetector>,
    recognizer: Arc<PlateRecognizer>,
    sink: Arc<dyn EventSink>,
    config: PlatewatchConfig,
}

impl Orchestrator {
    pub fn new(
        detector: Arc<PlateDetector>,
        recognizer: Arc<PlateRecognizer>,
        sink: Arc<dyn EventSink>,
        config: PlatewatchConfig,
    ) -> Self {
        Self {
            pipelines: HashMap::new(),
            detector,
            recognizer,
            sink,
            config,
        }
    }

    pub fn running_cameras(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.pipelines.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Drive the running set toward `desired`. Idempotent: reconciling the
    /// same directory twice is a no-op the second time.
    ///
    /// A pipeline that exited on its own (stream end, read failure) is reaped
    /// here and, if its camera is still desired, restarted on the same pass.
    pub fn reconcile(&mut self, desired: &[Camera]) {
        self.reap_finished();

        let desired_by_id: HashMap<&str, &Camera> = desired
            .iter()
            .map(|camera| (camera.id.as_str(), camera))
            .collect();

        // Stop pass: disabled, removed, or changed records.
        let stale: Vec<String> = self
            .pipelines
            .iter()
            .filter(|(id, handle)| match desired_by_id.get(id.as_str()) {
                Some(camera) => !camera.enabled || **camera != handle.camera,
                None => true,
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in stale {
            if let Some(handle) = self.pipelines.remove(&id) {
                log::info!("camera {}: stopping pipeline (directory change)", id);
                handle.stop_and_join();
            }
        }

        // Start pass: enabled cameras without a running pipeline. A spawn
        // failure skips the camera until the next reconcile.
        for camera in desired {
            if !camera.enabled || self.pipelines.contains_key(&camera.id) {
                continue;
            }
            match self.spawn(camera.clone()) {
                Ok(handle) => {
                    self.pipelines.insert(camera.id.clone(), handle);
                }
                Err(e) => {
                    log::warn!("camera {}: failed to start pipeline: {:#}", camera.id, e);
                }
            }
        }
    }

    /// Stop every pipeline and wait for the threads to exit. Flags are
    /// raised before any join so pipelines wind down in parallel.
    pub fn shutdown(&mut self) {
        for handle in self.pipelines.values() {
            handle.stop.store(true, Ordering::Relaxed);
        }
        for (_, handle) in self.pipelines.drain() {
            handle.stop_and_join();
        }
    }

    fn reap_finished(&mut self) {
        let finished: Vec<String> = self
            .pipelines
            .iter()
            .filter(|(_, handle)| handle.thread.is_finished())
            .map(|(id, _)| id.clone())
            .collect();
        for id in finished {
            if let Some(handle) = self.pipelines.remove(&id) {
                log::info!("camera {}: reaping exited pipeline", id);
                handle.stop_and_join();
            }
        }
    }

    fn spawn(&self, camera: Camera) -> Result<PipelineHandle> {
        let source = ingest::source_for_camera(&camera)?;
        let pipeline = CameraPipeline::new(
            camera.clone(),
            Arc::clone(&self.detector),
            Arc::clone(&self.recognizer),
            self.config.clone(),
        );
        let sink = Arc::clone(&self.sink);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let camera_id = camera.id.clone();
        let thread = std::thread::Builder::new()
            .name(format!("pipeline-{}", camera.id))
            .spawn(move || {
                if let Err(e) = pipeline.run(source, sink.as_ref(), &stop_flag) {
                    log::error!("camera {}: pipeline failed: {:#}", camera_id, e);
                }
            })
            .context("spawn pipeline thread")?;
        log::info!("camera {}: pipeline spawned ({})", camera.id, camera.url);
        Ok(PipelineHandle {
            camera,
            stop,
            thread,
        })
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
