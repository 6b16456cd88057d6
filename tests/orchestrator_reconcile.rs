//! Orchestrator reconciliation against a changing camera directory.
//!
//! Pipelines run against synthetic `stub://` streams with the deterministic
//! stub inference backend, so these tests exercise real threads without any
//! network or model files.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;

use platewatch::config::{
    DetectionSettings, ModelSettings, PlatewatchConfig, RecognitionSettings,
};
use platewatch::{
    Camera, DetectionEvent, EventSink, Orchestrator, PlateDetector, PlateRecognizer, StubBackend,
};

#[derive(Default)]
struct CollectorSink {
    events: Mutex<Vec<DetectionEvent>>,
}

impl EventSink for CollectorSink {
    fn submit(&self, event: DetectionEvent) -> Result<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

fn test_config() -> PlatewatchConfig {
    PlatewatchConfig {
        backend_url: "http://127.0.0.1:1".to_string(),
        refresh: Duration::from_secs(30),
        poll_interval: Duration::from_millis(1),
        finalize_timeout: Duration::from_millis(50),
        report_queue_depth: 16,
        detection: DetectionSettings {
            confidence_floor: 0.7,
            iou_threshold: 0.4,
        },
        recognition: RecognitionSettings {
            confidence_floor: 0.7,
            score_threshold: 0.6,
            iou_threshold: 0.4,
        },
        models: ModelSettings {
            detector_path: String::new(),
            recognizer_path: String::new(),
            vocabulary_path: String::new(),
        },
    }
}

fn orchestrator() -> Orchestrator {
    let detector = Arc::new(PlateDetector::new(Arc::new(StubBackend::new()), 0.7, 0.4));
    let recognizer = Arc::new(
        PlateRecognizer::new(
            Arc::new(StubBackend::new()),
            vec!["X".to_string()],
            0.7,
            0.6,
            0.4,
        )
        .expect("recognizer"),
    );
    Orchestrator::new(
        detector,
        recognizer,
        Arc::new(CollectorSink::default()),
        test_config(),
    )
}

fn camera(id: &str, enabled: bool) -> Camera {
    Camera {
        id: id.to_string(),
        url: format!("stub://{}", id),
        direction: "entry".to_string(),
        enabled,
    }
}

#[test]
fn starts_enabled_cameras_and_is_idempotent() {
    let mut orch = orchestrator();
    let directory = vec![camera("cam_a", true), camera("cam_b", true)];

    orch.reconcile(&directory);
    assert_eq!(orch.running_cameras(), vec!["cam_a", "cam_b"]);

    // Same directory again: no churn, same running set.
    orch.reconcile(&directory);
    assert_eq!(orch.running_cameras(), vec!["cam_a", "cam_b"]);

    orch.shutdown();
    assert!(orch.running_cameras().is_empty());
}

#[test]
fn disabled_camera_never_starts() {
    let mut orch = orchestrator();
    orch.reconcile(&[camera("cam_a", true), camera("cam_b", false)]);
    assert_eq!(orch.running_cameras(), vec!["cam_a"]);
    orch.shutdown();
}

#[test]
fn removed_and_disabled_cameras_stop() {
    let mut orch = orchestrator();
    orch.reconcile(&[camera("cam_a", true), camera("cam_b", true)]);
    assert_eq!(orch.running_cameras(), vec!["cam_a", "cam_b"]);

    // cam_a disabled in place, cam_b gone from the directory.
    orch.reconcile(&[camera("cam_a", false)]);
    assert!(orch.running_cameras().is_empty());
    orch.shutdown();
}

#[test]
fn changed_record_restarts_pipeline() {
    let mut orch = orchestrator();
    orch.reconcile(&[camera("cam_a", true)]);
    assert_eq!(orch.running_cameras(), vec!["cam_a"]);

    // New stream url for the same id: torn down and recreated on one pass.
    let mut changed = camera("cam_a", true);
    changed.url = "stub://cam_a_new_feed".to_string();
    orch.reconcile(&[changed]);
    assert_eq!(orch.running_cameras(), vec!["cam_a"]);
    orch.shutdown();
}

#[test]
fn unstartable_camera_does_not_block_others() {
    let mut orch = orchestrator();
    // rtsp:// needs the GStreamer feature; without it the spawn fails and
    // the camera is skipped until the next reconcile.
    let mut bad = camera("cam_bad", true);
    bad.url = "rtsp://10.0.0.9/stream".to_string();

    orch.reconcile(&[bad, camera("cam_ok", true)]);

    #[cfg(not(feature = "rtsp-gstreamer"))]
    assert_eq!(orch.running_cameras(), vec!["cam_ok"]);
    #[cfg(feature = "rtsp-gstreamer")]
    assert!(orch.running_cameras().contains(&"cam_ok".to_string()));

    orch.shutdown();
}

#[test]
fn daemon_shutdown_sequence_terminates() {
    use platewatch::EventReporter;
    use std::sync::mpsc;

    // The daemon's teardown order: stop pipelines, release the orchestrator
    // (and with it the sink's sender clone), then join the reporter worker.
    let (done_tx, done_rx) = mpsc::channel();
    std::thread::spawn(move || {
        let detector = Arc::new(PlateDetector::new(Arc::new(StubBackend::new()), 0.7, 0.4));
        let recognizer = Arc::new(
            PlateRecognizer::new(
                Arc::new(StubBackend::new()),
                vec!["X".to_string()],
                0.7,
                0.6,
                0.4,
            )
            .expect("recognizer"),
        );
        let reporter = EventReporter::spawn("http://127.0.0.1:1", 4).expect("spawn reporter");
        let mut orch = Orchestrator::new(
            detector,
            recognizer,
            Arc::new(reporter.handle()),
            test_config(),
        );
        orch.reconcile(&[camera("cam_a", true)]);

        orch.shutdown();
        drop(orch);
        reporter.shutdown();
        let _ = done_tx.send(());
    });

    done_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("shutdown sequence must terminate");
}

#[test]
fn shutdown_is_terminal_and_repeatable() {
    let mut orch = orchestrator();
    orch.reconcile(&[camera("cam_a", true)]);
    orch.shutdown();
    orch.shutdown();
    assert!(orch.running_cameras().is_empty());
}
