//! platewatchd - parking-lot license plate recognition daemon
//!
//! This daemon:
//! 1. Loads configuration (file + environment)
//! 2. Loads the shared detection and recognition models once
//! 3. Spawns the background event reporter
//! 4. Periodically fetches the camera directory from the backend
//! 5. Reconciles one pipeline thread per enabled camera against it
//! 6. Shuts pipelines and the reporter down cleanly on Ctrl-C

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use platewatch::{
    cameras, config::PlatewatchConfig, detect::StubBackend, EventReporter, ModelBackend,
    Orchestrator, PlateDetector, PlateRecognizer,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Run with the deterministic stub inference backend (no model files).
    #[arg(long)]
    stub_backend: bool,
    /// Override the backend base URL from the command line.
    #[arg(long, env = "PLATEWATCH_BACKEND_URL")]
    backend_url: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = Args::parse();
    let mut cfg = PlatewatchConfig::load()?;
    if let Some(url) = args.backend_url.take() {
        cfg.backend_url = url;
    }

    let (detector_backend, recognizer_backend) = load_backends(&args, &cfg)?;
    log::info!(
        "inference backends: detect={}, recognize={}",
        detector_backend.name(),
        recognizer_backend.name()
    );

    let vocabulary = if args.stub_backend {
        // The stub backend emits class id 0 only.
        vec!["X".to_string()]
    } else {
        PlateRecognizer::load_vocabulary(&cfg.models.vocabulary_path)?
    };

    let detector = Arc::new(PlateDetector::new(
        detector_backend,
        cfg.detection.confidence_floor,
        cfg.detection.iou_threshold,
    ));
    let recognizer = Arc::new(PlateRecognizer::new(
        recognizer_backend,
        vocabulary,
        cfg.recognition.confidence_floor,
        cfg.recognition.score_threshold,
        cfg.recognition.iou_threshold,
    )?);

    let reporter = EventReporter::spawn(&cfg.backend_url, cfg.report_queue_depth)?;
    let mut orchestrator = Orchestrator::new(
        detector,
        recognizer,
        Arc::new(reporter.handle()),
        cfg.clone(),
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        log::info!("shutdown requested");
        shutdown_flag.store(true, Ordering::Relaxed);
    })
    .context("install signal handler")?;

    log::info!(
        "platewatchd running. backend={}, refresh={}s, poll={}ms",
        cfg.backend_url,
        cfg.refresh.as_secs(),
        cfg.poll_interval.as_millis()
    );

    let mut last_refresh: Option<Instant> = None;
    while !shutdown.load(Ordering::Relaxed) {
        let due = last_refresh.map_or(true, |at| at.elapsed() >= cfg.refresh);
        if due {
            last_refresh = Some(Instant::now());
            // A failed fetch keeps the previous running set; pipelines are
            // never torn down on backend outage alone.
            match cameras::fetch_cameras(&cfg.backend_url) {
                Ok(directory) => {
                    log::debug!("camera directory: {} entries", directory.len());
                    orchestrator.reconcile(&directory);
                }
                Err(e) => log::warn!("camera directory fetch failed: {:#}", e),
            }
        }
        std::thread::sleep(Duration::from_millis(200));
    }

    orchestrator.shutdown();
    // The orchestrator's sink holds a sender clone; the reporter worker only
    // exits once every sender is gone, so release it before joining.
    drop(orchestrator);
    reporter.shutdown();
    log::info!("platewatchd stopped");
    Ok(())
}

fn load_backends(
    args: &Args,
    cfg: &PlatewatchConfig,
) -> Result<(Arc<dyn ModelBackend>, Arc<dyn ModelBackend>)> {
    if args.stub_backend {
        return Ok((Arc::new(StubBackend::new()), Arc::new(StubBackend::new())));
    }
    #[cfg(feature = "backend-tract")]
    {
        use platewatch::detect::TractBackend;
        // Input geometries the shipped models were exported with.
        const DETECT_INPUT: (u32, u32) = (224, 224);
        const RECOGNIZE_INPUT: (u32, u32) = (240, 120);
        let detector = TractBackend::new(&cfg.models.detector_path, DETECT_INPUT.0, DETECT_INPUT.1)
            .with_context(|| format!("load detector model {}", cfg.models.detector_path))?;
        let recognizer = TractBackend::new(
            &cfg.models.recognizer_path,
            RECOGNIZE_INPUT.0,
            RECOGNIZE_INPUT.1,
        )
        .with_context(|| format!("load recognizer model {}", cfg.models.recognizer_path))?;
        Ok((Arc::new(detector), Arc::new(recognizer)))
    }
    #[cfg(not(feature = "backend-tract"))]
    {
        let _ = cfg;
        anyhow::bail!(
            "built without the backend-tract feature; rerun with --stub-backend or rebuild \
             with --features backend-tract"
        )
    }
}
