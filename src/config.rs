use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_REFRESH_SECS: u64 = 30;
const DEFAULT_POLL_INTERVAL_MS: u64 = 30;
const DEFAULT_FINALIZE_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_REPORT_QUEUE_DEPTH: usize = 64;
const DEFAULT_DETECTION_CONFIDENCE_FLOOR: f32 = 0.7;
const DEFAULT_DETECTION_IOU: f32 = 0.4;
const DEFAULT_RECOGNITION_CONFIDENCE_FLOOR: f32 = 0.7;
const DEFAULT_RECOGNITION_SCORE_THRESHOLD: f32 = 0.6;
const DEFAULT_RECOGNITION_IOU: f32 = 0.4;
const DEFAULT_DETECTOR_MODEL_PATH: &str = "models/plate_detect.onnx";
const DEFAULT_RECOGNIZER_MODEL_PATH: &str = "models/char_recognize.onnx";
const DEFAULT_VOCABULARY_PATH: &str = "models/char_names.txt";

#[derive(Debug, Deserialize, Default)]
struct PlatewatchConfigFile {
    backend_url: Option<String>,
    refresh_secs: Option<u64>,
    poll_interval_ms: Option<u64>,
    finalize_timeout_ms: Option<u64>,
    report_queue_depth: Option<usize>,
    detection: Option<DetectionConfigFile>,
    recognition: Option<RecognitionConfigFile>,
    models: Option<ModelConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    confidence_floor: Option<f32>,
    iou_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct RecognitionConfigFile {
    confidence_floor: Option<f32>,
    score_threshold: Option<f32>,
    iou_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    detector_path: Option<String>,
    recognizer_path: Option<String>,
    vocabulary_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PlatewatchConfig {
    pub backend_url: String,
    pub refresh: Duration,
    pub poll_interval: Duration,
    pub finalize_timeout: Duration,
    pub report_queue_depth: usize,
    pub detection: DetectionSettings,
    pub recognition: RecognitionSettings,
    pub models: ModelSettings,
}

#[derive(Debug, Clone)]
pub struct DetectionSettings {
    pub confidence_floor: f32,
    pub iou_threshold: f32,
}

#[derive(Debug, Clone)]
pub struct RecognitionSettings {
    pub confidence_floor: f32,
    pub score_threshold: f32,
    pub iou_threshold: f32,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub detector_path: String,
    pub recognizer_path: String,
    pub vocabulary_path: String,
}

impl PlatewatchConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PLATEWATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PlatewatchConfigFile) -> Self {
        let backend_url = file
            .backend_url
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());
        let refresh = Duration::from_secs(file.refresh_secs.unwrap_or(DEFAULT_REFRESH_SECS));
        let poll_interval =
            Duration::from_millis(file.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS));
        let finalize_timeout = Duration::from_millis(
            file.finalize_timeout_ms
                .unwrap_or(DEFAULT_FINALIZE_TIMEOUT_MS),
        );
        let report_queue_depth = file
            .report_queue_depth
            .unwrap_or(DEFAULT_REPORT_QUEUE_DEPTH);
        let detection = DetectionSettings {
            confidence_floor: file
                .detection
                .as_ref()
                .and_then(|d| d.confidence_floor)
                .unwrap_or(DEFAULT_DETECTION_CONFIDENCE_FLOOR),
            iou_threshold: file
                .detection
                .as_ref()
                .and_then(|d| d.iou_threshold)
                .unwrap_or(DEFAULT_DETECTION_IOU),
        };
        let recognition = RecognitionSettings {
            confidence_floor: file
                .recognition
                .as_ref()
                .and_then(|r| r.confidence_floor)
                .unwrap_or(DEFAULT_RECOGNITION_CONFIDENCE_FLOOR),
            score_threshold: file
                .recognition
                .as_ref()
                .and_then(|r| r.score_threshold)
                .unwrap_or(DEFAULT_RECOGNITION_SCORE_THRESHOLD),
            iou_threshold: file
                .recognition
                .as_ref()
                .and_then(|r| r.iou_threshold)
                .unwrap_or(DEFAULT_RECOGNITION_IOU),
        };
        let models = ModelSettings {
            detector_path: file
                .models
                .as_ref()
                .and_then(|m| m.detector_path.clone())
                .unwrap_or_else(|| DEFAULT_DETECTOR_MODEL_PATH.to_string()),
            recognizer_path: file
                .models
                .as_ref()
                .and_then(|m| m.recognizer_path.clone())
                .unwrap_or_else(|| DEFAULT_RECOGNIZER_MODEL_PATH.to_string()),
            vocabulary_path: file
                .models
                .and_then(|m| m.vocabulary_path)
                .unwrap_or_else(|| DEFAULT_VOCABULARY_PATH.to_string()),
        };
        Self {
            backend_url,
            refresh,
            poll_interval,
            finalize_timeout,
            report_queue_depth,
            detection,
            recognition,
            models,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("PLATEWATCH_BACKEND_URL") {
            if !url.trim().is_empty() {
                self.backend_url = url;
            }
        }
        if let Ok(secs) = std::env::var("PLATEWATCH_REFRESH_SECS") {
            let seconds: u64 = secs.parse().map_err(|_| {
                anyhow!("PLATEWATCH_REFRESH_SECS must be an integer number of seconds")
            })?;
            self.refresh = Duration::from_secs(seconds);
        }
        if let Ok(ms) = std::env::var("PLATEWATCH_POLL_INTERVAL_MS") {
            let millis: u64 = ms.parse().map_err(|_| {
                anyhow!("PLATEWATCH_POLL_INTERVAL_MS must be an integer number of milliseconds")
            })?;
            self.poll_interval = Duration::from_millis(millis);
        }
        if let Ok(ms) = std::env::var("PLATEWATCH_FINALIZE_TIMEOUT_MS") {
            let millis: u64 = ms.parse().map_err(|_| {
                anyhow!("PLATEWATCH_FINALIZE_TIMEOUT_MS must be an integer number of milliseconds")
            })?;
            self.finalize_timeout = Duration::from_millis(millis);
        }
        if let Ok(floor) = std::env::var("PLATEWATCH_CONFIDENCE_FLOOR") {
            let value: f32 = floor
                .parse()
                .map_err(|_| anyhow!("PLATEWATCH_CONFIDENCE_FLOOR must be a number"))?;
            self.detection.confidence_floor = value;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        url::Url::parse(&self.backend_url)
            .map_err(|e| anyhow!("backend_url {:?} is not a valid url: {}", self.backend_url, e))?;
        if self.poll_interval.is_zero() {
            return Err(anyhow!("poll_interval_ms must be greater than zero"));
        }
        if self.finalize_timeout < self.poll_interval {
            return Err(anyhow!(
                "finalize_timeout_ms must be at least one poll interval, otherwise every \
                 transit finalizes after a single missed frame"
            ));
        }
        if self.report_queue_depth == 0 {
            return Err(anyhow!("report_queue_depth must be greater than zero"));
        }
        for (name, value) in [
            ("detection.confidence_floor", self.detection.confidence_floor),
            ("detection.iou_threshold", self.detection.iou_threshold),
            (
                "recognition.confidence_floor",
                self.recognition.confidence_floor,
            ),
            (
                "recognition.score_threshold",
                self.recognition.score_threshold,
            ),
            ("recognition.iou_threshold", self.recognition.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be within 0.0..=1.0", name));
            }
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<PlatewatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
