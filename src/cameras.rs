//! Backend camera directory client.
//!
//! The backend owns the camera inventory; this crate only consumes it. The
//! directory is fetched periodically and fed to the orchestrator, which
//! reconciles running pipelines against it.

use std::sync::OnceLock;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

/// One camera record from the backend directory.
///
/// `direction` is the backend's camera "type" (entry/exit); `enabled` is its
/// "status" flag. A record is immutable for the lifetime of a pipeline run;
/// any field change tears the pipeline down for recreation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Camera {
    pub id: String,
    pub url: String,
    pub direction: String,
    pub enabled: bool,
}

/// Raw backend wire shape.
#[derive(Debug, Deserialize)]
struct CameraRecord {
    #[serde(rename = "_id")]
    id: String,
    url: String,
    #[serde(rename = "type")]
    direction: String,
    #[serde(default = "default_status")]
    status: bool,
}

fn default_status() -> bool {
    true
}

/// Camera ids are used as path-ish identifiers downstream (log lines, event
/// fields), so enforce a positive allowlist rather than trying to escape.
///
/// Allowed: "cam_a1", "64f3ab-north-gate". Disallowed: whitespace, slashes,
/// punctuation outside `[_-]`.
pub fn validate_camera_id(id: &str) -> Result<()> {
    // Compile once for hot paths.
    static CAMERA_ID_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = CAMERA_ID_RE.get_or_init(|| regex::Regex::new(r"^[a-z0-9_-]{1,64}$").unwrap());

    if !re.is_match(&id.to_lowercase()) {
        return Err(anyhow!("camera id must match ^[a-z0-9_-]{{1,64}}$"));
    }
    Ok(())
}

impl Camera {
    fn from_record(record: CameraRecord) -> Result<Self> {
        validate_camera_id(&record.id)?;
        url::Url::parse(&record.url)
            .with_context(|| format!("camera {}: invalid stream url {:?}", record.id, record.url))?;
        Ok(Self {
            id: record.id,
            url: record.url,
            direction: record.direction,
            enabled: record.status,
        })
    }
}

/// Fetch the full camera directory from `{backend}/camera`.
///
/// The fetch itself failing is an error (caller logs and keeps its previous
/// view); a malformed individual entry is not. Each array element is parsed
/// on its own so one bad record cannot blank out the whole lot.
pub fn fetch_cameras(backend_url: &str) -> Result<Vec<Camera>> {
    let endpoint = format!("{}/camera", backend_url.trim_end_matches('/'));
    let body = ureq::get(&endpoint)
        .call()
        .with_context(|| format!("fetch camera directory from {}", endpoint))?
        .into_string()
        .context("read camera directory response")?;
    parse_camera_directory(&body)
}

/// Parse a JSON array of camera records, skipping malformed entries.
pub fn parse_camera_directory(body: &str) -> Result<Vec<Camera>> {
    let entries: Vec<serde_json::Value> =
        serde_json::from_str(body).context("camera directory is not a JSON array")?;

    let mut cameras = Vec::with_capacity(entries.len());
    for entry in entries {
        let parsed = serde_json::from_value::<CameraRecord>(entry.clone())
            .map_err(anyhow::Error::from)
            .and_then(Camera::from_record);
        match parsed {
            Ok(camera) => cameras.push(camera),
            Err(e) => log::warn!("skipping malformed camera entry {}: {:#}", entry, e),
        }
    }
    Ok(cameras)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_directory() {
        let body = r#"[
            {"_id": "cam_north", "url": "rtsp://10.0.0.5/stream", "type": "entry", "status": true},
            {"_id": "cam_south", "url": "rtsp://10.0.0.6/stream", "type": "exit", "status": false}
        ]"#;
        let cameras = parse_camera_directory(body).unwrap();
        assert_eq!(cameras.len(), 2);
        assert_eq!(cameras[0].id, "cam_north");
        assert_eq!(cameras[0].direction, "entry");
        assert!(cameras[0].enabled);
        assert!(!cameras[1].enabled);
    }

    #[test]
    fn malformed_entry_is_skipped_not_fatal() {
        let body = r#"[
            {"_id": "cam_ok", "url": "rtsp://10.0.0.5/stream", "type": "entry", "status": true},
            {"url": "rtsp://10.0.0.6/stream"},
            {"_id": "cam bad id", "url": "rtsp://10.0.0.7/stream", "type": "exit", "status": true},
            {"_id": "cam_bad_url", "url": "not a url", "type": "exit", "status": true}
        ]"#;
        let cameras = parse_camera_directory(body).unwrap();
        assert_eq!(cameras.len(), 1);
        assert_eq!(cameras[0].id, "cam_ok");
    }

    #[test]
    fn missing_status_defaults_to_enabled() {
        let body = r#"[{"_id": "cam_a", "url": "stub://demo", "type": "entry"}]"#;
        let cameras = parse_camera_directory(body).unwrap();
        assert!(cameras[0].enabled);
    }

    #[test]
    fn non_array_body_is_an_error() {
        assert!(parse_camera_directory("{}").is_err());
        assert!(parse_camera_directory("not json").is_err());
    }

    #[test]
    fn camera_id_allowlist() {
        assert!(validate_camera_id("cam_a1").is_ok());
        assert!(validate_camera_id("64F3AB-north-gate").is_ok());
        assert!(validate_camera_id("").is_err());
        assert!(validate_camera_id("cam/a").is_err());
        assert!(validate_camera_id("cam a").is_err());
        assert!(validate_camera_id(&"x".repeat(65)).is_err());
    }
}
