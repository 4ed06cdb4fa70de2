use crate::core_modules::frame::CaptureSettings;
use crate::core_modules::history::{GENERAL_HISTORY_CAP, PERSON_HISTORY_CAP};
use crate::core_modules::sample_buffer::REQUIRED_SAMPLES;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

/// Configuration for a detection session, allowing for tunable behavior.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Root of the backend, e.g. `http://127.0.0.1:8000`.
    pub base_url: String,
    /// Period of the detection poll loop.
    pub poll_interval: Duration,
    /// Delay before the first tick after a start.
    pub first_tick_delay: Duration,
    /// Period of the elapsed-time display refresh.
    pub clock_interval: Duration,
    /// Delay of the out-of-cycle poll scheduled after the operator resumes.
    pub resume_poll_delay: Duration,
    pub detect_timeout: Duration,
    pub save_timeout: Duration,
    pub upload_timeout: Duration,
    /// Observations per persisted batch.
    pub required_samples: usize,
    pub person_history_cap: usize,
    pub general_history_cap: usize,
    /// Minimum gap between two identical error notifications.
    pub error_cooldown: Duration,
    pub capture_width: u32,
    pub capture_height: u32,
    pub jpeg_quality: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            poll_interval: Duration::from_millis(1000),
            first_tick_delay: Duration::from_millis(1000),
            clock_interval: Duration::from_millis(1000),
            resume_poll_delay: Duration::from_millis(500),
            detect_timeout: Duration::from_secs(5),
            save_timeout: Duration::from_secs(5),
            upload_timeout: Duration::from_secs(300),
            required_samples: REQUIRED_SAMPLES,
            person_history_cap: PERSON_HISTORY_CAP,
            general_history_cap: GENERAL_HISTORY_CAP,
            error_cooldown: Duration::from_secs(5),
            capture_width: 640,
            capture_height: 480,
            jpeg_quality: 60,
        }
    }
}

impl SessionConfig {
    /// Defaults overlaid with `EMOSCAN_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from any key/value lookup. Unparseable values are
    /// logged and ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup("EMOSCAN_BASE_URL").filter(|v| !v.trim().is_empty()) {
            self.base_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "EMOSCAN_POLL_MS") {
            if ms > 0 {
                self.poll_interval = Duration::from_millis(ms);
            }
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "EMOSCAN_DETECT_TIMEOUT_MS") {
            self.detect_timeout = Duration::from_millis(ms);
        }
        if let Some(quality) = parse_var::<u8>(&lookup, "EMOSCAN_JPEG_QUALITY") {
            self.jpeg_quality = quality.clamp(1, 100);
        }
        self
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            max_width: self.capture_width,
            max_height: self.capture_height,
            quality: self.jpeg_quality,
        }
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}: cannot parse {:?}", key, raw);
            None
        }
    }
}
