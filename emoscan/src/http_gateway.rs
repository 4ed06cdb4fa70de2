//! `DetectionGateway` over the dashboard backend's JSON API.
//!
//! Requests are made with a blocking `ureq` agent on tokio's blocking pool. Each
//! request carries its own socket timeout matching the budget the controller
//! applies, so an abandoned call does not pin a blocking thread for long.

use crate::config::SessionConfig;
use crate::core_modules::camera_slots::CameraInfo;
use crate::core_modules::observation::{Observation, PendingResult};
use crate::core_modules::subject::SubjectId;
use crate::core_modules::upload::{RosterFile, UploadReport};
use crate::error::GatewayError;
use crate::gateway::{
    Ack, CameraConfig, Detection, DetectionGateway, PersistReport, WorkerLaunch, WorkerStatus,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;
use ureq::{Agent, AgentBuilder, Response};

const CAMERA_CONFIG_PATH: &str = "/api/camera-config/";
const DETECT_PATH: &str = "/api/detect-emotion/";
const SAVE_BATCH_PATH: &str = "/api/save-emotion/";
const SAVE_SINGLE_PATH: &str = "/api/save-camera-log/";
const CAMERAS_PATH: &str = "/api/cameras/";
const UPLOAD_PATH: &str = "/api/upload-excel/";
const START_WORKERS_PATH: &str = "/cemera/start-workers/";
const STOP_WORKERS_PATH: &str = "/cemera/stop-workers/";
const WORKER_STATUS_PATH: &str = "/cemera/worker-status/";

/// Multipart field the import endpoint reads the roster from.
const ROSTER_FIELD: &str = "excel_file";

#[derive(Debug, Clone)]
pub struct HttpGateway {
    agent: Agent,
    config: SessionConfig,
}

#[derive(Debug, Deserialize)]
struct CameraList {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    cameras: Vec<CameraInfo>,
    #[serde(default)]
    error: Option<String>,
}

impl HttpGateway {
    pub fn new(config: SessionConfig) -> Self {
        let agent = AgentBuilder::new().timeout_connect(Duration::from_secs(5)).build();
        Self { agent, config }
    }

    /// Runs a blocking request on the blocking pool.
    async fn blocking<T, F>(&self, request: F) -> Result<T, GatewayError>
    where
        T: Send + 'static,
        F: FnOnce(Agent) -> Result<T, GatewayError> + Send + 'static,
    {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || request(agent))
            .await
            .map_err(|err| GatewayError::Transport(format!("request task failed: {err}")))?
    }

    fn url(&self, path: &str) -> String {
        self.config.endpoint(path)
    }

    /// Body-less JSON POST used by the worker control endpoints.
    async fn post_command<T>(&self, path: &str) -> Result<T, GatewayError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let url = self.url(path);
        let timeout = self.config.save_timeout;
        self.blocking(move |agent| {
            let response = agent
                .post(&url)
                .timeout(timeout)
                .set("Content-Type", "application/json")
                .call()
                .map_err(map_error)?;
            decode(response)
        })
        .await
    }
}

impl DetectionGateway for HttpGateway {
    async fn check_camera(&self) -> Result<CameraConfig, GatewayError> {
        let url = self.url(CAMERA_CONFIG_PATH);
        let timeout = self.config.detect_timeout;
        self.blocking(move |agent| {
            let response = agent.get(&url).timeout(timeout).call().map_err(map_error)?;
            decode(response)
        })
        .await
    }

    async fn detect_emotion(&self, image: Vec<u8>) -> Result<Detection, GatewayError> {
        let url = self.url(DETECT_PATH);
        let timeout = self.config.detect_timeout;
        self.blocking(move |agent| {
            debug!(bytes = image.len(), "detect request");
            let body = json!({ "image": data_url(&image) });
            let response = agent.post(&url).timeout(timeout).send_json(body).map_err(map_error)?;
            decode(response)
        })
        .await
    }

    async fn persist_samples(
        &self,
        samples: Vec<Observation>,
        subject_id: Option<SubjectId>,
    ) -> Result<PersistReport, GatewayError> {
        let url = self.url(SAVE_BATCH_PATH);
        let timeout = self.config.save_timeout;
        self.blocking(move |agent| {
            let body = batch_payload(&samples, subject_id);
            let response = agent.post(&url).timeout(timeout).send_json(body).map_err(map_error)?;
            decode(response)
        })
        .await
    }

    async fn persist_single(&self, result: PendingResult) -> Result<Ack, GatewayError> {
        let url = self.url(SAVE_SINGLE_PATH);
        let timeout = self.config.save_timeout;
        self.blocking(move |agent| {
            let body = single_payload(&result);
            let response = agent.post(&url).timeout(timeout).send_json(body).map_err(map_error)?;
            decode(response)
        })
        .await
    }

    async fn list_cameras(&self) -> Result<Vec<CameraInfo>, GatewayError> {
        let url = self.url(CAMERAS_PATH);
        let timeout = self.config.detect_timeout;
        let list: CameraList = self
            .blocking(move |agent| {
                let response = agent
                    .get(&url)
                    .timeout(timeout)
                    .set("Cache-Control", "no-cache")
                    .call()
                    .map_err(map_error)?;
                decode(response)
            })
            .await?;

        if list.success {
            Ok(list.cameras)
        } else {
            Err(GatewayError::from_backend_message(
                200,
                list.error.unwrap_or_else(|| "camera list unavailable".to_string()),
            ))
        }
    }

    async fn upload_roster(&self, file: RosterFile) -> Result<UploadReport, GatewayError> {
        let url = self.url(UPLOAD_PATH);
        let timeout = self.config.upload_timeout;
        self.blocking(move |agent| {
            let boundary = multipart_boundary();
            let body = multipart_body(&boundary, ROSTER_FIELD, &file);
            let response = agent
                .post(&url)
                .timeout(timeout)
                .set("Content-Type", &format!("multipart/form-data; boundary={boundary}"))
                .send_bytes(&body)
                .map_err(map_error)?;
            decode(response)
        })
        .await
    }

    async fn start_workers(&self) -> Result<WorkerLaunch, GatewayError> {
        self.post_command(START_WORKERS_PATH).await
    }

    async fn stop_workers(&self) -> Result<Ack, GatewayError> {
        self.post_command(STOP_WORKERS_PATH).await
    }

    async fn worker_status(&self) -> Result<WorkerStatus, GatewayError> {
        let url = self.url(WORKER_STATUS_PATH);
        let timeout = self.config.detect_timeout;
        self.blocking(move |agent| {
            let response = agent.get(&url).timeout(timeout).call().map_err(map_error)?;
            decode(response)
        })
        .await
    }
}

fn data_url(jpeg: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(jpeg))
}

fn batch_payload(samples: &[Observation], subject_id: Option<SubjectId>) -> Value {
    let mut body = json!({ "s": samples });
    if let Some(id) = subject_id {
        body["person_id"] = json!(id);
    }
    body
}

fn single_payload(result: &PendingResult) -> Value {
    let localized = result
        .localized_label
        .clone()
        .or_else(|| result.observation.kind().map(|kind| kind.localized().to_string()));
    json!({
        "person_id": result.subject_id,
        "emotion": result.observation.emotion_label,
        "emotion_uz": localized,
        "emotion_confidence": result.observation.confidence,
    })
}

fn multipart_boundary() -> String {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("----emoscan{nanos:x}")
}

fn multipart_body(boundary: &str, field: &str, file: &RosterFile) -> Vec<u8> {
    let filename = file.name.replace('"', "");
    let mut body = Vec::with_capacity(file.bytes.len() + 256);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", file.content_type()).as_bytes());
    body.extend_from_slice(&file.bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

/// Decodes a 2xx body. A body of `{"success": false, "error": ...}` is a backend
/// error even with a 2xx status.
fn decode<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
    let status = response.status();
    let value: Value = response
        .into_json()
        .map_err(|err| GatewayError::Decode(err.to_string()))?;
    if value.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(GatewayError::from_backend_message(status, backend_message(&value)));
    }
    serde_json::from_value(value).map_err(|err| GatewayError::Decode(err.to_string()))
}

fn map_error(err: ureq::Error) -> GatewayError {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            let message = serde_json::from_str::<Value>(&body)
                .map(|value| backend_message(&value))
                .unwrap_or_else(|_| body.trim().to_string());
            GatewayError::from_backend_message(code, message)
        }
        ureq::Error::Transport(transport) => GatewayError::Transport(transport.to_string()),
    }
}

fn backend_message(value: &Value) -> String {
    value
        .get("error")
        .or_else(|| value.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}
