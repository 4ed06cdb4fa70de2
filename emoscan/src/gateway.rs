// THEORY:
// The `gateway` module is the session's only window onto the network. The
// controller never builds a request or parses a response itself; it asks a
// `DetectionGateway` and gets typed results back.
//
// The DTOs below mirror the backend's JSON (field renames live here and nowhere
// else). The trait is async and `Send` so a runtime can move in-flight calls onto
// its own task set and keep servicing timers and operator commands meanwhile.
// Timeouts are applied by the caller, which knows which budget applies.

use crate::core_modules::camera_slots::CameraInfo;
use crate::core_modules::observation::{Observation, PendingResult};
use crate::core_modules::subject::{Subject, SubjectId};
use crate::core_modules::upload::{RosterFile, UploadReport};
use crate::error::GatewayError;
use serde::{Deserialize, Deserializer};
use std::future::Future;

/// Stream configuration of the dashboard's primary camera.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CameraConfig {
    #[serde(default)]
    pub camera_id: Option<u64>,
    #[serde(default)]
    pub stream_url: Option<String>,
}

/// One answer of the inference endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Detection {
    /// Present only for a registered person; an unregistered face decodes to `None`.
    #[serde(rename = "person", default, deserialize_with = "registered_person")]
    pub subject: Option<Subject>,
    #[serde(rename = "emotion", default)]
    pub emotion_label: Option<String>,
    #[serde(rename = "emotion_uz", default)]
    pub localized_label: Option<String>,
    #[serde(rename = "emotion_confidence", default)]
    pub confidence: Option<f64>,
    /// Non-fatal warning from the backend ("no face", "camera busy", ...).
    #[serde(default)]
    pub error: Option<String>,
}

impl Detection {
    pub fn subject(subject: Subject) -> Self {
        Self {
            subject: Some(subject),
            ..Self::default()
        }
    }

    pub fn emotion(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            emotion_label: Some(label.into()),
            confidence: Some(confidence),
            ..Self::default()
        }
    }

    pub fn with_subject(mut self, subject: Subject) -> Self {
        self.subject = Some(subject);
        self
    }
}

/// The backend's `person` object. It is sent for unregistered faces too, then
/// without an id and with `is_registered: false`.
#[derive(Debug, Deserialize)]
struct PersonPayload {
    #[serde(default = "default_true")]
    is_registered: bool,
    #[serde(default)]
    id: Option<SubjectId>,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    camera_logs_count: Option<u32>,
}

impl PersonPayload {
    fn into_subject(self) -> Option<Subject> {
        if !self.is_registered {
            return None;
        }
        let id = self.id?;
        Some(Subject {
            id,
            display_name: self.full_name.unwrap_or_default(),
            photo_ref: self.photo_url,
            confidence: self.confidence.unwrap_or_default(),
            prior_observation_count: self.camera_logs_count.unwrap_or_default(),
        })
    }
}

fn registered_person<'de, D>(deserializer: D) -> Result<Option<Subject>, D::Error>
where
    D: Deserializer<'de>,
{
    let payload = Option::<PersonPayload>::deserialize(deserializer)?;
    Ok(payload.and_then(PersonPayload::into_subject))
}

/// Aggregate the backend computes over a person's stored observations.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AnalysisSummary {
    #[serde(default)]
    pub negative_count: u32,
    #[serde(default)]
    pub total_emotions: u32,
    #[serde(default)]
    pub negative_percentage: f64,
}

/// Result of persisting a batch of samples.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PersistReport {
    #[serde(default)]
    pub occurrence_count: u32,
    #[serde(rename = "requires_testing", default)]
    pub requires_followup: bool,
    #[serde(rename = "emotion_analysis", default)]
    pub analysis_summary: Option<AnalysisSummary>,
    /// Localized name of the dominant emotion of the batch.
    #[serde(rename = "emotion_uzbek", default)]
    pub dominant_label: Option<String>,
    #[serde(rename = "person_name", default)]
    pub subject_name: Option<String>,
}

/// Acknowledgement of a single-result save.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Ack {
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl Default for Ack {
    fn default() -> Self {
        Self {
            success: true,
            message: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Answer to a request to start the backend's stream workers.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WorkerLaunch {
    #[serde(default)]
    pub loaded_cameras: u32,
    #[serde(default)]
    pub message: Option<String>,
}

/// State of the backend's stream workers, which draw the annotated camera feeds.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WorkerStatus {
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub active_threads: u32,
}

impl WorkerStatus {
    pub fn is_active(&self) -> bool {
        self.running && self.active_threads > 0
    }
}

/// The network round trips the detection session depends on.
pub trait DetectionGateway: Send + Sync + 'static {
    /// Verifies the camera stream is reachable and returns its configuration.
    fn check_camera(
        &self,
    ) -> impl Future<Output = Result<CameraConfig, GatewayError>> + Send;

    /// Runs face recognition and emotion inference on one JPEG frame.
    fn detect_emotion(
        &self,
        image: Vec<u8>,
    ) -> impl Future<Output = Result<Detection, GatewayError>> + Send;

    /// Stores a full batch of samples, optionally attributed to a person.
    fn persist_samples(
        &self,
        samples: Vec<Observation>,
        subject_id: Option<SubjectId>,
    ) -> impl Future<Output = Result<PersistReport, GatewayError>> + Send;

    /// Stores the single confirmed result of a person.
    fn persist_single(
        &self,
        result: PendingResult,
    ) -> impl Future<Output = Result<Ack, GatewayError>> + Send;

    /// Lists the cameras that can be shown in the slot grid.
    fn list_cameras(
        &self,
    ) -> impl Future<Output = Result<Vec<CameraInfo>, GatewayError>> + Send;

    /// Uploads a roster file for import.
    fn upload_roster(
        &self,
        file: RosterFile,
    ) -> impl Future<Output = Result<UploadReport, GatewayError>> + Send;

    /// Starts the stream workers behind the annotated camera feeds.
    fn start_workers(&self) -> impl Future<Output = Result<WorkerLaunch, GatewayError>> + Send;

    fn stop_workers(&self) -> impl Future<Output = Result<Ack, GatewayError>> + Send;

    fn worker_status(&self) -> impl Future<Output = Result<WorkerStatus, GatewayError>> + Send;
}
