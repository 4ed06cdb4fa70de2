//! Scripted gateway and recording presenter shared by the controller and
//! runtime tests.

use crate::core_modules::camera_slots::CameraInfo;
use crate::core_modules::frame::StillFrame;
use crate::core_modules::history::HistoryItem;
use crate::core_modules::observation::{Observation, PendingResult};
use crate::core_modules::subject::{Subject, SubjectId};
use crate::core_modules::upload::{RosterFile, UploadReport};
use crate::error::GatewayError;
use crate::gateway::{
    Ack, AnalysisSummary, CameraConfig, Detection, DetectionGateway, PersistReport, WorkerLaunch,
    WorkerStatus,
};
use crate::presenter::{Presenter, Severity};
use crate::{DetectionSessionController, SessionConfig};
use image::{DynamicImage, RgbImage};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Subject(Option<u64>),
    Emotion {
        label: String,
        confidence: f64,
        actions: bool,
        subject: Option<u64>,
    },
    History {
        len: usize,
        owner: Option<String>,
    },
    Toast(String, Severity),
    Modal {
        subject: u64,
        followup: bool,
    },
    Status(bool),
    Stats {
        scans: u32,
        elapsed: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct RecordingPresenter {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl RecordingPresenter {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn toasts(&self) -> Vec<(String, Severity)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Toast(message, severity) => Some((message, severity)),
                _ => None,
            })
            .collect()
    }

    pub fn last_emotion(&self) -> Option<Call> {
        self.calls().into_iter().rev().find(|c| matches!(c, Call::Emotion { .. }))
    }

    pub fn last_subject(&self) -> Option<Option<u64>> {
        self.calls().into_iter().rev().find_map(|c| match c {
            Call::Subject(id) => Some(id),
            _ => None,
        })
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Presenter for RecordingPresenter {
    fn show_subject(&mut self, subject: Option<&Subject>) {
        self.record(Call::Subject(subject.map(|s| s.id.0)));
    }

    fn show_emotion(
        &mut self,
        label: &str,
        confidence: f64,
        show_actions: bool,
        subject: Option<&Subject>,
    ) {
        self.record(Call::Emotion {
            label: label.to_string(),
            confidence,
            actions: show_actions,
            subject: subject.map(|s| s.id.0),
        });
    }

    fn show_history(&mut self, items: &[HistoryItem], owner: Option<&str>) {
        self.record(Call::History {
            len: items.len(),
            owner: owner.map(str::to_string),
        });
    }

    fn show_toast(&mut self, message: &str, severity: Severity) {
        self.record(Call::Toast(message.to_string(), severity));
    }

    fn show_confirmation_modal(
        &mut self,
        subject: &Subject,
        _analysis: Option<&AnalysisSummary>,
        requires_followup: bool,
    ) {
        self.record(Call::Modal {
            subject: subject.id.0,
            followup: requires_followup,
        });
    }

    fn show_status(&mut self, active: bool) {
        self.record(Call::Status(active));
    }

    fn show_stats(&mut self, scan_count: u32, elapsed: &str) {
        self.record(Call::Stats {
            scans: scan_count,
            elapsed: elapsed.to_string(),
        });
    }
}

/// Responses and recorded traffic of a `ScriptedGateway`.
#[derive(Debug)]
pub struct Script {
    pub camera: Result<CameraConfig, GatewayError>,
    /// Served in order; an empty queue answers with an empty detection.
    pub detections: VecDeque<Result<Detection, GatewayError>>,
    pub detect_delay: Duration,
    pub batch_result: Result<PersistReport, GatewayError>,
    pub single_result: Result<Ack, GatewayError>,
    pub upload_result: Result<UploadReport, GatewayError>,
    pub worker_launch: Result<WorkerLaunch, GatewayError>,
    pub worker_status: Result<WorkerStatus, GatewayError>,

    pub detect_calls: usize,
    pub batches: Vec<(Vec<Observation>, Option<SubjectId>)>,
    pub singles: Vec<PendingResult>,
    pub uploads: Vec<String>,
    pub worker_starts: usize,
    pub worker_stops: usize,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            camera: Ok(CameraConfig::default()),
            detections: VecDeque::new(),
            detect_delay: Duration::ZERO,
            batch_result: Ok(PersistReport {
                occurrence_count: 1,
                dominant_label: Some("HURSAND".into()),
                subject_name: Some("Aziz Karimov".into()),
                ..PersistReport::default()
            }),
            single_result: Ok(Ack::default()),
            upload_result: Ok(UploadReport::default()),
            worker_launch: Ok(WorkerLaunch {
                loaded_cameras: 2,
                message: None,
            }),
            worker_status: Ok(WorkerStatus::default()),
            detect_calls: 0,
            batches: Vec::new(),
            singles: Vec::new(),
            uploads: Vec::new(),
            worker_starts: 0,
            worker_stops: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedGateway {
    script: Arc<Mutex<Script>>,
}

impl ScriptedGateway {
    pub fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    pub fn push_detection(&self, result: Result<Detection, GatewayError>) {
        self.script().detections.push_back(result);
    }

    pub fn detect_calls(&self) -> usize {
        self.script().detect_calls
    }
}

impl DetectionGateway for ScriptedGateway {
    async fn check_camera(&self) -> Result<CameraConfig, GatewayError> {
        self.script().camera.clone()
    }

    async fn detect_emotion(&self, image: Vec<u8>) -> Result<Detection, GatewayError> {
        assert!(!image.is_empty(), "frames are always encoded before detection");
        let (result, delay) = {
            let mut script = self.script();
            script.detect_calls += 1;
            let result = script.detections.pop_front().unwrap_or_else(|| Ok(Detection::default()));
            (result, script.detect_delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        result
    }

    async fn persist_samples(
        &self,
        samples: Vec<Observation>,
        subject_id: Option<SubjectId>,
    ) -> Result<PersistReport, GatewayError> {
        let mut script = self.script();
        script.batches.push((samples, subject_id));
        script.batch_result.clone()
    }

    async fn persist_single(&self, result: PendingResult) -> Result<Ack, GatewayError> {
        let mut script = self.script();
        script.singles.push(result);
        script.single_result.clone()
    }

    async fn list_cameras(&self) -> Result<Vec<CameraInfo>, GatewayError> {
        Ok(Vec::new())
    }

    async fn upload_roster(&self, file: RosterFile) -> Result<UploadReport, GatewayError> {
        let mut script = self.script();
        script.uploads.push(file.name);
        script.upload_result.clone()
    }

    async fn start_workers(&self) -> Result<WorkerLaunch, GatewayError> {
        let mut script = self.script();
        script.worker_starts += 1;
        script.worker_launch.clone()
    }

    async fn stop_workers(&self) -> Result<Ack, GatewayError> {
        self.script().worker_stops += 1;
        Ok(Ack::default())
    }

    async fn worker_status(&self) -> Result<WorkerStatus, GatewayError> {
        self.script().worker_status.clone()
    }
}

pub fn still_frame() -> StillFrame {
    StillFrame(DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 24, image::Rgb([90, 120, 150]))))
}

pub fn controller() -> (
    DetectionSessionController<ScriptedGateway, RecordingPresenter>,
    ScriptedGateway,
    RecordingPresenter,
) {
    let gateway = ScriptedGateway::default();
    let presenter = RecordingPresenter::default();
    let controller = DetectionSessionController::new(
        SessionConfig::default(),
        Arc::new(gateway.clone()),
        presenter.clone(),
        still_frame(),
    );
    (controller, gateway, presenter)
}

pub fn aziz() -> Subject {
    Subject::new(7, "Aziz Karimov")
}
