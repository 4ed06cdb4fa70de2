// THEORY:
// The `DetectionSessionController` is the high-level orchestrator of a detection
// session. It owns every piece of session state and is the only place that state
// changes. Its callers (the `SessionRuntime`, a UI shell, the tests) feed it
// timer ticks, gateway results and operator commands.
//
// Key architectural principles:
// 1.  **Tagged Phase**: The session is `Idle`, `Running` or `Paused`. The subject
//     and the pending result only exist inside `Paused`, so "paused without a
//     person" or "pending result while running" cannot be represented.
// 2.  **Split-Phase Ticks**: A poll tick is `begin_tick` (capture and encode a frame,
//     take the single-flight guard) followed later by `complete_tick` (apply the
//     answer). The network call happens in between, outside the controller, so a
//     runtime can keep servicing commands while a request is in flight.
// 3.  **Stale Results Are Dropped**: Every `stop` bumps a generation counter and
//     cancels the session token. A ticket carries the generation it was issued in;
//     answers from an older generation are discarded untouched.
// 4.  **Pause on Recognition**: A recognized person pauses polling until the
//     operator continues or confirms. Emotion readings keep flowing into the
//     sample buffer until a pending result exists.

use crate::config::SessionConfig;
use crate::core_modules::frame::{CaptureSettings, FrameSource, capture_encoded};
use crate::core_modules::history::{HistoryItem, HistoryLog};
use crate::core_modules::observation::{
    Observation, PendingResult, RESTING_LABEL, is_detected_label,
};
use crate::core_modules::sample_buffer::SampleBuffer;
use crate::core_modules::session_clock::SessionClock;
use crate::core_modules::subject::{Subject, SubjectId};
use crate::core_modules::throttle::Throttle;
use crate::core_modules::upload::{RosterFile, UploadReport};
use crate::error::{GatewayError, SessionError};
use crate::gateway::{Detection, DetectionGateway};
use crate::presenter::{Presenter, Severity};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Externally visible session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    PausedForConfirmation,
}

#[derive(Debug)]
enum Phase {
    Idle,
    Running {
        /// Set by `continue_session`: the next recognized person starts a fresh
        /// scope even when it is the same id as before.
        expecting_new_subject: bool,
    },
    Paused {
        subject: Subject,
        pending: Option<PendingResult>,
    },
}

/// Holds the single-flight flag for as long as it lives.
#[derive(Debug)]
struct InFlightGuard(Arc<AtomicBool>);

impl InFlightGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Proof that a detection request was started. Dropping it releases the
/// single-flight guard.
#[derive(Debug)]
pub struct TickTicket {
    generation: u64,
    cancel: CancellationToken,
    _guard: InFlightGuard,
}

impl TickTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Cancelled when the session that issued this ticket stops.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// An encoded frame ready for the detection endpoint.
#[derive(Debug)]
pub struct PollRequest {
    pub ticket: TickTicket,
    pub frame: Vec<u8>,
}

/// Runs `call` under a deadline, turning an elapsed deadline into a gateway timeout.
pub async fn with_deadline<T>(
    budget: Duration,
    call: impl Future<Output = Result<T, GatewayError>>,
) -> Result<T, GatewayError> {
    match tokio::time::timeout(budget, call).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout(budget)),
    }
}

/// One detection round trip, bounded by `budget` and abandoned when `cancel` fires.
pub async fn detect_with_deadline<G: DetectionGateway>(
    gateway: &G,
    frame: Vec<u8>,
    budget: Duration,
    cancel: &CancellationToken,
) -> Result<Detection, GatewayError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(GatewayError::Cancelled),
        result = with_deadline(budget, gateway.detect_emotion(frame)) => result,
    }
}

/// Drives one detection session on top of a gateway, a presenter and a frame source.
pub struct DetectionSessionController<G, P> {
    config: SessionConfig,
    capture: CaptureSettings,
    gateway: Arc<G>,
    presenter: P,
    frames: Box<dyn FrameSource>,

    phase: Phase,
    /// Id of the person the current scope belongs to.
    last_subject_id: Option<SubjectId>,
    samples: SampleBuffer,
    person_history: HistoryLog,
    general_history: HistoryLog,
    scan_count: u32,
    clock: SessionClock,

    generation: u64,
    session_token: CancellationToken,
    in_flight: Arc<AtomicBool>,
    detect_errors: Throttle,
    capture_warnings: Throttle,
    epoch: Instant,
}

impl<G: DetectionGateway, P: Presenter> DetectionSessionController<G, P> {
    pub fn new(
        config: SessionConfig,
        gateway: Arc<G>,
        mut presenter: P,
        frames: impl FrameSource + 'static,
    ) -> Self {
        presenter.show_status(false);
        Self {
            capture: config.capture_settings(),
            samples: SampleBuffer::new(config.required_samples),
            person_history: HistoryLog::new(config.person_history_cap),
            general_history: HistoryLog::new(config.general_history_cap),
            detect_errors: Throttle::new(config.error_cooldown),
            capture_warnings: Throttle::new(config.error_cooldown),
            config,
            gateway,
            presenter,
            frames: Box::new(frames),
            phase: Phase::Idle,
            last_subject_id: None,
            scan_count: 0,
            clock: SessionClock::new(),
            generation: 0,
            session_token: CancellationToken::new(),
            in_flight: Arc::new(AtomicBool::new(false)),
            epoch: Instant::now(),
        }
    }

    pub fn state(&self) -> SessionState {
        match self.phase {
            Phase::Idle => SessionState::Idle,
            Phase::Running { .. } => SessionState::Running,
            Phase::Paused { .. } => SessionState::PausedForConfirmation,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    pub fn current_subject(&self) -> Option<&Subject> {
        match &self.phase {
            Phase::Paused { subject, .. } => Some(subject),
            _ => None,
        }
    }

    pub fn pending_result(&self) -> Option<&PendingResult> {
        match &self.phase {
            Phase::Paused { pending, .. } => pending.as_ref(),
            _ => None,
        }
    }

    pub fn expecting_new_subject(&self) -> bool {
        matches!(
            self.phase,
            Phase::Running {
                expecting_new_subject: true
            }
        )
    }

    pub fn last_subject_id(&self) -> Option<SubjectId> {
        self.last_subject_id
    }

    pub fn samples(&self) -> Vec<Observation> {
        self.samples.snapshot()
    }

    pub fn person_history(&self) -> Vec<HistoryItem> {
        self.person_history.items()
    }

    pub fn general_history(&self) -> Vec<HistoryItem> {
        self.general_history.items()
    }

    pub fn scan_count(&self) -> u32 {
        self.scan_count
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_tick_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn elapsed_label(&self) -> String {
        self.clock.elapsed_label(self.now_millis())
    }

    fn now_millis(&self) -> u64 {
        Instant::now().saturating_duration_since(self.epoch).as_millis() as u64
    }

    /// Opens a session once the camera answers. A no-op when already started.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if !matches!(self.phase, Phase::Idle) {
            debug!("start ignored: session already active");
            return Ok(());
        }

        let check = with_deadline(self.config.detect_timeout, self.gateway.check_camera()).await;
        if let Err(err) = check {
            warn!("Camera check failed: {}", err);
            self.presenter
                .show_toast(&format!("Camera is unavailable: {err}"), Severity::Error);
            return Err(SessionError::CameraUnavailable(err));
        }

        self.samples.clear();
        self.person_history.clear();
        self.general_history.clear();
        self.scan_count = 0;
        self.last_subject_id = None;
        self.detect_errors.reset();
        self.capture_warnings.reset();
        self.session_token = CancellationToken::new();
        self.clock.start(self.now_millis());
        self.phase = Phase::Running {
            expecting_new_subject: false,
        };

        info!(generation = self.generation, "Detection session started");
        self.presenter.show_status(true);
        self.reset_result_view();
        self.presenter.show_toast("Camera started", Severity::Success);
        Ok(())
    }

    /// Ends the session. Safe to call any number of times.
    pub fn stop(&mut self) {
        self.generation += 1;
        self.session_token.cancel();
        self.session_token = CancellationToken::new();

        self.phase = Phase::Idle;
        self.last_subject_id = None;
        self.samples.clear();
        self.person_history.clear();
        self.general_history.clear();
        self.scan_count = 0;
        self.clock.stop();

        info!(generation = self.generation, "Detection session stopped");
        self.presenter.show_status(false);
        self.presenter.show_history(&[], None);
        self.reset_result_view();
        self.presenter.show_stats(0, &self.clock.elapsed_label(0));
        self.presenter.show_toast("Camera stopped", Severity::Info);
    }

    /// First half of a poll tick. Returns the frame to send, or `None` when this
    /// tick has nothing to do (idle, waiting for the operator, request in flight,
    /// no frame).
    pub fn begin_tick(&mut self) -> Option<PollRequest> {
        match &self.phase {
            Phase::Idle => return None,
            Phase::Paused { pending: Some(_), .. } => {
                debug!("tick skipped: waiting for the operator");
                return None;
            }
            _ => {}
        }

        let Some(guard) = InFlightGuard::acquire(&self.in_flight) else {
            debug!("tick skipped: detection already in flight");
            return None;
        };

        let frame = match capture_encoded(&mut *self.frames, &self.capture) {
            Ok(frame) => frame,
            Err(err) => {
                if self.capture_warnings.allow(Instant::now()) {
                    warn!("Frame capture failed: {}", err);
                }
                return None;
            }
        };

        Some(PollRequest {
            ticket: TickTicket {
                generation: self.generation,
                cancel: self.session_token.child_token(),
                _guard: guard,
            },
            frame,
        })
    }

    /// Second half of a poll tick. Results from a stopped session are discarded.
    pub async fn complete_tick(
        &mut self,
        ticket: TickTicket,
        result: Result<Detection, GatewayError>,
    ) {
        if ticket.generation != self.generation || matches!(self.phase, Phase::Idle) {
            debug!(
                ticket = ticket.generation,
                current = self.generation,
                "discarding detection from a stopped session"
            );
            return;
        }
        // Release before applying so a batch save does not block the next tick.
        drop(ticket);

        match result {
            Ok(detection) => self.apply_detection(detection).await,
            Err(GatewayError::Cancelled) => debug!("detection cancelled"),
            Err(err) => {
                warn!("Detection failed: {}", err);
                if self.detect_errors.allow(Instant::now()) {
                    self.presenter
                        .show_toast(&format!("Emotion detection failed: {err}"), Severity::Error);
                }
            }
        }
    }

    /// A full poll tick: capture, detect under the detect deadline, apply.
    pub async fn poll_tick(&mut self) {
        let Some(PollRequest { ticket, frame }) = self.begin_tick() else {
            return;
        };
        let result = detect_with_deadline(
            self.gateway.as_ref(),
            frame,
            self.config.detect_timeout,
            ticket.cancellation(),
        )
        .await;
        self.complete_tick(ticket, result).await;
    }

    /// Applies one detection answer to the session.
    pub async fn apply_detection(&mut self, detection: Detection) {
        let Detection {
            subject,
            emotion_label,
            localized_label,
            confidence,
            error,
        } = detection;

        if let Some(warning) = error {
            debug!("backend note: {}", warning);
        }
        if matches!(self.phase, Phase::Idle) {
            return;
        }

        // Stage 1: Person Recognition
        let admitting = match self.phase {
            Phase::Running { expecting_new_subject } => Some(expecting_new_subject),
            _ => None,
        };
        if let (Some(subject), Some(fresh_scope)) = (subject, admitting) {
            self.admit_subject(subject, fresh_scope);
        }

        // Stage 2: Emotion Reading
        let Some(label) = emotion_label.filter(|label| is_detected_label(label)) else {
            return;
        };
        let observation = Observation::new(label, confidence.unwrap_or(0.0));

        if matches!(self.phase, Phase::Paused { .. }) {
            // Stage 3: Batch Persistence
            if self.record_observation(observation, localized_label) {
                self.persist_batch().await;
            }
        } else {
            self.presenter
                .show_emotion(&observation.emotion_label, observation.confidence, false, None);
        }
    }

    fn admit_subject(&mut self, subject: Subject, fresh_scope: bool) {
        if fresh_scope || self.last_subject_id != Some(subject.id) {
            info!(id = %subject.id, "New person in front of the camera: {}", subject.display_name);
            self.last_subject_id = Some(subject.id);
            self.person_history.clear();
            self.samples.clear();
            self.presenter.show_history(&[], Some(subject.display_name.as_str()));
        }

        self.presenter.show_subject(Some(&subject));
        info!(id = %subject.id, "Paused for operator confirmation");
        self.phase = Phase::Paused { subject, pending: None };
    }

    /// Records a reading for the current person. Returns true when the sample
    /// buffer is full.
    fn record_observation(
        &mut self,
        observation: Observation,
        localized_label: Option<String>,
    ) -> bool {
        let Phase::Paused { subject, pending } = &mut self.phase else {
            return false;
        };

        let full = self.samples.add(observation.clone());
        *pending = Some(PendingResult {
            subject_id: subject.id,
            observation: observation.clone(),
            localized_label,
        });
        self.scan_count += 1;

        let item = HistoryItem::now(&observation);
        self.person_history.push(item.clone());
        self.general_history.push(item);

        debug!(
            id = %subject.id,
            samples = self.samples.len(),
            "{} {:.0}%",
            observation.emotion_label,
            observation.confidence
        );
        self.presenter
            .show_history(&self.person_history.items(), Some(subject.display_name.as_str()));
        self.presenter.show_emotion(
            &observation.emotion_label,
            observation.confidence,
            true,
            Some(&*subject),
        );
        full
    }

    async fn persist_batch(&mut self) {
        let batch = self.samples.snapshot();
        let subject_id = self.current_subject().map(|s| s.id);
        info!(samples = batch.len(), ?subject_id, "Persisting sample batch");

        let result = with_deadline(
            self.config.save_timeout,
            self.gateway.persist_samples(batch, subject_id),
        )
        .await;
        self.samples.clear();

        match result {
            Ok(report) => {
                let emotion = report.dominant_label.as_deref().unwrap_or("emotion");
                let message = match &report.subject_name {
                    Some(name) => format!(
                        "{name}: {emotion} saved ({}/{})",
                        report.occurrence_count, self.config.required_samples
                    ),
                    None => format!("{emotion} saved"),
                };
                self.presenter.show_toast(&message, Severity::Success);

                if let Phase::Paused { subject, .. } = &mut self.phase {
                    if report.subject_name.is_some() {
                        subject.prior_observation_count += 1;
                        self.presenter.show_subject(Some(&*subject));
                    }
                    if report.analysis_summary.is_some() {
                        self.presenter.show_confirmation_modal(
                            subject,
                            report.analysis_summary.as_ref(),
                            report.requires_followup,
                        );
                    }
                }
            }
            Err(err) if err.is_capacity() => {
                warn!("Record quota reached: {}", err);
                self.presenter.show_toast(
                    "All records for this person are already stored",
                    Severity::Warning,
                );
            }
            Err(err) => {
                warn!("Saving the batch failed: {}", err);
                self.presenter
                    .show_toast(&format!("Saving to the database failed: {err}"), Severity::Error);
            }
        }
    }

    /// Operator accepted the current person: saves the pending result, if any,
    /// and resumes polling for the next person. The sample buffer is kept.
    pub async fn continue_session(&mut self) -> Result<(), SessionError> {
        let (name, pending) = match &mut self.phase {
            Phase::Idle => return Err(SessionError::NotRunning),
            Phase::Running { .. } => ("Person".to_string(), None),
            Phase::Paused { subject, pending } => (subject.display_name.clone(), pending.take()),
        };

        match pending {
            Some(result) => {
                let save = self.gateway.persist_single(result);
                let outcome = with_deadline(self.config.save_timeout, save).await;
                match outcome {
                    Ok(ack) if ack.success => {
                        let message = format!("{name}: result saved, continuing");
                        self.presenter.show_toast(&message, Severity::Success);
                    }
                    Ok(ack) => {
                        let reason = ack.message.unwrap_or_else(|| "rejected".to_string());
                        warn!("Saving the confirmed result was rejected: {}", reason);
                        self.presenter
                            .show_toast(&format!("Saving failed: {reason}"), Severity::Error);
                    }
                    Err(err) => {
                        warn!("Saving the confirmed result failed: {}", err);
                        let message = format!("Saving failed: {err}");
                        self.presenter.show_toast(&message, Severity::Error);
                    }
                }
            }
            None => self.presenter.show_toast(&format!("{name}: continuing"), Severity::Info),
        }

        self.resume_for_next_subject();
        Ok(())
    }

    /// Operator confirmed the person's results in the dialog.
    pub fn confirm(&mut self) -> Result<(), SessionError> {
        let name = match &self.phase {
            Phase::Idle => return Err(SessionError::NotRunning),
            Phase::Running { .. } => "Person".to_string(),
            Phase::Paused { subject, .. } => subject.display_name.clone(),
        };

        self.presenter.show_toast(&format!("{name} confirmed"), Severity::Success);
        self.samples.clear();
        self.presenter.show_history(&[], None);
        self.resume_for_next_subject();
        Ok(())
    }

    /// Path of the follow-up questionnaire for the current person.
    pub fn request_followup(&mut self) -> Result<String, SessionError> {
        let Some(subject) = self.current_subject() else {
            self.presenter
                .show_toast("No recognized person to send to the test", Severity::Error);
            return Err(SessionError::NoSubject);
        };

        let mut path = format!("/test/{}/", subject.id);
        if let Some(pending) = self.pending_result() {
            path.push_str("?emotion=");
            path.push_str(&pending.observation.emotion_label);
        }
        info!(id = %subject.id, "Follow-up requested: {}", path);
        Ok(path)
    }

    /// Refreshes the scan counter and elapsed time display.
    pub fn clock_tick(&mut self) {
        if !self.clock.is_running() {
            return;
        }
        let elapsed = self.elapsed_label();
        self.presenter.show_stats(self.scan_count, &elapsed);
    }

    /// Validates and uploads a roster file, reporting the import counts.
    pub async fn upload_roster(&mut self, file: RosterFile) -> Result<UploadReport, SessionError> {
        let file = self.begin_upload(file)?;
        let upload = self.gateway.upload_roster(file);
        let result = with_deadline(self.config.upload_timeout, upload).await;
        self.complete_upload(result)
    }

    /// Checks a roster file before any network traffic.
    pub fn begin_upload(&mut self, file: RosterFile) -> Result<RosterFile, SessionError> {
        if let Err(err) = file.validate() {
            self.presenter.show_toast(&err.to_string(), Severity::Error);
            return Err(err.into());
        }
        info!(name = %file.name, size = file.size(), "Uploading roster");
        Ok(file)
    }

    /// Reports the outcome of a roster upload.
    pub fn complete_upload(
        &mut self,
        result: Result<UploadReport, GatewayError>,
    ) -> Result<UploadReport, SessionError> {
        let report = match result {
            Ok(report) => report,
            Err(err) => {
                warn!("Roster upload failed: {}", err);
                self.presenter.show_toast(&format!("Upload failed: {err}"), Severity::Error);
                return Err(err.into());
            }
        };

        if report.success_count > 0 {
            self.presenter.show_toast(
                &format!("{} people imported", report.success_count),
                Severity::Success,
            );
        }
        if report.error_count > 0 {
            self.presenter.show_toast(
                &format!("{} rows could not be imported", report.error_count),
                Severity::Warning,
            );
        }
        if report.success_count == 0 && report.error_count == 0 {
            let message = report.message.as_deref().unwrap_or("Nothing was imported");
            self.presenter.show_toast(message, Severity::Info);
        }
        Ok(report)
    }

    fn resume_for_next_subject(&mut self) {
        self.last_subject_id = None;
        self.person_history.clear();
        self.phase = Phase::Running {
            expecting_new_subject: true,
        };
        self.reset_result_view();
        info!("Resumed, waiting for the next person");
    }

    fn reset_result_view(&mut self) {
        self.presenter.show_subject(None);
        self.presenter.show_emotion(RESTING_LABEL, 0.0, false, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{Ack, AnalysisSummary, PersistReport};
    use crate::testing::{Call, RecordingPresenter, ScriptedGateway, aziz, controller};

    async fn started() -> (
        DetectionSessionController<ScriptedGateway, RecordingPresenter>,
        ScriptedGateway,
        RecordingPresenter,
    ) {
        let (mut ctl, gateway, presenter) = controller();
        ctl.start().await.unwrap();
        presenter.clear();
        (ctl, gateway, presenter)
    }

    #[tokio::test]
    async fn start_opens_a_running_session() {
        let (mut ctl, _gateway, presenter) = controller();
        assert_eq!(ctl.state(), SessionState::Idle);

        ctl.start().await.unwrap();

        assert_eq!(ctl.state(), SessionState::Running);
        let calls = presenter.calls();
        assert!(calls.contains(&Call::Status(true)));
        assert!(calls.contains(&Call::Toast("Camera started".into(), Severity::Success)));
    }

    #[tokio::test]
    async fn start_fails_when_camera_is_down() {
        let (mut ctl, gateway, presenter) = controller();
        gateway.script().camera = Err(GatewayError::Transport("refused".into()));

        let err = ctl.start().await.unwrap_err();

        assert!(matches!(err, SessionError::CameraUnavailable(_)));
        assert_eq!(ctl.state(), SessionState::Idle);
        assert_eq!(presenter.toasts().last().map(|t| t.1), Some(Severity::Error));
        assert!(ctl.begin_tick().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn recognized_person_pauses_the_session() {
        let (mut ctl, gateway, presenter) = started().await;
        gateway.push_detection(Ok(Detection::subject(aziz())));

        ctl.poll_tick().await;

        assert_eq!(ctl.state(), SessionState::PausedForConfirmation);
        assert_eq!(ctl.current_subject().map(|s| s.id), Some(SubjectId(7)));
        assert_eq!(ctl.last_subject_id(), Some(SubjectId(7)));
        assert_eq!(presenter.last_subject(), Some(Some(7)));
        assert!(ctl.pending_result().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn reading_for_the_paused_person_is_recorded() {
        let (mut ctl, gateway, presenter) = started().await;
        gateway.push_detection(Ok(Detection::subject(aziz())));
        gateway.push_detection(Ok(Detection::emotion("happy", 82.0)));

        ctl.poll_tick().await;
        ctl.poll_tick().await;

        assert_eq!(ctl.samples().len(), 1);
        assert_eq!(ctl.scan_count(), 1);
        assert_eq!(ctl.person_history().len(), 1);
        assert_eq!(ctl.general_history().len(), 1);
        assert_eq!(
            ctl.pending_result().map(|p| p.observation.emotion_label.as_str()),
            Some("happy")
        );
        assert_eq!(
            presenter.last_emotion(),
            Some(Call::Emotion {
                label: "happy".into(),
                confidence: 82.0,
                actions: true,
                subject: Some(7),
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn person_and_emotion_in_one_answer() {
        let (mut ctl, gateway, _presenter) = started().await;
        gateway.push_detection(Ok(Detection::emotion("sad", 61.0).with_subject(aziz())));

        ctl.poll_tick().await;

        assert_eq!(ctl.state(), SessionState::PausedForConfirmation);
        assert_eq!(ctl.pending_result().map(|p| p.subject_id), Some(SubjectId(7)));
        assert_eq!(ctl.samples().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_polling_while_a_result_awaits_the_operator() {
        let (mut ctl, gateway, _presenter) = started().await;
        gateway.push_detection(Ok(Detection::emotion("happy", 82.0).with_subject(aziz())));
        ctl.poll_tick().await;
        assert_eq!(gateway.detect_calls(), 1);

        for _ in 0..5 {
            ctl.poll_tick().await;
        }

        assert_eq!(gateway.detect_calls(), 1);
    }

    #[tokio::test]
    async fn full_buffer_is_persisted_for_the_person() {
        let (mut ctl, gateway, presenter) = started().await;
        ctl.apply_detection(Detection::subject(aziz())).await;
        let readings = [
            ("happy", 82.0),
            ("happy", 75.0),
            ("neutral", 40.0),
            ("sad", 55.0),
            ("happy", 90.0),
        ];

        for (label, confidence) in readings {
            ctl.apply_detection(Detection::emotion(label, confidence)).await;
        }

        let batches = gateway.script().batches.clone();
        assert_eq!(batches.len(), 1);
        let (samples, subject_id) = &batches[0];
        assert_eq!(*subject_id, Some(SubjectId(7)));
        let sent: Vec<(&str, f64)> =
            samples.iter().map(|o| (o.emotion_label.as_str(), o.confidence)).collect();
        assert_eq!(sent, readings);
        assert!(ctl.samples().is_empty());
        assert_eq!(ctl.current_subject().map(|s| s.prior_observation_count), Some(1));
        let saved = ("Aziz Karimov: HURSAND saved (1/5)".to_string(), Severity::Success);
        assert!(presenter.toasts().contains(&saved));
    }

    #[tokio::test]
    async fn batch_with_analysis_opens_the_results_dialog() {
        let (mut ctl, gateway, presenter) = started().await;
        gateway.script().batch_result = Ok(PersistReport {
            occurrence_count: 5,
            requires_followup: true,
            analysis_summary: Some(AnalysisSummary {
                negative_count: 3,
                total_emotions: 5,
                negative_percentage: 60.0,
            }),
            dominant_label: Some("QAYGULI".into()),
            subject_name: Some("Aziz Karimov".into()),
        });
        ctl.apply_detection(Detection::subject(aziz())).await;
        for _ in 0..5 {
            ctl.apply_detection(Detection::emotion("sad", 70.0)).await;
        }

        assert!(presenter.calls().contains(&Call::Modal {
            subject: 7,
            followup: true
        }));
    }

    #[tokio::test]
    async fn quota_error_is_a_warning_and_still_clears_the_buffer() {
        let (mut ctl, gateway, presenter) = started().await;
        gateway.script().batch_result =
            Err(GatewayError::from_backend_message(400, "5 ta yozuv saqlangan"));
        ctl.apply_detection(Detection::subject(aziz())).await;
        for _ in 0..5 {
            ctl.apply_detection(Detection::emotion("happy", 80.0)).await;
        }

        assert!(ctl.samples().is_empty());
        assert_eq!(presenter.toasts().last().map(|t| t.1), Some(Severity::Warning));
    }

    #[tokio::test]
    async fn failed_batch_is_an_error_toast() {
        let (mut ctl, gateway, presenter) = started().await;
        gateway.script().batch_result = Err(GatewayError::Transport("reset".into()));
        ctl.apply_detection(Detection::subject(aziz())).await;
        for _ in 0..5 {
            ctl.apply_detection(Detection::emotion("happy", 80.0)).await;
        }

        assert!(ctl.samples().is_empty());
        assert_eq!(presenter.toasts().last().map(|t| t.1), Some(Severity::Error));
    }

    #[tokio::test]
    async fn reading_without_a_person_is_shown_without_actions() {
        let (mut ctl, _gateway, presenter) = started().await;

        ctl.apply_detection(Detection::emotion("surprise", 66.0)).await;

        assert_eq!(ctl.state(), SessionState::Running);
        assert!(ctl.samples().is_empty());
        assert_eq!(ctl.scan_count(), 0);
        assert_eq!(
            presenter.last_emotion(),
            Some(Call::Emotion {
                label: "surprise".into(),
                confidence: 66.0,
                actions: false,
                subject: None,
            })
        );
    }

    #[tokio::test]
    async fn undetected_sentinel_is_ignored() {
        let (mut ctl, _gateway, presenter) = started().await;
        ctl.apply_detection(Detection::subject(aziz())).await;
        presenter.clear();

        ctl.apply_detection(Detection::emotion("aniqlanmadi", 0.0)).await;

        assert!(ctl.samples().is_empty());
        assert!(ctl.pending_result().is_none());
        assert!(presenter.calls().is_empty());
    }

    #[tokio::test]
    async fn continue_saves_the_pending_result_once_and_resumes() {
        let (mut ctl, gateway, _presenter) = started().await;
        ctl.apply_detection(Detection::subject(aziz())).await;
        ctl.apply_detection(Detection::emotion("happy", 82.0)).await;

        ctl.continue_session().await.unwrap();

        let singles = gateway.script().singles.clone();
        assert_eq!(singles.len(), 1);
        assert_eq!(singles[0].subject_id, SubjectId(7));
        assert_eq!(singles[0].observation.emotion_label, "happy");
        assert!(ctl.current_subject().is_none());
        assert_eq!(ctl.last_subject_id(), None);
        assert!(ctl.person_history().is_empty());
        assert_eq!(ctl.samples().len(), 1);
        assert_eq!(ctl.state(), SessionState::Running);
        assert!(ctl.expecting_new_subject());
    }

    #[tokio::test]
    async fn continue_resumes_even_when_saving_fails() {
        let (mut ctl, gateway, presenter) = started().await;
        gateway.script().single_result = Err(GatewayError::Timeout(Duration::from_secs(5)));
        ctl.apply_detection(Detection::emotion("sad", 50.0).with_subject(aziz())).await;

        ctl.continue_session().await.unwrap();

        assert_eq!(ctl.state(), SessionState::Running);
        assert!(presenter.toasts().iter().any(|(_, s)| *s == Severity::Error));
    }

    #[tokio::test]
    async fn rejected_save_is_reported() {
        let (mut ctl, gateway, presenter) = started().await;
        gateway.script().single_result = Ok(Ack {
            success: false,
            message: Some("duplicate".into()),
        });
        ctl.apply_detection(Detection::emotion("sad", 50.0).with_subject(aziz())).await;

        ctl.continue_session().await.unwrap();

        assert!(presenter.toasts().contains(&("Saving failed: duplicate".into(), Severity::Error)));
        assert_eq!(ctl.state(), SessionState::Running);
    }

    #[tokio::test]
    async fn continue_without_pending_result_saves_nothing() {
        let (mut ctl, gateway, _presenter) = started().await;
        ctl.apply_detection(Detection::subject(aziz())).await;

        ctl.continue_session().await.unwrap();

        assert!(gateway.script().singles.is_empty());
        assert_eq!(ctl.state(), SessionState::Running);
    }

    #[tokio::test]
    async fn continue_requires_a_session() {
        let (mut ctl, _gateway, _presenter) = controller();
        assert_eq!(ctl.continue_session().await, Err(SessionError::NotRunning));
        assert_eq!(ctl.confirm(), Err(SessionError::NotRunning));
    }

    #[tokio::test]
    async fn same_person_after_continue_starts_a_fresh_scope() {
        let (mut ctl, _gateway, _presenter) = started().await;
        ctl.apply_detection(Detection::emotion("happy", 82.0).with_subject(aziz())).await;
        ctl.continue_session().await.unwrap();
        assert_eq!(ctl.samples().len(), 1);

        ctl.apply_detection(Detection::subject(aziz())).await;

        assert!(ctl.samples().is_empty());
        assert_eq!(ctl.last_subject_id(), Some(SubjectId(7)));
        assert!(!ctl.expecting_new_subject());
    }

    #[tokio::test]
    async fn confirm_clears_the_person_and_resumes() {
        let (mut ctl, gateway, presenter) = started().await;
        ctl.apply_detection(Detection::emotion("happy", 82.0).with_subject(aziz())).await;

        ctl.confirm().unwrap();

        assert_eq!(ctl.state(), SessionState::Running);
        assert!(ctl.samples().is_empty());
        assert!(ctl.pending_result().is_none());
        assert!(gateway.script().singles.is_empty());
        assert!(presenter.toasts().contains(&("Aziz Karimov confirmed".into(), Severity::Success)));
    }

    #[tokio::test]
    async fn followup_path_carries_the_pending_emotion() {
        let (mut ctl, _gateway, _presenter) = started().await;
        ctl.apply_detection(Detection::subject(aziz())).await;
        assert_eq!(ctl.request_followup().unwrap(), "/test/7/");

        ctl.apply_detection(Detection::emotion("angry", 71.0)).await;
        assert_eq!(ctl.request_followup().unwrap(), "/test/7/?emotion=angry");
    }

    #[tokio::test]
    async fn followup_needs_a_person() {
        let (mut ctl, _gateway, presenter) = started().await;
        assert_eq!(ctl.request_followup(), Err(SessionError::NoSubject));
        assert_eq!(presenter.toasts().last().map(|t| t.1), Some(Severity::Error));
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_detection_failures_toast_once_per_window() {
        let (mut ctl, gateway, presenter) = started().await;
        gateway.push_detection(Err(GatewayError::Transport("refused".into())));
        gateway.push_detection(Err(GatewayError::Transport("refused".into())));

        ctl.poll_tick().await;
        tokio::time::advance(Duration::from_secs(3)).await;
        ctl.poll_tick().await;

        assert_eq!(gateway.detect_calls(), 2);
        assert_eq!(presenter.toasts().len(), 1);

        gateway.push_detection(Err(GatewayError::Transport("refused".into())));
        tokio::time::advance(Duration::from_secs(3)).await;
        ctl.poll_tick().await;
        assert_eq!(presenter.toasts().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_detection_times_out() {
        let (mut ctl, gateway, presenter) = started().await;
        gateway.script().detect_delay = Duration::from_secs(30);

        ctl.poll_tick().await;

        assert_eq!(ctl.state(), SessionState::Running);
        assert!(presenter.toasts()[0].0.contains("timed out"));
        assert!(!ctl.is_tick_in_flight());
    }

    #[tokio::test]
    async fn only_one_detection_in_flight() {
        let (mut ctl, _gateway, _presenter) = started().await;

        let first = ctl.begin_tick().expect("first tick");
        assert!(ctl.is_tick_in_flight());
        assert!(ctl.begin_tick().is_none());

        drop(first);
        assert!(!ctl.is_tick_in_flight());
        assert!(ctl.begin_tick().is_some());
    }

    #[tokio::test]
    async fn results_from_a_stopped_session_are_discarded() {
        let (mut ctl, _gateway, presenter) = started().await;
        let request = ctl.begin_tick().expect("tick");
        ctl.stop();
        ctl.start().await.unwrap();
        presenter.clear();

        assert!(request.ticket.cancellation().is_cancelled());
        ctl.complete_tick(request.ticket, Ok(Detection::subject(aziz()))).await;

        assert_eq!(ctl.state(), SessionState::Running);
        assert!(ctl.current_subject().is_none());
        assert!(presenter.calls().is_empty());
        assert!(!ctl.is_tick_in_flight());
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let (mut ctl, _gateway, presenter) = started().await;
        ctl.apply_detection(Detection::emotion("happy", 82.0).with_subject(aziz())).await;
        presenter.clear();

        ctl.stop();
        let first = presenter.calls();
        presenter.clear();
        ctl.stop();

        assert_eq!(presenter.calls(), first);
        assert_eq!(ctl.state(), SessionState::Idle);
        assert!(ctl.samples().is_empty());
        assert!(ctl.general_history().is_empty());
        assert_eq!(ctl.scan_count(), 0);
        assert!(first.contains(&Call::Stats {
            scans: 0,
            elapsed: "00:00".into()
        }));
    }

    #[tokio::test]
    async fn missing_frame_skips_the_tick_quietly() {
        let gateway = ScriptedGateway::default();
        let presenter = RecordingPresenter::default();
        let no_frames = || -> Option<image::DynamicImage> { None };
        let mut ctl = DetectionSessionController::new(
            SessionConfig::default(),
            Arc::new(gateway.clone()),
            presenter.clone(),
            no_frames,
        );
        ctl.start().await.unwrap();
        presenter.clear();

        ctl.poll_tick().await;
        ctl.poll_tick().await;

        assert_eq!(gateway.detect_calls(), 0);
        assert!(!ctl.is_tick_in_flight());
        assert!(presenter.toasts().is_empty());
        assert_eq!(ctl.state(), SessionState::Running);
        assert_eq!(ctl.scan_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn clock_reports_scans_and_elapsed_time() {
        let (mut ctl, _gateway, presenter) = started().await;
        ctl.apply_detection(Detection::emotion("happy", 82.0).with_subject(aziz())).await;
        tokio::time::advance(Duration::from_secs(65)).await;

        ctl.clock_tick();

        assert_eq!(
            presenter.calls().last(),
            Some(&Call::Stats {
                scans: 1,
                elapsed: "01:05".into()
            })
        );
    }

    #[tokio::test]
    async fn invalid_roster_never_reaches_the_backend() {
        let (mut ctl, gateway, presenter) = controller();

        let err = ctl.upload_roster(RosterFile::new("staff.csv", vec![1, 2])).await.unwrap_err();

        assert!(matches!(err, SessionError::Validation(_)));
        assert!(gateway.script().uploads.is_empty());
        assert_eq!(presenter.toasts().last().map(|t| t.1), Some(Severity::Error));
    }

    #[tokio::test]
    async fn roster_upload_reports_counts() {
        let (mut ctl, gateway, presenter) = controller();
        gateway.script().upload_result = Ok(UploadReport {
            success_count: 12,
            error_count: 2,
            total_count: 14,
            ..UploadReport::default()
        });

        let report = ctl.upload_roster(RosterFile::new("staff.xlsx", vec![1; 64])).await.unwrap();

        assert_eq!(report.total_count, 14);
        assert_eq!(gateway.script().uploads, ["staff.xlsx"]);
        let toasts = presenter.toasts();
        assert!(toasts.contains(&("12 people imported".into(), Severity::Success)));
        assert!(toasts.contains(&("2 rows could not be imported".into(), Severity::Warning)));
    }
}
