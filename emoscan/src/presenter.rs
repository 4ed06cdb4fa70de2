use crate::core_modules::history::HistoryItem;
use crate::core_modules::subject::Subject;
use crate::gateway::AnalysisSummary;
use std::fmt;
use tracing::{error, info, warn};

/// Toast severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(name)
    }
}

/// Everything the operator sees. Calls are fire-and-forget: the controller never
/// reads anything back.
pub trait Presenter {
    /// Shows the recognized person, or clears the person card with `None`.
    fn show_subject(&mut self, subject: Option<&Subject>);

    /// Shows an emotion reading. `show_actions` enables the confirm/test buttons.
    fn show_emotion(
        &mut self,
        label: &str,
        confidence: f64,
        show_actions: bool,
        subject: Option<&Subject>,
    );

    /// Renders history rows, newest first. `owner` names the person the rows belong to.
    fn show_history(&mut self, items: &[HistoryItem], owner: Option<&str>);

    fn show_toast(&mut self, message: &str, severity: Severity);

    /// Shows the post-batch results dialog.
    fn show_confirmation_modal(
        &mut self,
        subject: &Subject,
        analysis: Option<&AnalysisSummary>,
        requires_followup: bool,
    );

    /// Camera on/off indicator.
    fn show_status(&mut self, active: bool);

    /// Scan counter and elapsed session time.
    fn show_stats(&mut self, scan_count: u32, elapsed: &str);
}

/// Renders presenter calls as `tracing` events. Used by headless consoles.
#[derive(Debug, Default)]
pub struct TracingPresenter;

impl Presenter for TracingPresenter {
    fn show_subject(&mut self, subject: Option<&Subject>) {
        match subject {
            Some(s) => info!(
                target: "emoscan::ui",
                id = s.id.0,
                confidence = s.confidence,
                stored = s.prior_observation_count,
                "person: {}",
                s.display_name
            ),
            None => info!(target: "emoscan::ui", "person: ---"),
        }
    }

    fn show_emotion(
        &mut self,
        label: &str,
        confidence: f64,
        show_actions: bool,
        subject: Option<&Subject>,
    ) {
        info!(
            target: "emoscan::ui",
            confidence,
            actions = show_actions,
            person = subject.map(|s| s.display_name.as_str()).unwrap_or("-"),
            "emotion: {}",
            label
        );
    }

    fn show_history(&mut self, items: &[HistoryItem], owner: Option<&str>) {
        let rows: Vec<String> = items
            .iter()
            .map(|item| format!("{} {} {}%", item.time, item.emotion_label, item.confidence))
            .collect();
        info!(
            target: "emoscan::ui",
            owner = owner.unwrap_or("-"),
            "history: [{}]",
            rows.join(", ")
        );
    }

    fn show_toast(&mut self, message: &str, severity: Severity) {
        match severity {
            Severity::Error => error!(target: "emoscan::ui", "{}", message),
            Severity::Warning => warn!(target: "emoscan::ui", "{}", message),
            Severity::Info | Severity::Success => {
                info!(target: "emoscan::ui", %severity, "{}", message)
            }
        }
    }

    fn show_confirmation_modal(
        &mut self,
        subject: &Subject,
        analysis: Option<&AnalysisSummary>,
        requires_followup: bool,
    ) {
        let (negative, total, percent) = analysis
            .map(|a| (a.negative_count, a.total_emotions, a.negative_percentage))
            .unwrap_or_default();
        info!(
            target: "emoscan::ui",
            negative,
            total,
            percent,
            followup = requires_followup,
            "results ready for {}",
            subject.display_name
        );
    }

    fn show_status(&mut self, active: bool) {
        info!(target: "emoscan::ui", "camera {}", if active { "on" } else { "off" });
    }

    fn show_stats(&mut self, scan_count: u32, elapsed: &str) {
        tracing::debug!(target: "emoscan::ui", scan_count, "elapsed {}", elapsed);
    }
}
