// THEORY:
// This file is the main entry point for the `emoscan` library crate.
// It defines the public API used by whatever shell hosts a detection session
// (the `emoscan_console` binary, a desktop front end, a kiosk page).
//
// The primary export is the `DetectionSessionController` together with the two
// seams it talks through: `DetectionGateway` (the network round trips to the
// inference and save endpoints) and `Presenter` (everything the operator sees).
// `WorkerControl` starts and stops the backend's stream workers for the slot grid.
// The small leaf components (`SampleBuffer`, `SessionClock`, history logs, the
// camera slot registry) live in `core_modules` and are re-exported where callers
// need them.

pub mod config;
pub mod controller;
pub mod core_modules;
pub mod error;
pub mod gateway;
#[cfg(feature = "http")]
pub mod http_gateway;
pub mod presenter;
pub mod runtime;
pub mod workers;

#[cfg(test)]
pub(crate) mod testing;

pub use config::SessionConfig;
pub use controller::{DetectionSessionController, PollRequest, SessionState, TickTicket};
pub use core_modules::observation::{EmotionKind, Observation, PendingResult};
pub use core_modules::subject::{Subject, SubjectId};
pub use error::{CaptureError, GatewayError, SessionError, ValidationError};
pub use gateway::{
    CameraConfig, Detection, DetectionGateway, PersistReport, WorkerLaunch, WorkerStatus,
};
pub use presenter::{Presenter, Severity, TracingPresenter};
pub use runtime::{SessionCommand, SessionHandle, SessionRuntime};
pub use workers::WorkerControl;
