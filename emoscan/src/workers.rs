// THEORY:
// The annotated camera feeds shown in the slot grid are drawn by stream workers
// on the backend, one per camera. Nothing draws them until someone asks, so a
// shell starts them once when it comes up (`auto_start`) and lets the operator
// start, stop and inspect them by hand afterwards.
//
// `WorkerControl` is independent of the detection session: it shares the
// gateway, not the controller, and never touches session state.

use crate::controller::with_deadline;
use crate::error::GatewayError;
use crate::gateway::{DetectionGateway, WorkerLaunch, WorkerStatus};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct WorkerControl<G> {
    gateway: Arc<G>,
    budget: Duration,
    auto_started: bool,
}

impl<G: DetectionGateway> WorkerControl<G> {
    pub fn new(gateway: Arc<G>, budget: Duration) -> Self {
        Self {
            gateway,
            budget,
            auto_started: false,
        }
    }

    pub fn auto_started(&self) -> bool {
        self.auto_started
    }

    /// Starts the workers the first time it succeeds. Later calls return
    /// `Ok(None)` without a request; a failed attempt may be retried.
    pub async fn auto_start(&mut self) -> Result<Option<WorkerLaunch>, GatewayError> {
        if self.auto_started {
            info!("Stream workers already started");
            return Ok(None);
        }
        let launch = self.start().await?;
        self.auto_started = true;
        Ok(Some(launch))
    }

    pub async fn start(&mut self) -> Result<WorkerLaunch, GatewayError> {
        match with_deadline(self.budget, self.gateway.start_workers()).await {
            Ok(launch) => {
                info!(cameras = launch.loaded_cameras, "Stream workers started");
                Ok(launch)
            }
            Err(err) => {
                warn!("Starting stream workers failed: {}", err);
                Err(err)
            }
        }
    }

    pub async fn stop(&mut self) -> Result<(), GatewayError> {
        let ack = with_deadline(self.budget, self.gateway.stop_workers()).await?;
        if !ack.success {
            let message = ack.message.unwrap_or_else(|| "workers did not stop".to_string());
            return Err(GatewayError::from_backend_message(200, message));
        }
        info!("Stream workers stopped");
        Ok(())
    }

    pub async fn status(&self) -> Result<WorkerStatus, GatewayError> {
        with_deadline(self.budget, self.gateway.worker_status()).await
    }
}
