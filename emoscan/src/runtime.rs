// THEORY:
// The `SessionRuntime` turns the controller's methods into a living session. It
// is a single tokio task that owns the controller and multiplexes four sources
// of events: operator commands, the poll interval, the clock interval and
// completed network calls.
//
// Key architectural principles:
// 1.  **One Owner**: Only the runtime task touches the controller. Shells talk to
//     it through a cloneable `SessionHandle` (an mpsc sender plus a `watch` on
//     the session state), so no locks guard session state.
// 2.  **Long Calls Run Beside the Loop**: Detection requests and roster uploads
//     are pushed into `FuturesUnordered` sets and polled by the same `select!`,
//     so a Stop is never queued behind them. The camera check of Start, batch
//     saves and the save of Continue run inline; a Stop sent meanwhile waits at
//     most their timeout.
// 3.  **Timers Follow the State**: Intervals exist only while the session is
//     active. Stopping drops them and cancels in-flight requests through the
//     controller's session token; their late answers are discarded by generation.

use crate::controller::{
    DetectionSessionController, PollRequest, SessionState, TickTicket, detect_with_deadline,
    with_deadline,
};
use crate::core_modules::upload::{RosterFile, UploadReport};
use crate::error::{GatewayError, SessionError};
use crate::gateway::{Detection, DetectionGateway};
use crate::presenter::Presenter;
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep, interval_at, sleep};
use tracing::{debug, info};

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;
type DetectionOutcome = (TickTicket, Result<Detection, GatewayError>);
type UploadOutcome = (Reply<UploadReport>, Result<UploadReport, GatewayError>);

/// Operator commands accepted by a running session.
#[derive(Debug)]
pub enum SessionCommand {
    Start { reply: Reply<()> },
    Stop,
    Continue { reply: Reply<()> },
    Confirm { reply: Reply<()> },
    RequestFollowup { reply: Reply<String> },
    UploadRoster { file: RosterFile, reply: Reply<UploadReport> },
    Shutdown,
}

/// Cloneable front door of a `SessionRuntime`.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    pub async fn start(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::Start { reply }).await
    }

    pub fn stop(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Stop)
    }

    pub async fn continue_session(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::Continue { reply }).await
    }

    pub async fn confirm(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::Confirm { reply }).await
    }

    pub async fn request_followup(&self) -> Result<String, SessionError> {
        self.request(|reply| SessionCommand::RequestFollowup { reply }).await
    }

    pub async fn upload_roster(&self, file: RosterFile) -> Result<UploadReport, SessionError> {
        self.request(|reply| SessionCommand::UploadRoster { file, reply }).await
    }

    /// Stops the session, if any, and ends the runtime task.
    pub fn shutdown(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Shutdown)
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.commands.send(command).map_err(|_| SessionError::RuntimeClosed)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.send(build(reply))?;
        response.await.map_err(|_| SessionError::RuntimeClosed)?
    }
}

/// Event loop owning a `DetectionSessionController`.
pub struct SessionRuntime<G, P> {
    controller: DetectionSessionController<G, P>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    state: watch::Sender<SessionState>,
    poll_timer: Option<Interval>,
    clock_timer: Option<Interval>,
    resume_poll: Option<Pin<Box<Sleep>>>,
    detections: FuturesUnordered<BoxFuture<'static, DetectionOutcome>>,
    uploads: FuturesUnordered<BoxFuture<'static, UploadOutcome>>,
}

impl<G: DetectionGateway, P: Presenter> SessionRuntime<G, P> {
    pub fn new(controller: DetectionSessionController<G, P>) -> (Self, SessionHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(controller.state());
        let runtime = Self {
            controller,
            commands: command_rx,
            state: state_tx,
            poll_timer: None,
            clock_timer: None,
            resume_poll: None,
            detections: FuturesUnordered::new(),
            uploads: FuturesUnordered::new(),
        };
        let handle = SessionHandle {
            commands: command_tx,
            state: state_rx,
        };
        (runtime, handle)
    }

    /// Spawns the event loop. The join handle yields the controller back after
    /// shutdown.
    pub fn spawn(
        controller: DetectionSessionController<G, P>,
    ) -> (SessionHandle, JoinHandle<DetectionSessionController<G, P>>)
    where
        P: Send + 'static,
    {
        let (runtime, handle) = Self::new(controller);
        (handle, tokio::spawn(runtime.run()))
    }

    /// Runs until `Shutdown` arrives or every handle is dropped.
    pub async fn run(mut self) -> DetectionSessionController<G, P> {
        info!("Session runtime started");
        loop {
            let keep_running = tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => false,
                },
                _ = next_tick(&mut self.poll_timer) => {
                    self.dispatch_tick();
                    true
                }
                _ = next_tick(&mut self.clock_timer) => {
                    self.controller.clock_tick();
                    true
                }
                _ = elapsed(&mut self.resume_poll) => {
                    self.resume_poll = None;
                    self.dispatch_tick();
                    true
                }
                Some((ticket, result)) = self.detections.next() => {
                    self.controller.complete_tick(ticket, result).await;
                    true
                }
                Some((reply, result)) = self.uploads.next() => {
                    let _ = reply.send(self.controller.complete_upload(result));
                    true
                }
            };

            if !keep_running {
                break;
            }
            self.sync_timers();
            self.state.send_replace(self.controller.state());
        }

        if self.controller.state() != SessionState::Idle {
            self.controller.stop();
        }
        self.state.send_replace(SessionState::Idle);
        info!("Session runtime stopped");
        self.controller
    }

    async fn handle(&mut self, command: SessionCommand) -> bool {
        match command {
            SessionCommand::Start { reply } => {
                let _ = reply.send(self.controller.start().await);
            }
            SessionCommand::Stop => {
                debug!("stop requested");
                self.controller.stop();
            }
            SessionCommand::Continue { reply } => {
                let result = self.controller.continue_session().await;
                if result.is_ok() {
                    self.schedule_resume_poll();
                }
                let _ = reply.send(result);
            }
            SessionCommand::Confirm { reply } => {
                let result = self.controller.confirm();
                if result.is_ok() {
                    self.schedule_resume_poll();
                }
                let _ = reply.send(result);
            }
            SessionCommand::RequestFollowup { reply } => {
                let _ = reply.send(self.controller.request_followup());
            }
            SessionCommand::UploadRoster { file, reply } => {
                match self.controller.begin_upload(file) {
                    Ok(file) => {
                        let gateway = Arc::clone(self.controller.gateway());
                        let budget = self.controller.config().upload_timeout;
                        self.uploads.push(Box::pin(async move {
                            let result = with_deadline(budget, gateway.upload_roster(file)).await;
                            (reply, result)
                        }));
                    }
                    Err(err) => {
                        let _ = reply.send(Err(err));
                    }
                }
            }
            SessionCommand::Shutdown => return false,
        }
        true
    }

    fn dispatch_tick(&mut self) {
        let Some(PollRequest { ticket, frame }) = self.controller.begin_tick() else {
            return;
        };
        let gateway = Arc::clone(self.controller.gateway());
        let budget = self.controller.config().detect_timeout;
        self.detections.push(Box::pin(async move {
            let result =
                detect_with_deadline(gateway.as_ref(), frame, budget, ticket.cancellation()).await;
            (ticket, result)
        }));
    }

    fn schedule_resume_poll(&mut self) {
        let delay = self.controller.config().resume_poll_delay;
        self.resume_poll = Some(Box::pin(sleep(delay)));
    }

    fn sync_timers(&mut self) {
        if self.controller.state() == SessionState::Idle {
            self.poll_timer = None;
            self.clock_timer = None;
            self.resume_poll = None;
            return;
        }

        let config = self.controller.config();
        if self.poll_timer.is_none() {
            let start = Instant::now() + config.first_tick_delay;
            let mut timer = interval_at(start, config.poll_interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            self.poll_timer = Some(timer);
        }
        if self.clock_timer.is_none() {
            let start = Instant::now() + config.clock_interval;
            let mut timer = interval_at(start, config.clock_interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            self.clock_timer = Some(timer);
        }
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => pending::<()>().await,
    }
}

async fn elapsed(delay: &mut Option<Pin<Box<Sleep>>>) {
    match delay {
        Some(delay) => delay.as_mut().await,
        None => pending::<()>().await,
    }
}
