use anyhow::{Context, bail};
use emoscan::core_modules::camera_slots::{CameraFeed, CameraInfo, CameraSlots, SLOT_COUNT};
use emoscan::core_modules::frame::FrameSequence;
use emoscan::core_modules::upload::RosterFile;
use emoscan::http_gateway::HttpGateway;
use emoscan::{
    DetectionGateway, DetectionSessionController, SessionConfig, SessionHandle, SessionRuntime,
    TracingPresenter, WorkerControl,
};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

const HELP: &str = "commands: start | stop | continue | confirm | test | upload <path> | \
                    cameras | slot <camera id> | close <slot> | full <slot> | esc | \
                    workers start|stop|status | quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Logging ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- 2. Argument Parsing & Frame Loading ---
    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        println!("Usage: emoscan_console <image or directory>...");
        return Ok(());
    }
    let frames = load_frames(&args)?;
    info!("Loaded {} frame(s)", frames.len());

    // --- 3. Session Wiring ---
    let config = SessionConfig::from_env();
    info!(backend = %config.base_url, "Using backend");
    let gateway = Arc::new(HttpGateway::new(config.clone()));
    let controller = DetectionSessionController::new(
        config.clone(),
        Arc::clone(&gateway),
        TracingPresenter,
        frames,
    );
    let (handle, task) = SessionRuntime::spawn(controller);

    // The annotated slot feeds need the backend's stream workers.
    let mut workers = WorkerControl::new(Arc::clone(&gateway), config.save_timeout);
    if let Ok(Some(launch)) = workers.auto_start().await {
        info!("{} camera stream(s) running", launch.loaded_cameras);
    }

    // --- 4. Operator Loop ---
    println!("{HELP}");
    let mut console = Console {
        handle,
        gateway,
        workers,
        config,
        slots: CameraSlots::new(),
        cameras: Vec::new(),
    };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !console.execute(line).await {
            break;
        }
    }

    // --- 5. Shutdown ---
    console.handle.shutdown().ok();
    task.await.context("session runtime panicked")?;
    Ok(())
}

struct Console {
    handle: SessionHandle,
    gateway: Arc<HttpGateway>,
    workers: WorkerControl<HttpGateway>,
    config: SessionConfig,
    slots: CameraSlots,
    cameras: Vec<CameraInfo>,
}

impl Console {
    /// Runs one operator command. Returns false on `quit`.
    async fn execute(&mut self, line: &str) -> bool {
        let (command, argument) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        // Failures are already surfaced as toasts by the session; log the rest.
        match command {
            "start" => {
                if let Err(err) = self.handle.start().await {
                    warn!("start: {}", err);
                }
            }
            "stop" => {
                if let Err(err) = self.handle.stop() {
                    warn!("stop: {}", err);
                }
            }
            "continue" => {
                if let Err(err) = self.handle.continue_session().await {
                    warn!("continue: {}", err);
                }
            }
            "confirm" => {
                if let Err(err) = self.handle.confirm().await {
                    warn!("confirm: {}", err);
                }
            }
            "test" => match self.handle.request_followup().await {
                Ok(path) => info!("Open {}", self.config.endpoint(&path)),
                Err(err) => warn!("test: {}", err),
            },
            "upload" => {
                if let Err(err) = self.upload(argument).await {
                    error!("upload: {:#}", err);
                }
            }
            "cameras" => self.list_cameras().await,
            "slot" => self.open_slot(argument),
            "close" => match parse_slot(argument) {
                Some(index) => match self.slots.release(index) {
                    Some(feed) => info!("Slot {} closed ({})", index + 1, feed.name),
                    None => info!("Slot {} is already empty", index + 1),
                },
                None => warn!("close: expected a slot number 1-{}", SLOT_COUNT),
            },
            "full" => {
                let toggled = parse_slot(argument)
                    .and_then(|index| self.slots.toggle_fullscreen(index).map(|on| (index, on)));
                match toggled {
                    Some((index, on)) => {
                        info!("Slot {} fullscreen {}", index + 1, if on { "on" } else { "off" })
                    }
                    None => warn!("full: no camera in that slot"),
                }
            }
            "esc" => {
                let closed = self.slots.exit_fullscreen();
                if closed > 0 {
                    info!("Left fullscreen");
                }
            }
            "workers" => self.control_workers(argument).await,
            "quit" | "exit" => return false,
            _ => println!("{HELP}"),
        }
        true
    }

    async fn upload(&self, argument: &str) -> anyhow::Result<()> {
        if argument.is_empty() {
            bail!("expected a file path");
        }
        let path = Path::new(argument);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("path has no file name")?;
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;

        let report = self.handle.upload_roster(RosterFile::new(name, bytes)).await?;
        info!(
            imported = report.success_count,
            failed = report.error_count,
            total = report.total_count,
            "Roster processed"
        );
        for row_error in &report.errors {
            warn!("  {}", row_error);
        }
        Ok(())
    }

    async fn control_workers(&mut self, argument: &str) {
        match argument {
            "start" => {
                if let Ok(launch) = self.workers.start().await {
                    info!("{} camera stream(s) running", launch.loaded_cameras);
                }
            }
            "stop" => {
                if let Err(err) = self.workers.stop().await {
                    error!("Stopping stream workers failed: {}", err);
                }
            }
            "status" | "" => match self.workers.status().await {
                Ok(status) if status.is_active() => {
                    info!("Stream workers: {} camera(s) running", status.active_threads)
                }
                Ok(_) => info!("Stream workers: stopped"),
                Err(err) => warn!("Worker status unavailable: {}", err),
            },
            _ => warn!("workers: expected start, stop or status"),
        }
    }

    async fn list_cameras(&mut self) {
        match self.gateway.list_cameras().await {
            Ok(cameras) => {
                info!("{} camera(s)", cameras.len());
                for camera in &cameras {
                    info!(
                        active = camera.is_active,
                        "  [{}] {} {}",
                        camera.id,
                        camera.name,
                        camera.stream_url.as_deref().unwrap_or("")
                    );
                }
                self.cameras = cameras;
            }
            Err(err) => error!("Loading cameras failed: {}", err),
        }
    }

    fn open_slot(&mut self, argument: &str) {
        let Ok(camera_id) = argument.parse::<u64>() else {
            warn!("slot: expected a camera id");
            return;
        };
        let feed = match self.cameras.iter().find(|c| c.id == camera_id) {
            Some(info) => CameraFeed::from(info),
            None => CameraFeed::annotated(camera_id, format!("Camera {camera_id}")),
        };
        let name = feed.name.clone();
        let path = self.config.endpoint(&feed.stream_path);
        let index = self.slots.assign(feed);
        info!("Slot {}: {} ({})", index + 1, name, path);
    }
}

/// Parses a 1-based slot number.
fn parse_slot(argument: &str) -> Option<usize> {
    let number: usize = argument.parse().ok()?;
    (1..=SLOT_COUNT).contains(&number).then(|| number - 1)
}

fn load_frames(args: &[String]) -> anyhow::Result<FrameSequence> {
    let mut paths = Vec::new();
    for arg in args {
        let path = PathBuf::from(arg);
        if path.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(&path)
                .with_context(|| format!("cannot list {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| is_image(p))
                .collect();
            entries.sort();
            paths.extend(entries);
        } else {
            paths.push(path);
        }
    }

    let frames = paths
        .iter()
        .map(|path| image::open(path).with_context(|| format!("cannot open {}", path.display())))
        .collect::<anyhow::Result<Vec<_>>>()?;
    if frames.is_empty() {
        bail!("no image files found");
    }
    Ok(FrameSequence::new(frames))
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
