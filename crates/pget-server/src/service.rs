// Download coordinator: probes the source, registers the task, launches
// the fetcher, and tracks task lifecycle in memory.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use pget_core::config::AppConfig;
use pget_core::engine::{self, DownloadConfig, ProgressFn};
use pget_core::hub::Hub;
use pget_core::metadata;
use pget_core::network;
use pget_core::types::{PgetError, Progress, Request, Task, TaskState};

pub const DEFAULT_USER_AGENT: &str = concat!("Pget/", env!("CARGO_PKG_VERSION"));

/// Payload returned for an accepted download.
#[derive(Debug, Serialize)]
pub struct Accepted {
    pub id: String,
    pub size: u64,
}

/// Owns the hub and the in-memory task registry. Shared across all
/// request handlers; never hidden behind a global.
pub struct DownloadService {
    config: AppConfig,
    hub: Arc<Hub>,
    tasks: Mutex<HashMap<String, Task>>,
    shutdown: CancellationToken,
}

impl DownloadService {
    pub fn new(config: AppConfig) -> Self {
        let capacity = config.progress.subscriber_capacity;
        Self {
            config,
            hub: Arc::new(Hub::new(capacity)),
            tasks: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    pub fn throttle_interval(&self) -> Duration {
        Duration::from_millis(self.config.progress.throttle_interval_ms)
    }

    /// Cancel every running download; used on server shutdown.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    // Guards are held only for plain map reads and writes; nothing under
    // the lock can panic, so poisoning is unreachable. Keep it that way
    // before adding calls inside any critical section.
    fn tasks(&self) -> MutexGuard<'_, HashMap<String, Task>> {
        self.tasks.lock().expect("task registry poisoned")
    }

    fn user_agent(&self) -> String {
        self.config
            .downloads
            .user_agent
            .clone()
            .filter(|ua| !ua.is_empty())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    /// Accept one download request: HEAD-probe the source, register the
    /// task, spawn the fetcher, and answer immediately with `{id, size}`.
    ///
    /// Probe failures are reported synchronously and register nothing.
    pub async fn start(self: Arc<Self>, req: Request) -> Result<Accepted, PgetError> {
        if req.url.is_empty() {
            return Err(PgetError::InvalidRequest("url must not be empty".to_string()));
        }
        let url = url::Url::parse(&req.url)?;
        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(PgetError::InvalidRequest(format!(
                    "unsupported scheme: {scheme}"
                )))
            }
        }

        let proxy = req
            .proxy_url
            .clone()
            .filter(|p| !p.is_empty())
            .or_else(|| self.config.downloads.proxy_url.clone().filter(|p| !p.is_empty()));

        let id = Uuid::new_v4().to_string();
        info!(%id, url = %req.url, "download requested");

        let probe_client = network::probe_client(proxy.as_deref())?;
        let content_length = network::probe(&probe_client, &req.url, &self.user_agent()).await?;

        let output_dir = req
            .download_path
            .clone()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(metadata::default_download_dir);
        let filename = metadata::filename_from_url(&url);

        let task = Task {
            id: id.clone(),
            url: req.url.clone(),
            content_length,
            parallelism: self.config.downloads.parallelism,
            output_dir,
            filename,
            state: TaskState::Queued,
        };

        // The hub entry must exist before this method returns so a
        // subscriber connecting right after the response finds it.
        self.hub.new_task(&id);
        self.tasks().insert(id.clone(), task);

        let service = self.clone();
        let task_id = id.clone();
        tokio::spawn(async move {
            service.run_download(task_id, proxy).await;
        });

        Ok(Accepted {
            id,
            size: content_length,
        })
    }

    async fn run_download(self: Arc<Self>, id: String, proxy: Option<String>) {
        let task = match self.tasks().get(&id).cloned() {
            Some(task) => task,
            None => return,
        };

        self.set_state(&id, TaskState::Running);
        let result = self.fetch(&task, proxy).await;

        match &result {
            Ok(()) => {
                info!(%id, "download finished");
                self.set_state(&id, TaskState::Done);
            }
            Err(PgetError::Cancelled) => {
                warn!(%id, "download cancelled");
                self.set_state(&id, TaskState::Cancelled);
            }
            Err(err) => {
                error!(%id, %err, "download failed");
                self.set_state(&id, TaskState::Failed);
            }
        }

        // Closing the task flushes buffered samples to the remaining
        // relays and makes late lookups answer "task finished".
        self.hub.close_task(&id);
        self.reap(&id);
    }

    async fn fetch(&self, task: &Task, proxy: Option<String>) -> Result<(), PgetError> {
        let client = network::build_client(task.parallelism, proxy.as_deref())?;

        let hub = self.hub.clone();
        let id = task.id.clone();
        let progress: ProgressFn = Arc::new(move |downloaded, total, speed| {
            hub.publish(
                &id,
                Progress {
                    downloaded,
                    total,
                    speed,
                },
            );
        });

        engine::download(DownloadConfig {
            urls: vec![task.url.clone()],
            filename: task.filename.clone(),
            output_dir: task.output_dir.clone(),
            content_length: task.content_length,
            parallelism: task.parallelism,
            client,
            user_agent: self.user_agent(),
            referer: self
                .config
                .downloads
                .referer
                .clone()
                .filter(|r| !r.is_empty()),
            read_buffer: self.config.downloads.read_buffer,
            sample_interval: Duration::from_millis(self.config.progress.sample_interval_ms),
            cancel: self.shutdown.child_token(),
            progress: Some(progress),
        })
        .await
    }

    fn set_state(&self, id: &str, state: TaskState) {
        if let Some(task) = self.tasks().get_mut(id) {
            task.state = state;
        }
    }

    /// Drop a task record once it is terminal and nobody subscribes to it
    /// any more. Called when the fetcher finishes and whenever a
    /// subscriber detaches.
    pub fn reap(&self, id: &str) {
        if self.hub.contains(id) {
            return;
        }
        let mut tasks = self.tasks();
        if tasks.get(id).is_some_and(|t| t.state.is_terminal()) {
            tasks.remove(id);
        }
    }

    /// Current state of a task, if its record is still held.
    pub fn task_state(&self, id: &str) -> Option<TaskState> {
        self.tasks().get(id).map(|t| t.state)
    }
}
