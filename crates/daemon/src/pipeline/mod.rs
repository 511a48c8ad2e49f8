//! Asynchronous prompt-to-video jobs.
//!
//! A single worker task drains a FIFO queue and runs one job at a time:
//! video stage, audio stage, then mux. The job table is shared behind one
//! mutex that is never held across an await.

pub mod fallback;
pub mod job;
pub mod stages;

use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};
pub use job::{
    estimate_duration_seconds, Job, JobStage, JobStatus, ProviderKind, VideoJobRequest,
};
pub use stages::Providers;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Each job writes under `<output_root>/<job_id>/`.
    pub output_root: PathBuf,
    /// Bounded wait on the queue between shutdown checks.
    pub queue_poll_interval: Duration,
    /// How long `stop` waits for the worker.
    pub shutdown_timeout: Duration,
    pub list_limit_max: usize,
}

impl OrchestratorConfig {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            queue_poll_interval: Duration::from_millis(500),
            shutdown_timeout: Duration::from_secs(2),
            list_limit_max: 100,
        }
    }
}

/// Published on every recorded job update.
#[derive(Debug, Clone, PartialEq)]
pub struct JobEvent {
    pub job_id: String,
    pub status: JobStatus,
    pub stage: JobStage,
    pub progress: u8,
}

struct Entry {
    seq: u64,
    job: Job,
}

#[derive(Default)]
struct JobTable {
    entries: HashMap<String, Entry>,
    next_seq: u64,
}

/// The in-memory job arena.
struct JobStore {
    table: Mutex<JobTable>,
    events: broadcast::Sender<JobEvent>,
}

impl JobStore {
    fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            table: Mutex::new(JobTable::default()),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, JobTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, job: &Job) {
        // No subscribers is fine.
        let _ = self.events.send(JobEvent {
            job_id: job.id.clone(),
            status: job.status,
            stage: job.stage,
            progress: job.progress,
        });
    }

    fn insert(&self, job: Job) {
        let mut table = self.lock();
        let seq = table.next_seq;
        table.next_seq += 1;
        self.publish(&job);
        table.entries.insert(job.id.clone(), Entry { seq, job });
    }

    fn get(&self, id: &str) -> Option<Job> {
        self.lock().entries.get(id).map(|e| e.job.clone())
    }

    fn list_recent(&self, limit: usize) -> Vec<Job> {
        let table = self.lock();
        let mut entries: Vec<&Entry> = table.entries.values().collect();
        entries.sort_by(|a, b| {
            b.job
                .created_at
                .cmp(&a.job.created_at)
                .then(b.seq.cmp(&a.seq))
        });
        entries.into_iter().take(limit).map(|e| e.job.clone()).collect()
    }

    fn update(&self, id: &str, apply: impl FnOnce(&mut Job)) {
        let mut table = self.lock();
        if let Some(entry) = table.entries.get_mut(id) {
            if entry.job.status.is_terminal() {
                return;
            }
            let floor = entry.job.progress;
            apply(&mut entry.job);
            entry.job.progress = entry.job.progress.max(floor);
            self.publish(&entry.job);
        }
    }
}

pub struct JobOrchestrator {
    store: Arc<JobStore>,
    queue: mpsc::UnboundedSender<String>,
    queued: Arc<AtomicUsize>,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
    config: OrchestratorConfig,
}

impl JobOrchestrator {
    /// Spawns the worker on the current tokio runtime.
    pub fn start(config: OrchestratorConfig, providers: Providers) -> Self {
        let store = Arc::new(JobStore::new());
        let queued = Arc::new(AtomicUsize::new(0));
        let shutdown = CancellationToken::new();
        let (queue, rx) = mpsc::unbounded_channel();

        let worker = Worker {
            store: store.clone(),
            providers,
            output_root: config.output_root.clone(),
            queued: queued.clone(),
        };
        let handle = tokio::spawn(worker.run(rx, shutdown.clone(), config.queue_poll_interval));

        info!(output_root = %config.output_root.display(), "job orchestrator started");
        Self {
            store,
            queue,
            queued,
            shutdown,
            worker: Mutex::new(Some(handle)),
            config,
        }
    }

    /// Records a queued job and enqueues it. Never waits for execution.
    pub fn submit(&self, request: VideoJobRequest) -> PipelineResult<Job> {
        if self.shutdown.is_cancelled() {
            return Err(PipelineError::Unavailable("job orchestrator is stopped".to_string()));
        }
        let request = request.validate()?;
        let job = Job::queued(Uuid::new_v4().simple().to_string(), request);

        self.store.insert(job.clone());
        self.queued.fetch_add(1, Ordering::SeqCst);
        if self.queue.send(job.id.clone()).is_err() {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            self.store.update(&job.id, |j| j.fail("job worker is not running"));
            return Err(PipelineError::Unavailable("job worker is not running".to_string()));
        }

        info!(job_id = %job.id, "video job queued");
        Ok(job)
    }

    pub fn get(&self, id: &str) -> PipelineResult<Job> {
        self.store
            .get(id)
            .ok_or_else(|| PipelineError::JobNotFound(id.to_string()))
    }

    /// Newest first. `limit` is clamped to `1..=list_limit_max`.
    pub fn list_recent(&self, limit: usize) -> Vec<Job> {
        self.store
            .list_recent(limit.clamp(1, self.config.list_limit_max.max(1)))
    }

    /// Jobs waiting for the worker.
    pub fn queue_depth(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.store.events.subscribe()
    }

    /// Signals the worker and waits a bounded time for it to finish its job.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return;
        };
        match timeout(self.config.shutdown_timeout, handle).await {
            Ok(Ok(())) => info!("job orchestrator stopped"),
            Ok(Err(e)) => error!(error = %e, "job worker ended abnormally"),
            Err(_) => warn!("job worker still busy after shutdown timeout"),
        }
    }
}

struct Worker {
    store: Arc<JobStore>,
    providers: Providers,
    output_root: PathBuf,
    queued: Arc<AtomicUsize>,
}

impl Worker {
    async fn run(
        self,
        mut rx: mpsc::UnboundedReceiver<String>,
        shutdown: CancellationToken,
        poll_interval: Duration,
    ) {
        while !shutdown.is_cancelled() {
            match timeout(poll_interval, rx.recv()).await {
                Err(_) => continue,
                Ok(None) => break,
                Ok(Some(job_id)) => {
                    self.queued.fetch_sub(1, Ordering::SeqCst);
                    self.process(&job_id).await;
                }
            }
        }
    }

    /// Runs one job to a terminal state. Never propagates.
    async fn process(&self, job_id: &str) {
        let result = AssertUnwindSafe(self.run_job(job_id)).catch_unwind().await;
        let message = match result {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err.to_string(),
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                format!("job worker panicked: {detail}")
            }
        };
        error!(job_id, error = %message, "video job failed");
        self.store.update(job_id, |job| job.fail(&message));
    }

    fn checkpoint(&self, job_id: &str, stage: JobStage) {
        self.store.update(job_id, |job| job.enter_stage(stage));
    }

    async fn run_job(&self, job_id: &str) -> PipelineResult<()> {
        let Some(job) = self.store.get(job_id) else {
            return Err(PipelineError::JobNotFound(job_id.to_string()));
        };

        self.store.update(job_id, |job| {
            job.status = JobStatus::Running;
            job.enter_stage(JobStage::Starting);
        });

        let seconds = estimate_duration_seconds(&job.narration);
        let job_dir = self.output_root.join(&job.id);
        tokio::fs::create_dir_all(&job_dir).await?;
        info!(job_id, seconds, "video job started");

        let video = stages::video_stage(&self.providers, &job, seconds, &job_dir, |stage| {
            self.checkpoint(job_id, stage)
        })
        .await?;
        let video_provider = video.provider;
        self.store
            .update(job_id, |job| job.record_video_provider(video_provider));

        self.checkpoint(job_id, JobStage::GeneratingAudio);
        let audio = stages::audio_stage(&self.providers, &job, seconds, &job_dir).await?;
        let audio_provider = audio.provider;
        self.store
            .update(job_id, |job| job.record_audio_provider(audio_provider));

        self.checkpoint(job_id, JobStage::Muxing);
        let output = job_dir.join("final.mp4");
        self.providers
            .media
            .mux(&video.value, &audio.value, &output)
            .await?;

        info!(job_id, video = ?video_provider, audio = ?audio_provider, "video job completed");
        self.store.update(job_id, |job| {
            job.status = JobStatus::Completed;
            job.output_path = Some(output);
            job.enter_stage(JobStage::Completed);
        });
        Ok(())
    }
}
