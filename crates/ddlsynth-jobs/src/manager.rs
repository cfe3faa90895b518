use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use ddlsynth_ai::{AiOrchestrator, CancellationToken, OrchestratorError};
use ddlsynth_parse::SchemaParser;
use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore, broadcast};
use tracing::{info, warn};

use crate::errors::{JobError, Result};
use crate::model::{Job, JobEvent, JobId, JobRequest, JobResult, JobStatus};
use crate::progress::{JobSink, PARSE_SHARE, generation_progress};

const EVENT_BUFFER: usize = 256;

/// Limits applied by a [`JobManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSettings {
    pub max_concurrent_jobs: usize,
    /// How long terminal jobs stay queryable.
    pub retention: Duration,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            retention: Duration::from_secs(3600),
        }
    }
}

struct JobEntry {
    job: Job,
    cancel: CancellationToken,
    events: broadcast::Sender<JobEvent>,
    finished: Option<Instant>,
    /// Released together with the transition to a terminal status.
    permit: Option<OwnedSemaphorePermit>,
}

/// Registry and runner for generation jobs.
///
/// Construct once and share through an `Arc`; every job runs in its own
/// task and is the only writer of its entry, apart from cancellation.
pub struct JobManager {
    parser: SchemaParser,
    orchestrator: AiOrchestrator,
    settings: JobSettings,
    slots: Arc<Semaphore>,
    jobs: RwLock<HashMap<JobId, JobEntry>>,
}

impl JobManager {
    pub fn new(parser: SchemaParser, orchestrator: AiOrchestrator, settings: JobSettings) -> Self {
        Self {
            parser,
            orchestrator,
            settings,
            slots: Arc::new(Semaphore::new(settings.max_concurrent_jobs)),
            jobs: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> JobSettings {
        self.settings
    }

    /// Register a job and spawn its pipeline.
    pub async fn start(self: &Arc<Self>, request: JobRequest) -> Result<JobId> {
        self.sweep().await;

        let permit = Arc::clone(&self.slots)
            .try_acquire_owned()
            .map_err(|_| JobError::CapacityExceeded {
                limit: self.settings.max_concurrent_jobs,
            })?;

        let id = JobId::new();
        let cancel = CancellationToken::new();
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        self.jobs.write().await.insert(
            id,
            JobEntry {
                job: Job::new(id),
                cancel: cancel.clone(),
                events,
                finished: None,
                permit: Some(permit),
            },
        );
        info!(job = %id, "job created");

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let pipeline = tokio::spawn(Arc::clone(&manager).execute(id, request, cancel));
            if let Err(err) = pipeline.await {
                warn!(job = %id, error = %err, "job pipeline aborted");
                manager
                    .fail(id, format!("pipeline task failed: {err}"))
                    .await;
            }
        });
        Ok(id)
    }

    pub async fn status(&self, id: JobId) -> Result<Job> {
        self.jobs
            .read()
            .await
            .get(&id)
            .map(|entry| entry.job.clone())
            .ok_or(JobError::NotFound(id))
    }

    /// Request cancellation. Honored at the pipeline's next table boundary.
    pub async fn cancel(&self, id: JobId) -> Result<Job> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs.get_mut(&id).ok_or(JobError::NotFound(id))?;
        if !entry.job.status.is_terminal() {
            entry.job.cancelled = true;
            entry.cancel.cancel();
            info!(job = %id, "job cancellation requested");
        }
        Ok(entry.job.clone())
    }

    pub async fn subscribe(&self, id: JobId) -> Result<broadcast::Receiver<JobEvent>> {
        self.jobs
            .read()
            .await
            .get(&id)
            .map(|entry| entry.events.subscribe())
            .ok_or(JobError::NotFound(id))
    }

    /// Drop terminal jobs older than the retention window. Returns how many
    /// were removed.
    pub async fn sweep(&self) -> usize {
        let retention = self.settings.retention;
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, entry| {
            entry
                .finished
                .is_none_or(|finished| finished.elapsed() < retention)
        });
        let removed = before - jobs.len();
        if removed > 0 {
            info!(removed, "expired jobs swept");
        }
        removed
    }

    async fn execute(self: Arc<Self>, id: JobId, request: JobRequest, cancel: CancellationToken) {
        self.set_status(id, JobStatus::Running).await;

        let schema = match self.parser.parse(&request.ddl).await {
            Ok(schema) => schema,
            Err(err) => {
                warn!(job = %id, error = %err, "schema recovery failed");
                self.fail(id, err.to_string()).await;
                return;
            }
        };
        self.advance(id, PARSE_SHARE).await;

        if cancel.is_cancelled() {
            self.finish(id, JobStatus::Cancelled, None).await;
            return;
        }

        let sink = JobSink {
            manager: Arc::clone(&self),
            id,
        };
        let outcome = match self
            .orchestrator
            .run(&schema, &request.config, &sink, &cancel)
            .await
        {
            Ok(outcome) => outcome,
            Err(OrchestratorError::Cancelled) => {
                self.finish(id, JobStatus::Cancelled, None).await;
                return;
            }
            Err(err) => {
                warn!(job = %id, error = %err, "generation failed");
                self.fail(id, err.to_string()).await;
                return;
            }
        };
        self.advance(id, generation_progress(1.0)).await;

        if cancel.is_cancelled() {
            self.finish(id, JobStatus::Cancelled, None).await;
            return;
        }

        let result = JobResult {
            schema,
            dataset: outcome.dataset,
            meta: outcome.meta,
        };
        self.advance(id, 1.0).await;
        self.finish(id, JobStatus::Completed, Some(result)).await;
    }

    /// Raise a job's progress; lower values are ignored.
    pub(crate) async fn advance(&self, id: JobId, progress: f64) {
        let mut jobs = self.jobs.write().await;
        let Some(entry) = jobs.get_mut(&id) else {
            return;
        };
        if progress > entry.job.progress {
            entry.job.progress = progress.min(1.0);
            let _ = entry.events.send(JobEvent::Progress {
                progress: entry.job.progress,
            });
        }
    }

    pub(crate) async fn publish(&self, id: JobId, event: JobEvent) {
        if let Some(entry) = self.jobs.read().await.get(&id) {
            let _ = entry.events.send(event);
        }
    }

    async fn set_status(&self, id: JobId, status: JobStatus) {
        let mut jobs = self.jobs.write().await;
        if let Some(entry) = jobs.get_mut(&id) {
            entry.job.status = status;
            let _ = entry.events.send(JobEvent::Status { status });
        }
    }

    async fn fail(&self, id: JobId, message: String) {
        {
            let mut jobs = self.jobs.write().await;
            if let Some(entry) = jobs.get_mut(&id) {
                entry.job.error = Some(message);
            }
        }
        self.finish(id, JobStatus::Error, None).await;
    }

    async fn finish(&self, id: JobId, status: JobStatus, result: Option<JobResult>) {
        let mut jobs = self.jobs.write().await;
        let Some(entry) = jobs.get_mut(&id) else {
            return;
        };
        entry.job.status = status;
        entry.job.result = result;
        entry.job.finished_at = Some(Utc::now());
        entry.finished = Some(Instant::now());
        entry.permit = None;
        info!(job = %id, status = ?status, progress = entry.job.progress, "job finished");
        let _ = entry.events.send(JobEvent::Status { status });
    }
}
