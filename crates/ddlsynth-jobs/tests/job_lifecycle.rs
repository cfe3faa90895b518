use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ddlsynth_ai::{AiOrchestrator, CompletionClient, CompletionError, CompletionRequest};
use ddlsynth_generate::GenerationConfig;
use ddlsynth_jobs::{
    Job, JobError, JobEvent, JobId, JobManager, JobRequest, JobSettings, JobStatus,
};
use ddlsynth_parse::SchemaParser;
use tokio::sync::Semaphore;

const LIBRARY_DDL: &str = "
CREATE TABLE authors (id SERIAL PRIMARY KEY, name VARCHAR(100) NOT NULL);
CREATE TABLE books (
  id SERIAL PRIMARY KEY,
  title VARCHAR(200) NOT NULL,
  author_id INTEGER NOT NULL REFERENCES authors(id)
);
";

/// Blocks every call until the gate is opened, then answers with prose.
struct GatedClient {
    gate: Semaphore,
    calls: AtomicUsize,
}

impl GatedClient {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            calls: AtomicUsize::new(0),
        })
    }

    fn open(&self) {
        self.gate.add_permits(1);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionClient for GatedClient {
    async fn complete(&self, _request: CompletionRequest) -> Result<String, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _permit = self.gate.acquire().await.map_err(|_| CompletionError::Disabled)?;
        Ok("no rows today".to_string())
    }
}

/// Panics on every call, standing in for a bug inside the pipeline.
struct PanickingClient;

#[async_trait]
impl CompletionClient for PanickingClient {
    async fn complete(&self, _request: CompletionRequest) -> Result<String, CompletionError> {
        panic!("completion client exploded");
    }
}

fn request() -> JobRequest {
    JobRequest {
        ddl: LIBRARY_DDL.to_string(),
        config: GenerationConfig {
            seed: Some(1),
            num_records: Some(3),
            ..GenerationConfig::default()
        },
    }
}

fn offline_manager(settings: JobSettings) -> Arc<JobManager> {
    Arc::new(JobManager::new(SchemaParser::new(), AiOrchestrator::disabled(), settings))
}

fn gated_manager(client: &Arc<GatedClient>, settings: JobSettings) -> Arc<JobManager> {
    let client = Arc::clone(client) as Arc<dyn CompletionClient>;
    Arc::new(JobManager::new(
        SchemaParser::new(),
        AiOrchestrator::new(Some(client)),
        settings,
    ))
}

async fn wait_for(manager: &JobManager, id: JobId, done: impl Fn(&Job) -> bool) -> Job {
    for _ in 0..500 {
        let job = manager.status(id).await.expect("job");
        if done(&job) {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} did not reach the expected state");
}

async fn wait_terminal(manager: &JobManager, id: JobId) -> Job {
    wait_for(manager, id, |job| job.status.is_terminal()).await
}

#[tokio::test]
async fn offline_job_completes_with_a_valid_dataset() {
    let manager = offline_manager(JobSettings::default());
    let id = manager.start(request()).await.expect("start");

    let job = wait_terminal(&manager, id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 1.0);
    assert!(job.finished_at.is_some());
    assert!(!job.cancelled);

    let result = job.result.expect("result");
    assert_eq!(result.schema.table_names(), vec!["authors", "books"]);
    assert_eq!(result.dataset["authors"].len(), 3);
    assert_eq!(result.dataset["books"].len(), 3);
    assert!(result.meta.validation.passed());
}

#[tokio::test]
async fn unparsable_ddl_ends_in_error() {
    let manager = offline_manager(JobSettings::default());
    let id = manager
        .start(JobRequest {
            ddl: "this is not ddl".to_string(),
            config: GenerationConfig::default(),
        })
        .await
        .expect("start");

    let job = wait_terminal(&manager, id).await;
    assert_eq!(job.status, JobStatus::Error);
    assert!(job.error.as_deref().is_some_and(|e| e.contains("no tables")));
    assert!(job.result.is_none());
}

#[tokio::test]
async fn capacity_is_enforced_and_released() {
    let client = GatedClient::new();
    let manager = gated_manager(
        &client,
        JobSettings {
            max_concurrent_jobs: 1,
            ..JobSettings::default()
        },
    );

    let first = manager.start(request()).await.expect("first");
    let rejected = manager.start(request()).await;
    assert_eq!(rejected, Err(JobError::CapacityExceeded { limit: 1 }));

    client.gate.add_permits(100);
    let job = wait_terminal(&manager, first).await;
    assert_eq!(job.status, JobStatus::Completed);

    let second = manager.start(request()).await.expect("slot released");
    assert_eq!(wait_terminal(&manager, second).await.status, JobStatus::Completed);
}

#[tokio::test]
async fn cancellation_waits_for_the_in_flight_call() {
    let client = GatedClient::new();
    let manager = gated_manager(&client, JobSettings::default());
    let id = manager.start(request()).await.expect("start");

    for _ in 0..500 {
        if client.calls() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(client.calls(), 1);

    let snapshot = manager.cancel(id).await.expect("cancel");
    assert!(snapshot.cancelled);
    assert_eq!(snapshot.status, JobStatus::Running);

    client.open();
    let job = wait_terminal(&manager, id).await;
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.result.is_none());
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn subscribers_see_monotone_progress() {
    let client = GatedClient::new();
    let manager = gated_manager(&client, JobSettings::default());
    let id = manager.start(request()).await.expect("start");
    let mut events = manager.subscribe(id).await.expect("subscribe");

    client.gate.add_permits(100);

    let mut progress = Vec::new();
    let mut last_status = None;
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event in time")
            .expect("open channel");
        match event {
            JobEvent::Progress { progress: value } => progress.push(value),
            JobEvent::Status { status } => {
                last_status = Some(status);
                if status.is_terminal() {
                    break;
                }
            }
            JobEvent::Pipeline { .. } => {}
        }
    }

    assert_eq!(last_status, Some(JobStatus::Completed));
    assert!(progress.windows(2).all(|pair| pair[0] <= pair[1]), "{progress:?}");
    assert_eq!(progress.last().copied(), Some(1.0));
}

#[tokio::test]
async fn terminal_jobs_are_swept_after_retention() {
    let manager = offline_manager(JobSettings {
        retention: Duration::ZERO,
        ..JobSettings::default()
    });
    let id = manager.start(request()).await.expect("start");
    wait_terminal(&manager, id).await;

    assert_eq!(manager.sweep().await, 1);
    assert_eq!(manager.status(id).await.err(), Some(JobError::NotFound(id)));
}

#[tokio::test]
async fn unknown_and_finished_jobs() {
    let manager = offline_manager(JobSettings::default());
    let missing = JobId::new();
    assert_eq!(manager.status(missing).await.err(), Some(JobError::NotFound(missing)));
    assert!(manager.subscribe(missing).await.is_err());
    assert_eq!(manager.cancel(missing).await.err(), Some(JobError::NotFound(missing)));

    let id = manager.start(request()).await.expect("start");
    wait_terminal(&manager, id).await;
    let job = manager.cancel(id).await.expect("cancel");
    assert!(!job.cancelled);
    assert_eq!(job.status, JobStatus::Completed);

    let json = serde_json::to_value(&job).expect("json");
    assert_eq!(json["status"], "completed");
    assert!(json["createdAt"].is_string());
}

#[tokio::test]
async fn panicking_pipeline_ends_in_error_and_frees_its_slot() {
    let client: Arc<dyn CompletionClient> = Arc::new(PanickingClient);
    let manager = Arc::new(JobManager::new(
        SchemaParser::new(),
        AiOrchestrator::new(Some(client)),
        JobSettings {
            max_concurrent_jobs: 1,
            ..JobSettings::default()
        },
    ));

    let id = manager.start(request()).await.expect("start");
    let job = wait_terminal(&manager, id).await;
    assert_eq!(job.status, JobStatus::Error);
    assert!(job.finished_at.is_some());
    let error = job.error.expect("error message");
    assert!(error.starts_with("pipeline task failed"), "{error}");

    let next = manager.start(request()).await.expect("slot was released");
    assert_eq!(wait_terminal(&manager, next).await.status, JobStatus::Error);
}
