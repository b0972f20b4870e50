use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{RunNumber, RunSet};
use crate::error::DqmError;
use crate::resolver::LinkResolver;
use crate::store::OutputStore;
use crate::transport::ArchiveTransport;

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub run_expressions: Vec<String>,
    pub datasets: Vec<String>,
    pub output_dir: Utf8PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStage {
    Resolve,
    Fetch,
}

impl TaskStage {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStage::Resolve => "resolve",
            TaskStage::Fetch => "fetch",
        }
    }
}

/// One (run, dataset) pair that did not end up on disk.
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub run: RunNumber,
    pub dataset: String,
    pub stage: TaskStage,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadedFile {
    pub run: RunNumber,
    pub dataset: String,
    pub url: String,
    pub path: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub attempted: usize,
    pub downloaded: Vec<DownloadedFile>,
    pub failures: Vec<FailureRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub position: usize,
    pub total: usize,
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);

    fn finish(&self) {}
}

#[derive(Debug)]
struct TaskFailure {
    stage: TaskStage,
    error: DqmError,
}

impl TaskFailure {
    fn at(stage: TaskStage) -> impl Fn(DqmError) -> Self {
        move |error| Self { stage, error }
    }
}

/// Runs a batch of (run, dataset) downloads one after another. A task that
/// fails is recorded and the batch moves on; only errors outside any single
/// task (bad run expressions, a resolver handing back a non-ROOT link) abort.
pub struct Orchestrator<'a, T: ArchiveTransport + ?Sized> {
    transport: &'a T,
}

impl<'a, T: ArchiveTransport + ?Sized> Orchestrator<'a, T> {
    pub fn new(transport: &'a T) -> Self {
        Self { transport }
    }

    pub fn run(
        &self,
        request: &BatchRequest,
        resolver: &dyn LinkResolver,
        sink: &dyn ProgressSink,
    ) -> Result<BatchReport, DqmError> {
        let runs = RunSet::parse(&request.run_expressions)?;
        let tasks = runs
            .iter()
            .flat_map(|run| request.datasets.iter().map(move |dataset| (run, dataset)))
            .collect::<Vec<_>>();
        if tasks.is_empty() {
            warn!("no (run, dataset) pairs to download");
        }

        let store = OutputStore::new(request.output_dir.clone());
        let started_at = Utc::now();
        let start = Instant::now();
        let total = tasks.len();
        let mut downloaded = Vec::new();
        let mut failures = Vec::new();

        for (index, (run, dataset)) in tasks.into_iter().enumerate() {
            sink.event(ProgressEvent {
                position: index + 1,
                total,
                message: format!("Run {run}, {dataset}"),
                elapsed: Some(start.elapsed()),
            });

            match self.attempt(&store, resolver, run, dataset) {
                Ok(file) => downloaded.push(file),
                Err(failure) if failure.error.is_task_level() => {
                    debug!(%run, %dataset, stage = failure.stage.as_str(), error = %failure.error, "task failed");
                    failures.push(FailureRecord {
                        run,
                        dataset: dataset.clone(),
                        stage: failure.stage,
                        error: failure.error.to_string(),
                    });
                }
                Err(failure) => {
                    sink.finish();
                    warn!(
                        %run,
                        %dataset,
                        downloaded = downloaded.len(),
                        failures = failures.len(),
                        "batch aborted after {} of {total} tasks",
                        index + 1
                    );
                    for recorded in &failures {
                        warn!(
                            run = %recorded.run,
                            dataset = %recorded.dataset,
                            stage = recorded.stage.as_str(),
                            "earlier failure: {}",
                            recorded.error
                        );
                    }
                    return Err(failure.error);
                }
            }
        }
        sink.finish();

        info!(
            attempted = total,
            downloaded = downloaded.len(),
            failures = failures.len(),
            "batch finished"
        );
        Ok(BatchReport {
            attempted: total,
            downloaded,
            failures,
            started_at,
            finished_at: Utc::now(),
        })
    }

    fn attempt(
        &self,
        store: &OutputStore,
        resolver: &dyn LinkResolver,
        run: RunNumber,
        dataset: &str,
    ) -> Result<DownloadedFile, TaskFailure> {
        let url = resolver
            .resolve(run, dataset)
            .map_err(TaskFailure::at(TaskStage::Resolve))?;
        let (path, bytes) = self
            .fetch(store, &url)
            .map_err(TaskFailure::at(TaskStage::Fetch))?;
        info!(%run, %dataset, %path, bytes, "downloaded");
        Ok(DownloadedFile {
            run,
            dataset: dataset.to_string(),
            url: url.to_string(),
            path: path.to_string(),
            bytes,
        })
    }

    fn fetch(&self, store: &OutputStore, url: &Url) -> Result<(Utf8PathBuf, u64), DqmError> {
        store.ensure_root()?;
        let path = store.target_path(url)?;
        let mut body = self.transport.get(url)?;
        let bytes = store.write_atomic(&path, &mut body)?;
        Ok((path, bytes))
    }
}
