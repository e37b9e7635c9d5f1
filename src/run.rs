//! One benchmark pass: setup, producer, worker pool, collector, teardown.

use crate::batch::produce;
use crate::collector::{CollectStats, collect};
use crate::engine::{EngineError, QueryEngine};
use crate::output::ResultsSink;
use crate::queryset::QuerySet;
use crate::worker::{BatchFailure, spawn_pool};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error("invalid run configuration: {0}")]
    InvalidConfig(String),
    #[error("setup query failed: {0}")]
    Setup(#[source] EngineError),
    #[error(transparent)]
    Batch(#[from] BatchFailure),
    #[error("writing results: {0}")]
    Sink(#[from] std::io::Error),
    #[error("run cancelled")]
    Cancelled,
    #[error("collected {got} of {expected} results")]
    Incomplete { expected: usize, got: u64 },
    #[error("task failed: {0}")]
    Join(String),
}

/// Outcome of one (query set, concurrency, batch size) pass.
///
/// A failed pass carries `seconds = -1` and the error text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BenchmarkSummary {
    pub name: String,
    pub iterations: usize,
    pub concurrency: usize,
    #[serde(rename = "batchsize")]
    pub batch_size: usize,
    pub seconds: f64,
    #[serde(rename = "columncount")]
    pub column_count: u64,
    pub timestamp: i64,
    pub throughput: f64,
    pub latency_us_p50: u64,
    pub latency_us_p99: u64,
    pub latency_us_max: u64,
    pub results_file: Option<String>,
    pub error: Option<String>,
    pub teardown_error: Option<String>,
}

impl BenchmarkSummary {
    pub const FAILED_SECONDS: f64 = -1.0;

    fn failed(
        name: &str,
        concurrency: usize,
        batch_size: usize,
        column_count: u64,
        timestamp: i64,
        err: &RunError,
    ) -> Self {
        Self {
            name: name.to_string(),
            iterations: 0,
            concurrency,
            batch_size,
            seconds: Self::FAILED_SECONDS,
            column_count,
            timestamp,
            throughput: 0.0,
            latency_us_p50: 0,
            latency_us_p99: 0,
            latency_us_max: 0,
            results_file: None,
            error: Some(err.to_string()),
            teardown_error: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.seconds < 0.0
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub results_dir: PathBuf,
    /// Dataset cardinality reported with every summary.
    pub column_count: u64,
    pub snapshot_interval: Duration,
    /// Batch queue capacity; defaults to the concurrency.
    pub queue_depth: Option<usize>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("results"),
            column_count: 0,
            snapshot_interval: Duration::from_secs(1),
            queue_depth: None,
        }
    }
}

pub struct Runner {
    engine: Arc<dyn QueryEngine>,
    options: RunOptions,
}

impl Runner {
    pub fn new(engine: Arc<dyn QueryEngine>, options: RunOptions) -> Self {
        Self { engine, options }
    }

    /// Run every query of `queryset` once, `batch_size` per request and
    /// `concurrency` requests in flight. Never fails: errors become a
    /// sentinel summary.
    pub async fn run(
        &self,
        queryset: Arc<QuerySet>,
        concurrency: usize,
        batch_size: usize,
        cancel: &CancellationToken,
    ) -> BenchmarkSummary {
        let timestamp = chrono::Utc::now().timestamp();
        let opened = match check_run(concurrency, batch_size, cancel) {
            Ok(()) => ResultsSink::create(&self.options.results_dir, queryset.name(), timestamp)
                .await
                .map_err(RunError::Sink),
            Err(e) => Err(e),
        };
        match opened {
            Ok(mut sink) => {
                self.run_with_sink(queryset, concurrency, batch_size, timestamp, &mut sink, cancel)
                    .await
            }
            Err(e) => self.failed(&queryset, concurrency, batch_size, timestamp, None, e),
        }
    }

    /// [`Runner::run`] writing into a caller-provided sink.
    pub async fn run_with_sink(
        &self,
        queryset: Arc<QuerySet>,
        concurrency: usize,
        batch_size: usize,
        timestamp: i64,
        sink: &mut ResultsSink,
        cancel: &CancellationToken,
    ) -> BenchmarkSummary {
        info!(
            name = queryset.name(),
            iterations = queryset.size(),
            concurrency,
            batch_size,
            "starting run"
        );
        let results_file = Some(sink.path().display().to_string());
        match self
            .try_run(&queryset, concurrency, batch_size, timestamp, sink, cancel)
            .await
        {
            Ok(mut summary) => {
                summary.results_file = results_file;
                summary
            }
            Err(e) => self.failed(&queryset, concurrency, batch_size, timestamp, results_file, e),
        }
    }

    fn failed(
        &self,
        queryset: &QuerySet,
        concurrency: usize,
        batch_size: usize,
        timestamp: i64,
        results_file: Option<String>,
        e: RunError,
    ) -> BenchmarkSummary {
        error!(name = queryset.name(), concurrency, batch_size, "run failed: {}", e);
        let mut summary = BenchmarkSummary::failed(
            queryset.name(),
            concurrency,
            batch_size,
            self.options.column_count,
            timestamp,
            &e,
        );
        summary.results_file = results_file;
        summary
    }

    async fn try_run(
        &self,
        queryset: &Arc<QuerySet>,
        concurrency: usize,
        batch_size: usize,
        timestamp: i64,
        sink: &mut ResultsSink,
        cancel: &CancellationToken,
    ) -> Result<BenchmarkSummary, RunError> {
        check_run(concurrency, batch_size, cancel)?;

        let start = Instant::now();
        if let Some(setup) = queryset.setup() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(RunError::Cancelled),
                res = self.engine.query(setup) => { res.map_err(RunError::Setup)?; }
            }
        }

        let collected = self
            .execute(queryset, concurrency, batch_size, sink, cancel)
            .await;
        let seconds = start.elapsed().as_secs_f64();

        let teardown_error = self.teardown(queryset).await;
        let collected = collected?;
        let iterations = queryset.size();
        if collected.records != iterations as u64 {
            return Err(RunError::Incomplete {
                expected: iterations,
                got: collected.records,
            });
        }
        info!(
            "wrote {} bytes to {}",
            collected.bytes,
            sink.path().display()
        );

        Ok(BenchmarkSummary {
            name: queryset.name().to_string(),
            iterations,
            concurrency,
            batch_size,
            seconds,
            column_count: self.options.column_count,
            timestamp,
            throughput: if seconds > 0.0 { iterations as f64 / seconds } else { 0.0 },
            latency_us_p50: collected.latency.latency_us_p50,
            latency_us_p99: collected.latency.latency_us_p99,
            latency_us_max: collected.latency.latency_us_max,
            results_file: None,
            error: None,
            teardown_error,
        })
    }

    /// Producer, pool and collector for one pass. All tasks are joined
    /// before returning.
    async fn execute(
        &self,
        queryset: &Arc<QuerySet>,
        concurrency: usize,
        batch_size: usize,
        sink: &mut ResultsSink,
        cancel: &CancellationToken,
    ) -> Result<CollectStats, RunError> {
        if queryset.is_empty() {
            return Ok(CollectStats::default());
        }
        let run_cancel = cancel.child_token();
        let depth = self.options.queue_depth.unwrap_or(concurrency).max(1);
        let (batch_tx, batch_rx) = flume::bounded(depth);
        let (done_tx, done_rx) = flume::bounded(concurrency.saturating_mul(batch_size).clamp(1, 65_536));

        let producer = tokio::spawn(produce(queryset.clone(), batch_size, batch_tx, run_cancel.clone()));
        let workers = spawn_pool(concurrency, self.engine.clone(), batch_rx, done_tx, run_cancel.clone());

        let collected = collect(done_rx, sink, &run_cancel, self.options.snapshot_interval).await;
        if collected.is_err() {
            run_cancel.cancel();
        }

        let mut join_error = None;
        for res in join_all(workers).await {
            if let Err(e) = res {
                join_error.get_or_insert_with(|| e.to_string());
            }
        }
        match producer.await {
            Ok(batches) => tracing::debug!(batches, "producer finished"),
            Err(e) => {
                join_error.get_or_insert_with(|| e.to_string());
            }
        }

        let collected = collected?;
        if let Some(e) = join_error {
            return Err(RunError::Join(e));
        }
        Ok(collected)
    }

    async fn teardown(&self, queryset: &QuerySet) -> Option<String> {
        let teardown = queryset.teardown()?;
        match self.engine.query(teardown).await {
            Ok(_) => None,
            Err(e) => {
                warn!(name = queryset.name(), "teardown failed: {}", e);
                Some(e.to_string())
            }
        }
    }
}

fn check_run(
    concurrency: usize,
    batch_size: usize,
    cancel: &CancellationToken,
) -> Result<(), RunError> {
    if concurrency == 0 || batch_size == 0 {
        return Err(RunError::InvalidConfig(format!(
            "concurrency ({}) and batch size ({}) must be at least 1",
            concurrency, batch_size
        )));
    }
    if cancel.is_cancelled() {
        return Err(RunError::Cancelled);
    }
    Ok(())
}

/// Sum the results of a (possibly compound) counting query.
pub async fn dataset_cardinality(engine: &dyn QueryEngine, pql: &str) -> Result<u64, EngineError> {
    let results = engine.query(pql).await?;
    Ok(results.into_iter().map(|v| v.max(0) as u64).sum())
}
