//! Collector: drains completions in arrival order into the results sink.

use crate::metrics::stats::{LatencyStats, StatsSnapshot};
use crate::output::ResultsSink;
use crate::run::RunError;
use crate::worker::Completion;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Clone, Default)]
pub struct CollectStats {
    pub records: u64,
    pub bytes: u64,
    pub latency: StatsSnapshot,
}

/// Drain `completions` until every worker has hung up.
///
/// A drain cut short by cancellation is an error, never a partial success.
///
/// The first failed batch or sink error cancels the run and is returned at
/// once; lines already written are flushed and kept.
pub async fn collect(
    completions: flume::Receiver<Completion>,
    sink: &mut ResultsSink,
    cancel: &CancellationToken,
    snapshot_interval: Duration,
) -> Result<CollectStats, RunError> {
    let mut stats = LatencyStats::new();
    let mut ticker = progress_ticker(snapshot_interval);
    if let Some(t) = ticker.as_mut() {
        t.tick().await; // First tick completes immediately
    }

    let outcome = loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break Err(RunError::Cancelled),
            _ = tick(&mut ticker) => {
                let snap = stats.snapshot();
                info!(
                    records = snap.records,
                    batches = snap.batches,
                    "progress: {:.2} q/s (avg {:.2} q/s), p50 {} us",
                    snap.interval_throughput(),
                    snap.total_throughput(),
                    snap.latency_us_p50,
                );
                continue;
            }
            next = completions.recv_async() => next,
        };
        match next {
            // workers also hang up when cancelled
            Err(_) if cancel.is_cancelled() => break Err(RunError::Cancelled),
            Err(_) => break Ok(()),
            Ok(Completion::Record(record)) => {
                if let Err(e) = sink.append(&record).await {
                    error!("writing results file {}: {}", sink.path().display(), e);
                    break Err(RunError::Sink(e));
                }
                stats.record_query();
            }
            Ok(Completion::Batch { latency }) => stats.record_batch(latency),
            Ok(Completion::Failed(failure)) => break Err(RunError::Batch(failure)),
        }
    };

    if outcome.is_err() {
        cancel.cancel();
    }
    let flushed = sink.flush().await;
    outcome?;
    flushed?;

    Ok(CollectStats {
        records: sink.lines(),
        bytes: sink.bytes(),
        latency: stats.snapshot(),
    })
}

fn progress_ticker(every: Duration) -> Option<Interval> {
    if every.is_zero() {
        return None;
    }
    let mut t = interval(every);
    t.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(t)
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
