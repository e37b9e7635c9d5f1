//! Worker pool: each worker fuses a batch into one compound request and
//! re-attaches the engine's ordered results to the batch's records.

use crate::batch::Batch;
use crate::engine::{EngineError, QueryEngine};
use crate::queryset::QueryRecord;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

#[derive(thiserror::Error, Debug, Clone)]
pub enum BatchError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("expected {expected} results, got {got}")]
    CountMismatch { expected: usize, got: usize },
}

/// A compound request that could not be matched back to its inputs.
#[derive(thiserror::Error, Debug, Clone)]
#[error("batch of {len} queries failed: {source}")]
pub struct BatchFailure {
    pub query: String,
    pub len: usize,
    pub source: BatchError,
}

/// What workers hand to the collector.
#[derive(Debug)]
pub enum Completion {
    Record(QueryRecord),
    /// Emitted after a batch's records; one round trip.
    Batch { latency: Duration },
    Failed(BatchFailure),
}

/// Join the rendered texts of a batch into one request.
pub fn compound_request(batch: &[QueryRecord]) -> String {
    batch.iter().map(|r| r.raw.as_str()).collect()
}

/// Zip engine results onto records, position for position.
pub fn attach_results(mut batch: Batch, results: Vec<i64>) -> Result<Batch, BatchError> {
    if results.len() != batch.len() {
        return Err(BatchError::CountMismatch {
            expected: batch.len(),
            got: results.len(),
        });
    }
    for (record, value) in batch.iter_mut().zip(results) {
        record.output = Some(value);
    }
    Ok(batch)
}

/// Start `concurrency` workers sharing one batch queue and one completion queue.
pub fn spawn_pool(
    concurrency: usize,
    engine: Arc<dyn QueryEngine>,
    batches: flume::Receiver<Batch>,
    completions: flume::Sender<Completion>,
    cancel: CancellationToken,
) -> Vec<JoinHandle<usize>> {
    (0..concurrency)
        .map(|id| {
            tokio::spawn(run_worker(
                id,
                engine.clone(),
                batches.clone(),
                completions.clone(),
                cancel.clone(),
            ))
        })
        .collect()
}

/// Process batches until the queue is drained, a batch fails, or the run is
/// cancelled. Returns the number of batches completed.
pub async fn run_worker(
    id: usize,
    engine: Arc<dyn QueryEngine>,
    batches: flume::Receiver<Batch>,
    completions: flume::Sender<Completion>,
    cancel: CancellationToken,
) -> usize {
    let mut done = 0usize;
    loop {
        let batch = tokio::select! {
            _ = cancel.cancelled() => break,
            next = batches.recv_async() => match next {
                Ok(b) => b,
                Err(_) => break,
            },
        };
        let raw = compound_request(&batch);
        let len = batch.len();
        let t0 = Instant::now();
        let response = tokio::select! {
            _ = cancel.cancelled() => break,
            r = engine.query(&raw) => r,
        };
        let latency = t0.elapsed();

        let outcome = response
            .map_err(BatchError::from)
            .and_then(|results| attach_results(batch, results));
        match outcome {
            Ok(records) => {
                for record in records {
                    if !emit(&completions, &cancel, Completion::Record(record)).await {
                        return done;
                    }
                }
                if !emit(&completions, &cancel, Completion::Batch { latency }).await {
                    return done;
                }
                done += 1;
            }
            Err(source) => {
                error!(worker = id, "batch failed: {}\n{}", source, raw);
                let failure = BatchFailure {
                    query: raw,
                    len,
                    source,
                };
                emit(&completions, &cancel, Completion::Failed(failure)).await;
                break;
            }
        }
    }
    debug!(worker = id, batches = done, "worker exiting");
    done
}

async fn emit(
    tx: &flume::Sender<Completion>,
    cancel: &CancellationToken,
    item: Completion,
) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        res = tx.send_async(item) => res.is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::{MockEngine, MockMode};
    use crate::queryset::QuerySet;

    fn batch_of(n: usize) -> Batch {
        let qs = QuerySet::new("w", "Q({})", vec![(0..n as i64).collect()]).unwrap();
        (0..n).map(|i| qs.record_at(i)).collect()
    }

    #[test]
    fn compound_request_concatenates_in_order() {
        assert_eq!(compound_request(&batch_of(3)), "Q(0)\nQ(1)\nQ(2)\n");
    }

    #[test]
    fn attach_rejects_short_responses() {
        let err = attach_results(batch_of(3), vec![1, 2]).unwrap_err();
        assert!(matches!(err, BatchError::CountMismatch { expected: 3, got: 2 }));
    }

    #[test]
    fn attach_zips_by_position() {
        let out = attach_results(batch_of(2), vec![7, 9]).unwrap();
        assert_eq!(out[0].output, Some(7));
        assert_eq!(out[1].output, Some(9));
    }

    #[tokio::test]
    async fn worker_emits_records_then_timing() {
        let (btx, brx) = flume::bounded(4);
        let (ctx, crx) = flume::unbounded();
        btx.send_async(batch_of(3)).await.unwrap();
        drop(btx);
        let done = run_worker(
            0,
            Arc::new(MockEngine::echo()),
            brx,
            ctx,
            CancellationToken::new(),
        )
        .await;
        assert_eq!(done, 1);
        let items: Vec<Completion> = crx.drain().collect();
        assert_eq!(items.len(), 4);
        assert!(matches!(items[3], Completion::Batch { .. }));
        if let Completion::Record(r) = &items[2] {
            assert_eq!(r.output, Some(2));
        } else {
            panic!("expected record");
        }
    }

    #[tokio::test]
    async fn worker_reports_failure_and_stops() {
        let (btx, brx) = flume::bounded(4);
        let (ctx, crx) = flume::unbounded();
        btx.send_async(batch_of(2)).await.unwrap();
        btx.send_async(batch_of(2)).await.unwrap();
        drop(btx);
        let done = run_worker(
            0,
            Arc::new(MockEngine::new(MockMode::DropLast)),
            brx,
            ctx,
            CancellationToken::new(),
        )
        .await;
        assert_eq!(done, 0);
        let items: Vec<Completion> = crx.drain().collect();
        assert_eq!(items.len(), 1);
        match &items[0] {
            Completion::Failed(f) => {
                assert_eq!(f.query, "Q(0)\nQ(1)\n");
                assert!(matches!(f.source, BatchError::CountMismatch { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
