//! Batch producer: slices the iteration space into contiguous batches.

use crate::queryset::{QueryRecord, QuerySet};
use std::ops::Range;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub type Batch = Vec<QueryRecord>;

/// Contiguous index ranges of `batch_size`, the last one possibly shorter.
pub fn partition(total: usize, batch_size: usize) -> impl Iterator<Item = Range<usize>> {
    let step = batch_size.max(1);
    (0..total)
        .step_by(step)
        .map(move |start| start..(start + step).min(total))
}

/// Render batches into `tx` until the set is exhausted or the run is cancelled.
///
/// Dropping `tx` on return closes the queue for the workers. Returns the
/// number of batches handed off.
pub async fn produce(
    queryset: Arc<QuerySet>,
    batch_size: usize,
    tx: flume::Sender<Batch>,
    cancel: CancellationToken,
) -> usize {
    let mut sent = 0usize;
    for range in partition(queryset.size(), batch_size) {
        let batch: Batch = range.map(|n| queryset.record_at(n)).collect();
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(sent, "producer cancelled");
                break;
            }
            res = tx.send_async(batch) => {
                if res.is_err() {
                    // every worker is gone
                    break;
                }
                sent += 1;
            }
        }
    }
    sent
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn twelve_by_five() {
        let sizes: Vec<usize> = partition(12, 5).map(|r| r.len()).collect();
        assert_eq!(sizes, vec![5, 5, 2]);
    }

    #[test]
    fn empty_space_yields_nothing() {
        assert_eq!(partition(0, 3).count(), 0);
    }

    #[test]
    fn batch_larger_than_space() {
        let ranges: Vec<Range<usize>> = partition(4, 10).collect();
        assert_eq!(ranges, vec![0..4]);
    }

    proptest! {
        #[test]
        fn partition_is_exhaustive_and_ordered(total in 0usize..500, batch in 1usize..40) {
            let ranges: Vec<Range<usize>> = partition(total, batch).collect();
            let flat: Vec<usize> = ranges.iter().cloned().flatten().collect();
            prop_assert_eq!(flat, (0..total).collect::<Vec<_>>());
            if let Some((last, rest)) = ranges.split_last() {
                for r in rest {
                    prop_assert_eq!(r.len(), batch);
                }
                prop_assert!(!last.is_empty() && last.len() <= batch);
            }
        }
    }

    #[tokio::test]
    async fn produce_emits_all_batches_then_closes() {
        let qs = Arc::new(QuerySet::new("p", "Q({}, {})", vec![vec![1, 2, 3], vec![4, 5, 6, 7]]).unwrap());
        let (tx, rx) = flume::bounded(1);
        let handle = tokio::spawn(produce(qs, 5, tx, CancellationToken::new()));
        let mut sizes = Vec::new();
        let mut indices = Vec::new();
        while let Ok(batch) = rx.recv_async().await {
            sizes.push(batch.len());
            indices.extend(batch.iter().map(|r| r.index));
        }
        assert_eq!(handle.await.unwrap(), 3);
        assert_eq!(sizes, vec![5, 5, 2]);
        assert_eq!(indices, (0..12).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn produce_stops_when_cancelled() {
        let qs = Arc::new(QuerySet::new("p", "Q({})", vec![(0..100).collect()]).unwrap());
        let (tx, rx) = flume::bounded(1);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(produce(qs, 1, tx, cancel.clone()));
        let _first = rx.recv_async().await.unwrap();
        cancel.cancel();
        let sent = handle.await.unwrap();
        assert!(sent < 100);
    }
}
