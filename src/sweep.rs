//! Sweep driver: one full pass per (concurrency, batch size) pair.

use crate::queryset::QuerySet;
use crate::run::{BenchmarkSummary, Runner};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const DEFAULT_CONCURRENCY: [usize; 3] = [8, 16, 32];
pub const DEFAULT_BATCH_SIZES: [usize; 3] = [2, 4, 8];

/// Grid order: outer loop over concurrency, inner loop over batch size.
pub fn grid(concurrencies: &[usize], batch_sizes: &[usize]) -> Vec<(usize, usize)> {
    concurrencies
        .iter()
        .flat_map(|&c| batch_sizes.iter().map(move |&b| (c, b)))
        .collect()
}

/// Run the passes one after another so each gets an uncontended measurement.
///
/// A failed pass contributes its failure summary and the sweep moves on to
/// the next pair. Cancellation stops the sweep; pairs not yet started are
/// skipped.
pub async fn sweep(
    runner: &Runner,
    queryset: Arc<QuerySet>,
    concurrencies: &[usize],
    batch_sizes: &[usize],
    cancel: &CancellationToken,
) -> Vec<BenchmarkSummary> {
    let pairs = grid(concurrencies, batch_sizes);
    let mut summaries = Vec::with_capacity(pairs.len());
    for (i, (concurrency, batch_size)) in pairs.iter().copied().enumerate() {
        if cancel.is_cancelled() {
            warn!(remaining = pairs.len() - i, "sweep cancelled");
            break;
        }
        let summary = runner.run(queryset.clone(), concurrency, batch_size, cancel).await;
        if summary.is_failed() {
            warn!(concurrency, batch_size, "sweep pass failed, continuing");
        } else {
            info!(
                concurrency,
                batch_size,
                seconds = summary.seconds,
                "sweep pass {}/{} done",
                i + 1,
                pairs.len()
            );
        }
        summaries.push(summary);
    }
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_is_concurrency_major() {
        assert_eq!(
            grid(&[1, 2], &[1, 3]),
            vec![(1, 1), (1, 3), (2, 1), (2, 3)]
        );
        assert!(grid(&[], &[1]).is_empty());
    }

    #[test]
    fn default_grid_has_nine_pairs() {
        assert_eq!(grid(&DEFAULT_CONCURRENCY, &DEFAULT_BATCH_SIZES).len(), 9);
    }
}
