//! Parameterized load benchmark for bitmap-index query engines.
//!
//! A [`queryset::QuerySet`] expands a PQL template over an argument grid; a
//! [`run::Runner`] streams the expansion through a batch producer, a pool of
//! concurrent workers and a single collector, and reports a
//! [`run::BenchmarkSummary`] per pass. [`sweep::sweep`] repeats passes over a
//! grid of concurrency and batch-size settings.

pub mod batch;
pub mod catalogue;
pub mod collector;
pub mod config;
pub mod engine;
pub mod enumerate;
pub mod logging;
pub mod metrics;
pub mod output;
pub mod queryset;
pub mod run;
pub mod sweep;
pub mod worker;
