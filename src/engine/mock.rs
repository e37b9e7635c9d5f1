//! In-process engine for tests and dry runs (feature `engine-mock`).
//!
//! Each top-level call of a compound request counts as one sub-query, however
//! many lines it spans; the echoed result is the sum of the integers in it.
use crate::engine::{ConnectOptions, EngineError, QueryEngine};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockMode {
    Echo,
    /// Answer with one result fewer than requested.
    DropLast,
    /// Fail any request containing the pattern.
    FailOn(String),
}

pub struct MockEngine {
    mode: MockMode,
    delay: Duration,
    calls: AtomicUsize,
    requests: Mutex<Vec<String>>,
}

pub async fn connect(opts: ConnectOptions) -> Result<Arc<dyn QueryEngine>, EngineError> {
    let mode = match opts.get("mode").unwrap_or("echo") {
        "echo" => MockMode::Echo,
        "drop_last" => MockMode::DropLast,
        "fail" => MockMode::FailOn(opts.get("fail_on").unwrap_or("").to_string()),
        other => return Err(EngineError::Connect(format!("unknown mock mode {}", other))),
    };
    let delay_ms: u64 = opts.get("delay_ms").and_then(|s| s.parse().ok()).unwrap_or(0);
    Ok(Arc::new(
        MockEngine::new(mode).with_delay(Duration::from_millis(delay_ms)),
    ))
}

impl MockEngine {
    pub fn new(mode: MockMode) -> Self {
        Self {
            mode,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn echo() -> Self {
        Self::new(MockMode::Echo)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of `query` calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl QueryEngine for MockEngine {
    async fn query(&self, pql: &str) -> Result<Vec<i64>, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut r) = self.requests.lock() {
            r.push(pql.to_string());
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let MockMode::FailOn(pattern) = &self.mode {
            if pql.contains(pattern.as_str()) {
                return Err(EngineError::Query(format!("mock failure on {}", pattern)));
            }
        }
        let mut results: Vec<i64> = split_calls(pql).into_iter().map(sum_integers).collect();
        if self.mode == MockMode::DropLast {
            results.pop();
        }
        Ok(results)
    }

    async fn health_check(&self) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Top-level `Name(...)` calls, in request order.
fn split_calls(pql: &str) -> Vec<&str> {
    let mut calls = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in pql.char_indices() {
        match c {
            '(' => depth += 1,
            ')' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    calls.push(pql[start..=i].trim());
                    start = i + 1;
                }
            }
            _ => {}
        }
    }
    calls
}

fn sum_integers(line: &str) -> i64 {
    let mut total = 0i64;
    let mut current: Option<i64> = None;
    let mut negative = false;
    let mut prev = ' ';
    for c in line.chars() {
        if let Some(d) = c.to_digit(10) {
            if current.is_none() {
                negative = prev == '-';
            }
            current = Some(current.unwrap_or(0).saturating_mul(10).saturating_add(d as i64));
        } else if let Some(v) = current.take() {
            total = total.saturating_add(if negative { -v } else { v });
        }
        prev = c;
    }
    if let Some(v) = current {
        total = total.saturating_add(if negative { -v } else { v });
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_integers_per_line() {
        assert_eq!(sum_integers("Row(a=12, b=30)"), 42);
        assert_eq!(sum_integers("Row(a=-5)"), -5);
        assert_eq!(sum_integers("Count()"), 0);
        assert_eq!(sum_integers("Q(99999999999999999999999)"), i64::MAX);
        assert_eq!(sum_integers("Q(-99999999999999999999999)"), -i64::MAX);
    }

    #[test]
    fn calls_may_span_lines() {
        let calls = split_calls("Sum(\n\tIntersect(\n\t\tBitmap(rowID=1),\n\t),\nfield=x)\nCount(Bitmap(rowID=2))\n");
        assert_eq!(calls.len(), 2);
        assert!(calls[1].starts_with("Count("));
    }

    #[tokio::test]
    async fn echo_answers_each_call() {
        let engine = MockEngine::echo();
        let out = engine.query("Q(1)\nQ(2, 3)\n\nQ(4)\n").await.unwrap();
        assert_eq!(out, vec![1, 5, 4]);
        assert_eq!(engine.calls(), 1);
    }

    #[tokio::test]
    async fn drop_last_is_short_by_one() {
        let engine = MockEngine::new(MockMode::DropLast);
        assert_eq!(engine.query("Q(1)\nQ(2)\n").await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn fail_on_pattern() {
        let engine = MockEngine::new(MockMode::FailOn("Store".into()));
        assert!(engine.query("Store(id=1)\n").await.is_err());
        assert!(engine.query("Q(1)\n").await.is_ok());
        assert_eq!(engine.requests().len(), 2);
    }
}
