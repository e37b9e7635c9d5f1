//! Pilosa adapter (feature `engine-pilosa`): PQL over the HTTP API, using reqwest.
use crate::engine::{ConnectOptions, EngineError, QueryEngine};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub struct PilosaEngine {
    client: Client,
    base_url: String,
    index: String,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct VersionResponse {
    version: String,
}

pub async fn connect(opts: ConnectOptions) -> Result<Arc<dyn QueryEngine>, EngineError> {
    Ok(Arc::new(PilosaEngine::new(&opts)?))
}

impl PilosaEngine {
    pub fn new(opts: &ConnectOptions) -> Result<Self, EngineError> {
        let host = opts.get("host").unwrap_or("localhost:10101");
        let scheme = opts.get("scheme").unwrap_or("http");
        let index = opts.get("index").unwrap_or("ssb").to_string();
        let timeout_ms: u64 = opts
            .get("timeout_ms")
            .and_then(|s| s.parse().ok())
            .unwrap_or(300_000);
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| EngineError::Connect(e.to_string()))?;
        Ok(Self {
            client,
            base_url: format!("{}://{}", scheme, host.trim_end_matches('/')),
            index,
        })
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    /// Server version as reported by `/version`.
    pub async fn version(&self) -> Result<String, EngineError> {
        let resp = self
            .client
            .get(format!("{}/version", self.base_url))
            .send()
            .await
            .map_err(transport_err)?;
        let body: VersionResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::Decode(e.to_string()))?;
        Ok(body.version)
    }

    /// Create the index if it does not exist yet.
    pub async fn ensure_index(&self) -> Result<(), EngineError> {
        self.ensure(format!("{}/index/{}", self.base_url, self.index)).await
    }

    /// Create a frame in the index if it does not exist yet.
    pub async fn ensure_frame(&self, frame: &str) -> Result<(), EngineError> {
        self.ensure(format!("{}/index/{}/frame/{}", self.base_url, self.index, frame))
            .await
    }

    async fn ensure(&self, url: String) -> Result<(), EngineError> {
        let resp = self
            .client
            .post(&url)
            .body("{}")
            .send()
            .await
            .map_err(transport_err)?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::CONFLICT => Ok(()),
            s => {
                let text = resp.text().await.unwrap_or_default();
                Err(EngineError::Query(format!("{} {}: {}", url, s, text.trim())))
            }
        }
    }
}

#[async_trait::async_trait]
impl QueryEngine for PilosaEngine {
    async fn query(&self, pql: &str) -> Result<Vec<i64>, EngineError> {
        let resp = self
            .client
            .post(format!("{}/index/{}/query", self.base_url, self.index))
            .body(pql.to_string())
            .send()
            .await
            .map_err(transport_err)?;
        let status = resp.status();
        let text = resp.text().await.map_err(transport_err)?;
        let body: QueryResponse = serde_json::from_str(&text).map_err(|e| {
            if status.is_success() {
                EngineError::Decode(e.to_string())
            } else {
                EngineError::Query(format!("{}: {}", status, text.trim()))
            }
        })?;
        if let Some(err) = body.error {
            return Err(EngineError::Query(err));
        }
        if !status.is_success() {
            return Err(EngineError::Query(status.to_string()));
        }
        decode_results(&body.results)
    }

    async fn health_check(&self) -> Result<(), EngineError> {
        self.version().await.map(|_| ())
    }
}

fn transport_err(e: reqwest::Error) -> EngineError {
    if e.is_timeout() {
        EngineError::Timeout
    } else {
        EngineError::Transport(e.to_string())
    }
}

/// Reduce each PQL result to one scalar: counts are plain numbers, `Sum` yields
/// `{"sum", "count"}`, bitmaps are measured by their bit count.
pub fn decode_results(results: &[Value]) -> Result<Vec<i64>, EngineError> {
    results.iter().map(decode_scalar).collect()
}

fn decode_scalar(v: &Value) -> Result<i64, EngineError> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|u| u as i64))
            .ok_or_else(|| EngineError::Decode(format!("non-integer result {}", n))),
        Value::Bool(b) => Ok(*b as i64),
        Value::Object(map) => {
            if let Some(sum) = map.get("sum") {
                decode_scalar(sum)
            } else if let Some(count) = map.get("count") {
                decode_scalar(count)
            } else if let Some(Value::Array(bits)) = map.get("bits") {
                Ok(bits.len() as i64)
            } else {
                Err(EngineError::Decode(format!("unrecognized result {}", v)))
            }
        }
        other => Err(EngineError::Decode(format!("unrecognized result {}", other))),
    }
}
