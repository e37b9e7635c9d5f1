//! Query-engine abstraction: trait, error type, and builder factory.

pub mod config;
#[cfg(any(test, feature = "engine-mock"))]
pub mod mock;
#[cfg(feature = "engine-pilosa")]
pub mod pilosa;

use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Engine {
    Pilosa,
    #[cfg(any(test, feature = "engine-mock"))]
    Mock,
}

#[derive(Clone, Debug, Default)]
pub struct ConnectOptions {
    pub params: BTreeMap<String, String>,
}

impl ConnectOptions {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum EngineError {
    #[error("connect: {0}")]
    Connect(String),
    #[error("transport: {0}")]
    Transport(String),
    #[error("engine: {0}")]
    Query(String),
    #[error("decode: {0}")]
    Decode(String),
    #[error("timeout")]
    Timeout,
}

/// A bitmap-index engine that executes compound requests.
///
/// `query` receives one or more concatenated queries and must return exactly
/// one scalar per query, in request order. Any failing sub-query fails the
/// whole request.
#[async_trait::async_trait]
pub trait QueryEngine: Send + Sync {
    async fn query(&self, pql: &str) -> Result<Vec<i64>, EngineError>;
    async fn health_check(&self) -> Result<(), EngineError>;
}

pub struct EngineBuilder;

impl EngineBuilder {
    pub async fn connect(
        engine: Engine,
        opts: ConnectOptions,
    ) -> Result<Arc<dyn QueryEngine>, EngineError> {
        match engine {
            Engine::Pilosa => {
                #[cfg(feature = "engine-pilosa")]
                {
                    crate::engine::pilosa::connect(opts).await
                }
                #[cfg(not(feature = "engine-pilosa"))]
                {
                    let _ = opts;
                    Err(EngineError::Connect("pilosa feature disabled".into()))
                }
            }
            #[cfg(any(test, feature = "engine-mock"))]
            Engine::Mock => crate::engine::mock::connect(opts).await,
        }
    }
}
