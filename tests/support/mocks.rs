use async_trait::async_trait;
use chrono::{DateTime, Utc};
use meshgraph::mesh::{ConfigKind, ConfigObject, ConfigSource, SourceError, StaticConfigSource};
use meshgraph::prometheus::{MetricsApi, QueryError, QueryResponse, ResultType};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Config source over fixed objects that can fail or stall selected collections.
#[derive(Default)]
pub struct ScriptedSource {
    inner: StaticConfigSource,
    failures: HashMap<ConfigKind, String>,
    delays: HashMap<ConfigKind, Duration>,
    calls: Mutex<Vec<(ConfigKind, String)>>,
    completed: Mutex<Vec<ConfigKind>>,
}

impl ScriptedSource {
    pub fn new(objects: Vec<ConfigObject>) -> Self {
        Self {
            inner: StaticConfigSource::new(objects),
            ..Self::default()
        }
    }

    pub fn failing(mut self, kind: ConfigKind, message: &str) -> Self {
        self.failures.insert(kind, message.to_string());
        self
    }

    pub fn delayed(mut self, kind: ConfigKind, delay: Duration) -> Self {
        self.delays.insert(kind, delay);
        self
    }

    pub fn calls(&self) -> Vec<(ConfigKind, String)> {
        self.calls.lock().expect("source calls").clone()
    }

    /// Collections whose retrieval ran to completion, in completion order.
    pub fn completed(&self) -> Vec<ConfigKind> {
        self.completed.lock().expect("source completions").clone()
    }
}

#[async_trait]
impl ConfigSource for ScriptedSource {
    async fn list(
        &self,
        kind: ConfigKind,
        namespace: &str,
    ) -> Result<Vec<ConfigObject>, SourceError> {
        self.calls
            .lock()
            .expect("source calls")
            .push((kind, namespace.to_string()));
        if let Some(delay) = self.delays.get(&kind) {
            tokio::time::sleep(*delay).await;
        }
        let result = match self.failures.get(&kind) {
            Some(message) => Err(SourceError::transport(message.clone())),
            None => self.inner.list(kind, namespace).await,
        };
        self.completed.lock().expect("source completions").push(kind);
        result
    }

    async fn get(
        &self,
        kind: ConfigKind,
        namespace: &str,
        name: &str,
    ) -> Result<ConfigObject, SourceError> {
        match self.failures.get(&kind) {
            Some(message) => Err(SourceError::transport(message.clone())),
            None => self.inner.get(kind, namespace, name).await,
        }
    }
}

/// Metrics backend answering by expression substring; unmatched queries get an empty vector.
#[derive(Default)]
pub struct ScriptedMetricsApi {
    rules: Vec<(String, Result<QueryResponse, String>)>,
    queries: Mutex<Vec<String>>,
}

impl ScriptedMetricsApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, fragment: &str, response: QueryResponse) -> Self {
        self.rules.push((fragment.to_string(), Ok(response)));
        self
    }

    pub fn fail(mut self, fragment: &str, message: &str) -> Self {
        self.rules.push((fragment.to_string(), Err(message.to_string())));
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().expect("recorded queries").clone()
    }
}

#[async_trait]
impl MetricsApi for ScriptedMetricsApi {
    async fn instant_query(
        &self,
        expression: &str,
        _time: DateTime<Utc>,
        _cancel: &CancellationToken,
    ) -> Result<QueryResponse, QueryError> {
        self.queries
            .lock()
            .expect("recorded queries")
            .push(expression.to_string());

        let rule = self
            .rules
            .iter()
            .find(|(fragment, _)| expression.contains(fragment.as_str()));
        match rule {
            Some((_, Ok(response))) => Ok(response.clone()),
            Some((_, Err(message))) => Err(QueryError::transport(message.clone())),
            None => Ok(QueryResponse {
                result_type: ResultType::Vector,
                result: json!([]),
            }),
        }
    }
}

pub fn vector_response(result: serde_json::Value) -> QueryResponse {
    QueryResponse {
        result_type: ResultType::Vector,
        result,
    }
}
