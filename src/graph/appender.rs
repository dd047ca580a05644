use crate::domain::MatchSettings;
use crate::graph::model::TrafficGraph;
use crate::mesh::object::ConfigKind;
use crate::mesh::snapshot::{ConfigSnapshot, ConfigSnapshotFetcher, FetchError};
use crate::metrics::metrics;
use crate::prometheus::{QueryError, TelemetryQueryExecutor, TelemetryVector};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryFailurePolicy {
    #[default]
    AbortPipeline,
    SkipAppender,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Completed,
    Failed,
}

impl PipelineState {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineState::Idle => "IDLE",
            PipelineState::Running => "RUNNING",
            PipelineState::Completed => "COMPLETED",
            PipelineState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueryWindow {
    pub query_time: DateTime<Utc>,
    pub duration: Duration,
}

impl QueryWindow {
    pub fn new(query_time: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            query_time,
            duration,
        }
    }

    pub fn range(&self) -> String {
        format!("{}s", self.duration.as_secs().max(1))
    }
}

pub struct AppenderContext {
    pub window: QueryWindow,
    pub namespaces: Vec<String>,
    pub settings: MatchSettings,
    pub fetcher: ConfigSnapshotFetcher,
    pub telemetry: TelemetryQueryExecutor,
    pub traffic: Arc<TelemetryVector>,
    snapshots: Mutex<HashMap<String, Arc<ConfigSnapshot>>>,
}

impl AppenderContext {
    pub fn new(
        window: QueryWindow,
        namespaces: Vec<String>,
        fetcher: ConfigSnapshotFetcher,
        telemetry: TelemetryQueryExecutor,
        traffic: Arc<TelemetryVector>,
    ) -> Self {
        Self {
            window,
            namespaces,
            settings: fetcher.settings().clone(),
            fetcher,
            telemetry,
            traffic,
            snapshots: Mutex::new(HashMap::new()),
        }
    }

    /// Unfiltered config snapshot of a namespace, fetched once per pass.
    pub async fn snapshot(&self, namespace: &str) -> Result<Arc<ConfigSnapshot>, FetchError> {
        let mut cache = self.snapshots.lock().await;
        if let Some(snapshot) = cache.get(namespace) {
            return Ok(Arc::clone(snapshot));
        }
        let snapshot = Arc::new(self.fetcher.fetch_snapshot(namespace, "").await?);
        cache.insert(namespace.to_string(), Arc::clone(&snapshot));
        Ok(snapshot)
    }

    pub fn includes_namespace(&self, namespace: &str) -> bool {
        self.namespaces.iter().any(|candidate| candidate == namespace)
    }
}

#[async_trait]
pub trait Appender: Send + Sync {
    fn name(&self) -> &'static str;

    async fn append(
        &self,
        graph: &mut TrafficGraph,
        context: &AppenderContext,
    ) -> Result<(), AppenderError>;
}

#[derive(Debug, Error)]
pub enum AppenderError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("telemetry unavailable: {0}")]
    TelemetryUnavailable(#[from] QueryError),
    #[error("{reason}")]
    Invalid { reason: String },
}

impl AppenderError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        AppenderError::Invalid {
            reason: reason.into(),
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            AppenderError::Fetch(_) => "config_fetch",
            AppenderError::TelemetryUnavailable(_) => "telemetry_unavailable",
            AppenderError::Invalid { .. } => "invalid",
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("appender `{appender}` failed: {source}")]
    AppenderFailed {
        appender: String,
        #[source]
        source: AppenderError,
    },
    #[error("pipeline cannot start from state {state}")]
    AlreadyRun { state: PipelineState },
}

impl PipelineError {
    pub fn appender(&self) -> Option<&str> {
        match self {
            PipelineError::AppenderFailed { appender, .. } => Some(appender),
            PipelineError::AlreadyRun { .. } => None,
        }
    }

    pub fn failed_collection(&self) -> Option<ConfigKind> {
        match self {
            PipelineError::AppenderFailed {
                source: AppenderError::Fetch(err),
                ..
            } => Some(err.kind()),
            _ => None,
        }
    }

    pub fn is_telemetry_unavailable(&self) -> bool {
        matches!(
            self,
            PipelineError::AppenderFailed {
                source: AppenderError::TelemetryUnavailable(_),
                ..
            }
        )
    }
}

#[derive(Debug)]
pub struct PipelineReport {
    pub graph: TrafficGraph,
    pub skipped: Vec<&'static str>,
}

/// Runs appenders one after another in declared order. A pipeline runs at most once.
pub struct AppenderPipeline {
    appenders: Vec<Arc<dyn Appender>>,
    policy: TelemetryFailurePolicy,
    state: PipelineState,
}

impl AppenderPipeline {
    pub fn new(appenders: Vec<Arc<dyn Appender>>, policy: TelemetryFailurePolicy) -> Self {
        Self {
            appenders,
            policy,
            state: PipelineState::Idle,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn appender_names(&self) -> Vec<&'static str> {
        self.appenders.iter().map(|appender| appender.name()).collect()
    }

    pub async fn run(
        &mut self,
        mut graph: TrafficGraph,
        context: &AppenderContext,
    ) -> Result<PipelineReport, PipelineError> {
        if self.state != PipelineState::Idle {
            return Err(PipelineError::AlreadyRun { state: self.state });
        }
        self.state = PipelineState::Running;

        let mut skipped = Vec::new();
        for appender in &self.appenders {
            let name = appender.name();
            let started = Instant::now();
            let rollback =
                (self.policy == TelemetryFailurePolicy::SkipAppender).then(|| graph.clone());

            match appender.append(&mut graph, context).await {
                Ok(()) => {
                    metrics().record_appender_success(name);
                    crate::appender_event!(
                        debug,
                        "appender_completed",
                        appender = name,
                        elapsed_ms = started.elapsed().as_millis()
                    );
                }
                Err(err @ AppenderError::TelemetryUnavailable(_)) if rollback.is_some() => {
                    metrics().record_appender_failure(name, err.reason());
                    crate::appender_event!(
                        warn,
                        "appender_skipped",
                        appender = name,
                        error = err
                    );
                    if let Some(previous) = rollback {
                        graph = previous;
                    }
                    skipped.push(name);
                }
                Err(err) => {
                    metrics().record_appender_failure(name, err.reason());
                    crate::appender_event!(error, "appender_failed", appender = name, error = err);
                    self.state = PipelineState::Failed;
                    return Err(PipelineError::AppenderFailed {
                        appender: name.to_string(),
                        source: err,
                    });
                }
            }
        }

        self.state = PipelineState::Completed;
        Ok(PipelineReport { graph, skipped })
    }
}
