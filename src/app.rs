use crate::config::MeshGraphConfig;
use crate::error::{Context, Result};
use crate::graph::appender::{
    Appender, AppenderContext, AppenderPipeline, QueryWindow, TelemetryFailurePolicy,
};
use crate::graph::appenders::AppenderRegistry;
use crate::graph::model::{TrafficGraph, TRAFFIC_LABELS};
use crate::mesh::snapshot::ConfigSnapshotFetcher;
use crate::mesh::source::{ConfigSource, StaticConfigSource};
use crate::prometheus::{MetricsApi, PrometheusApi, TelemetryQueryExecutor, TelemetryVector};
use chrono::{DateTime, Utc};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone, Debug, Default)]
pub struct GraphRequest {
    pub namespaces: Vec<String>,
    pub query_time: Option<DateTime<Utc>>,
    pub duration: Option<Duration>,
}

impl GraphRequest {
    pub fn for_namespaces<I, S>(namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            namespaces: namespaces.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

#[derive(Debug)]
pub struct GraphResponse {
    pub window: QueryWindow,
    pub graph: TrafficGraph,
    pub skipped: Vec<&'static str>,
}

impl GraphResponse {
    pub fn to_json(&self) -> JsonValue {
        json!({
            "timestamp": self.window.query_time.timestamp(),
            "duration": self.window.duration.as_secs(),
            "skippedAppenders": self.skipped,
            "graph": self.graph.to_json(),
        })
    }
}

pub struct MeshGraphService {
    fetcher: ConfigSnapshotFetcher,
    telemetry: TelemetryQueryExecutor,
    appenders: Vec<Arc<dyn Appender>>,
    policy: TelemetryFailurePolicy,
    duration: Duration,
}

impl MeshGraphService {
    pub fn initialise(config: &MeshGraphConfig) -> Result<Self> {
        let api = PrometheusApi::new(&config.prometheus.url, config.prometheus.timeout)
            .with_context(|| format!("invalid prometheus url `{}`", config.prometheus.url))?;

        let source = match config.source.path.as_deref() {
            Some(path) if !path.trim().is_empty() => StaticConfigSource::from_path(path)
                .with_context(|| format!("failed to load config objects from {path}"))?,
            _ => {
                tracing::warn!("no source.path configured; routing config will be empty");
                StaticConfigSource::default()
            }
        };

        Self::new(Arc::new(source), Arc::new(api), config)
    }

    pub fn new(
        source: Arc<dyn ConfigSource>,
        api: Arc<dyn MetricsApi>,
        config: &MeshGraphConfig,
    ) -> Result<Self> {
        let registry = AppenderRegistry::with_defaults();
        let appenders = registry
            .select(config.graph.appenders.as_deref())
            .context("invalid graph.appenders")?;

        Ok(Self {
            fetcher: ConfigSnapshotFetcher::new(source, config.mesh.match_settings()),
            telemetry: TelemetryQueryExecutor::new(api),
            appenders,
            policy: config.graph.telemetry_failure_policy,
            duration: config.graph.duration,
        })
    }

    pub fn fetcher(&self) -> &ConfigSnapshotFetcher {
        &self.fetcher
    }

    pub async fn build_graph(&self, request: GraphRequest) -> Result<GraphResponse> {
        if request.namespaces.is_empty() {
            crate::bail_err!("graph request names no namespaces");
        }
        let window = QueryWindow::new(
            request.query_time.unwrap_or_else(Utc::now),
            request.duration.unwrap_or(self.duration),
        );
        let started = Instant::now();

        let range = window.range();
        let request_query = request_traffic_expression(&request.namespaces, &range);
        let tcp_query = tcp_traffic_expression(&request.namespaces, &range);
        let (requests, tcp) = tokio::try_join!(
            self.telemetry.query(&request_query, window.query_time),
            self.telemetry.query(&tcp_query, window.query_time),
        )
        .context("failed to query base traffic")?;

        let mut graph = TrafficGraph::from_vector(&requests);
        graph.accumulate(&tcp, "tcp");

        let traffic: TelemetryVector = requests.into_iter().chain(tcp).collect();
        let context = AppenderContext::new(
            window,
            request.namespaces.clone(),
            self.fetcher.clone(),
            self.telemetry.clone(),
            Arc::new(traffic),
        );

        let mut pipeline = AppenderPipeline::new(self.appenders.clone(), self.policy);
        let report = pipeline.run(graph, &context).await?;

        tracing::info!(
            namespaces = %request.namespaces.join(","),
            nodes = report.graph.node_count(),
            edges = report.graph.edge_count(),
            skipped = report.skipped.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "graph built"
        );

        Ok(GraphResponse {
            window,
            graph: report.graph,
            skipped: report.skipped,
        })
    }
}

fn namespace_selector(namespaces: &[String]) -> String {
    format!(
        "reporter=\"destination\",destination_service_namespace=~\"{}\"",
        namespaces.join("|")
    )
}

pub fn request_traffic_expression(namespaces: &[String], range: &str) -> String {
    format!(
        "sum(rate(istio_requests_total{{{}}}[{}])) by ({})",
        namespace_selector(namespaces),
        range,
        TRAFFIC_LABELS.join(",")
    )
}

pub fn tcp_traffic_expression(namespaces: &[String], range: &str) -> String {
    format!(
        "sum(rate(istio_tcp_sent_bytes_total{{{}}}[{}])) by ({})",
        namespace_selector(namespaces),
        range,
        TRAFFIC_LABELS.join(",")
    )
}
