use crate::domain::{MatchSettings, DEFAULT_IDENTITY_DOMAIN, DEFAULT_VERSION_LABEL};
use crate::graph::appender::TelemetryFailurePolicy;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MeshGraphConfig {
    #[serde(default)]
    pub prometheus: PrometheusConfig,
    #[serde(default)]
    pub mesh: MeshConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub source: SourceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrometheusConfig {
    #[serde(default = "default_prometheus_url")]
    pub url: String,
    #[serde(default = "default_query_timeout", deserialize_with = "humantime_duration")]
    pub timeout: Duration,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            url: default_prometheus_url(),
            timeout: default_query_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeshConfig {
    #[serde(default = "default_identity_domain")]
    pub identity_domain: String,
    #[serde(default = "default_version_label")]
    pub version_label: String,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            identity_domain: default_identity_domain(),
            version_label: default_version_label(),
        }
    }
}

impl MeshConfig {
    pub fn match_settings(&self) -> MatchSettings {
        MatchSettings::new(&self.identity_domain, &self.version_label)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    #[serde(default)]
    pub telemetry_failure_policy: TelemetryFailurePolicy,
    #[serde(default = "default_graph_duration", deserialize_with = "humantime_duration")]
    pub duration: Duration,
    /// Enabled appenders in execution order; `None` enables all of them.
    #[serde(default)]
    pub appenders: Option<Vec<String>>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            telemetry_failure_policy: TelemetryFailurePolicy::default(),
            duration: default_graph_duration(),
            appenders: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SourceConfig {
    #[serde(default)]
    pub path: Option<String>,
}

fn default_prometheus_url() -> String {
    "http://localhost:9090".to_string()
}

const fn default_query_timeout() -> Duration {
    Duration::from_secs(30)
}

const fn default_graph_duration() -> Duration {
    Duration::from_secs(600)
}

fn default_identity_domain() -> String {
    DEFAULT_IDENTITY_DOMAIN.to_string()
}

fn default_version_label() -> String {
    DEFAULT_VERSION_LABEL.to_string()
}

fn humantime_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}

impl MeshGraphConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config/local")
    }

    /// Layers an optional config file under `MESHGRAPH__*` environment variables.
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("MESHGRAPH").separator("__"))
            .build()?
            .try_deserialize()
    }
}
