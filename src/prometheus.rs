//! Instant queries against the metrics backend.

use crate::mesh::source::BoxError;
use crate::metrics::metrics;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Rounding applied to every submitted expression so repeated queries agree on float noise.
pub const ROUNDING_PRECISION: &str = "0.001";

#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub labels: BTreeMap<String, String>,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl Sample {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// Single-timestamp snapshot of labelled series values.
pub type TelemetryVector = Vec<Sample>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    Vector,
    Matrix,
    Scalar,
    String,
}

impl ResultType {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultType::Vector => "vector",
            ResultType::Matrix => "matrix",
            ResultType::Scalar => "scalar",
            ResultType::String => "string",
        }
    }
}

/// Raw `data` section of a query response.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub result_type: ResultType,
    pub result: JsonValue,
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("metrics backend transport failure: {0}")]
    Transport(#[source] BoxError),
    #[error("metrics backend returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("no handling for query result type `{result_type}`")]
    UnexpectedResultType { result_type: String },
    #[error("failed to decode query result: {reason}")]
    Decode { reason: String },
    #[error("query was cancelled")]
    Cancelled,
}

impl QueryError {
    pub fn transport<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        QueryError::Transport(error.into())
    }

    pub fn decode(reason: impl Into<String>) -> Self {
        QueryError::Decode {
            reason: reason.into(),
        }
    }

    /// Every query failure means telemetry for the pass is unavailable.
    pub fn is_telemetry_unavailable(&self) -> bool {
        true
    }
}

/// Transport for instant queries.
#[async_trait]
pub trait MetricsApi: Send + Sync {
    async fn instant_query(
        &self,
        expression: &str,
        time: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<QueryResponse, QueryError>;
}

/// HTTP client for the Prometheus query API.
#[derive(Clone, Debug)]
pub struct PrometheusApi {
    client: reqwest::Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEnvelope {
    status: String,
    #[serde(default)]
    data: Option<QueryResponse>,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl PrometheusApi {
    pub fn new(base_url: &str, timeout: Duration) -> crate::error::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, Url::parse(base_url)?))
    }

    pub fn with_client(client: reqwest::Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    /// Appends the query endpoint to the base path, so `http://host/prometheus` is queried at
    /// `http://host/prometheus/api/v1/query`.
    fn query_url(&self) -> Result<Url, QueryError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                QueryError::transport(format!("base url `{}` cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(["api", "v1", "query"]);
        Ok(url)
    }

    async fn send(
        &self,
        expression: &str,
        time: DateTime<Utc>,
    ) -> Result<QueryResponse, QueryError> {
        let timestamp = format!("{:.3}", time.timestamp_millis() as f64 / 1000.0);
        let response = self
            .client
            .get(self.query_url()?)
            .query(&[("query", expression), ("time", timestamp.as_str())])
            .send()
            .await
            .map_err(QueryError::transport)?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(QueryError::transport)?;
        let envelope: Option<ApiEnvelope> = serde_json::from_slice(&bytes).ok();

        match envelope {
            Some(ApiEnvelope {
                status: api_status,
                data: Some(data),
                ..
            }) if status.is_success() && api_status == "success" => Ok(data),
            Some(envelope) => Err(QueryError::Status {
                status: status.as_u16(),
                message: match (envelope.error_type, envelope.error) {
                    (Some(kind), Some(error)) => format!("{kind}: {error}"),
                    (None, Some(error)) => error,
                    _ => format!("status `{}` without data", envelope.status),
                },
            }),
            None if !status.is_success() => Err(QueryError::Status {
                status: status.as_u16(),
                message: String::from_utf8_lossy(&bytes).into_owned(),
            }),
            None => Err(QueryError::decode("response body is not a query envelope")),
        }
    }
}

#[async_trait]
impl MetricsApi for PrometheusApi {
    async fn instant_query(
        &self,
        expression: &str,
        time: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<QueryResponse, QueryError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(QueryError::Cancelled),
            result = self.send(expression, time) => result,
        }
    }
}

/// Issues rounded instant queries and insists on a vector result.
#[derive(Clone)]
pub struct TelemetryQueryExecutor {
    api: Arc<dyn MetricsApi>,
}

impl TelemetryQueryExecutor {
    pub fn new(api: Arc<dyn MetricsApi>) -> Self {
        Self { api }
    }

    pub async fn query(
        &self,
        expression: &str,
        as_of: DateTime<Utc>,
    ) -> Result<TelemetryVector, QueryError> {
        let expression = rounded(expression);
        tracing::debug!(
            query = %expression,
            time = %as_of.to_rfc3339_opts(SecondsFormat::Secs, true),
            now = %Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            unix = as_of.timestamp(),
            "submitting telemetry query"
        );

        let scope = CancellationToken::new();
        let _release = scope.clone().drop_guard();

        let started = Instant::now();
        let result = self
            .api
            .instant_query(&expression, as_of, &scope)
            .await
            .and_then(|response| match response.result_type {
                ResultType::Vector => decode_vector(&response.result),
                other => Err(QueryError::UnexpectedResultType {
                    result_type: other.as_str().to_string(),
                }),
            });
        metrics().record_query(result.is_ok(), started.elapsed());

        if let Err(err) = &result {
            tracing::warn!(query = %expression, error = %err, "telemetry query failed");
        }
        result
    }
}

/// Wraps an expression in the fixed 3-decimal rounding function.
pub fn rounded(expression: &str) -> String {
    format!("round({expression},{ROUNDING_PRECISION})")
}

/// Decodes `[{"metric": {..}, "value": [<unix seconds>, "<value>"]}, ..]`.
pub fn decode_vector(result: &JsonValue) -> Result<TelemetryVector, QueryError> {
    let items = result
        .as_array()
        .ok_or_else(|| QueryError::decode("vector result is not an array"))?;

    items.iter().map(decode_sample).collect()
}

fn decode_sample(item: &JsonValue) -> Result<Sample, QueryError> {
    let labels = match item.get("metric") {
        Some(JsonValue::Object(map)) => map
            .iter()
            .filter_map(|(key, value)| value.as_str().map(|v| (key.clone(), v.to_string())))
            .collect(),
        None | Some(JsonValue::Null) => BTreeMap::new(),
        Some(_) => return Err(QueryError::decode("sample metric is not an object")),
    };

    let pair = item
        .get("value")
        .and_then(JsonValue::as_array)
        .filter(|pair| pair.len() == 2)
        .ok_or_else(|| QueryError::decode("sample value is not a [timestamp, value] pair"))?;

    let seconds = pair[0]
        .as_f64()
        .ok_or_else(|| QueryError::decode("sample timestamp is not a number"))?;
    let value = match &pair[1] {
        JsonValue::String(raw) => parse_sample_value(raw)?,
        JsonValue::Number(number) => number
            .as_f64()
            .ok_or_else(|| QueryError::decode("sample value is out of range"))?,
        _ => return Err(QueryError::decode("sample value is not a string")),
    };

    let millis = (seconds * 1000.0).round() as i64;
    let timestamp = Utc
        .timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| QueryError::decode(format!("sample timestamp {seconds} out of range")))?;

    Ok(Sample {
        labels,
        value,
        timestamp,
    })
}

fn parse_sample_value(raw: &str) -> Result<f64, QueryError> {
    match raw {
        "NaN" => Ok(f64::NAN),
        "+Inf" | "Inf" => Ok(f64::INFINITY),
        "-Inf" => Ok(f64::NEG_INFINITY),
        _ => raw
            .parse()
            .map_err(|_| QueryError::decode(format!("sample value `{raw}` is not a float"))),
    }
}
