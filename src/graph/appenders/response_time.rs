use super::RESPONSE_TIME_MS;
use crate::graph::appender::{Appender, AppenderContext, AppenderError};
use crate::graph::model::{edge_key, TrafficGraph, TRAFFIC_LABELS};
use async_trait::async_trait;

/// Writes a latency quantile, in milliseconds, on every edge the metrics backend reports one for.
pub struct ResponseTimeAppender {
    quantile: f64,
}

impl Default for ResponseTimeAppender {
    fn default() -> Self {
        Self { quantile: 0.95 }
    }
}

impl ResponseTimeAppender {
    pub const NAME: &'static str = "response_time";

    pub fn with_quantile(quantile: f64) -> Self {
        Self { quantile }
    }

    pub fn expression(&self, namespaces: &[String], range: &str) -> String {
        format!(
            "histogram_quantile({}, sum(rate(istio_request_duration_milliseconds_bucket{{reporter=\"destination\",destination_service_namespace=~\"{}\"}}[{}])) by (le,{}))",
            self.quantile,
            namespaces.join("|"),
            range,
            TRAFFIC_LABELS.join(","),
        )
    }
}

#[async_trait]
impl Appender for ResponseTimeAppender {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn append(
        &self,
        graph: &mut TrafficGraph,
        context: &AppenderContext,
    ) -> Result<(), AppenderError> {
        if graph.edge_count() == 0 || context.namespaces.is_empty() {
            return Ok(());
        }
        if !(0.0..=1.0).contains(&self.quantile) {
            return Err(AppenderError::invalid(format!(
                "quantile {} is outside [0, 1]",
                self.quantile
            )));
        }

        let expression = self.expression(&context.namespaces, &context.window.range());
        let vector = context
            .telemetry
            .query(&expression, context.window.query_time)
            .await?;

        let mut annotated = 0usize;
        for sample in &vector {
            if !sample.value.is_finite() {
                continue;
            }
            let Some(key) = edge_key(sample, "http") else {
                continue;
            };
            if let Some(edge) = graph.edge_mut(&key) {
                edge.annotations.set_number(RESPONSE_TIME_MS, sample.value);
                annotated += 1;
            }
        }
        crate::appender_event!(
            debug,
            "response_times_applied",
            appender = Self::NAME,
            samples = vector.len(),
            edges = annotated
        );
        Ok(())
    }
}
