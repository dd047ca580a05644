use super::{scoped_destinations, HAS_CIRCUIT_BREAKER};
use crate::graph::appender::{Appender, AppenderContext, AppenderError};
use crate::graph::model::TrafficGraph;
use crate::mesh::resilience::has_circuit_breaker;
use async_trait::async_trait;

pub struct CircuitBreakerAppender;

impl CircuitBreakerAppender {
    pub const NAME: &'static str = "circuit_breaker";
}

#[async_trait]
impl Appender for CircuitBreakerAppender {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn append(
        &self,
        graph: &mut TrafficGraph,
        context: &AppenderContext,
    ) -> Result<(), AppenderError> {
        for key in scoped_destinations(graph, context) {
            let snapshot = context.snapshot(key.namespace()).await?;
            let protected = snapshot.destination_rules.iter().any(|rule| {
                has_circuit_breaker(
                    rule,
                    key.namespace(),
                    key.name(),
                    key.version(),
                    &context.settings,
                )
            });
            if let Some(node) = graph.node_mut(&key) {
                node.annotations.set_flag(HAS_CIRCUIT_BREAKER, protected);
            }
        }
        Ok(())
    }
}
