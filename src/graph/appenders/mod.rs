//! Concrete enrichment passes and the registry that selects them by name.

pub mod circuit_breaker;
pub mod external_services;
pub mod gateway_validation;
pub mod response_time;
pub mod routing;

use crate::graph::appender::Appender;
use crate::graph::model::{NodeKey, TrafficGraph};
use crate::graph::appender::AppenderContext;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub use circuit_breaker::CircuitBreakerAppender;
pub use external_services::ExternalServicesAppender;
pub use gateway_validation::GatewayValidationAppender;
pub use response_time::ResponseTimeAppender;
pub use routing::RoutingAppender;

pub const HAS_VIRTUAL_SERVICE: &str = "has_virtual_service";
pub const SUBSETS: &str = "subsets";
pub const ROUTED_BY_SUBSET: &str = "routed_by_subset";
pub const HAS_CIRCUIT_BREAKER: &str = "has_circuit_breaker";
pub const INVALID_GATEWAYS: &str = "invalid_gateways";
pub const UNKNOWN_GATEWAYS: &str = "unknown_gateways";
pub const IS_SERVICE_ENTRY: &str = "is_service_entry";
pub const EXTERNAL_ROUTE: &str = "external_route";
pub const RESPONSE_TIME_MS: &str = "response_time_ms";

/// Execution order used when no explicit list is configured.
pub const DEFAULT_ORDER: [&str; 5] = [
    RoutingAppender::NAME,
    CircuitBreakerAppender::NAME,
    GatewayValidationAppender::NAME,
    ExternalServicesAppender::NAME,
    ResponseTimeAppender::NAME,
];

/// Appenders available to a pipeline, addressed by name.
#[derive(Default)]
pub struct AppenderRegistry {
    appenders: HashMap<&'static str, Arc<dyn Appender>>,
}

impl AppenderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in appender.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(RoutingAppender);
        registry.register(CircuitBreakerAppender);
        registry.register(GatewayValidationAppender);
        registry.register(ExternalServicesAppender);
        registry.register(ResponseTimeAppender::default());
        registry
    }

    pub fn register<A>(&mut self, appender: A)
    where
        A: Appender + 'static,
    {
        self.appenders.insert(appender.name(), Arc::new(appender));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Appender>> {
        self.appenders.get(name).cloned()
    }

    /// Resolves `names` in the given order; `None` selects [`DEFAULT_ORDER`].
    pub fn select(&self, names: Option<&[String]>) -> Result<Vec<Arc<dyn Appender>>, RegistryError> {
        match names {
            Some(names) => names.iter().map(|name| self.lookup(name)).collect(),
            None => DEFAULT_ORDER.iter().map(|name| self.lookup(name)).collect(),
        }
    }

    fn lookup(&self, name: &str) -> Result<Arc<dyn Appender>, RegistryError> {
        self.get(name).ok_or_else(|| RegistryError::UnknownAppender {
            name: name.to_string(),
        })
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no appender registered under `{name}`")]
    UnknownAppender { name: String },
}

/// Destination nodes that live in one of the requested namespaces.
pub(crate) fn scoped_destinations(graph: &TrafficGraph, context: &AppenderContext) -> Vec<NodeKey> {
    graph
        .destination_keys()
        .into_iter()
        .filter(|key| context.includes_namespace(key.namespace()))
        .collect()
}
