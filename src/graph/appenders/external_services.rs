use super::{EXTERNAL_ROUTE, IS_SERVICE_ENTRY};
use crate::graph::appender::{Appender, AppenderContext, AppenderError};
use crate::graph::model::TrafficGraph;
use crate::mesh::external::{protocol_class, ExternalHostIndex};
use crate::mesh::object::VirtualServiceSpec;
use crate::mesh::route::virtual_service_targets;
use async_trait::async_trait;
use std::collections::HashMap;

/// Marks destinations registered as external services and edges whose routing sends them
/// outside the mesh.
pub struct ExternalServicesAppender;

impl ExternalServicesAppender {
    pub const NAME: &'static str = "external_services";
}

#[async_trait]
impl Appender for ExternalServicesAppender {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn append(
        &self,
        graph: &mut TrafficGraph,
        context: &AppenderContext,
    ) -> Result<(), AppenderError> {
        let mut indexes = HashMap::new();
        for namespace in &context.namespaces {
            let entries = context.fetcher.list_service_entries(namespace).await?;
            let index = ExternalHostIndex::build(&entries);
            crate::appender_event!(
                debug,
                "external_hosts_indexed",
                appender = Self::NAME,
                namespace = namespace,
                keys = index.len()
            );
            indexes.insert(namespace.as_str(), index);
        }

        for node in graph.nodes_mut() {
            if indexes
                .get(node.key.namespace())
                .is_some_and(|index| index.contains_host(node.key.name()))
            {
                node.annotations.set_flag(IS_SERVICE_ENTRY, true);
            }
        }

        for (namespace, index) in &indexes {
            if index.is_empty() {
                continue;
            }
            let snapshot = context.snapshot(namespace).await?;
            for edge in graph.edges_mut() {
                let target = edge.target();
                if target.namespace() != *namespace {
                    continue;
                }
                let class = protocol_class(&edge.protocol().to_uppercase());
                let external = snapshot.virtual_services.iter().any(|object| {
                    virtual_service_targets(object, namespace, target.name(), &context.settings)
                        && object
                            .as_virtual_service()
                            .is_some_and(|spec| routes_to_external_host(spec, class, index))
                });
                if external {
                    edge.annotations.set_flag(EXTERNAL_ROUTE, true);
                }
            }
        }
        Ok(())
    }
}

fn routes_to_external_host(spec: &VirtualServiceSpec, protocol: &str, index: &ExternalHostIndex) -> bool {
    spec.routes_for(protocol)
        .iter()
        .flat_map(|rule| rule.destinations.iter())
        .filter_map(|destination| destination.host.as_deref())
        .any(|host| index.contains(protocol, host))
}
