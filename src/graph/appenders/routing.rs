use super::{scoped_destinations, HAS_VIRTUAL_SERVICE, ROUTED_BY_SUBSET, SUBSETS};
use crate::graph::appender::{Appender, AppenderContext, AppenderError};
use crate::graph::model::TrafficGraph;
use crate::mesh::object::ROUTE_PROTOCOLS;
use crate::mesh::route::{
    find_destination_host, virtual_service_routes_subsets, virtual_service_targets,
};
use crate::mesh::subset::subsets_for_version;
use async_trait::async_trait;
use std::collections::HashSet;

/// Marks services that have routing rules and the subsets their versions belong to.
pub struct RoutingAppender;

impl RoutingAppender {
    pub const NAME: &'static str = "routing";
}

#[async_trait]
impl Appender for RoutingAppender {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn append(
        &self,
        graph: &mut TrafficGraph,
        context: &AppenderContext,
    ) -> Result<(), AppenderError> {
        let settings = &context.settings;
        let mut routed = HashSet::new();

        for key in scoped_destinations(graph, context) {
            let snapshot = context.snapshot(key.namespace()).await?;
            let (namespace, service, version) = (key.namespace(), key.name(), key.version());

            let has_virtual_service = snapshot.virtual_services.iter().any(|object| {
                virtual_service_targets(object, namespace, service, settings)
                    || object.as_virtual_service().is_some_and(|spec| {
                        find_destination_host(spec, &ROUTE_PROTOCOLS, service, namespace, None, settings)
                    })
            });
            let subsets = if version.is_empty() {
                Vec::new()
            } else {
                subsets_for_version(&snapshot.destination_rules, service, version, settings)
            };
            if snapshot.virtual_services.iter().any(|object| {
                virtual_service_routes_subsets(object, namespace, service, &subsets, settings)
            }) {
                routed.insert(key.clone());
            }

            if let Some(node) = graph.node_mut(&key) {
                node.annotations.set_flag(HAS_VIRTUAL_SERVICE, has_virtual_service);
                if !subsets.is_empty() {
                    node.annotations.extend_list(SUBSETS, subsets);
                }
            }
        }

        for edge in graph.edges_mut() {
            if routed.contains(edge.target()) {
                edge.annotations.set_flag(ROUTED_BY_SUBSET, true);
            }
        }
        Ok(())
    }
}
