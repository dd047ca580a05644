use super::{scoped_destinations, INVALID_GATEWAYS, UNKNOWN_GATEWAYS};
use crate::graph::appender::{Appender, AppenderContext, AppenderError};
use crate::graph::model::TrafficGraph;
use crate::mesh::gateway::{all_gateways_known, gateway_names, unknown_gateways};
use crate::mesh::object::{ConfigObject, ROUTE_PROTOCOLS};
use crate::mesh::route::{find_destination_host, virtual_service_targets};
use crate::mesh::snapshot::FetchError;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};

/// Flags services reachable through routing objects that reference gateways which do not exist.
///
/// Bare references resolve against the routing object's namespace. Qualified `namespace/name`
/// references resolve against the gateways of the namespace they name.
pub struct GatewayValidationAppender;

impl GatewayValidationAppender {
    pub const NAME: &'static str = "gateway_validation";
}

async fn load_gateways(
    context: &AppenderContext,
    listed: &mut HashMap<String, Vec<ConfigObject>>,
    namespace: &str,
) -> Result<(), FetchError> {
    if !listed.contains_key(namespace) {
        let gateways = context.fetcher.list_gateways(namespace).await?;
        listed.insert(namespace.to_string(), gateways);
    }
    Ok(())
}

#[async_trait]
impl Appender for GatewayValidationAppender {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn append(
        &self,
        graph: &mut TrafficGraph,
        context: &AppenderContext,
    ) -> Result<(), AppenderError> {
        let destinations = scoped_destinations(graph, context);
        let mut listed = HashMap::new();

        for namespace in &context.namespaces {
            load_gateways(context, &mut listed, namespace).await?;
            let snapshot = context.snapshot(namespace).await?;

            let referenced: BTreeSet<String> = snapshot
                .virtual_services
                .iter()
                .filter_map(|object| object.as_virtual_service())
                .flat_map(|spec| spec.gateways.iter().flatten())
                .filter_map(|gateway| gateway.split_once('/'))
                .map(|(gateway_namespace, _)| gateway_namespace.to_string())
                .collect();
            for gateway_namespace in &referenced {
                load_gateways(context, &mut listed, gateway_namespace).await?;
            }

            let mut known = listed
                .get(namespace.as_str())
                .map(|gateways| gateway_names(gateways))
                .unwrap_or_default();
            known.extend(
                listed
                    .values()
                    .flatten()
                    .map(|gateway| format!("{}/{}", gateway.namespace(), gateway.name())),
            );

            for object in &snapshot.virtual_services {
                let Some(spec) = object.as_virtual_service() else {
                    continue;
                };
                if all_gateways_known(spec, &known) {
                    continue;
                }
                let unknown = unknown_gateways(spec, &known);
                crate::appender_event!(
                    warn,
                    "unknown_gateway_reference",
                    appender = Self::NAME,
                    namespace = namespace,
                    virtual_service = object.name(),
                    gateways = unknown.join(",")
                );

                for key in destinations.iter().filter(|key| key.namespace() == namespace.as_str()) {
                    let targeted = virtual_service_targets(object, namespace, key.name(), &context.settings)
                        || find_destination_host(
                            spec,
                            &ROUTE_PROTOCOLS,
                            key.name(),
                            namespace,
                            None,
                            &context.settings,
                        );
                    if !targeted {
                        continue;
                    }
                    if let Some(node) = graph.node_mut(key) {
                        node.annotations.set_flag(INVALID_GATEWAYS, true);
                        node.annotations
                            .extend_list(UNKNOWN_GATEWAYS, unknown.iter().map(|name| name.to_string()));
                    }
                }
            }
        }
        Ok(())
    }
}
