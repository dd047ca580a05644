use crate::domain::MatchSettings;
use crate::mesh::document::{Document, DocumentExt};
use crate::mesh::external::ExternalHostIndex;
use crate::mesh::host::host_matches;
use crate::mesh::object::{ConfigObject, RouteDestination, VirtualServiceSpec, ROUTE_PROTOCOLS};

/// Walks every destination reachable through the given protocols' route lists.
fn destinations<'a>(
    spec: &'a VirtualServiceSpec,
    protocols: &'a [&'a str],
) -> impl Iterator<Item = (&'a str, &'a RouteDestination)> + 'a {
    protocols.iter().flat_map(move |protocol| {
        spec.routes_for(protocol)
            .iter()
            .flat_map(|rule| rule.destinations.iter())
            .map(move |destination| (*protocol, destination))
    })
}

/// Returns true if any route destination for `protocols` points at the service, or at a host
/// registered in `external_hosts` under the same protocol class.
pub fn find_destination_host(
    spec: &VirtualServiceSpec,
    protocols: &[&str],
    service: &str,
    namespace: &str,
    external_hosts: Option<&ExternalHostIndex>,
    settings: &MatchSettings,
) -> bool {
    destinations(spec, protocols).any(|(protocol, destination)| {
        let Some(host) = destination.host.as_deref() else {
            return false;
        };
        if host_matches(host, service, namespace, &settings.identity_domain) {
            return true;
        }
        external_hosts.is_some_and(|index| index.contains(protocol, host))
    })
}

/// Like [`find_destination_host`], but the matching destination must also name one of `subsets`.
pub fn find_destination_subset(
    spec: &VirtualServiceSpec,
    protocols: &[&str],
    service: &str,
    namespace: &str,
    subsets: &[String],
    settings: &MatchSettings,
) -> bool {
    destinations(spec, protocols).any(|(_, destination)| {
        let (Some(host), Some(subset)) = (destination.host.as_deref(), destination.subset.as_deref())
        else {
            return false;
        };
        host_matches(host, service, namespace, &settings.identity_domain)
            && subsets.iter().any(|candidate| candidate == subset)
    })
}

/// True when the routing object declares the service in its `hosts` list.
pub fn virtual_service_targets(
    virtual_service: &ConfigObject,
    namespace: &str,
    service: &str,
    settings: &MatchSettings,
) -> bool {
    if service.is_empty() {
        return false;
    }
    virtual_service
        .as_virtual_service()
        .and_then(|spec| spec.hosts.as_ref())
        .is_some_and(|hosts| {
            hosts
                .iter()
                .any(|host| host_matches(host, service, namespace, &settings.identity_domain))
        })
}

/// True when the routing object sends traffic for the service to any of `subsets`.
pub fn virtual_service_routes_subsets(
    virtual_service: &ConfigObject,
    namespace: &str,
    service: &str,
    subsets: &[String],
    settings: &MatchSettings,
) -> bool {
    if subsets.is_empty() {
        return false;
    }
    virtual_service.as_virtual_service().is_some_and(|spec| {
        find_destination_subset(spec, &ROUTE_PROTOCOLS, service, namespace, subsets, settings)
    })
}

/// Matches a legacy route-rule `destination` block (`namespace`, `name`, `labels`).
///
/// A destination without labels covers the whole service. With labels and a non-empty
/// `version`, the version label must equal `version`.
pub fn filter_by_destination(
    spec: &Document,
    namespace: &str,
    service: &str,
    version: &str,
    settings: &MatchSettings,
) -> bool {
    let Some(destination) = spec.object_at("destination") else {
        return false;
    };
    if destination
        .field("namespace")
        .is_some_and(|value| value.as_str() != Some(namespace))
    {
        return false;
    }
    if destination
        .field("name")
        .is_some_and(|value| value.as_str() != Some(service))
    {
        return false;
    }

    match destination.field("labels") {
        Some(labels) if !version.is_empty() => match labels.as_object() {
            Some(_) => labels.str_at(&settings.version_label) == Some(version),
            None => false,
        },
        _ => true,
    }
}
