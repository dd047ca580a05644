use crate::mesh::object::{ConfigObject, VirtualServiceSpec};
use std::collections::HashSet;

/// Reserved gateway reference meaning "all sidecars in the mesh".
pub const MESH_GATEWAY: &str = "mesh";

/// Names of the given gateway objects.
pub fn gateway_names<'a, I>(gateways: I) -> HashSet<String>
where
    I: IntoIterator<Item = &'a ConfigObject>,
{
    gateways
        .into_iter()
        .map(|gateway| gateway.name().to_string())
        .collect()
}

/// True when every gateway the routing object references, other than `mesh`, is known.
/// An absent gateway list is trivially valid.
pub fn all_gateways_known(spec: &VirtualServiceSpec, known: &HashSet<String>) -> bool {
    spec.gateways.as_ref().map_or(true, |gateways| {
        gateways
            .iter()
            .all(|gateway| gateway == MESH_GATEWAY || known.contains(gateway))
    })
}

/// Gateway references of the routing object that resolve to nothing in `known`.
pub fn unknown_gateways<'a>(spec: &'a VirtualServiceSpec, known: &HashSet<String>) -> Vec<&'a str> {
    spec.gateways
        .iter()
        .flatten()
        .filter(|gateway| gateway.as_str() != MESH_GATEWAY && !known.contains(*gateway))
        .map(String::as_str)
        .collect()
}
