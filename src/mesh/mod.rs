//! Routing-config model and the correlation logic that resolves traffic identities against it.

pub mod document;
pub mod external;
pub mod gateway;
pub mod host;
pub mod object;
pub mod resilience;
pub mod route;
pub mod snapshot;
pub mod source;
pub mod subset;

pub use external::{protocol_class, ExternalHostIndex};
pub use gateway::{all_gateways_known, gateway_names, unknown_gateways, MESH_GATEWAY};
pub use host::host_matches;
pub use object::{ConfigKind, ConfigObject, ConfigSpec, ObjectMeta, ROUTE_PROTOCOLS};
pub use resilience::has_circuit_breaker;
pub use route::{
    filter_by_destination, find_destination_host, find_destination_subset,
    virtual_service_routes_subsets, virtual_service_targets,
};
pub use snapshot::{ConfigSnapshot, ConfigSnapshotFetcher, FetchError};
pub use source::{ConfigSource, SourceError, StaticConfigSource};
pub use subset::subsets_for_version;
