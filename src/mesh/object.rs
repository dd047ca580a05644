use crate::mesh::document::{Document, DocumentExt};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Route protocols consulted when a routing object is matched against a service.
pub const ROUTE_PROTOCOLS: [&str; 2] = ["http", "tcp"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConfigKind {
    VirtualService,
    DestinationRule,
    Gateway,
    ServiceEntry,
    QuotaSpec,
    QuotaSpecBinding,
}

impl ConfigKind {
    pub const ALL: [ConfigKind; 6] = [
        ConfigKind::VirtualService,
        ConfigKind::DestinationRule,
        ConfigKind::Gateway,
        ConfigKind::ServiceEntry,
        ConfigKind::QuotaSpec,
        ConfigKind::QuotaSpecBinding,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConfigKind::VirtualService => "VirtualService",
            ConfigKind::DestinationRule => "DestinationRule",
            ConfigKind::Gateway => "Gateway",
            ConfigKind::ServiceEntry => "ServiceEntry",
            ConfigKind::QuotaSpec => "QuotaSpec",
            ConfigKind::QuotaSpecBinding => "QuotaSpecBinding",
        }
    }

    /// Plural resource name used by the control-plane API.
    pub fn resource(self) -> &'static str {
        match self {
            ConfigKind::VirtualService => "virtualservices",
            ConfigKind::DestinationRule => "destinationrules",
            ConfigKind::Gateway => "gateways",
            ConfigKind::ServiceEntry => "serviceentries",
            ConfigKind::QuotaSpec => "quotaspecs",
            ConfigKind::QuotaSpecBinding => "quotaspecbindings",
        }
    }
}

impl fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigKind {
    type Err = ObjectParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ConfigKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value || kind.resource() == value)
            .ok_or_else(|| ObjectParseError::UnknownKind(value.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum ObjectParseError {
    #[error("unknown config object kind `{0}`")]
    UnknownKind(String),
    #[error("config object is missing `{0}`")]
    MissingField(&'static str),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// A routing config object: kind discriminant, identity, and a per-kind typed view of its spec.
///
/// The parsed document is kept alongside the typed view so unknown fields survive
/// serialization. Objects are never mutated after construction.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigObject {
    meta: ObjectMeta,
    spec: ConfigSpec,
    document: Document,
}

impl ConfigObject {
    pub fn new(
        kind: ConfigKind,
        namespace: impl Into<String>,
        name: impl Into<String>,
        document: Document,
    ) -> Self {
        let meta = ObjectMeta {
            name: name.into(),
            namespace: namespace.into(),
            labels: BTreeMap::new(),
        };
        let spec = ConfigSpec::from_document(kind, &document);
        Self {
            meta,
            spec,
            document,
        }
    }

    /// Builds an object from its API representation (`kind`, `metadata`, `spec`).
    pub fn from_manifest(manifest: &JsonValue) -> Result<Self, ObjectParseError> {
        let kind: ConfigKind = manifest
            .str_at("kind")
            .ok_or(ObjectParseError::MissingField("kind"))?
            .parse()?;
        let metadata = manifest
            .object_at("metadata")
            .ok_or(ObjectParseError::MissingField("metadata"))?;
        let name = metadata
            .str_at("name")
            .ok_or(ObjectParseError::MissingField("metadata.name"))?;
        let namespace = metadata.str_at("namespace").unwrap_or_default();
        let document = manifest.field("spec").cloned().unwrap_or(JsonValue::Null);

        let mut object = Self::new(kind, namespace, name, document);
        object.meta.labels = metadata.string_map_at("labels").unwrap_or_default();
        Ok(object)
    }

    /// Serializes back to the API representation.
    pub fn to_manifest(&self) -> JsonValue {
        serde_json::json!({
            "kind": self.kind().as_str(),
            "metadata": {
                "name": self.meta.name,
                "namespace": self.meta.namespace,
                "labels": self.meta.labels,
            },
            "spec": self.document,
        })
    }

    pub fn kind(&self) -> ConfigKind {
        self.spec.kind()
    }

    pub fn object_meta(&self) -> &ObjectMeta {
        &self.meta
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn namespace(&self) -> &str {
        &self.meta.namespace
    }

    pub fn spec(&self) -> &ConfigSpec {
        &self.spec
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn as_virtual_service(&self) -> Option<&VirtualServiceSpec> {
        match &self.spec {
            ConfigSpec::VirtualService(spec) => Some(spec),
            _ => None,
        }
    }

    pub fn as_destination_rule(&self) -> Option<&DestinationRuleSpec> {
        match &self.spec {
            ConfigSpec::DestinationRule(spec) => Some(spec),
            _ => None,
        }
    }

    pub fn as_service_entry(&self) -> Option<&ServiceEntrySpec> {
        match &self.spec {
            ConfigSpec::ServiceEntry(spec) => Some(spec),
            _ => None,
        }
    }

    pub fn as_gateway(&self) -> Option<&GatewaySpec> {
        match &self.spec {
            ConfigSpec::Gateway(spec) => Some(spec),
            _ => None,
        }
    }
}

/// Closed set of per-kind payloads.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigSpec {
    VirtualService(VirtualServiceSpec),
    DestinationRule(DestinationRuleSpec),
    Gateway(GatewaySpec),
    ServiceEntry(ServiceEntrySpec),
    QuotaSpec(Document),
    QuotaSpecBinding(Document),
}

impl ConfigSpec {
    pub fn from_document(kind: ConfigKind, document: &Document) -> Self {
        match kind {
            ConfigKind::VirtualService => {
                ConfigSpec::VirtualService(VirtualServiceSpec::from_document(document))
            }
            ConfigKind::DestinationRule => {
                ConfigSpec::DestinationRule(DestinationRuleSpec::from_document(document))
            }
            ConfigKind::Gateway => ConfigSpec::Gateway(GatewaySpec::from_document(document)),
            ConfigKind::ServiceEntry => {
                ConfigSpec::ServiceEntry(ServiceEntrySpec::from_document(document))
            }
            ConfigKind::QuotaSpec => ConfigSpec::QuotaSpec(document.clone()),
            ConfigKind::QuotaSpecBinding => ConfigSpec::QuotaSpecBinding(document.clone()),
        }
    }

    pub fn kind(&self) -> ConfigKind {
        match self {
            ConfigSpec::VirtualService(_) => ConfigKind::VirtualService,
            ConfigSpec::DestinationRule(_) => ConfigKind::DestinationRule,
            ConfigSpec::Gateway(_) => ConfigKind::Gateway,
            ConfigSpec::ServiceEntry(_) => ConfigKind::ServiceEntry,
            ConfigSpec::QuotaSpec(_) => ConfigKind::QuotaSpec,
            ConfigSpec::QuotaSpecBinding(_) => ConfigKind::QuotaSpecBinding,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct VirtualServiceSpec {
    pub hosts: Option<Vec<String>>,
    pub gateways: Option<Vec<String>>,
    /// Route lists keyed by protocol (`http`, `tcp`, `tls`).
    pub routes: BTreeMap<String, Vec<RouteRule>>,
}

impl VirtualServiceSpec {
    const PROTOCOL_KEYS: [&'static str; 3] = ["http", "tcp", "tls"];

    pub fn from_document(document: &Document) -> Self {
        let routes = Self::PROTOCOL_KEYS
            .iter()
            .filter(|protocol| matches!(document.field(protocol), Some(JsonValue::Array(_))))
            .map(|protocol| {
                let rules = document
                    .objects_at(protocol)
                    .map(RouteRule::from_document)
                    .collect();
                (protocol.to_string(), rules)
            })
            .collect();

        Self {
            hosts: document.string_list_at("hosts"),
            gateways: document.string_list_at("gateways"),
            routes,
        }
    }

    pub fn routes_for(&self, protocol: &str) -> &[RouteRule] {
        self.routes
            .get(protocol)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RouteRule {
    pub destinations: Vec<RouteDestination>,
}

impl RouteRule {
    fn from_document(document: &Document) -> Self {
        let destinations = document
            .objects_at("route")
            .filter_map(|weighted| weighted.object_at("destination"))
            .map(RouteDestination::from_document)
            .collect();
        Self { destinations }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RouteDestination {
    pub host: Option<String>,
    pub subset: Option<String>,
}

impl RouteDestination {
    fn from_document(document: &Document) -> Self {
        Self {
            host: document.str_at("host").map(str::to_string),
            subset: document.str_at("subset").map(str::to_string),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrafficPolicy {
    pub connection_pool: bool,
    pub outlier_detection: bool,
}

impl TrafficPolicy {
    /// `None` unless the policy is an object; key presence is all that is recorded.
    fn from_field(document: &Document) -> Option<Self> {
        document.object_at("trafficPolicy").map(|policy| Self {
            connection_pool: policy.contains("connectionPool"),
            outlier_detection: policy.contains("outlierDetection"),
        })
    }

    pub fn is_circuit_breaking(&self) -> bool {
        self.connection_pool || self.outlier_detection
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DestinationRuleSpec {
    pub host: Option<String>,
    pub traffic_policy: Option<TrafficPolicy>,
    pub subsets: Vec<SubsetSpec>,
}

impl DestinationRuleSpec {
    pub fn from_document(document: &Document) -> Self {
        Self {
            host: document.str_at("host").map(str::to_string),
            traffic_policy: TrafficPolicy::from_field(document),
            subsets: document
                .objects_at("subsets")
                .map(SubsetSpec::from_document)
                .collect(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubsetSpec {
    pub name: Option<String>,
    pub labels: Option<BTreeMap<String, String>>,
    pub traffic_policy: Option<TrafficPolicy>,
}

impl SubsetSpec {
    fn from_document(document: &Document) -> Self {
        Self {
            name: document.str_at("name").map(str::to_string),
            labels: document.string_map_at("labels"),
            traffic_policy: TrafficPolicy::from_field(document),
        }
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .as_ref()
            .and_then(|labels| labels.get(key))
            .map(String::as_str)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GatewaySpec {
    pub selector: BTreeMap<String, String>,
    pub server_hosts: Vec<String>,
}

impl GatewaySpec {
    pub fn from_document(document: &Document) -> Self {
        Self {
            selector: document.string_map_at("selector").unwrap_or_default(),
            server_hosts: document
                .objects_at("servers")
                .filter_map(|server| server.string_list_at("hosts"))
                .flatten()
                .collect(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ServiceEntrySpec {
    pub hosts: Option<Vec<String>>,
    pub ports: Vec<ServiceEntryPort>,
    pub location: Option<String>,
}

impl ServiceEntrySpec {
    /// `ports` is read either as a single object or as a list of port objects.
    pub fn from_document(document: &Document) -> Self {
        let ports = match document.field("ports") {
            Some(single @ JsonValue::Object(_)) => vec![ServiceEntryPort::from_document(single)],
            Some(JsonValue::Array(_)) => document
                .objects_at("ports")
                .map(ServiceEntryPort::from_document)
                .collect(),
            _ => Vec::new(),
        };

        Self {
            hosts: document.string_list_at("hosts"),
            ports,
            location: document.str_at("location").map(str::to_string),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ServiceEntryPort {
    pub number: Option<u64>,
    pub name: Option<String>,
    pub protocol: Option<String>,
}

impl ServiceEntryPort {
    fn from_document(document: &Document) -> Self {
        Self {
            number: document.field("number").and_then(JsonValue::as_u64),
            name: document.str_at("name").map(str::to_string),
            protocol: document.str_at("protocol").map(str::to_string),
        }
    }
}
