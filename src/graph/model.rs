use crate::domain::ServiceIdentity;
use crate::prometheus::{Sample, TelemetryVector};
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;

pub const LABEL_SOURCE_NAMESPACE: &str = "source_workload_namespace";
pub const LABEL_SOURCE_WORKLOAD: &str = "source_workload";
pub const LABEL_SOURCE_APP: &str = "source_app";
pub const LABEL_SOURCE_VERSION: &str = "source_version";
pub const LABEL_DEST_SERVICE_NAMESPACE: &str = "destination_service_namespace";
pub const LABEL_DEST_SERVICE_NAME: &str = "destination_service_name";
pub const LABEL_DEST_WORKLOAD: &str = "destination_workload";
pub const LABEL_DEST_APP: &str = "destination_app";
pub const LABEL_DEST_VERSION: &str = "destination_version";
pub const LABEL_REQUEST_PROTOCOL: &str = "request_protocol";

/// Grouping labels of the traffic queries, in the order they are emitted.
pub const TRAFFIC_LABELS: [&str; 10] = [
    LABEL_SOURCE_NAMESPACE,
    LABEL_SOURCE_WORKLOAD,
    LABEL_SOURCE_APP,
    LABEL_SOURCE_VERSION,
    LABEL_DEST_SERVICE_NAMESPACE,
    LABEL_DEST_SERVICE_NAME,
    LABEL_DEST_WORKLOAD,
    LABEL_DEST_APP,
    LABEL_DEST_VERSION,
    LABEL_REQUEST_PROTOCOL,
];

/// Telemetry placeholder for labels the proxy could not resolve.
const UNKNOWN: &str = "unknown";

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NodeKey {
    pub identity: ServiceIdentity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
}

impl NodeKey {
    pub fn service(identity: ServiceIdentity) -> Self {
        Self {
            identity,
            workload: None,
            app: None,
        }
    }

    pub fn with_workload(mut self, workload: Option<&str>) -> Self {
        self.workload = known(workload).map(str::to_string);
        self
    }

    pub fn with_app(mut self, app: Option<&str>) -> Self {
        self.app = known(app).map(str::to_string);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.identity.namespace
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn version(&self) -> &str {
        self.identity.version_str()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnnotationValue {
    Flag(bool),
    Number(f64),
    List(Vec<String>),
}

/// Annotations written by appenders. There is no removal API: later passes can only add.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Annotations {
    values: BTreeMap<String, AnnotationValue>,
}

impl Annotations {
    /// Sets a flag. Once true, a flag stays true.
    pub fn set_flag(&mut self, key: &str, value: bool) {
        match self.values.get_mut(key) {
            Some(AnnotationValue::Flag(existing)) => *existing |= value,
            _ => {
                self.values
                    .insert(key.to_string(), AnnotationValue::Flag(value));
            }
        }
    }

    pub fn set_number(&mut self, key: &str, value: f64) {
        self.values
            .insert(key.to_string(), AnnotationValue::Number(value));
    }

    /// Appends to a list annotation, creating it when absent.
    pub fn extend_list<I>(&mut self, key: &str, items: I)
    where
        I: IntoIterator<Item = String>,
    {
        match self.values.get_mut(key) {
            Some(AnnotationValue::List(existing)) => existing.extend(items),
            _ => {
                self.values
                    .insert(key.to_string(), AnnotationValue::List(items.into_iter().collect()));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&AnnotationValue> {
        self.values.get(key)
    }

    pub fn flag(&self, key: &str) -> bool {
        matches!(self.values.get(key), Some(AnnotationValue::Flag(true)))
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        match self.values.get(key) {
            Some(AnnotationValue::Number(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn list(&self, key: &str) -> &[String] {
        match self.values.get(key) {
            Some(AnnotationValue::List(items)) => items,
            _ => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Node {
    pub key: NodeKey,
    pub annotations: Annotations,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct EdgeKey {
    pub source: NodeKey,
    pub target: NodeKey,
    pub protocol: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Edge {
    pub key: EdgeKey,
    pub weight: f64,
    pub annotations: Annotations,
}

impl Edge {
    pub fn source(&self) -> &NodeKey {
        &self.key.source
    }

    pub fn target(&self) -> &NodeKey {
        &self.key.target
    }

    pub fn protocol(&self) -> &str {
        &self.key.protocol
    }
}

/// Per-request traffic topology.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrafficGraph {
    nodes: BTreeMap<NodeKey, Node>,
    edges: BTreeMap<EdgeKey, Edge>,
}

impl TrafficGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from request telemetry, defaulting the protocol to `http`.
    pub fn from_vector(vector: &TelemetryVector) -> Self {
        let mut graph = Self::new();
        graph.accumulate(vector, "http");
        graph
    }

    /// Adds every sample of `vector` as traffic; samples without a destination service are
    /// skipped.
    pub fn accumulate(&mut self, vector: &TelemetryVector, default_protocol: &str) {
        for sample in vector {
            match edge_key(sample, default_protocol) {
                Some(key) => self.add_traffic(key.source, key.target, &key.protocol, sample.value),
                None => tracing::debug!(
                    labels = ?sample.labels,
                    "skipping sample without destination service"
                ),
            }
        }
    }

    pub fn add_node(&mut self, key: NodeKey) -> &mut Node {
        self.nodes.entry(key.clone()).or_insert_with(|| Node {
            key,
            annotations: Annotations::default(),
        })
    }

    /// Accumulates traffic on the (source, target, protocol) edge, creating nodes as needed.
    /// Non-finite values create the edge without adding weight.
    pub fn add_traffic(&mut self, source: NodeKey, target: NodeKey, protocol: &str, value: f64) {
        self.add_node(source.clone());
        self.add_node(target.clone());

        let key = EdgeKey {
            source,
            target,
            protocol: protocol.to_string(),
        };
        let edge = self.edges.entry(key.clone()).or_insert_with(|| Edge {
            key,
            weight: 0.0,
            annotations: Annotations::default(),
        });
        if value.is_finite() {
            edge.weight += value;
        }
    }

    pub fn node(&self, key: &NodeKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    pub fn node_mut(&mut self, key: &NodeKey) -> Option<&mut Node> {
        self.nodes.get_mut(key)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.values_mut()
    }

    pub fn edge(&self, key: &EdgeKey) -> Option<&Edge> {
        self.edges.get(key)
    }

    pub fn edge_mut(&mut self, key: &EdgeKey) -> Option<&mut Edge> {
        self.edges.get_mut(key)
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn edges_mut(&mut self) -> impl Iterator<Item = &mut Edge> {
        self.edges.values_mut()
    }

    /// Nodes that receive traffic, i.e. appear as an edge target.
    pub fn destination_keys(&self) -> Vec<NodeKey> {
        let mut keys: Vec<NodeKey> = self.edges.keys().map(|edge| edge.target.clone()).collect();
        keys.sort();
        keys.dedup();
        keys
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn to_json(&self) -> JsonValue {
        json!({
            "nodes": self.nodes.values().collect::<Vec<_>>(),
            "edges": self.edges.values().collect::<Vec<_>>(),
        })
    }
}

fn known(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.is_empty() && *value != UNKNOWN)
}

/// Edge a telemetry sample describes, or `None` when it lacks a destination service.
pub fn edge_key(sample: &Sample, default_protocol: &str) -> Option<EdgeKey> {
    let dest_namespace = known(sample.label(LABEL_DEST_SERVICE_NAMESPACE))?;
    let dest_service = known(sample.label(LABEL_DEST_SERVICE_NAME))?;

    let target = NodeKey::service(
        ServiceIdentity::new(dest_namespace, dest_service)
            .with_version(known(sample.label(LABEL_DEST_VERSION)).unwrap_or_default()),
    )
    .with_workload(sample.label(LABEL_DEST_WORKLOAD))
    .with_app(sample.label(LABEL_DEST_APP));

    let source_namespace = known(sample.label(LABEL_SOURCE_NAMESPACE)).unwrap_or(UNKNOWN);
    let source_workload = sample.label(LABEL_SOURCE_WORKLOAD);
    let source_app = sample.label(LABEL_SOURCE_APP);
    let source_name = known(source_app)
        .or_else(|| known(source_workload))
        .unwrap_or(UNKNOWN);

    let source = NodeKey::service(
        ServiceIdentity::new(source_namespace, source_name)
            .with_version(known(sample.label(LABEL_SOURCE_VERSION)).unwrap_or_default()),
    )
    .with_workload(source_workload)
    .with_app(source_app);

    let protocol = known(sample.label(LABEL_REQUEST_PROTOCOL))
        .unwrap_or(default_protocol)
        .to_lowercase();

    Some(EdgeKey {
        source,
        target,
        protocol,
    })
}
