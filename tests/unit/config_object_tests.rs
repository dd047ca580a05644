#[path = "../support/mod.rs"]
mod support;

use meshgraph::config::MeshGraphConfig;
use meshgraph::graph::TelemetryFailurePolicy;
use meshgraph::mesh::document::DocumentExt;
use meshgraph::mesh::{
    ConfigKind, ConfigObject, ConfigSnapshotFetcher, ConfigSource, ConfigSpec, FetchError,
    SourceError, StaticConfigSource,
};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use support::fixtures::{
    destination_rule, reviews_destination_rule, reviews_virtual_service, settings, virtual_service,
};
use support::mocks::ScriptedSource;

const MANIFESTS: &str = r#"
kind: VirtualService
metadata:
  name: reviews
  namespace: bookinfo
  labels:
    app: reviews
spec:
  hosts: [reviews]
  http:
    - route:
        - destination: { host: reviews, subset: v1 }
---
kind: DestinationRule
metadata:
  name: reviews
  namespace: bookinfo
spec:
  host: reviews
  subsets:
    - name: v1
      labels: { version: v1 }
---
---
kind: QuotaSpec
metadata:
  name: request-count
  namespace: istio-system
spec:
  rules:
    - quotas:
        - charge: 1
          quota: requestcount
"#;

#[test]
fn kinds_parse_from_kind_and_resource_names() {
    assert_eq!("VirtualService".parse::<ConfigKind>().unwrap(), ConfigKind::VirtualService);
    assert_eq!(
        "destinationrules".parse::<ConfigKind>().unwrap(),
        ConfigKind::DestinationRule
    );
    assert!("Deployment".parse::<ConfigKind>().is_err());
    for kind in ConfigKind::ALL {
        assert_eq!(kind.as_str().parse::<ConfigKind>().unwrap(), kind);
    }
}

#[test]
fn manifests_round_trip_through_objects() {
    let manifest = json!({
        "kind": "Gateway",
        "metadata": { "name": "bookinfo-gateway", "namespace": "bookinfo", "labels": { "team": "web" } },
        "spec": {
            "selector": { "istio": "ingressgateway" },
            "servers": [{ "hosts": ["bookinfo.example.com"], "port": { "number": 80 } }]
        }
    });
    let object = ConfigObject::from_manifest(&manifest).expect("gateway manifest");

    assert_eq!(object.kind(), ConfigKind::Gateway);
    assert_eq!(object.name(), "bookinfo-gateway");
    assert_eq!(object.object_meta().labels.get("team").map(String::as_str), Some("web"));
    let spec = object.as_gateway().expect("gateway spec");
    assert_eq!(spec.server_hosts, vec!["bookinfo.example.com"]);
    assert_eq!(object.to_manifest(), manifest);
}

#[test]
fn manifests_without_identity_are_rejected() {
    assert!(ConfigObject::from_manifest(&json!({ "metadata": { "name": "x" } })).is_err());
    assert!(ConfigObject::from_manifest(&json!({ "kind": "Gateway" })).is_err());
    assert!(ConfigObject::from_manifest(&json!({ "kind": "Gateway", "metadata": {} })).is_err());
}

#[test]
fn typed_views_follow_the_kind() {
    let object = reviews_virtual_service();
    assert!(object.as_virtual_service().is_some());
    assert!(object.as_destination_rule().is_none());
    assert!(matches!(object.spec(), ConfigSpec::VirtualService(_)));

    let quota = ConfigObject::new(ConfigKind::QuotaSpec, "istio-system", "q", json!({ "rules": [] }));
    assert!(matches!(quota.spec(), ConfigSpec::QuotaSpec(doc) if doc.contains("rules")));
}

#[test]
fn document_navigation_treats_wrong_types_as_absent() {
    let document = json!({ "a": { "b": { "c": "leaf" } }, "list": [1, { "x": 1 }, "s"], "text": "t" });

    let inner = document.object_at("a").and_then(|a| a.object_at("b"));
    assert_eq!(inner.and_then(|b| b.str_at("c")), Some("leaf"));
    assert_eq!(document.object_at("a").and_then(|a| a.object_at("missing")), None);
    assert_eq!(document.object_at("text"), None);
    assert_eq!(document.field("text").and_then(|text| text.field("inner")), None);
    assert_eq!(document.objects_at("list").count(), 1);
    assert_eq!(document.seq_at("text").count(), 0);
    assert_eq!(document.str_at("a"), None);
    assert_eq!(json!("scalar").field("a"), None);
}

#[tokio::test]
async fn static_source_parses_yaml_streams() {
    let source = StaticConfigSource::from_yaml_str(MANIFESTS).expect("manifest stream");
    assert_eq!(source.objects().len(), 3);

    let rules = source
        .list(ConfigKind::DestinationRule, "bookinfo")
        .await
        .expect("list");
    assert_eq!(rules.len(), 1);
    assert!(source
        .list(ConfigKind::DestinationRule, "default")
        .await
        .expect("list")
        .is_empty());

    let quota = source
        .get(ConfigKind::QuotaSpec, "istio-system", "request-count")
        .await
        .expect("quota spec");
    assert_eq!(quota.kind(), ConfigKind::QuotaSpec);

    let missing = source
        .get(ConfigKind::Gateway, "bookinfo", "nope")
        .await
        .expect_err("missing gateway");
    assert!(matches!(missing, SourceError::NotFound { kind: ConfigKind::Gateway, .. }));
}

#[test]
fn static_source_reports_the_bad_document() {
    let err = StaticConfigSource::from_yaml_str("kind: Gateway\nmetadata: {name: a}\n---\nkind: Pod\nmetadata: {name: b}\n")
        .expect_err("unknown kind");
    assert!(err.to_string().starts_with("document 1:"), "{err}");
}

#[tokio::test]
async fn static_source_loads_from_a_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(MANIFESTS.as_bytes()).expect("write manifests");

    let source = StaticConfigSource::from_path(file.path()).expect("load manifests");
    assert_eq!(source.objects().len(), 3);
}

fn fetcher(source: &Arc<ScriptedSource>) -> ConfigSnapshotFetcher {
    let dyn_source: Arc<dyn ConfigSource> = source.clone();
    ConfigSnapshotFetcher::new(dyn_source, settings())
}

#[tokio::test(flavor = "multi_thread")]
async fn snapshot_failure_reports_only_the_routing_error() {
    let source = Arc::new(
        ScriptedSource::new(vec![reviews_virtual_service(), reviews_destination_rule()])
            .failing(ConfigKind::VirtualService, "virtual service listing unavailable")
            .delayed(ConfigKind::DestinationRule, Duration::from_millis(50)),
    );

    let err = fetcher(&source)
        .fetch_snapshot("bookinfo", "reviews")
        .await
        .expect_err("routing retrieval fails");

    assert_eq!(err.kind(), ConfigKind::VirtualService);
    assert_eq!(err.namespace(), "bookinfo");
    assert!(matches!(err, FetchError::Retrieval { .. }));
    assert!(err.to_string().contains("VirtualService"), "{err}");

    let mut completed = source.completed();
    completed.sort();
    assert_eq!(
        completed,
        vec![ConfigKind::VirtualService, ConfigKind::DestinationRule]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn snapshot_prefers_routing_error_when_both_fail() {
    let source = Arc::new(
        ScriptedSource::new(Vec::new())
            .failing(ConfigKind::VirtualService, "vs down")
            .failing(ConfigKind::DestinationRule, "dr down")
            .delayed(ConfigKind::VirtualService, Duration::from_millis(30)),
    );

    let err = fetcher(&source)
        .fetch_snapshot("bookinfo", "")
        .await
        .expect_err("both retrievals fail");
    assert_eq!(err.kind(), ConfigKind::VirtualService);
}

#[tokio::test(flavor = "multi_thread")]
async fn snapshot_reports_policy_error_when_routing_succeeds() {
    let source = Arc::new(
        ScriptedSource::new(vec![reviews_virtual_service()])
            .failing(ConfigKind::DestinationRule, "dr down"),
    );

    let err = fetcher(&source)
        .fetch_snapshot("bookinfo", "reviews")
        .await
        .expect_err("policy retrieval fails");
    assert_eq!(err.kind(), ConfigKind::DestinationRule);
}

#[tokio::test]
async fn snapshot_filters_by_service() {
    let source = Arc::new(ScriptedSource::new(vec![
        reviews_virtual_service(),
        reviews_destination_rule(),
        virtual_service(
            "bookinfo",
            "ratings",
            json!({ "tcp": [{ "route": [{ "destination": { "host": "ratings.bookinfo" } }] }] }),
        ),
        virtual_service(
            "bookinfo",
            "tls-only",
            json!({ "tls": [{ "route": [{ "destination": { "host": "reviews" } }] }] }),
        ),
        destination_rule("bookinfo", "ratings", json!({ "host": "ratings" })),
        reviews_virtual_service_in("default"),
    ]));
    let fetcher = fetcher(&source);

    let snapshot = fetcher
        .fetch_snapshot("bookinfo", "reviews")
        .await
        .expect("snapshot");
    let names: Vec<_> = snapshot.virtual_services.iter().map(|o| o.name()).collect();
    assert_eq!(names, vec!["reviews"]);
    assert_eq!(snapshot.destination_rules.len(), 1);

    let ratings = fetcher
        .fetch_snapshot("bookinfo", "ratings")
        .await
        .expect("snapshot");
    assert_eq!(ratings.virtual_services.len(), 1);
    assert_eq!(ratings.virtual_services[0].name(), "ratings");

    let everything = fetcher.fetch_snapshot("bookinfo", "").await.expect("snapshot");
    assert_eq!(everything.virtual_services.len(), 3);
    assert_eq!(everything.destination_rules.len(), 2);
}

fn reviews_virtual_service_in(namespace: &str) -> ConfigObject {
    virtual_service(
        namespace,
        "reviews",
        json!({ "http": [{ "route": [{ "destination": { "host": "reviews" } }] }] }),
    )
}

#[tokio::test]
async fn fetcher_lists_and_gets_every_kind() {
    let source = Arc::new(
        ScriptedSource::new(vec![support::fixtures::gateway("bookinfo", "bookinfo-gateway")])
            .failing(ConfigKind::ServiceEntry, "entries down"),
    );
    let fetcher = fetcher(&source);

    assert_eq!(fetcher.list_gateways("bookinfo").await.expect("gateways").len(), 1);
    assert!(fetcher.list_quota_specs("bookinfo").await.expect("quotas").is_empty());
    assert!(fetcher
        .list_quota_spec_bindings("bookinfo")
        .await
        .expect("bindings")
        .is_empty());

    let err = fetcher
        .list_service_entries("bookinfo")
        .await
        .expect_err("entries fail");
    assert_eq!(err.kind(), ConfigKind::ServiceEntry);

    let gateway = fetcher
        .get(ConfigKind::Gateway, "bookinfo", "bookinfo-gateway")
        .await
        .expect("gateway");
    assert_eq!(gateway.name(), "bookinfo-gateway");
    assert!(fetcher
        .get(ConfigKind::VirtualService, "bookinfo", "absent")
        .await
        .is_err());
}

#[test]
fn config_defaults_apply_without_a_file() {
    let config = MeshGraphConfig::load_from("does/not/exist").expect("defaults");
    assert_eq!(config.prometheus.url, "http://localhost:9090");
    assert_eq!(config.prometheus.timeout, Duration::from_secs(30));
    assert_eq!(config.graph.duration, Duration::from_secs(600));
    assert_eq!(config.graph.telemetry_failure_policy, TelemetryFailurePolicy::AbortPipeline);
    assert!(config.graph.appenders.is_none());
    assert_eq!(config.mesh.match_settings(), settings());
}

#[test]
fn config_file_overrides_defaults() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("meshgraph.yaml");
    std::fs::write(
        &path,
        r#"
prometheus:
  url: http://prometheus.istio-system:9090
  timeout: 5s
mesh:
  identity_domain: corp.internal
  version_label: track
graph:
  telemetry_failure_policy: skip_appender
  duration: 1m
  appenders: [routing, circuit_breaker]
source:
  path: /etc/meshgraph/objects.yaml
"#,
    )
    .expect("write config");

    let config = MeshGraphConfig::load_from(path.to_str().expect("utf-8 path")).expect("config");
    assert_eq!(config.prometheus.url, "http://prometheus.istio-system:9090");
    assert_eq!(config.prometheus.timeout, Duration::from_secs(5));
    assert_eq!(config.mesh.match_settings().version_label, "track");
    assert_eq!(config.mesh.match_settings().identity_domain, "corp.internal");
    assert_eq!(config.graph.telemetry_failure_policy, TelemetryFailurePolicy::SkipAppender);
    assert_eq!(config.graph.duration, Duration::from_secs(60));
    assert_eq!(
        config.graph.appenders,
        Some(vec!["routing".to_string(), "circuit_breaker".to_string()])
    );
    assert_eq!(config.source.path.as_deref(), Some("/etc/meshgraph/objects.yaml"));
}
