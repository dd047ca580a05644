#[path = "../support/mod.rs"]
mod support;

use meshgraph::mesh::{
    all_gateways_known, gateway_names, protocol_class, unknown_gateways, ExternalHostIndex,
};
use serde_json::json;
use std::collections::HashSet;
use support::fixtures::{gateway, service_entry, virtual_service};

fn known(names: &[&str]) -> HashSet<String> {
    names.iter().map(|name| name.to_string()).collect()
}

#[test]
fn absent_gateway_list_is_valid() {
    let object = virtual_service("bookinfo", "reviews", json!({ "hosts": ["reviews"] }));
    let spec = object.as_virtual_service().expect("virtual service");
    assert!(all_gateways_known(spec, &known(&[])));
    assert!(unknown_gateways(spec, &known(&[])).is_empty());
}

#[test]
fn mesh_gateway_is_always_known() {
    let object = virtual_service("bookinfo", "reviews", json!({ "gateways": ["mesh"] }));
    let spec = object.as_virtual_service().expect("virtual service");
    assert!(all_gateways_known(spec, &known(&[])));
}

#[test]
fn unknown_references_are_reported() {
    let object = virtual_service(
        "bookinfo",
        "reviews",
        json!({ "gateways": ["mesh", "bookinfo-gateway", "missing-gateway"] }),
    );
    let spec = object.as_virtual_service().expect("virtual service");
    let names = gateway_names(&[gateway("bookinfo", "bookinfo-gateway")]);

    assert_eq!(names, known(&["bookinfo-gateway"]));
    assert!(!all_gateways_known(spec, &names));
    assert_eq!(unknown_gateways(spec, &names), vec!["missing-gateway"]);
    assert!(all_gateways_known(
        spec,
        &known(&["bookinfo-gateway", "missing-gateway"])
    ));
}

#[test]
fn protocol_classes() {
    assert_eq!(protocol_class("HTTP"), "http");
    assert_eq!(protocol_class("HTTP2"), "http");
    assert_eq!(protocol_class("GRPC"), "http");
    assert_eq!(protocol_class("HTTPS"), "tls");
    assert_eq!(protocol_class("TLS"), "tls");
    assert_eq!(protocol_class("MONGO"), "tcp");
    assert_eq!(protocol_class("TCP"), "tcp");
    assert_eq!(protocol_class("grpc"), "tcp");
}

#[test]
fn index_keys_hosts_by_protocol_class() {
    let entries = [
        service_entry(
            "bookinfo",
            "grpc-api",
            json!({ "hosts": ["grpc.example.com"], "ports": { "number": 443, "protocol": "GRPC" } }),
        ),
        service_entry(
            "bookinfo",
            "secure",
            json!({ "hosts": ["secure.example.com"], "ports": [{ "number": 443, "protocol": "TLS" }] }),
        ),
        service_entry(
            "bookinfo",
            "db",
            json!({ "hosts": ["db.example.com"], "ports": [{ "number": 27017, "protocol": "MONGO" }] }),
        ),
    ];
    let index = ExternalHostIndex::build(&entries);

    assert_eq!(index.len(), 3);
    assert!(index.contains_key("httpgrpc.example.com"));
    assert!(index.contains_key("tlssecure.example.com"));
    assert!(index.contains_key("tcpdb.example.com"));
    assert!(index.contains("HTTP", "grpc.example.com"));
    assert!(!index.contains("tcp", "grpc.example.com"));
    assert!(index.contains_host("db.example.com"));
    assert!(!index.contains_host("unknown.example.com"));
}

#[test]
fn index_covers_every_declared_port() {
    let entry = service_entry(
        "bookinfo",
        "multi",
        json!({
            "hosts": ["a.example.com", "b.example.com"],
            "ports": [
                { "number": 80, "protocol": "HTTP" },
                { "number": 443, "protocol": "HTTPS" },
                { "number": 8080, "protocol": "HTTP2" }
            ]
        }),
    );
    let index = ExternalHostIndex::build([&entry]);

    let mut keys: Vec<_> = index.keys().collect();
    keys.sort_unstable();
    assert_eq!(
        keys,
        vec![
            "httpa.example.com",
            "httpb.example.com",
            "tlsa.example.com",
            "tlsb.example.com"
        ]
    );
}

#[test]
fn entries_without_hosts_or_protocols_are_skipped() {
    let entries = [
        service_entry("bookinfo", "no-hosts", json!({ "ports": [{ "protocol": "HTTP" }] })),
        service_entry("bookinfo", "no-ports", json!({ "hosts": ["x.example.com"] })),
        service_entry(
            "bookinfo",
            "no-protocol",
            json!({ "hosts": ["y.example.com"], "ports": [{ "number": 80 }] }),
        ),
        gateway("bookinfo", "not-an-entry"),
    ];
    assert!(ExternalHostIndex::build(&entries).is_empty());
}
