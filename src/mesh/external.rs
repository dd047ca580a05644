use crate::mesh::object::ConfigObject;
use std::collections::HashSet;

/// Maps a service-entry port protocol onto the route protocol a routing object would use for it.
pub fn protocol_class(protocol: &str) -> &'static str {
    match protocol {
        "HTTP" | "HTTP2" | "GRPC" => "http",
        "HTTPS" | "TLS" => "tls",
        _ => "tcp",
    }
}

/// Protocol-qualified hostnames declared by external service registrations.
///
/// Keys are `protocol class + hostname`, e.g. `httpapi.example.com`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExternalHostIndex {
    keys: HashSet<String>,
}

impl ExternalHostIndex {
    pub fn build<'a, I>(service_entries: I) -> Self
    where
        I: IntoIterator<Item = &'a ConfigObject>,
    {
        let mut keys = HashSet::new();
        for entry in service_entries {
            let Some(spec) = entry.as_service_entry() else {
                continue;
            };
            let Some(hosts) = spec.hosts.as_ref() else {
                continue;
            };
            for protocol in spec.ports.iter().filter_map(|port| port.protocol.as_deref()) {
                let class = protocol_class(protocol);
                for host in hosts {
                    keys.insert(format!("{class}{host}"));
                }
            }
        }
        Self { keys }
    }

    /// Looks up `lowercase(protocol) + host`.
    pub fn contains(&self, protocol: &str, host: &str) -> bool {
        let key = format!("{}{host}", protocol.to_lowercase());
        self.keys.contains(&key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// True when the host is registered under any protocol class.
    pub fn contains_host(&self, host: &str) -> bool {
        ["http", "tls", "tcp"]
            .iter()
            .any(|class| self.contains(class, host))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
