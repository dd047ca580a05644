#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default DNS suffix of the cluster-internal service domain.
pub const DEFAULT_IDENTITY_DOMAIN: &str = "svc.cluster.local";
/// Default label key used to tag workload versions.
pub const DEFAULT_VERSION_LABEL: &str = "version";

/// The unit host and route matching resolves against.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServiceIdentity {
    pub namespace: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ServiceIdentity {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            version: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        let version = version.into();
        self.version = if version.is_empty() {
            None
        } else {
            Some(version)
        };
        self
    }

    /// Version label value, empty when the workload is unversioned.
    pub fn version_str(&self) -> &str {
        self.version.as_deref().unwrap_or("")
    }
}

impl fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}/{}@{}", self.namespace, self.name, version),
            None => write!(f, "{}/{}", self.namespace, self.name),
        }
    }
}

/// Mesh conventions every resolver needs, passed explicitly with each call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSettings {
    pub identity_domain: String,
    pub version_label: String,
}

impl MatchSettings {
    pub fn new(identity_domain: impl Into<String>, version_label: impl Into<String>) -> Self {
        Self {
            identity_domain: identity_domain.into(),
            version_label: version_label.into(),
        }
    }
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self::new(DEFAULT_IDENTITY_DOMAIN, DEFAULT_VERSION_LABEL)
    }
}
