use crate::domain::MatchSettings;
use crate::mesh::host::host_matches;
use crate::mesh::object::{ConfigKind, ConfigObject, ROUTE_PROTOCOLS};
use crate::mesh::route::find_destination_host;
use crate::mesh::source::{ConfigSource, SourceError};
use crate::metrics::metrics;
use std::sync::Arc;
use thiserror::Error;

/// Routing rules and traffic policies of one namespace, fetched together.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConfigSnapshot {
    pub virtual_services: Vec<ConfigObject>,
    pub destination_rules: Vec<ConfigObject>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to retrieve {kind} collection in namespace `{namespace}`: {source}")]
    Retrieval {
        kind: ConfigKind,
        namespace: String,
        #[source]
        source: SourceError,
    },
    #[error("{kind} retrieval for namespace `{namespace}` did not complete: {source}")]
    Join {
        kind: ConfigKind,
        namespace: String,
        #[source]
        source: tokio::task::JoinError,
    },
}

impl FetchError {
    /// The upstream collection whose retrieval failed.
    pub fn kind(&self) -> ConfigKind {
        match self {
            FetchError::Retrieval { kind, .. } | FetchError::Join { kind, .. } => *kind,
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            FetchError::Retrieval { namespace, .. } | FetchError::Join { namespace, .. } => {
                namespace
            }
        }
    }
}

/// Retrieves config collections through a [`ConfigSource`], applying per-service filters.
#[derive(Clone)]
pub struct ConfigSnapshotFetcher {
    source: Arc<dyn ConfigSource>,
    settings: MatchSettings,
}

impl ConfigSnapshotFetcher {
    pub fn new(source: Arc<dyn ConfigSource>, settings: MatchSettings) -> Self {
        Self { source, settings }
    }

    pub fn settings(&self) -> &MatchSettings {
        &self.settings
    }

    /// Lists virtual services and destination rules concurrently.
    ///
    /// Both retrievals always run to completion. If either fails, only that error is
    /// returned, virtual services taking precedence, and no partial snapshot escapes.
    pub async fn fetch_snapshot(
        &self,
        namespace: &str,
        service: &str,
    ) -> Result<ConfigSnapshot, FetchError> {
        let virtual_services = tokio::spawn({
            let fetcher = self.clone();
            let (namespace, service) = (namespace.to_string(), service.to_string());
            async move { fetcher.list_virtual_services(&namespace, &service).await }
        });
        let destination_rules = tokio::spawn({
            let fetcher = self.clone();
            let (namespace, service) = (namespace.to_string(), service.to_string());
            async move { fetcher.list_destination_rules(&namespace, &service).await }
        });

        let (virtual_services, destination_rules) = tokio::join!(virtual_services, destination_rules);

        let virtual_services = virtual_services.map_err(|source| FetchError::Join {
            kind: ConfigKind::VirtualService,
            namespace: namespace.to_string(),
            source,
        })??;
        let destination_rules = destination_rules.map_err(|source| FetchError::Join {
            kind: ConfigKind::DestinationRule,
            namespace: namespace.to_string(),
            source,
        })??;

        tracing::debug!(
            namespace,
            service,
            virtual_services = virtual_services.len(),
            destination_rules = destination_rules.len(),
            "fetched config snapshot"
        );

        Ok(ConfigSnapshot {
            virtual_services,
            destination_rules,
        })
    }

    /// Virtual services of the namespace; with a non-empty `service`, only those routing
    /// http or tcp traffic to it.
    pub async fn list_virtual_services(
        &self,
        namespace: &str,
        service: &str,
    ) -> Result<Vec<ConfigObject>, FetchError> {
        let objects = self.list(ConfigKind::VirtualService, namespace).await?;
        Ok(objects
            .into_iter()
            .filter(|object| {
                service.is_empty()
                    || object.as_virtual_service().is_some_and(|spec| {
                        find_destination_host(
                            spec,
                            &ROUTE_PROTOCOLS,
                            service,
                            namespace,
                            None,
                            &self.settings,
                        )
                    })
            })
            .collect())
    }

    /// Destination rules of the namespace; with a non-empty `service`, only those whose host
    /// names it.
    pub async fn list_destination_rules(
        &self,
        namespace: &str,
        service: &str,
    ) -> Result<Vec<ConfigObject>, FetchError> {
        let objects = self.list(ConfigKind::DestinationRule, namespace).await?;
        Ok(objects
            .into_iter()
            .filter(|object| {
                service.is_empty()
                    || object
                        .as_destination_rule()
                        .and_then(|spec| spec.host.as_deref())
                        .is_some_and(|host| {
                            host_matches(host, service, namespace, &self.settings.identity_domain)
                        })
            })
            .collect())
    }

    pub async fn list_gateways(&self, namespace: &str) -> Result<Vec<ConfigObject>, FetchError> {
        self.list(ConfigKind::Gateway, namespace).await
    }

    pub async fn list_service_entries(
        &self,
        namespace: &str,
    ) -> Result<Vec<ConfigObject>, FetchError> {
        self.list(ConfigKind::ServiceEntry, namespace).await
    }

    pub async fn list_quota_specs(&self, namespace: &str) -> Result<Vec<ConfigObject>, FetchError> {
        self.list(ConfigKind::QuotaSpec, namespace).await
    }

    pub async fn list_quota_spec_bindings(
        &self,
        namespace: &str,
    ) -> Result<Vec<ConfigObject>, FetchError> {
        self.list(ConfigKind::QuotaSpecBinding, namespace).await
    }

    pub async fn get(
        &self,
        kind: ConfigKind,
        namespace: &str,
        name: &str,
    ) -> Result<ConfigObject, FetchError> {
        let result = self.source.get(kind, namespace, name).await;
        metrics().record_config_fetch(kind.as_str(), result.is_ok());
        result.map_err(|source| FetchError::Retrieval {
            kind,
            namespace: namespace.to_string(),
            source,
        })
    }

    async fn list(
        &self,
        kind: ConfigKind,
        namespace: &str,
    ) -> Result<Vec<ConfigObject>, FetchError> {
        let result = self.source.list(kind, namespace).await;
        metrics().record_config_fetch(kind.as_str(), result.is_ok());
        result
            .inspect_err(|err| {
                tracing::warn!(kind = %kind, namespace, error = %err, "config retrieval failed");
            })
            .map_err(|source| FetchError::Retrieval {
                kind,
                namespace: namespace.to_string(),
                source,
            })
    }
}
