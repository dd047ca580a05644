use crate::mesh::object::{ConfigKind, ConfigObject, ObjectParseError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Control-plane retrieval of routing config objects, addressed by kind and namespace.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn list(&self, kind: ConfigKind, namespace: &str)
        -> Result<Vec<ConfigObject>, SourceError>;

    async fn get(
        &self,
        kind: ConfigKind,
        namespace: &str,
        name: &str,
    ) -> Result<ConfigObject, SourceError>;
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("transport failure: {0}")]
    Transport(#[source] BoxError),
    #[error("unexpected response shape: {0}")]
    UnexpectedShape(String),
    #[error("{kind} `{namespace}/{name}` not found")]
    NotFound {
        kind: ConfigKind,
        namespace: String,
        name: String,
    },
}

impl SourceError {
    pub fn transport<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        SourceError::Transport(error.into())
    }
}

#[derive(Debug, Error)]
pub enum StaticSourceError {
    #[error("failed to read config objects: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config objects: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("document {index}: {source}")]
    Object {
        index: usize,
        #[source]
        source: ObjectParseError,
    },
}

/// In-memory source serving a fixed set of objects, e.g. loaded from a YAML stream of manifests.
#[derive(Clone, Debug, Default)]
pub struct StaticConfigSource {
    objects: Vec<ConfigObject>,
}

impl StaticConfigSource {
    pub fn new(objects: Vec<ConfigObject>) -> Self {
        Self { objects }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, StaticSourceError> {
        let mut contents = String::new();
        File::open(path)?.read_to_string(&mut contents)?;
        Self::from_yaml_str(&contents)
    }

    /// Parses a multi-document YAML stream; empty documents are skipped.
    pub fn from_yaml_str(contents: &str) -> Result<Self, StaticSourceError> {
        let mut objects = Vec::new();
        for (index, document) in serde_yaml::Deserializer::from_str(contents).enumerate() {
            let manifest = JsonValue::deserialize(document)?;
            if manifest.is_null() {
                continue;
            }
            let object = ConfigObject::from_manifest(&manifest)
                .map_err(|source| StaticSourceError::Object { index, source })?;
            objects.push(object);
        }
        Ok(Self { objects })
    }

    pub fn objects(&self) -> &[ConfigObject] {
        &self.objects
    }
}

#[async_trait]
impl ConfigSource for StaticConfigSource {
    async fn list(
        &self,
        kind: ConfigKind,
        namespace: &str,
    ) -> Result<Vec<ConfigObject>, SourceError> {
        Ok(self
            .objects
            .iter()
            .filter(|object| object.kind() == kind && object.namespace() == namespace)
            .cloned()
            .collect())
    }

    async fn get(
        &self,
        kind: ConfigKind,
        namespace: &str,
        name: &str,
    ) -> Result<ConfigObject, SourceError> {
        self.objects
            .iter()
            .find(|object| {
                object.kind() == kind && object.namespace() == namespace && object.name() == name
            })
            .cloned()
            .ok_or_else(|| SourceError::NotFound {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }
}
