//! Routing rules and fault policies applied through the cluster driver.
//!
//! A [`ConfigObject`] is a named, namespaced configuration document of a
//! given [`ConfigKind`]. Documents are authored as rendered YAML and carried
//! as structured JSON so the driver never deals with raw text.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::driver::validate_name;
use crate::error::ClusterDriverError;

/// API group/version the mesh control plane serves its config kinds under
pub const CONFIG_API_VERSION: &str = "config.istio.io/v1alpha2";

/// Kind of mesh configuration object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigKind {
    /// Route rule (weighted or header-based routing)
    RouteRule,
    /// Destination policy (fault injection, load balancing)
    DestinationPolicy,
}

impl ConfigKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RouteRule => "RouteRule",
            Self::DestinationPolicy => "DestinationPolicy",
        }
    }
}

impl fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigKind {
    type Err = ClusterDriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RouteRule" | "route-rule" => Ok(Self::RouteRule),
            "DestinationPolicy" | "destination-policy" => Ok(Self::DestinationPolicy),
            other => Err(ClusterDriverError::PolicyParse {
                name: other.to_owned(),
                reason: "unknown kind (expected RouteRule or DestinationPolicy)".to_owned(),
            }),
        }
    }
}

/// A named configuration object ready to be applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigObject {
    /// Object kind
    pub kind: ConfigKind,
    /// Object name
    pub name: String,
    /// Namespace the object lives in
    pub namespace: String,
    /// Structured body of the object
    pub spec: serde_json::Value,
}

impl ConfigObject {
    /// Builds an object from a structured spec.
    pub fn new(
        kind: ConfigKind,
        name: impl Into<String>,
        namespace: impl Into<String>,
        spec: serde_json::Value,
    ) -> Result<Self, ClusterDriverError> {
        let name = name.into();
        let namespace = namespace.into();
        validate_name("object name", &name)?;
        validate_name("namespace", &namespace)?;
        if !spec.is_object() {
            return Err(ClusterDriverError::PolicyParse {
                name,
                reason: "document must be a mapping".to_owned(),
            });
        }
        Ok(Self {
            kind,
            name,
            namespace,
            spec,
        })
    }

    /// Parses a rendered YAML document.
    ///
    /// The document is either the bare spec body or a full manifest
    /// (`apiVersion`/`kind`/`metadata`/`spec`), in which case only `spec`
    /// is kept.
    pub fn from_yaml(
        kind: ConfigKind,
        name: impl Into<String>,
        namespace: impl Into<String>,
        yaml: &str,
    ) -> Result<Self, ClusterDriverError> {
        let name = name.into();
        let document: serde_json::Value =
            serde_yaml::from_str(yaml).map_err(|e| ClusterDriverError::PolicyParse {
                name: name.clone(),
                reason: format!("cannot convert YAML to JSON: {e}"),
            })?;

        let spec = match document {
            serde_json::Value::Object(mut map)
                if map.contains_key("kind") && map.contains_key("spec") =>
            {
                map.remove("spec").unwrap_or(serde_json::Value::Null)
            }
            other => other,
        };

        Self::new(kind, name, namespace, spec)
    }

    /// Reads and parses a YAML document from disk.
    pub async fn load(
        kind: ConfigKind,
        name: impl Into<String>,
        namespace: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> Result<Self, ClusterDriverError> {
        let path = path.as_ref();
        let yaml = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ClusterDriverError::PolicyLoad {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        Self::from_yaml(kind, name, namespace, &yaml)
    }

    /// Full manifest as submitted to the control plane.
    pub fn manifest(&self) -> serde_json::Value {
        serde_json::json!({
            "apiVersion": CONFIG_API_VERSION,
            "kind": self.kind.as_str(),
            "metadata": {
                "name": self.name,
                "namespace": self.namespace,
            },
            "spec": self.spec,
        })
    }
}

impl fmt::Display for ConfigObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} in {}", self.kind, self.name, self.namespace)
    }
}
