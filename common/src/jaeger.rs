use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Topology used to deploy the tracing components
#[derive(Serialize, Deserialize, Eq, PartialEq, Clone, Copy, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub enum DeploymentStrategy {
    /// Every component in a single pod, in-memory storage by default
    #[default]
    #[serde(alias = "allinone")]
    AllInOne,
    /// Collector and query deployed separately against a persistent storage
    Production,
    /// Production with a kafka buffer between collector and ingester
    Streaming,
}

#[derive(Serialize, Deserialize, Eq, PartialEq, Clone, Copy, Debug, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    Memory,
    Elasticsearch,
    Cassandra,
    Kafka,
    Badger,
}
impl StorageType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageType::Memory => "memory",
            StorageType::Elasticsearch => "elasticsearch",
            StorageType::Cassandra => "cassandra",
            StorageType::Kafka => "kafka",
            StorageType::Badger => "badger",
        }
    }

    #[must_use]
    pub fn is_persistent(&self) -> bool {
        !matches!(self, StorageType::Memory)
    }
}

/// Options for the all-in-one image
#[derive(Serialize, Deserialize, Eq, PartialEq, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct AllInOneSpec {
    /// Container image, defaults to jaegertracing/all-in-one
    pub image: Option<String>,
    /// Command line flags passed as `--key=value`
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

/// Options for a standalone component (collector or query)
#[derive(Serialize, Deserialize, Eq, PartialEq, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    pub image: Option<String>,
    pub replicas: Option<i32>,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Eq, PartialEq, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    #[serde(default, rename = "type")]
    pub storage_type: StorageType,
    /// Storage flags passed to every component talking to the storage
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Eq, PartialEq, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct IngressSpec {
    /// Expose the query UI: defaults to true
    pub enabled: Option<bool>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Eq, PartialEq, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct SamplingSpec {
    /// Sampling strategies document, served to the clients as-is
    pub options: Option<serde_json::Value>,
}

/// Describe a Jaeger deployment
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[kube(
    kind = "Jaeger",
    shortname = "jaeger",
    group = "jaegertracing.io",
    version = "v1",
    namespaced
)]
#[kube(
    doc = "Custom resource representing a Jaeger tracing deployment",
    printcolumn = r#"
    {"name":"strategy", "type":"string", "description":"Deployment strategy", "jsonPath":".spec.strategy"},
    {"name":"storage",  "type":"string", "description":"Storage type", "jsonPath":".spec.storage.type"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct JaegerSpec {
    #[serde(default)]
    pub strategy: DeploymentStrategy,
    #[serde(default)]
    pub all_in_one: AllInOneSpec,
    #[serde(default)]
    pub collector: ComponentSpec,
    #[serde(default)]
    pub query: ComponentSpec,
    #[serde(default)]
    pub storage: StorageSpec,
    #[serde(default)]
    pub ingress: IngressSpec,
    #[serde(default)]
    pub sampling: SamplingSpec,
    /// Labels added to every generated object
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Annotations added to every generated object
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl Jaeger {
    /// Builds an instance with a default spec, as the kube watcher would deliver it
    #[must_use]
    pub fn named(namespace: &str, name: &str) -> Jaeger {
        let mut jaeger = Jaeger::new(name, JaegerSpec::default());
        if !namespace.is_empty() {
            jaeger.metadata.namespace = Some(namespace.to_string());
        }
        jaeger
    }
}
