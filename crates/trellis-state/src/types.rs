//! Domain types for the trellis substrate store.
//!
//! These types represent the desired-state instance, the in-memory resource
//! descriptors built per reconcile pass, and the observed status records
//! that readiness probes read back. All types are serializable to/from JSON
//! for storage in redb tables.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Unique identifier for an app instance (namespace-scoped).
pub type InstanceUid = String;

// ── App instance ───────────────────────────────────────────────────

/// Desired state for one deployment of the multi-tier application.
///
/// Created by an external operator action (`trellisd apply`); the
/// reconciler reads it at the start of every pass and never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppInstance {
    pub name: String,
    pub namespace: String,
    /// Replica count for the serving tiers.
    pub size: i32,
    /// Site hostname override for the web tier.
    #[serde(default)]
    pub site_name: Option<String>,
    /// Site hostname override for the authoring tier.
    #[serde(default)]
    pub studio_site_name: Option<String>,
    /// Display title override.
    #[serde(default)]
    pub title: Option<String>,
}

impl AppInstance {
    pub fn new(namespace: &str, name: &str, size: i32) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            size,
            site_name: None,
            studio_site_name: None,
            title: None,
        }
    }

    /// Composite table key: `{namespace}/{name}`.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Stable identity used for owner back-references.
    pub fn uid(&self) -> InstanceUid {
        self.table_key()
    }
}

// ── Resource identity ──────────────────────────────────────────────

/// Kind of a managed resource on the substrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Persistent storage claim (backing volume for a data store).
    StorageClaim,
    /// Bundle of configuration files/settings mounted into workloads.
    ConfigBundle,
    /// Stable network endpoint in front of a workload.
    Endpoint,
    /// Long-running replicated workload.
    Workload,
    /// One-shot task, run to completion.
    Task,
    /// Ingress route mapping external hosts to an endpoint.
    Route,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StorageClaim => "storage_claim",
            Self::ConfigBundle => "config_bundle",
            Self::Endpoint => "endpoint",
            Self::Workload => "workload",
            Self::Task => "task",
            Self::Route => "route",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owner back-reference recorded on every managed resource.
///
/// A value-type identity, not a live reference: used for cascade delete
/// and nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRef {
    pub instance_uid: InstanceUid,
}

impl OwnerRef {
    pub fn to_instance(instance: &AppInstance) -> Self {
        Self {
            instance_uid: instance.uid(),
        }
    }
}

// ── Resource descriptor ────────────────────────────────────────────

/// In-memory description of one managed resource.
///
/// Built fresh on every reconcile pass by the manifest builders; becomes a
/// persisted managed resource once the ensure primitive creates it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceDescriptor {
    pub kind: ResourceKind,
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub owner: Option<OwnerRef>,
    pub body: ResourceBody,
}

impl ResourceDescriptor {
    /// Composite table key: `{kind}/{namespace}/{name}`.
    pub fn table_key(&self) -> String {
        resource_key(self.kind, &self.namespace, &self.name)
    }
}

/// Build the table key for a (kind, namespace, name) identity.
pub fn resource_key(kind: ResourceKind, namespace: &str, name: &str) -> String {
    format!("{kind}/{namespace}/{name}")
}

/// Kind-specific body of a resource descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceBody {
    Claim(ClaimSpec),
    Bundle(BundleSpec),
    Endpoint(EndpointSpec),
    Workload(WorkloadSpec),
    Task(TaskSpec),
    Route(RouteSpec),
}

/// Storage claim parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClaimSpec {
    /// Requested capacity, e.g. "5Gi".
    pub capacity: String,
}

/// Config bundle contents: filename → file body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BundleSpec {
    pub data: BTreeMap<String, String>,
}

/// Network endpoint parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointSpec {
    /// Label selector for backing workload pods.
    pub selector: BTreeMap<String, String>,
    pub ports: Vec<PortMapping>,
    pub expose: ExposeKind,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PortMapping {
    pub port: u16,
    pub target_port: u16,
}

impl PortMapping {
    pub fn same(port: u16) -> Self {
        Self {
            port,
            target_port: port,
        }
    }
}

/// How an endpoint is exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExposeKind {
    ClusterLocal,
    NodePort,
}

/// Long-running workload parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkloadSpec {
    pub image: String,
    pub replicas: i32,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub ports: Vec<u16>,
    #[serde(default)]
    pub env: Vec<EnvVar>,
    #[serde(default)]
    pub mounts: Vec<VolumeMount>,
    #[serde(default)]
    pub volumes: Vec<Volume>,
}

/// One-shot task parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskSpec {
    pub image: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<EnvVar>,
    #[serde(default)]
    pub mounts: Vec<VolumeMount>,
    #[serde(default)]
    pub volumes: Vec<Volume>,
}

/// Ingress route parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteSpec {
    pub rules: Vec<RouteRule>,
}

/// One host → endpoint rule of a route.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteRule {
    pub host: String,
    pub endpoint: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

impl EnvVar {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VolumeMount {
    /// Volume name, matching an entry in `WorkloadSpec::volumes`.
    pub name: String,
    pub path: String,
}

impl VolumeMount {
    pub fn new(name: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
        }
    }
}

/// A named volume backed by a claim or a config bundle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Volume {
    pub name: String,
    pub origin: VolumeOrigin,
}

impl Volume {
    pub fn from_claim(name: &str, claim: &str) -> Self {
        Self {
            name: name.to_string(),
            origin: VolumeOrigin::Claim {
                claim: claim.to_string(),
            },
        }
    }

    pub fn from_bundle(name: &str, bundle: &str) -> Self {
        Self {
            name: name.to_string(),
            origin: VolumeOrigin::Bundle {
                bundle: bundle.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VolumeOrigin {
    Claim { claim: String },
    Bundle { bundle: String },
}

// ── Observed status ────────────────────────────────────────────────

/// Observed status of a long-running workload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct WorkloadStatus {
    pub ready_replicas: i32,
}

/// Observed status of a one-shot task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct TaskStatus {
    pub succeeded: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_table_key() {
        let inst = AppInstance::new("openlearn", "edu1", 1);
        assert_eq!(inst.table_key(), "openlearn/edu1");
        assert_eq!(inst.uid(), "openlearn/edu1");
    }

    #[test]
    fn resource_key_includes_kind() {
        assert_eq!(
            resource_key(ResourceKind::Workload, "openlearn", "edu1-mysql"),
            "workload/openlearn/edu1-mysql"
        );
        assert_eq!(
            resource_key(ResourceKind::Endpoint, "openlearn", "mysql"),
            "endpoint/openlearn/mysql"
        );
    }

    #[test]
    fn instance_json_round_trip() {
        let mut inst = AppInstance::new("openlearn", "edu1", 1);
        inst.site_name = Some("learn.example.org".to_string());

        let json = serde_json::to_string(&inst).unwrap();
        let back: AppInstance = serde_json::from_str(&json).unwrap();
        assert_eq!(back, inst);
    }

    #[test]
    fn optional_overrides_default_to_none() {
        let json = r#"{"name":"edu1","namespace":"openlearn","size":1}"#;
        let inst: AppInstance = serde_json::from_str(json).unwrap();
        assert_eq!(inst.site_name, None);
        assert_eq!(inst.studio_site_name, None);
        assert_eq!(inst.title, None);
    }

    #[test]
    fn descriptor_key_matches_free_function() {
        let desc = ResourceDescriptor {
            kind: ResourceKind::StorageClaim,
            name: "mysql".to_string(),
            namespace: "openlearn".to_string(),
            labels: BTreeMap::new(),
            owner: None,
            body: ResourceBody::Claim(ClaimSpec {
                capacity: "5Gi".to_string(),
            }),
        };
        assert_eq!(desc.table_key(), "storage_claim/openlearn/mysql");
    }
}
