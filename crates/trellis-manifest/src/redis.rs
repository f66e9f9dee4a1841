//! Cache/broker tier (Redis).
//!
//! Serves both as the page cache and as the worker tier's task broker.

use trellis_state::{
    AppInstance, EndpointSpec, ExposeKind, OwnerRef, PortMapping, ResourceBody,
    ResourceDescriptor, ResourceKind, Volume, VolumeMount, WorkloadSpec,
};

use crate::labels::labels_for;
use crate::workload_name;

pub const REDIS_IMAGE: &str = "docker.io/redis:6.0.9";
pub const REDIS_PORT: u16 = 6379;

pub fn redis_workload_name(instance: &AppInstance) -> String {
    workload_name(instance, "redis")
}

pub fn redis_workload(instance: &AppInstance) -> ResourceDescriptor {
    let labels = labels_for(instance, "redis");
    ResourceDescriptor {
        kind: ResourceKind::Workload,
        name: redis_workload_name(instance),
        namespace: instance.namespace.clone(),
        labels,
        owner: Some(OwnerRef::to_instance(instance)),
        body: ResourceBody::Workload(WorkloadSpec {
            image: REDIS_IMAGE.to_string(),
            replicas: 1,
            args: vec![
                "redis-server".to_string(),
                "/etc/redis/redis.conf".to_string(),
            ],
            ports: vec![REDIS_PORT],
            env: vec![],
            mounts: vec![
                VolumeMount::new("config", "/etc/redis"),
                VolumeMount::new("data", "/var/lib/redis"),
            ],
            volumes: vec![
                Volume::from_bundle("config", "cache-config"),
                Volume::from_claim("data", "redis"),
            ],
        }),
    }
}

pub fn redis_endpoint(instance: &AppInstance) -> ResourceDescriptor {
    let labels = labels_for(instance, "redis");
    ResourceDescriptor {
        kind: ResourceKind::Endpoint,
        name: "redis".to_string(),
        namespace: instance.namespace.clone(),
        labels: labels.clone(),
        owner: Some(OwnerRef::to_instance(instance)),
        body: ResourceBody::Endpoint(EndpointSpec {
            selector: labels,
            ports: vec![PortMapping::same(REDIS_PORT)],
            expose: ExposeKind::ClusterLocal,
        }),
    }
}
