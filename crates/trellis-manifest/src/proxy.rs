//! Reverse-proxy tier (nginx).

use trellis_state::{
    AppInstance, EndpointSpec, ExposeKind, OwnerRef, PortMapping, ResourceBody,
    ResourceDescriptor, ResourceKind, Volume, VolumeMount, WorkloadSpec,
};

use crate::labels::labels_for;
use crate::workload_name;

pub const PROXY_IMAGE: &str = "docker.io/nginx:1.13";
pub const PROXY_HTTP_PORT: u16 = 80;
pub const PROXY_HTTPS_PORT: u16 = 443;

pub fn proxy_workload_name(instance: &AppInstance) -> String {
    workload_name(instance, "proxy")
}

pub fn proxy_workload(instance: &AppInstance) -> ResourceDescriptor {
    let labels = labels_for(instance, "proxy");
    ResourceDescriptor {
        kind: ResourceKind::Workload,
        name: proxy_workload_name(instance),
        namespace: instance.namespace.clone(),
        labels,
        owner: Some(OwnerRef::to_instance(instance)),
        body: ResourceBody::Workload(WorkloadSpec {
            image: PROXY_IMAGE.to_string(),
            replicas: 1,
            args: vec![],
            ports: vec![PROXY_HTTP_PORT, PROXY_HTTPS_PORT],
            env: vec![],
            mounts: vec![
                VolumeMount::new("config", "/etc/nginx/conf.d"),
                VolumeMount::new("cache", "/var/cache/proxy"),
            ],
            volumes: vec![
                Volume::from_bundle("config", "proxy-config"),
                Volume::from_claim("cache", "proxy"),
            ],
        }),
    }
}

pub fn proxy_endpoint(instance: &AppInstance) -> ResourceDescriptor {
    let labels = labels_for(instance, "proxy");
    ResourceDescriptor {
        kind: ResourceKind::Endpoint,
        name: "proxy".to_string(),
        namespace: instance.namespace.clone(),
        labels: labels.clone(),
        owner: Some(OwnerRef::to_instance(instance)),
        body: ResourceBody::Endpoint(EndpointSpec {
            selector: labels,
            ports: vec![
                PortMapping::same(PROXY_HTTP_PORT),
                PortMapping::same(PROXY_HTTPS_PORT),
            ],
            expose: ExposeKind::NodePort,
        }),
    }
}
