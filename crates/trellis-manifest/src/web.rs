//! Web serving tier.
//!
//! The only tier whose replica count follows the instance's `size` field.

use trellis_state::{
    AppInstance, EndpointSpec, EnvVar, ExposeKind, OwnerRef, PortMapping, ResourceBody,
    ResourceDescriptor, ResourceKind, Volume, VolumeMount, WorkloadSpec,
};

use crate::labels::labels_for;
use crate::{PLATFORM_IMAGE, site_name, workload_name};

pub const WEB_PORT: u16 = 8000;

pub fn web_workload_name(instance: &AppInstance) -> String {
    workload_name(instance, "web")
}

pub fn web_workload(instance: &AppInstance) -> ResourceDescriptor {
    let labels = labels_for(instance, "web");
    ResourceDescriptor {
        kind: ResourceKind::Workload,
        name: web_workload_name(instance),
        namespace: instance.namespace.clone(),
        labels,
        owner: Some(OwnerRef::to_instance(instance)),
        body: ResourceBody::Workload(WorkloadSpec {
            image: PLATFORM_IMAGE.to_string(),
            replicas: instance.size,
            args: vec![
                "./manage.py".to_string(),
                "runserver".to_string(),
                format!("0.0.0.0:{WEB_PORT}"),
            ],
            ports: vec![WEB_PORT],
            env: vec![EnvVar::new("SITE_NAME", &site_name(instance))],
            mounts: vec![
                VolumeMount::new("settings", "/openlearn/settings/web"),
                VolumeMount::new("config", "/openlearn/config"),
            ],
            volumes: vec![
                Volume::from_bundle("settings", "web-settings"),
                Volume::from_bundle("config", "app-config"),
            ],
        }),
    }
}

pub fn web_endpoint(instance: &AppInstance) -> ResourceDescriptor {
    let labels = labels_for(instance, "web");
    ResourceDescriptor {
        kind: ResourceKind::Endpoint,
        name: "web".to_string(),
        namespace: instance.namespace.clone(),
        labels: labels.clone(),
        owner: Some(OwnerRef::to_instance(instance)),
        body: ResourceBody::Endpoint(EndpointSpec {
            selector: labels,
            ports: vec![PortMapping::same(WEB_PORT)],
            expose: ExposeKind::ClusterLocal,
        }),
    }
}
