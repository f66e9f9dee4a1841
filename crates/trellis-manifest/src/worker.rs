//! Background-worker tier.
//!
//! Runs the async task runner against the redis broker. No endpoint: the
//! worker pulls work, nothing connects to it.

use trellis_state::{
    AppInstance, OwnerRef, ResourceBody, ResourceDescriptor, ResourceKind, Volume,
    VolumeMount, WorkloadSpec,
};

use crate::labels::labels_for;
use crate::{PLATFORM_IMAGE, workload_name};

pub fn worker_workload_name(instance: &AppInstance) -> String {
    workload_name(instance, "worker")
}

pub fn worker_workload(instance: &AppInstance) -> ResourceDescriptor {
    let labels = labels_for(instance, "worker");
    ResourceDescriptor {
        kind: ResourceKind::Workload,
        name: worker_workload_name(instance),
        namespace: instance.namespace.clone(),
        labels,
        owner: Some(OwnerRef::to_instance(instance)),
        body: ResourceBody::Workload(WorkloadSpec {
            image: PLATFORM_IMAGE.to_string(),
            replicas: instance.size,
            args: vec![
                "./manage.py".to_string(),
                "worker".to_string(),
                "--loglevel=info".to_string(),
            ],
            ports: vec![],
            env: vec![],
            mounts: vec![
                VolumeMount::new("settings", "/openlearn/settings/worker"),
                VolumeMount::new("config", "/openlearn/config"),
            ],
            volumes: vec![
                Volume::from_bundle("settings", "worker-settings"),
                Volume::from_bundle("config", "app-config"),
            ],
        }),
    }
}
