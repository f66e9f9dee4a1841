//! Document store tier (MongoDB).

use trellis_state::{
    AppInstance, EndpointSpec, ExposeKind, OwnerRef, PortMapping, ResourceBody,
    ResourceDescriptor, ResourceKind, Volume, VolumeMount, WorkloadSpec,
};

use crate::labels::labels_for;
use crate::workload_name;

pub const MONGO_IMAGE: &str = "docker.io/mongo:3.6.18";
pub const MONGO_PORT: u16 = 27017;

pub fn mongo_workload_name(instance: &AppInstance) -> String {
    workload_name(instance, "mongo")
}

pub fn mongo_workload(instance: &AppInstance) -> ResourceDescriptor {
    let labels = labels_for(instance, "mongo");
    ResourceDescriptor {
        kind: ResourceKind::Workload,
        name: mongo_workload_name(instance),
        namespace: instance.namespace.clone(),
        labels,
        owner: Some(OwnerRef::to_instance(instance)),
        body: ResourceBody::Workload(WorkloadSpec {
            image: MONGO_IMAGE.to_string(),
            replicas: 1,
            args: vec!["mongod".to_string()],
            ports: vec![MONGO_PORT],
            env: vec![],
            mounts: vec![VolumeMount::new("data", "/data/db")],
            volumes: vec![Volume::from_claim("data", "mongo")],
        }),
    }
}

pub fn mongo_endpoint(instance: &AppInstance) -> ResourceDescriptor {
    let labels = labels_for(instance, "mongo");
    ResourceDescriptor {
        kind: ResourceKind::Endpoint,
        name: "mongo".to_string(),
        namespace: instance.namespace.clone(),
        labels: labels.clone(),
        owner: Some(OwnerRef::to_instance(instance)),
        body: ResourceBody::Endpoint(EndpointSpec {
            selector: labels,
            ports: vec![PortMapping::same(MONGO_PORT)],
            expose: ExposeKind::ClusterLocal,
        }),
    }
}
