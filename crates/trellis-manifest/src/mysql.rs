//! Relational store tier (MySQL).

use trellis_state::{
    AppInstance, EndpointSpec, EnvVar, ExposeKind, OwnerRef, PortMapping, ResourceBody,
    ResourceDescriptor, ResourceKind, Volume, VolumeMount, WorkloadSpec,
};

use crate::labels::labels_for;
use crate::workload_name;

pub const MYSQL_IMAGE: &str = "docker.io/mysql:5.7.32";
pub const MYSQL_PORT: u16 = 3306;

pub fn mysql_workload_name(instance: &AppInstance) -> String {
    workload_name(instance, "mysql")
}

pub fn mysql_endpoint_name() -> &'static str {
    "mysql"
}

/// The relational store runs as a singleton regardless of instance size.
pub fn mysql_workload(instance: &AppInstance) -> ResourceDescriptor {
    let labels = labels_for(instance, "mysql");
    ResourceDescriptor {
        kind: ResourceKind::Workload,
        name: mysql_workload_name(instance),
        namespace: instance.namespace.clone(),
        labels,
        owner: Some(OwnerRef::to_instance(instance)),
        body: ResourceBody::Workload(WorkloadSpec {
            image: MYSQL_IMAGE.to_string(),
            replicas: 1,
            args: vec![
                "mysqld".to_string(),
                "--character-set-server=utf8".to_string(),
                "--collation-server=utf8_general_ci".to_string(),
            ],
            ports: vec![MYSQL_PORT],
            env: vec![EnvVar::new("MYSQL_ROOT_PASSWORD", "changeme-dev")],
            mounts: vec![
                VolumeMount::new("data", "/var/lib/mysql"),
                VolumeMount::new("initdb", "/docker-entrypoint-initdb.d"),
            ],
            volumes: vec![
                Volume::from_claim("data", "mysql"),
                Volume::from_bundle("initdb", "db-init"),
            ],
        }),
    }
}

pub fn mysql_endpoint(instance: &AppInstance) -> ResourceDescriptor {
    let labels = labels_for(instance, "mysql");
    ResourceDescriptor {
        kind: ResourceKind::Endpoint,
        name: mysql_endpoint_name().to_string(),
        namespace: instance.namespace.clone(),
        labels: labels.clone(),
        owner: Some(OwnerRef::to_instance(instance)),
        body: ResourceBody::Endpoint(EndpointSpec {
            selector: labels,
            ports: vec![PortMapping::same(MYSQL_PORT)],
            expose: ExposeKind::ClusterLocal,
        }),
    }
}
