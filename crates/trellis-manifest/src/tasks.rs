//! One-shot initialization tasks.
//!
//! `migrate_task` applies the relational schema; it must run after the data
//! stores are up and before the serving tiers. `seed_task` loads the demo
//! content set and runs after the migration.

use trellis_state::{
    AppInstance, OwnerRef, ResourceBody, ResourceDescriptor, ResourceKind, TaskSpec, Volume,
    VolumeMount,
};

use crate::labels::labels_for;
use crate::{PLATFORM_IMAGE, workload_name};

pub fn migrate_task_name(instance: &AppInstance) -> String {
    workload_name(instance, "migrate")
}

pub fn seed_task_name(instance: &AppInstance) -> String {
    workload_name(instance, "seed")
}

fn init_task(instance: &AppInstance, tier: &str, name: String, args: &[&str]) -> ResourceDescriptor {
    ResourceDescriptor {
        kind: ResourceKind::Task,
        name,
        namespace: instance.namespace.clone(),
        labels: labels_for(instance, tier),
        owner: Some(OwnerRef::to_instance(instance)),
        body: ResourceBody::Task(TaskSpec {
            image: PLATFORM_IMAGE.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            env: vec![],
            mounts: vec![VolumeMount::new("config", "/openlearn/config")],
            volumes: vec![Volume::from_bundle("config", "app-config")],
        }),
    }
}

/// Schema migration against the relational store.
pub fn migrate_task(instance: &AppInstance) -> ResourceDescriptor {
    init_task(
        instance,
        "migrate",
        migrate_task_name(instance),
        &["./manage.py", "migrate"],
    )
}

/// Demo content load, run once after the schema exists.
pub fn seed_task(instance: &AppInstance) -> ResourceDescriptor {
    init_task(
        instance,
        "seed",
        seed_task_name(instance),
        &["./manage.py", "loaddata", "demo"],
    )
}
