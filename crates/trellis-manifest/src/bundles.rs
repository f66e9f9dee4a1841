//! Config bundle builders.
//!
//! Bundles are mounted read-only into workloads and tasks. Their contents
//! are rendered from the instance's site-name/title overrides, so two
//! instances in different namespaces get different bundles from the same
//! builders.

use std::collections::BTreeMap;

use trellis_state::{
    AppInstance, BundleSpec, OwnerRef, ResourceBody, ResourceDescriptor, ResourceKind,
};

use crate::labels::labels_for;
use crate::{site_name, studio_site_name, title};

fn bundle(
    instance: &AppInstance,
    tier: &str,
    name: &str,
    data: BTreeMap<String, String>,
) -> ResourceDescriptor {
    ResourceDescriptor {
        kind: ResourceKind::ConfigBundle,
        name: name.to_string(),
        namespace: instance.namespace.clone(),
        labels: labels_for(instance, tier),
        owner: Some(OwnerRef::to_instance(instance)),
        body: ResourceBody::Bundle(BundleSpec { data }),
    }
}

/// Platform-wide configuration shared by web, worker, and init tasks.
pub fn app_config(instance: &AppInstance) -> ResourceDescriptor {
    let data = BTreeMap::from([
        ("SITE_NAME".to_string(), site_name(instance)),
        ("STUDIO_SITE_NAME".to_string(), studio_site_name(instance)),
        ("PLATFORM_TITLE".to_string(), title(instance)),
        ("MYSQL_HOST".to_string(), "mysql".to_string()),
        ("MONGO_HOST".to_string(), "mongo".to_string()),
        ("REDIS_HOST".to_string(), "redis".to_string()),
    ]);
    bundle(instance, "config", "app-config", data)
}

/// Settings overlay for the web tier.
pub fn web_settings(instance: &AppInstance) -> ResourceDescriptor {
    let data = BTreeMap::from([(
        "settings.py".to_string(),
        format!(
            "SITE_NAME = \"{}\"\nSERVE_PORT = 8000\n",
            site_name(instance)
        ),
    )]);
    bundle(instance, "web", "web-settings", data)
}

/// Settings overlay for the background-worker tier.
pub fn worker_settings(instance: &AppInstance) -> ResourceDescriptor {
    let data = BTreeMap::from([(
        "settings.py".to_string(),
        "BROKER_URL = \"redis://redis:6379/0\"\n".to_string(),
    )]);
    bundle(instance, "worker", "worker-settings", data)
}

/// Init scripts for the relational store, run on first boot.
pub fn db_init(instance: &AppInstance) -> ResourceDescriptor {
    let data = BTreeMap::from([(
        "init.sql".to_string(),
        "CREATE DATABASE IF NOT EXISTS openlearn;\n".to_string(),
    )]);
    bundle(instance, "mysql", "db-init", data)
}

/// Cache/broker server configuration.
pub fn cache_config(instance: &AppInstance) -> ResourceDescriptor {
    let data = BTreeMap::from([(
        "redis.conf".to_string(),
        "maxmemory 256mb\nmaxmemory-policy allkeys-lru\n".to_string(),
    )]);
    bundle(instance, "redis", "cache-config", data)
}

/// Reverse-proxy virtual host configuration.
pub fn proxy_config(instance: &AppInstance) -> ResourceDescriptor {
    let data = BTreeMap::from([(
        "default.conf".to_string(),
        format!(
            "server {{\n  listen 80;\n  server_name {};\n  location / {{ proxy_pass http://web:8000; }}\n}}\n",
            site_name(instance)
        ),
    )]);
    bundle(instance, "proxy", "proxy-config", data)
}

/// All config bundles for an instance, in creation order.
pub fn all_bundles(instance: &AppInstance) -> Vec<ResourceDescriptor> {
    vec![
        app_config(instance),
        web_settings(instance),
        worker_settings(instance),
        db_init(instance),
        cache_config(instance),
        proxy_config(instance),
    ]
}
