//! Redb-backed substrate persistence for trellis.
//!
//! Holds the app instances (desired state), the managed resources created
//! on their behalf, and the observed status records that readiness probes
//! read. All values are JSON-serialized into redb's `&[u8]` value columns.
//! The store supports both on-disk and in-memory backends (the latter for
//! testing).
//!
//! Creation is strictly create-only: `create_resource` refuses to overwrite
//! an existing (kind, namespace, name) identity, which is what makes the
//! ensure primitive's at-most-one invariant hold at the storage layer.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe substrate store backed by redb.
#[derive(Clone)]
pub struct SubstrateStore {
    db: Arc<Database>,
}

impl SubstrateStore {
    /// Open (or create) a persistent substrate store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "substrate store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory substrate store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory substrate store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        txn.open_table(RESOURCES).map_err(map_err!(Table))?;
        txn.open_table(WORKLOAD_STATUS).map_err(map_err!(Table))?;
        txn.open_table(TASK_STATUS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── App instances ──────────────────────────────────────────────

    /// Insert or update an app instance.
    pub fn put_instance(&self, instance: &AppInstance) -> StateResult<()> {
        let key = instance.table_key();
        let value = serde_json::to_vec(instance).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "instance stored");
        Ok(())
    }

    /// Get an app instance by namespace/name key.
    pub fn get_instance(&self, key: &str) -> StateResult<Option<AppInstance>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let instance: AppInstance =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(instance))
            }
            None => Ok(None),
        }
    }

    /// List all app instances.
    pub fn list_instances(&self) -> StateResult<Vec<AppInstance>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let instance: AppInstance =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(instance);
        }
        Ok(results)
    }

    /// Delete an app instance and cascade-delete everything it owns.
    ///
    /// Returns true if the instance existed.
    pub fn delete_instance(&self, key: &str) -> StateResult<bool> {
        let existed;
        {
            let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
            {
                let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
                existed = table.remove(key).map_err(map_err!(Write))?.is_some();
            }
            txn.commit().map_err(map_err!(Transaction))?;
        }
        // The owner back-reference is keyed on the instance uid, which is
        // the same string as its table key.
        let removed = self.delete_owned(key)?;
        debug!(%key, existed, owned_removed = removed, "instance deleted");
        Ok(existed)
    }

    // ── Managed resources ──────────────────────────────────────────

    /// Create a managed resource from a descriptor.
    ///
    /// Fails with [`StateError::AlreadyExists`] if a resource with the same
    /// (kind, namespace, name) identity is already present. Never updates.
    pub fn create_resource(&self, desc: &ResourceDescriptor) -> StateResult<()> {
        let key = desc.table_key();
        let value = serde_json::to_vec(desc).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(RESOURCES).map_err(map_err!(Table))?;
            if table.get(key.as_str()).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::AlreadyExists(key));
            }
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "resource created");
        Ok(())
    }

    /// Get a managed resource by identity.
    pub fn get_resource(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> StateResult<Option<ResourceDescriptor>> {
        let key = resource_key(kind, namespace, name);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RESOURCES).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let desc: ResourceDescriptor =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(desc))
            }
            None => Ok(None),
        }
    }

    /// List all managed resources.
    pub fn list_resources(&self) -> StateResult<Vec<ResourceDescriptor>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RESOURCES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let desc: ResourceDescriptor =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(desc);
        }
        Ok(results)
    }

    /// List all resources owned by the given instance uid.
    pub fn list_owned(&self, instance_uid: &str) -> StateResult<Vec<ResourceDescriptor>> {
        Ok(self
            .list_resources()?
            .into_iter()
            .filter(|desc| {
                desc.owner
                    .as_ref()
                    .is_some_and(|o| o.instance_uid == instance_uid)
            })
            .collect())
    }

    /// Delete all resources owned by an instance, plus their status
    /// records. Returns the number of resources removed.
    pub fn delete_owned(&self, instance_uid: &str) -> StateResult<u32> {
        let owned = self.list_owned(instance_uid)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut resources = txn.open_table(RESOURCES).map_err(map_err!(Table))?;
            let mut workload_status =
                txn.open_table(WORKLOAD_STATUS).map_err(map_err!(Table))?;
            let mut task_status = txn.open_table(TASK_STATUS).map_err(map_err!(Table))?;
            for desc in &owned {
                resources
                    .remove(desc.table_key().as_str())
                    .map_err(map_err!(Write))?;
                let status_key = format!("{}/{}", desc.namespace, desc.name);
                match desc.kind {
                    ResourceKind::Workload => {
                        workload_status
                            .remove(status_key.as_str())
                            .map_err(map_err!(Write))?;
                    }
                    ResourceKind::Task => {
                        task_status
                            .remove(status_key.as_str())
                            .map_err(map_err!(Write))?;
                    }
                    _ => {}
                }
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(owned.len() as u32)
    }

    // ── Observed status ────────────────────────────────────────────

    /// Record the observed status of a workload (written by the substrate's
    /// node agents; the reconciler only reads).
    pub fn set_workload_status(
        &self,
        namespace: &str,
        name: &str,
        status: &WorkloadStatus,
    ) -> StateResult<()> {
        self.put_status(WORKLOAD_STATUS, namespace, name, status)
    }

    /// Read the observed status of a workload.
    pub fn workload_status(
        &self,
        namespace: &str,
        name: &str,
    ) -> StateResult<Option<WorkloadStatus>> {
        self.get_status(WORKLOAD_STATUS, namespace, name)
    }

    /// Record the observed status of a one-shot task.
    pub fn set_task_status(
        &self,
        namespace: &str,
        name: &str,
        status: &TaskStatus,
    ) -> StateResult<()> {
        self.put_status(TASK_STATUS, namespace, name, status)
    }

    /// Read the observed status of a one-shot task.
    pub fn task_status(&self, namespace: &str, name: &str) -> StateResult<Option<TaskStatus>> {
        self.get_status(TASK_STATUS, namespace, name)
    }

    fn put_status<T: serde::Serialize>(
        &self,
        table_def: redb::TableDefinition<'static, &'static str, &'static [u8]>,
        namespace: &str,
        name: &str,
        status: &T,
    ) -> StateResult<()> {
        let key = format!("{namespace}/{name}");
        let value = serde_json::to_vec(status).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table_def).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_status<T: serde::de::DeserializeOwned>(
        &self,
        table_def: redb::TableDefinition<'static, &'static str, &'static [u8]>,
        namespace: &str,
        name: &str,
    ) -> StateResult<Option<T>> {
        let key = format!("{namespace}/{name}");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table_def).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let status: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(status))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn claim(namespace: &str, name: &str, owner: &AppInstance) -> ResourceDescriptor {
        ResourceDescriptor {
            kind: ResourceKind::StorageClaim,
            name: name.to_string(),
            namespace: namespace.to_string(),
            labels: BTreeMap::new(),
            owner: Some(OwnerRef::to_instance(owner)),
            body: ResourceBody::Claim(ClaimSpec {
                capacity: "1Gi".to_string(),
            }),
        }
    }

    #[test]
    fn instance_round_trip() {
        let store = SubstrateStore::open_in_memory().unwrap();
        let instance = AppInstance::new("openlearn", "edu1", 1);
        store.put_instance(&instance).unwrap();

        let loaded = store.get_instance("openlearn/edu1").unwrap().unwrap();
        assert_eq!(loaded, instance);
        assert!(store.get_instance("openlearn/other").unwrap().is_none());
    }

    #[test]
    fn create_resource_is_create_only() {
        let store = SubstrateStore::open_in_memory().unwrap();
        let instance = AppInstance::new("openlearn", "edu1", 1);
        let desc = claim("openlearn", "mysql", &instance);

        store.create_resource(&desc).unwrap();
        let err = store.create_resource(&desc).unwrap_err();
        assert!(matches!(err, StateError::AlreadyExists(_)));

        // Exactly one copy persisted.
        assert_eq!(store.list_resources().unwrap().len(), 1);
    }

    #[test]
    fn same_name_different_kind_do_not_collide() {
        let store = SubstrateStore::open_in_memory().unwrap();
        let instance = AppInstance::new("openlearn", "edu1", 1);

        let mut endpoint = claim("openlearn", "mysql", &instance);
        endpoint.kind = ResourceKind::Endpoint;
        endpoint.body = ResourceBody::Endpoint(EndpointSpec {
            selector: BTreeMap::new(),
            ports: vec![PortMapping::same(3306)],
            expose: ExposeKind::ClusterLocal,
        });

        store.create_resource(&claim("openlearn", "mysql", &instance)).unwrap();
        store.create_resource(&endpoint).unwrap();
        assert_eq!(store.list_resources().unwrap().len(), 2);
    }

    #[test]
    fn delete_instance_cascades_to_owned_resources() {
        let store = SubstrateStore::open_in_memory().unwrap();
        let edu1 = AppInstance::new("openlearn", "edu1", 1);
        let edu2 = AppInstance::new("openlearn", "edu2", 1);
        store.put_instance(&edu1).unwrap();
        store.put_instance(&edu2).unwrap();

        store.create_resource(&claim("openlearn", "edu1-mysql", &edu1)).unwrap();
        store.create_resource(&claim("openlearn", "edu1-redis", &edu1)).unwrap();
        store.create_resource(&claim("openlearn", "edu2-mysql", &edu2)).unwrap();

        assert!(store.delete_instance("openlearn/edu1").unwrap());

        let remaining = store.list_resources().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "edu2-mysql");
    }

    #[test]
    fn cascade_delete_removes_status_records() {
        let store = SubstrateStore::open_in_memory().unwrap();
        let instance = AppInstance::new("openlearn", "edu1", 1);
        store.put_instance(&instance).unwrap();

        let mut workload = claim("openlearn", "edu1-mysql", &instance);
        workload.kind = ResourceKind::Workload;
        workload.body = ResourceBody::Workload(WorkloadSpec {
            image: "docker.io/mysql:5.7.32".to_string(),
            replicas: 1,
            args: vec![],
            ports: vec![3306],
            env: vec![],
            mounts: vec![],
            volumes: vec![],
        });
        store.create_resource(&workload).unwrap();
        store
            .set_workload_status("openlearn", "edu1-mysql", &WorkloadStatus { ready_replicas: 1 })
            .unwrap();

        store.delete_instance("openlearn/edu1").unwrap();
        assert!(store.workload_status("openlearn", "edu1-mysql").unwrap().is_none());
    }

    #[test]
    fn status_reads_absent_as_none() {
        let store = SubstrateStore::open_in_memory().unwrap();
        assert!(store.workload_status("openlearn", "missing").unwrap().is_none());
        assert!(store.task_status("openlearn", "missing").unwrap().is_none());
    }

    #[test]
    fn task_status_round_trip() {
        let store = SubstrateStore::open_in_memory().unwrap();
        store
            .set_task_status("openlearn", "edu1-migrate", &TaskStatus { succeeded: 1 })
            .unwrap();
        let status = store.task_status("openlearn", "edu1-migrate").unwrap().unwrap();
        assert_eq!(status.succeeded, 1);
    }

    #[test]
    fn persistent_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trellis.redb");

        {
            let store = SubstrateStore::open(&path).unwrap();
            store.put_instance(&AppInstance::new("openlearn", "edu1", 1)).unwrap();
        }

        let store = SubstrateStore::open(&path).unwrap();
        assert!(store.get_instance("openlearn/edu1").unwrap().is_some());
    }
}
