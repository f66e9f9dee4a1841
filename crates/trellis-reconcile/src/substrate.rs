//! The substrate seam and the ensure primitive.
//!
//! [`Substrate`] is the narrow interface the reconciler consumes: one read
//! for the desired-state instance, get/create for managed resources, and a
//! status read per probeable kind. The production implementation is
//! [`SubstrateStore`]; tests substitute doubles to inject failures.

use tracing::{debug, info};

use trellis_state::{
    AppInstance, ResourceDescriptor, ResourceKind, StateResult, SubstrateStore, TaskStatus,
    WorkloadStatus,
};

use crate::error::{ReconcileError, ReconcileResult};

/// Narrow substrate interface consumed by the reconciler.
pub trait Substrate {
    /// Read the desired-state instance. `None` means it was deleted.
    fn instance(&self, key: &str) -> StateResult<Option<AppInstance>>;

    /// Look up a managed resource by identity. `None` is not an error.
    fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> StateResult<Option<ResourceDescriptor>>;

    /// Create a managed resource. Must fail if the identity is taken.
    fn create(&self, desc: &ResourceDescriptor) -> StateResult<()>;

    /// Observed workload status, if the substrate has reported any.
    fn workload_status(&self, namespace: &str, name: &str)
    -> StateResult<Option<WorkloadStatus>>;

    /// Observed task status, if the substrate has reported any.
    fn task_status(&self, namespace: &str, name: &str) -> StateResult<Option<TaskStatus>>;
}

impl Substrate for SubstrateStore {
    fn instance(&self, key: &str) -> StateResult<Option<AppInstance>> {
        self.get_instance(key)
    }

    fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> StateResult<Option<ResourceDescriptor>> {
        self.get_resource(kind, namespace, name)
    }

    fn create(&self, desc: &ResourceDescriptor) -> StateResult<()> {
        self.create_resource(desc)
    }

    fn workload_status(
        &self,
        namespace: &str,
        name: &str,
    ) -> StateResult<Option<WorkloadStatus>> {
        SubstrateStore::workload_status(self, namespace, name)
    }

    fn task_status(&self, namespace: &str, name: &str) -> StateResult<Option<TaskStatus>> {
        SubstrateStore::task_status(self, namespace, name)
    }
}

/// What the ensure primitive did for one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The resource did not exist and was created.
    Created,
    /// A resource with the same identity already exists; nothing was done.
    AlreadyExists,
}

/// Ensure a managed resource exists: create if absent, no-op otherwise.
///
/// This is the unit of idempotency. An existing resource is never compared
/// against the descriptor and never updated (drift is out of scope), so
/// calling this any number of times after the first creation has no effect
/// on the substrate.
pub fn ensure<S: Substrate>(
    substrate: &S,
    desc: &ResourceDescriptor,
) -> ReconcileResult<EnsureOutcome> {
    if substrate.get(desc.kind, &desc.namespace, &desc.name)?.is_some() {
        debug!(kind = %desc.kind, name = %desc.name, "resource exists, skipping");
        return Ok(EnsureOutcome::AlreadyExists);
    }

    substrate.create(desc).map_err(|source| ReconcileError::Ensure {
        kind: desc.kind,
        name: desc.name.clone(),
        source,
    })?;

    info!(
        kind = %desc.kind,
        namespace = %desc.namespace,
        name = %desc.name,
        "resource created"
    );
    Ok(EnsureOutcome::Created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_manifest::claims::storage_claim;
    use trellis_state::StateError;

    #[test]
    fn ensure_creates_then_skips() {
        let store = SubstrateStore::open_in_memory().unwrap();
        let instance = AppInstance::new("openlearn", "edu1", 1);
        let desc = storage_claim(&instance, "mysql", "5Gi");

        assert_eq!(ensure(&store, &desc).unwrap(), EnsureOutcome::Created);
        assert_eq!(ensure(&store, &desc).unwrap(), EnsureOutcome::AlreadyExists);

        // Exactly one resource with this identity exists.
        assert_eq!(store.list_resources().unwrap().len(), 1);
    }

    #[test]
    fn ensure_never_updates_an_existing_resource() {
        let store = SubstrateStore::open_in_memory().unwrap();
        let instance = AppInstance::new("openlearn", "edu1", 1);

        let original = storage_claim(&instance, "mysql", "5Gi");
        ensure(&store, &original).unwrap();

        // Same identity, different body: the stored copy must not change.
        let drifted = storage_claim(&instance, "mysql", "50Gi");
        assert_eq!(ensure(&store, &drifted).unwrap(), EnsureOutcome::AlreadyExists);

        let stored = store
            .get_resource(original.kind, &original.namespace, &original.name)
            .unwrap()
            .unwrap();
        assert_eq!(stored, original);
    }

    /// Double whose create always fails with a permission-style error.
    struct DeniedSubstrate(SubstrateStore);

    impl Substrate for DeniedSubstrate {
        fn instance(&self, key: &str) -> StateResult<Option<AppInstance>> {
            self.0.get_instance(key)
        }
        fn get(
            &self,
            kind: ResourceKind,
            namespace: &str,
            name: &str,
        ) -> StateResult<Option<ResourceDescriptor>> {
            self.0.get_resource(kind, namespace, name)
        }
        fn create(&self, _desc: &ResourceDescriptor) -> StateResult<()> {
            Err(StateError::Write("permission denied".to_string()))
        }
        fn workload_status(
            &self,
            namespace: &str,
            name: &str,
        ) -> StateResult<Option<WorkloadStatus>> {
            self.0.workload_status(namespace, name)
        }
        fn task_status(&self, namespace: &str, name: &str) -> StateResult<Option<TaskStatus>> {
            self.0.task_status(namespace, name)
        }
    }

    #[test]
    fn creation_error_carries_resource_identity() {
        let substrate = DeniedSubstrate(SubstrateStore::open_in_memory().unwrap());
        let instance = AppInstance::new("openlearn", "edu1", 1);
        let desc = storage_claim(&instance, "mysql", "5Gi");

        let err = ensure(&substrate, &desc).unwrap_err();
        match err {
            ReconcileError::Ensure { kind, name, .. } => {
                assert_eq!(kind, ResourceKind::StorageClaim);
                assert_eq!(name, "mysql");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
