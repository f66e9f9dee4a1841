//! Storage claim builders.
//!
//! One claim per stateful tier, created before anything that mounts them.
//! Claims keep the bare tier name so workload volume definitions can refer
//! to them without knowing the instance.

use trellis_state::{
    AppInstance, ClaimSpec, OwnerRef, ResourceBody, ResourceDescriptor, ResourceKind,
};

use crate::labels::labels_for;

/// Build one storage claim for a tier with the given capacity ("5Gi").
pub fn storage_claim(instance: &AppInstance, tier: &str, capacity: &str) -> ResourceDescriptor {
    ResourceDescriptor {
        kind: ResourceKind::StorageClaim,
        name: tier.to_string(),
        namespace: instance.namespace.clone(),
        labels: labels_for(instance, tier),
        owner: Some(OwnerRef::to_instance(instance)),
        body: ResourceBody::Claim(ClaimSpec {
            capacity: capacity.to_string(),
        }),
    }
}

/// All storage claims for an instance, in creation order.
pub fn all_claims(instance: &AppInstance) -> Vec<ResourceDescriptor> {
    vec![
        storage_claim(instance, "mysql", "5Gi"),
        storage_claim(instance, "mongo", "5Gi"),
        storage_claim(instance, "redis", "1Gi"),
        storage_claim(instance, "proxy", "1Gi"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_carry_capacity_and_owner() {
        let inst = AppInstance::new("openlearn", "edu1", 1);
        let claim = storage_claim(&inst, "mysql", "5Gi");

        assert_eq!(claim.kind, ResourceKind::StorageClaim);
        assert_eq!(claim.name, "mysql");
        assert_eq!(claim.owner.as_ref().unwrap().instance_uid, "openlearn/edu1");
        assert!(matches!(claim.body, ResourceBody::Claim(ref c) if c.capacity == "5Gi"));
    }

    #[test]
    fn every_stateful_tier_gets_a_claim() {
        let inst = AppInstance::new("openlearn", "edu1", 1);
        let names: Vec<String> = all_claims(&inst).into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["mysql", "mongo", "redis", "proxy"]);
    }
}
