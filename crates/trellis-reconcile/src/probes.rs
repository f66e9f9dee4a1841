//! Readiness probes.
//!
//! Probes reduce observed substrate status to a boolean. Any lookup
//! failure (resource missing, status never reported, transient store
//! error) reads as "not ready", never as an error: the pipeline converts
//! not-ready into a delayed requeue, so a broken lookup self-heals by
//! being retried on the next pass.

use tracing::{debug, warn};

use crate::substrate::Substrate;

/// Ready iff the substrate reports exactly `want` ready replicas.
pub fn workload_ready<S: Substrate>(
    substrate: &S,
    namespace: &str,
    name: &str,
    want: i32,
) -> bool {
    match substrate.workload_status(namespace, name) {
        Ok(Some(status)) => status.ready_replicas == want,
        Ok(None) => {
            debug!(%namespace, %name, "no workload status yet, not ready");
            false
        }
        Err(err) => {
            warn!(%namespace, %name, error = %err, "workload status lookup failed, treating as not ready");
            false
        }
    }
}

/// Done iff the substrate reports at least one successful completion.
pub fn task_done<S: Substrate>(substrate: &S, namespace: &str, name: &str) -> bool {
    match substrate.task_status(namespace, name) {
        Ok(Some(status)) => status.succeeded > 0,
        Ok(None) => {
            debug!(%namespace, %name, "no task status yet, not done");
            false
        }
        Err(err) => {
            warn!(%namespace, %name, error = %err, "task status lookup failed, treating as not done");
            false
        }
    }
}
