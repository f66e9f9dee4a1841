//! Per-instance reconcile workers.
//!
//! One background task per app instance, so passes for the same instance
//! are strictly serialized while different instances reconcile
//! concurrently. Each worker loops: run a pass, honor the requeue
//! decision, repeat; `Requeue::None` ends the worker. A worker that
//! settled (converged or instance gone) is respawned on the next resync
//! if the instance still exists; one that spent its retry budget stays
//! parked until the instance is deleted.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use trellis_reconcile::{Pipeline, Reconciler, Requeue, RetryPolicy, StageTable};
use trellis_state::SubstrateStore;

/// Pause before retrying a failed pass.
const FAILURE_BACKOFF: Duration = Duration::from_secs(1);

/// Why a worker's loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerExit {
    /// Converged, instance gone, or shutdown requested.
    Settled,
    /// Spent the retry budget; do not reschedule this instance.
    GaveUp,
}

/// Tracks the live worker task per instance key.
pub struct WorkerSet {
    store: SubstrateStore,
    policy: RetryPolicy,
    shutdown: watch::Receiver<bool>,
    workers: HashMap<String, JoinHandle<WorkerExit>>,
    given_up: HashSet<String>,
}

impl WorkerSet {
    pub fn new(
        store: SubstrateStore,
        policy: RetryPolicy,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            policy,
            shutdown,
            workers: HashMap::new(),
            given_up: HashSet::new(),
        }
    }

    /// Reconcile the worker set against the current instance list:
    /// reap finished workers, then spawn one for every instance that
    /// doesn't have a live worker and hasn't given up. An instance that
    /// gave up is skipped until its key leaves the list, so deleting and
    /// re-applying it grants a fresh budget.
    pub async fn resync(&mut self, keys: Vec<String>) {
        let finished: Vec<String> = self
            .workers
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(key, _)| key.clone())
            .collect();
        for key in finished {
            if let Some(handle) = self.workers.remove(&key) {
                match handle.await {
                    Ok(WorkerExit::GaveUp) => {
                        warn!(%key, "instance gave up, parking until deleted");
                        self.given_up.insert(key);
                    }
                    Ok(WorkerExit::Settled) => {}
                    Err(err) => warn!(%key, error = %err, "worker task failed"),
                }
            }
        }

        self.given_up.retain(|key| keys.contains(key));

        for key in keys {
            if self.workers.contains_key(&key) || self.given_up.contains(&key) {
                continue;
            }
            let handle = tokio::spawn(run_worker(
                self.store.clone(),
                key.clone(),
                self.policy,
                self.shutdown.clone(),
            ));
            self.workers.insert(key, handle);
        }
    }

    /// Abort all workers (for shutdown).
    pub fn stop_all(&mut self) {
        for (key, handle) in self.workers.drain() {
            debug!(%key, "stopping worker");
            handle.abort();
        }
    }

    pub fn active(&self) -> usize {
        self.workers.len()
    }
}

/// The worker loop for one instance.
async fn run_worker(
    store: SubstrateStore,
    key: String,
    policy: RetryPolicy,
    mut shutdown: watch::Receiver<bool>,
) -> WorkerExit {
    info!(%key, "worker started");

    let pipeline = Pipeline::new(store, StageTable::standard());
    let mut reconciler = Reconciler::new(pipeline, policy);

    loop {
        let delay = match reconciler.reconcile(&key) {
            Requeue::None => {
                if reconciler.gave_up(&key) {
                    info!(%key, "retry budget spent, worker exiting");
                    return WorkerExit::GaveUp;
                }
                info!(%key, "instance settled, worker exiting");
                return WorkerExit::Settled;
            }
            Requeue::Immediate => FAILURE_BACKOFF,
            Requeue::After(delay) => delay,
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!(%key, "worker shutting down");
                    return WorkerExit::Settled;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_manifest::{mongo, mysql, proxy, redis, tasks};
    use trellis_state::{AppInstance, TaskStatus, WorkloadStatus};

    fn satisfy_all_gates(store: &SubstrateStore, instance: &AppInstance) {
        let ns = &instance.namespace;
        let ready = WorkloadStatus { ready_replicas: 1 };
        let done = TaskStatus { succeeded: 1 };
        store
            .set_workload_status(ns, &mysql::mysql_workload_name(instance), &ready)
            .unwrap();
        store
            .set_workload_status(ns, &mongo::mongo_workload_name(instance), &ready)
            .unwrap();
        store
            .set_workload_status(ns, &redis::redis_workload_name(instance), &ready)
            .unwrap();
        store
            .set_workload_status(ns, &proxy::proxy_workload_name(instance), &ready)
            .unwrap();
        store
            .set_task_status(ns, &tasks::migrate_task_name(instance), &done)
            .unwrap();
        store
            .set_task_status(ns, &tasks::seed_task_name(instance), &done)
            .unwrap();
    }

    async fn wait_until_idle(set: &WorkerSet) {
        for _ in 0..500 {
            if set.workers.values().all(|handle| handle.is_finished()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("workers did not finish");
    }

    #[tokio::test]
    async fn worker_exits_once_instance_settles() {
        let store = SubstrateStore::open_in_memory().unwrap();
        let instance = AppInstance::new("openlearn", "edu1", 1);
        store.put_instance(&instance).unwrap();
        satisfy_all_gates(&store, &instance);

        let (_tx, rx) = watch::channel(false);
        let exit =
            run_worker(store.clone(), "openlearn/edu1".to_string(), RetryPolicy::unbounded(), rx)
                .await;
        assert_eq!(exit, WorkerExit::Settled);

        // Everything provisioned, including the final route.
        assert!(
            store
                .get_resource(trellis_state::ResourceKind::Route, "openlearn", "edu1-web")
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn worker_exits_for_missing_instance() {
        let store = SubstrateStore::open_in_memory().unwrap();
        let (_tx, rx) = watch::channel(false);
        let exit =
            run_worker(store, "openlearn/ghost".to_string(), RetryPolicy::unbounded(), rx).await;
        assert_eq!(exit, WorkerExit::Settled);
    }

    #[tokio::test]
    async fn worker_reports_spent_budget() {
        let store = SubstrateStore::open_in_memory().unwrap();
        let instance = AppInstance::new("openlearn", "edu1", 1);
        store.put_instance(&instance).unwrap();

        // Nothing ever becomes ready; a budget of one pass is spent
        // immediately, with no requeue sleep.
        let (_tx, rx) = watch::channel(false);
        let exit =
            run_worker(store, "openlearn/edu1".to_string(), RetryPolicy::with_budget(1), rx).await;
        assert_eq!(exit, WorkerExit::GaveUp);
    }

    #[tokio::test]
    async fn resync_spawns_one_worker_per_instance() {
        let store = SubstrateStore::open_in_memory().unwrap();
        let (_tx, rx) = watch::channel(false);
        let mut set = WorkerSet::new(store, RetryPolicy::unbounded(), rx);

        set.resync(vec!["openlearn/a".to_string(), "openlearn/b".to_string()]).await;
        assert_eq!(set.active(), 2);

        // Re-syncing the same keys does not double-spawn.
        set.resync(vec!["openlearn/a".to_string(), "openlearn/b".to_string()]).await;
        assert_eq!(set.active(), 2);

        set.stop_all();
        assert_eq!(set.active(), 0);
    }

    #[tokio::test]
    async fn gave_up_instance_stays_parked_until_deleted() {
        let store = SubstrateStore::open_in_memory().unwrap();
        let instance = AppInstance::new("openlearn", "edu1", 1);
        store.put_instance(&instance).unwrap();

        let (_tx, rx) = watch::channel(false);
        let mut set = WorkerSet::new(store.clone(), RetryPolicy::with_budget(1), rx);
        let keys = vec!["openlearn/edu1".to_string()];

        set.resync(keys.clone()).await;
        assert_eq!(set.active(), 1);
        wait_until_idle(&set).await;

        // The worker spent its budget; later resyncs must not grant a
        // fresh one while the instance still exists.
        set.resync(keys.clone()).await;
        assert_eq!(set.active(), 0);
        set.resync(keys.clone()).await;
        assert_eq!(set.active(), 0);

        // Deleting the instance clears the parking, so a re-applied
        // instance reconciles again.
        set.resync(vec![]).await;
        set.resync(keys).await;
        assert_eq!(set.active(), 1);

        set.stop_all();
    }
}
