//! Reconcile pipeline: the ordered, dependency-gated provisioning driver.
//!
//! The pipeline walks a fixed stage table, ensuring each stage's
//! descriptors and stopping at the first failure or closed readiness gate.
//! Stage order and gating are data ([`Stage`]), not control flow: the
//! dependency graph of the application lives in [`StageTable::standard`]
//! and nowhere else.
//!
//! A pass never blocks on readiness. A closed gate terminates the pass
//! with a requeue delay, and the next pass restarts from stage 0.
//! Ensure calls on already-existing resources are no-ops, so restarting
//! repeats no work.

use std::time::Duration;

use tracing::{debug, info, warn};

use trellis_manifest::{bundles, claims, mongo, mysql, proxy, redis, route, tasks, web, worker};
use trellis_state::{AppInstance, ResourceDescriptor};

use crate::error::ReconcileError;
use crate::probes::{task_done, workload_ready};
use crate::substrate::{Substrate, ensure};

/// Requeue delay while waiting for a workload to report ready.
pub const WORKLOAD_READY_DELAY: Duration = Duration::from_secs(5);

/// Requeue delay while waiting for a one-shot task to complete. Longer
/// than the workload delay: a task has to run, not just get scheduled.
pub const TASK_DONE_DELAY: Duration = Duration::from_secs(15);

/// Builds the descriptors for one stage. Pure; called fresh every pass.
pub type BuildFn = fn(&AppInstance) -> Vec<ResourceDescriptor>;

/// Derives a gated resource's name from the instance.
pub type NameFn = fn(&AppInstance) -> String;

/// Readiness gate guarding advancement past a stage.
///
/// Which stages are gated is an explicit configuration choice made in the
/// stage table; nothing is inferred from resource kinds.
#[derive(Debug, Clone, Copy)]
pub enum Gate {
    /// Advance unconditionally once the stage's descriptors are ensured.
    None,
    /// Advance once the named workload reports exactly one ready replica.
    WorkloadReady { workload: NameFn },
    /// Advance once the named task reports a successful completion.
    TaskDone { task: NameFn },
}

impl Gate {
    /// Requeue delay to use while this gate is closed.
    pub fn delay(&self) -> Duration {
        match self {
            Gate::None => Duration::ZERO,
            Gate::WorkloadReady { .. } => WORKLOAD_READY_DELAY,
            Gate::TaskDone { .. } => TASK_DONE_DELAY,
        }
    }
}

/// One position in the tier order.
#[derive(Clone, Copy)]
pub struct Stage {
    pub name: &'static str,
    pub build: BuildFn,
    pub gate: Gate,
}

/// The fixed total order over tiers.
pub struct StageTable {
    stages: Vec<Stage>,
}

impl StageTable {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// The standard tier order: storage claims and config bundles, then
    /// the data stores (each gated on readiness), then the init tasks
    /// (gated on completion), then the serving tiers, then the proxy
    /// (gated, so the route only lands once something answers), then the
    /// ingress route.
    pub fn standard() -> Self {
        Self::new(vec![
            Stage {
                name: "storage-claims",
                build: claims::all_claims,
                gate: Gate::None,
            },
            Stage {
                name: "config-bundles",
                build: bundles::all_bundles,
                gate: Gate::None,
            },
            Stage {
                name: "mysql",
                build: build_mysql,
                gate: Gate::WorkloadReady {
                    workload: mysql::mysql_workload_name,
                },
            },
            Stage {
                name: "mongo",
                build: build_mongo,
                gate: Gate::WorkloadReady {
                    workload: mongo::mongo_workload_name,
                },
            },
            Stage {
                name: "redis",
                build: build_redis,
                gate: Gate::WorkloadReady {
                    workload: redis::redis_workload_name,
                },
            },
            Stage {
                name: "migrate",
                build: build_migrate,
                gate: Gate::TaskDone {
                    task: tasks::migrate_task_name,
                },
            },
            Stage {
                name: "seed",
                build: build_seed,
                gate: Gate::TaskDone {
                    task: tasks::seed_task_name,
                },
            },
            Stage {
                name: "web",
                build: build_web,
                gate: Gate::None,
            },
            Stage {
                name: "worker",
                build: build_worker,
                gate: Gate::None,
            },
            Stage {
                name: "proxy",
                build: build_proxy,
                gate: Gate::WorkloadReady {
                    workload: proxy::proxy_workload_name,
                },
            },
            Stage {
                name: "route",
                build: build_route,
                gate: Gate::None,
            },
        ])
    }
}

fn build_mysql(i: &AppInstance) -> Vec<ResourceDescriptor> {
    vec![mysql::mysql_workload(i), mysql::mysql_endpoint(i)]
}

fn build_mongo(i: &AppInstance) -> Vec<ResourceDescriptor> {
    vec![mongo::mongo_workload(i), mongo::mongo_endpoint(i)]
}

fn build_redis(i: &AppInstance) -> Vec<ResourceDescriptor> {
    vec![redis::redis_workload(i), redis::redis_endpoint(i)]
}

fn build_migrate(i: &AppInstance) -> Vec<ResourceDescriptor> {
    vec![tasks::migrate_task(i)]
}

fn build_seed(i: &AppInstance) -> Vec<ResourceDescriptor> {
    vec![tasks::seed_task(i)]
}

fn build_web(i: &AppInstance) -> Vec<ResourceDescriptor> {
    vec![web::web_workload(i), web::web_endpoint(i)]
}

fn build_worker(i: &AppInstance) -> Vec<ResourceDescriptor> {
    vec![worker::worker_workload(i)]
}

fn build_proxy(i: &AppInstance) -> Vec<ResourceDescriptor> {
    vec![proxy::proxy_workload(i), proxy::proxy_endpoint(i)]
}

fn build_route(i: &AppInstance) -> Vec<ResourceDescriptor> {
    vec![route::route(i)]
}

/// Where a pass is in the stage table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelinePhase {
    /// Ensuring descriptors for the given stage index.
    Provisioning(usize),
    /// Stage descriptors ensured, polling the stage's readiness gate.
    WaitingReady(usize),
    /// A lookup or creation failed; the pass stopped.
    Failed,
    /// Every stage ensured and every gate open.
    Complete,
}

/// Terminal outcome of one pass.
#[derive(Debug)]
pub enum PassOutcome {
    /// All stages provisioned and ready.
    Complete,
    /// A readiness gate is closed; retry after `delay`.
    NotReady {
        stage: &'static str,
        delay: Duration,
    },
    /// An ensure call failed; the pass stopped at `stage`.
    Failed(ReconcileError),
}

/// Drives one instance's resources toward the stage table's end state.
pub struct Pipeline<S: Substrate> {
    substrate: S,
    table: StageTable,
}

impl<S: Substrate> Pipeline<S> {
    pub fn new(substrate: S, table: StageTable) -> Self {
        Self { substrate, table }
    }

    pub fn substrate(&self) -> &S {
        &self.substrate
    }

    /// Run one complete pass for an instance, from stage 0 until the first
    /// failure, the first closed gate, or completion.
    pub fn run_pass(&self, instance: &AppInstance) -> PassOutcome {
        let mut phase;

        for (idx, stage) in self.table.stages().iter().enumerate() {
            phase = PipelinePhase::Provisioning(idx);
            debug!(instance = %instance.name, stage = stage.name, ?phase, "provisioning stage");

            for desc in (stage.build)(instance) {
                if let Err(err) = ensure(&self.substrate, &desc) {
                    phase = PipelinePhase::Failed;
                    warn!(
                        instance = %instance.name,
                        stage = stage.name,
                        ?phase,
                        error = %err,
                        "ensure failed, aborting pass"
                    );
                    return PassOutcome::Failed(err);
                }
            }

            if !matches!(stage.gate, Gate::None) {
                phase = PipelinePhase::WaitingReady(idx);
                debug!(instance = %instance.name, stage = stage.name, ?phase, "polling readiness gate");

                if !self.gate_open(&stage.gate, instance) {
                    let delay = stage.gate.delay();
                    info!(
                        instance = %instance.name,
                        stage = stage.name,
                        delay_secs = delay.as_secs(),
                        "stage not ready, requeueing pass"
                    );
                    return PassOutcome::NotReady {
                        stage: stage.name,
                        delay,
                    };
                }
            }
        }

        phase = PipelinePhase::Complete;
        info!(instance = %instance.name, ?phase, "all stages provisioned and ready");
        PassOutcome::Complete
    }

    /// Poll a gate once. Gated workloads are singletons, so ready means
    /// exactly one ready replica.
    fn gate_open(&self, gate: &Gate, instance: &AppInstance) -> bool {
        match gate {
            Gate::None => true,
            Gate::WorkloadReady { workload } => {
                let name = workload(instance);
                workload_ready(&self.substrate, &instance.namespace, &name, 1)
            }
            Gate::TaskDone { task } => {
                let name = task(instance);
                task_done(&self.substrate, &instance.namespace, &name)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_state::{SubstrateStore, TaskStatus, WorkloadStatus};

    fn mark_workload_ready(store: &SubstrateStore, namespace: &str, name: &str) {
        store
            .set_workload_status(namespace, name, &WorkloadStatus { ready_replicas: 1 })
            .unwrap();
    }

    fn mark_task_done(store: &SubstrateStore, namespace: &str, name: &str) {
        store
            .set_task_status(namespace, name, &TaskStatus { succeeded: 1 })
            .unwrap();
    }

    fn all_gates_open(store: &SubstrateStore, instance: &AppInstance) {
        mark_workload_ready(store, &instance.namespace, &mysql::mysql_workload_name(instance));
        mark_workload_ready(store, &instance.namespace, &mongo::mongo_workload_name(instance));
        mark_workload_ready(store, &instance.namespace, &redis::redis_workload_name(instance));
        mark_task_done(store, &instance.namespace, &tasks::migrate_task_name(instance));
        mark_task_done(store, &instance.namespace, &tasks::seed_task_name(instance));
        mark_workload_ready(store, &instance.namespace, &proxy::proxy_workload_name(instance));
    }

    #[test]
    fn first_pass_stops_at_first_gate() {
        let store = SubstrateStore::open_in_memory().unwrap();
        let instance = AppInstance::new("openlearn", "edu1", 1);
        let pipeline = Pipeline::new(store.clone(), StageTable::standard());

        let outcome = pipeline.run_pass(&instance);
        match outcome {
            PassOutcome::NotReady { stage, delay } => {
                assert_eq!(stage, "mysql");
                assert_eq!(delay, WORKLOAD_READY_DELAY);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        // Claims and bundles landed, mysql landed, nothing past the gate.
        assert!(
            store
                .get_resource(trellis_state::ResourceKind::Workload, "openlearn", "edu1-mysql")
                .unwrap()
                .is_some()
        );
        assert!(
            store
                .get_resource(trellis_state::ResourceKind::Workload, "openlearn", "edu1-web")
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn task_gates_use_the_longer_delay() {
        let store = SubstrateStore::open_in_memory().unwrap();
        let instance = AppInstance::new("openlearn", "edu1", 1);
        let pipeline = Pipeline::new(store.clone(), StageTable::standard());

        mark_workload_ready(&store, "openlearn", "edu1-mysql");
        mark_workload_ready(&store, "openlearn", "edu1-mongo");
        mark_workload_ready(&store, "openlearn", "edu1-redis");

        let outcome = pipeline.run_pass(&instance);
        match outcome {
            PassOutcome::NotReady { stage, delay } => {
                assert_eq!(stage, "migrate");
                assert_eq!(delay, TASK_DONE_DELAY);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn pass_completes_when_all_gates_open() {
        let store = SubstrateStore::open_in_memory().unwrap();
        let instance = AppInstance::new("openlearn", "edu1", 1);
        let pipeline = Pipeline::new(store.clone(), StageTable::standard());

        all_gates_open(&store, &instance);

        assert!(matches!(pipeline.run_pass(&instance), PassOutcome::Complete));

        // The route is the last thing created.
        assert!(
            store
                .get_resource(trellis_state::ResourceKind::Route, "openlearn", "edu1-web")
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn restart_reconverges_without_duplicates() {
        let store = SubstrateStore::open_in_memory().unwrap();
        let instance = AppInstance::new("openlearn", "edu1", 1);
        let pipeline = Pipeline::new(store.clone(), StageTable::standard());

        // Several passes stall at successive gates.
        pipeline.run_pass(&instance);
        mark_workload_ready(&store, "openlearn", "edu1-mysql");
        pipeline.run_pass(&instance);
        mark_workload_ready(&store, "openlearn", "edu1-mongo");
        mark_workload_ready(&store, "openlearn", "edu1-redis");
        pipeline.run_pass(&instance);
        mark_task_done(&store, "openlearn", "edu1-migrate");
        mark_task_done(&store, "openlearn", "edu1-seed");
        mark_workload_ready(&store, "openlearn", "edu1-proxy");
        assert!(matches!(pipeline.run_pass(&instance), PassOutcome::Complete));

        let via_restarts = store.list_resources().unwrap().len();

        // A hypothetical single pass with all gates pre-satisfied.
        let fresh = SubstrateStore::open_in_memory().unwrap();
        let fresh_pipeline = Pipeline::new(fresh.clone(), StageTable::standard());
        all_gates_open(&fresh, &instance);
        assert!(matches!(fresh_pipeline.run_pass(&instance), PassOutcome::Complete));

        assert_eq!(via_restarts, fresh.list_resources().unwrap().len());
    }

    #[test]
    fn empty_table_completes_without_touching_the_store() {
        let store = SubstrateStore::open_in_memory().unwrap();
        let instance = AppInstance::new("openlearn", "edu1", 1);
        let pipeline = Pipeline::new(store.clone(), StageTable::new(vec![]));

        assert!(matches!(pipeline.run_pass(&instance), PassOutcome::Complete));
        assert!(store.list_resources().unwrap().is_empty());
    }

    #[test]
    fn standard_table_orders_stores_before_tasks_before_serving() {
        let table = StageTable::standard();
        let names: Vec<&str> = table.stages().iter().map(|s| s.name).collect();

        let pos = |name: &str| names.iter().position(|n| *n == name).unwrap();
        assert!(pos("storage-claims") < pos("mysql"));
        assert!(pos("config-bundles") < pos("mysql"));
        assert!(pos("mysql") < pos("migrate"));
        assert!(pos("migrate") < pos("seed"));
        assert!(pos("seed") < pos("web"));
        assert!(pos("web") < pos("proxy"));
        assert!(pos("proxy") < pos("route"));
        assert_eq!(*names.last().unwrap(), "route");
    }
}
