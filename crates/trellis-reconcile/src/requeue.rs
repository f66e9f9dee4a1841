//! Requeue decisions: the scheduling wrapper around the pipeline.
//!
//! Converts a pass's terminal outcome into a scheduling signal for the
//! outer work queue. Delays are fixed constants per barrier class: no
//! exponential backoff, no jitter. The retry budget is opt-in; by default
//! a stalled dependency is retried forever.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::pipeline::{PassOutcome, Pipeline};
use crate::substrate::Substrate;

/// Scheduling signal returned to the work queue after a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
    /// Done (or nothing to do); no further action.
    None,
    /// Transient failure; retry immediately.
    Immediate,
    /// A readiness barrier is closed; retry after the given delay.
    After(Duration),
}

/// Retry policy for not-ready passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryPolicy {
    /// Give up on an instance after this many consecutive not-ready
    /// passes. `None` retries forever.
    pub max_not_ready: Option<u32>,
}

impl RetryPolicy {
    pub fn unbounded() -> Self {
        Self {
            max_not_ready: None,
        }
    }

    pub fn with_budget(max_not_ready: u32) -> Self {
        Self {
            max_not_ready: Some(max_not_ready),
        }
    }

    fn exhausted(&self, not_ready_passes: u32) -> bool {
        self.max_not_ready
            .is_some_and(|max| not_ready_passes >= max)
    }
}

/// Map a pass outcome to a scheduling signal.
///
/// `not_ready_passes` counts consecutive not-ready outcomes for this
/// instance, including the current one.
pub fn decide(outcome: &PassOutcome, not_ready_passes: u32, policy: &RetryPolicy) -> Requeue {
    match outcome {
        PassOutcome::Complete => Requeue::None,
        PassOutcome::Failed(_) => Requeue::Immediate,
        PassOutcome::NotReady { stage, delay } => {
            if policy.exhausted(not_ready_passes) {
                error!(
                    stage,
                    passes = not_ready_passes,
                    "retry budget exhausted, giving up on instance"
                );
                Requeue::None
            } else {
                Requeue::After(*delay)
            }
        }
    }
}

/// Per-instance reconcile driver: reads the instance, runs a pass, and
/// applies the retry policy.
///
/// One `Reconciler` serves many instances, but the caller must not invoke
/// `reconcile` concurrently for the same key; the work queue serializes
/// passes per identity.
pub struct Reconciler<S: Substrate> {
    pipeline: Pipeline<S>,
    policy: RetryPolicy,
    /// Consecutive not-ready passes per instance key.
    not_ready: HashMap<String, u32>,
}

impl<S: Substrate> Reconciler<S> {
    pub fn new(pipeline: Pipeline<S>, policy: RetryPolicy) -> Self {
        Self {
            pipeline,
            policy,
            not_ready: HashMap::new(),
        }
    }

    /// Run one pass for the instance behind `key` and decide scheduling.
    ///
    /// A missing instance is "nothing to do" (deletion raced the queue),
    /// and errors surface as an immediate requeue rather than bubbling to
    /// the caller.
    pub fn reconcile(&mut self, key: &str) -> Requeue {
        let instance = match self.pipeline.substrate().instance(key) {
            Ok(Some(instance)) => instance,
            Ok(None) => {
                debug!(%key, "instance gone, nothing to do");
                self.not_ready.remove(key);
                return Requeue::None;
            }
            Err(err) => {
                warn!(%key, error = %err, "instance lookup failed");
                return Requeue::Immediate;
            }
        };

        let outcome = self.pipeline.run_pass(&instance);

        let passes = match &outcome {
            PassOutcome::NotReady { .. } => {
                let counter = self.not_ready.entry(key.to_string()).or_insert(0);
                *counter += 1;
                *counter
            }
            _ => {
                self.not_ready.remove(key);
                0
            }
        };

        decide(&outcome, passes, &self.policy)
    }

    /// True once `key` has spent its retry budget. Distinguishes a
    /// gave-up `Requeue::None` from a converged or deleted instance, so
    /// the caller can stop scheduling the key instead of granting it a
    /// fresh budget.
    pub fn gave_up(&self, key: &str) -> bool {
        let passes = self.not_ready.get(key).copied().unwrap_or(0);
        self.policy.exhausted(passes)
    }
}
