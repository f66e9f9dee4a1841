//! trellis-reconcile: the reconciliation engine.
//!
//! Drives the live state of the substrate toward an [`AppInstance`]'s
//! desired state, one pass at a time:
//!
//! - **`substrate`**: the narrow substrate seam and the idempotent
//!   ensure primitive (create if absent, never update)
//! - **`probes`**: readiness probes reducing observed status to booleans
//! - **`pipeline`**: the ordered stage table and the per-pass state
//!   machine (provision, poll gate, advance / fail / requeue)
//! - **`requeue`**: maps pass outcomes to scheduling signals, with an
//!   optional retry budget
//!
//! # Architecture
//!
//! ```text
//! Reconciler
//!   └── Pipeline (StageTable: claims → bundles → stores → tasks → serving → route)
//!       ├── ensure(descriptor) per stage        (trellis-manifest builders)
//!       └── gate poll per barrier stage         (probes)
//! ```
//!
//! All state is read back from the substrate on every pass; nothing is
//! cached between passes.
//!
//! [`AppInstance`]: trellis_state::AppInstance

pub mod error;
pub mod pipeline;
pub mod probes;
pub mod requeue;
pub mod substrate;

pub use error::{ReconcileError, ReconcileResult};
pub use pipeline::{
    Gate, PassOutcome, Pipeline, PipelinePhase, Stage, StageTable, TASK_DONE_DELAY,
    WORKLOAD_READY_DELAY,
};
pub use requeue::{Reconciler, Requeue, RetryPolicy, decide};
pub use substrate::{EnsureOutcome, Substrate, ensure};
