//! redb table definitions for the trellis substrate store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain
//! types). Instance and status keys follow `{namespace}/{name}`; resource
//! keys prepend the kind: `{kind}/{namespace}/{name}`.

use redb::TableDefinition;

/// App instances keyed by `{namespace}/{name}`.
pub const INSTANCES: TableDefinition<&str, &[u8]> = TableDefinition::new("app_instances");

/// Managed resources keyed by `{kind}/{namespace}/{name}`.
pub const RESOURCES: TableDefinition<&str, &[u8]> = TableDefinition::new("resources");

/// Observed workload status keyed by `{namespace}/{name}`.
pub const WORKLOAD_STATUS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("workload_status");

/// Observed task status keyed by `{namespace}/{name}`.
pub const TASK_STATUS: TableDefinition<&str, &[u8]> = TableDefinition::new("task_status");
