//! trellis-state: substrate state store for trellis.
//!
//! Backed by [redb](https://docs.rs/redb), holds the desired-state app
//! instances, the managed resources created on their behalf, and the
//! observed status records read by readiness probes.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Composite keys (`{namespace}/{name}`, `{kind}/{namespace}/{name}`)
//! keep resource identities unique per kind.
//!
//! The `SubstrateStore` is `Clone` + `Send` + `Sync` (backed by
//! `Arc<Database>`) and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::SubstrateStore;
pub use types::*;
