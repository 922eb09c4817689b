//! Client-side core of a personal/shared task-and-calendar manager.
//!
//! The crate normalizes heterogeneous persisted task rows into a canonical
//! in-memory model, answers per-day aggregation queries (single-day vs.
//! multi-day buckets with stable priority ordering), and keeps local
//! collections reconciled with a remote persistence service across
//! create/update/delete/status-toggle operations.
//!
//! Local collections are caches: every successful mutation patches them from
//! the row the service returned, never from the client-constructed intent.

pub mod agenda;
pub mod error;
pub mod mapping;
pub mod models;
pub mod remote;
pub mod session;
pub mod stores;

pub use error::StoreError;
pub use models::{Task, TaskDraft, TaskPriority, TaskStatus};
pub use stores::{CategoryStore, GroupStore, TaskScope, TaskStore};
