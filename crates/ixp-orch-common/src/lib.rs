//! Common orchestration abstractions for IXP peering.
//!
//! This crate provides the building blocks the peering daemon is assembled
//! from, independent of any peering semantics:
//!
//! - [`Orch`]: Base trait for orchestration agents driven by a daemon loop
//! - [`Consumer`]: Coalescing queue that collapses bursts of events per key
//! - [`KeyedLocks`]: Per-key exclusive sections (no global lock)
//! - [`RetryPolicy`] / [`retry_async`]: Bounded retry with exponential backoff
//! - [`TaskStatus`]: Classification of task processing results
//!
//! # Architecture
//!
//! The orchestration model is event driven:
//!
//! 1. Mutations enqueue change events into a [`Consumer`]
//! 2. The daemon loop ticks and calls [`Orch::do_task`] on agents with pending work
//! 3. Agents drain the consumer and process each key inside a [`KeyedLocks`] section
//! 4. Transient failures are retried per [`RetryPolicy`], then surfaced

mod consumer;
mod keyed_lock;
mod orch;
mod retry;
mod task;

pub use consumer::{Consumer, ConsumerConfig, PendingEntry};
pub use keyed_lock::{KeyedGuard, KeyedLocks};
pub use orch::Orch;
pub use retry::{retry_async, RetryPolicy};
pub use task::{Retryable, TaskStatus};
