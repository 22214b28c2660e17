//! mdfs-scrub: recursive namespace scrub scheduling for the mdfs metadata
//! cache.
//!
//! A scrub walks part of the cached namespace tree and verifies each
//! object's stored state. This crate decides which entry is being verified
//! at any instant: it owns the priority queue of pending entries, expands
//! containers depth-first, and resumes traversal across asynchronous
//! fetches of not-yet-cached tree fragments.
//!
//! Architecture:
//! - [`ScrubStack`] - the scheduler: enqueue operations, the drive loop,
//!   and the in-flight bookkeeping
//! - [`NamespaceCache`] - the interface consumed from the metadata cache
//!   (residency, fetches, iteration, per-object verification)
//! - [`ScrubHeader`] - per-job parameters shared down the tree
//! - [`MemTree`] - deterministic in-memory cache for tests and demos
//!
//! The scheduler is single-driver: everything that would re-enter the
//! drive loop goes through an internal message channel drained by
//! [`ScrubStack::pump`], so recursion depth stays bounded and no locking
//! is needed around the queue.

pub mod cache;
pub mod config;
pub mod header;
pub mod memtree;
pub mod message;
pub mod stack;

mod entry;
mod queue;

pub use cache::{NamespaceCache, ObjectKind};
pub use config::ScrubConfig;
pub use header::ScrubHeader;
pub use memtree::MemTree;
pub use message::{FetchCompletion, OnFinish, VerifyCompletion};
pub use stack::{ScrubStack, ScrubStats};
