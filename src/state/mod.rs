//! Merge engine.
//!
//! Turns a store value plus a batch of snapshots into the next store value.
//! Nothing here touches the filesystem.

mod merge;

pub use merge::apply_batch;
