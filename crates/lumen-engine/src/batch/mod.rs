//! Instanced draw batching.

mod submitter;

pub use submitter::{BatchSubmitter, IndexRange, InstanceRecord};
