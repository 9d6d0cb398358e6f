//! Per-object instance data.
//!
//! The [`InstanceOffsetRegistry`] publishes transform matrices of every
//! visible object into one shared storage buffer and answers where each
//! definition's and object's data starts. Objects, models and visibility are
//! supplied by the caller through the traits in this module.

mod ids;
mod matrix;
mod registry;
mod source;

pub use ids::{DefId, ModelKey, ObjectId, ObjectKind, OffsetKey};
pub use matrix::Mat4;
pub use registry::{INVALID_OFFSET, InstanceOffsetRegistry};
pub use source::{ModelSource, SceneObject, Visibility};
