//! Attribute layout engine.
//!
//! Turns attribute tables into byte offsets and strides. Two rules exist:
//! vertex/index data is packed tightly, uniform/storage blocks place every
//! attribute on a 16-byte boundary so they match std140-style shader blocks.

mod attribute;
mod definition;
mod kind;
mod scalar;

pub use attribute::{AttributeDescriptor, AttributeSpec};
pub use definition::{BufferDefinition, LayoutDump};
pub use kind::{BLOCK_ALIGNMENT, BufferKind, LayoutRule};
pub use scalar::ScalarType;
