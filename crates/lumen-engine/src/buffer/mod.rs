//! Scriptable GPU buffers.
//!
//! A [`ScriptBuffer`] is the handle a scripting layer holds. Once defined it
//! owns a [`BufferObject`]: a device buffer, its host shadow copy and the
//! definition that gives the bytes meaning. Typed uploads and downloads go
//! through the shadow; range bindings expose element sub-ranges to shaders.

mod binding;
mod handle;
mod object;
mod transcode;

pub use binding::BoundRange;
pub use handle::ScriptBuffer;
pub use object::{BufferObject, BufferSize};
