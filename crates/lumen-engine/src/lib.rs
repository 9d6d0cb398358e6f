//! Lumen engine crate.
//!
//! Scriptable GPU buffer management: attribute layouts, typed transcoding
//! between flat numeric sequences and buffer bytes, stable-position range
//! allocation, and per-object instance data for instanced rendering.

pub mod alloc;
pub mod batch;
pub mod buffer;
pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod instance;
pub mod layout;
pub mod logging;

pub use config::EngineConfig;
pub use context::RenderContext;
pub use error::{BufferError, DefinitionError, RangeError, Result};
