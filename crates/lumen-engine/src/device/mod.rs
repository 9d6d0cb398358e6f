//! Device backends.
//!
//! Buffer objects never touch a graphics API directly. They talk to a
//! [`DeviceBackend`], which is responsible for:
//! - creating, resizing and destroying device buffers
//! - sub-range writes and blocking read-back
//! - recording uniform/storage range bindings
//! - recording indexed-instanced draws for the draw orchestration layer
//!
//! Two backends are provided: [`WgpuDevice`] for real hardware and
//! [`HeadlessDevice`], a host-memory device used by tools and tests.

mod error;
mod gpu;
mod headless;
mod init;

pub use error::DeviceError;
pub use gpu::WgpuDevice;
pub use headless::{DeviceStats, HeadlessDevice};
pub use init::DeviceInit;

use crate::layout::BufferKind;

/// Offsets and lengths of device writes must be multiples of this value.
pub const COPY_ALIGNMENT: u64 = wgpu::COPY_BUFFER_ALIGNMENT;

/// Rounds `value` up to the next multiple of [`COPY_ALIGNMENT`].
#[inline]
pub const fn align_copy_size(value: u64) -> u64 {
    (value + COPY_ALIGNMENT - 1) & !(COPY_ALIGNMENT - 1)
}

/// Opaque handle to a buffer owned by a backend.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct DeviceBufferId(pub(crate) u64);

/// Parameters for [`DeviceBackend::create_buffer`].
#[derive(Debug, Clone, Copy)]
pub struct DeviceBufferDesc<'a> {
    pub label: &'a str,
    pub kind: BufferKind,
    /// Requested size in bytes. Backends round up to [`COPY_ALIGNMENT`].
    pub size: u64,
}

/// Shader-visible binding class of a bound buffer range.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum BindTarget {
    Uniform,
    Storage,
}

/// A buffer sub-range attached to a binding index.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RangeBinding {
    pub target: BindTarget,
    pub index: u32,
    pub buffer: DeviceBufferId,
    pub offset: u64,
    pub size: u64,
}

/// One indexed, instanced draw.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct IndexedInstancedDraw {
    pub first_index: u32,
    pub index_count: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
    pub instance_count: u32,
    /// Buffer holding the per-instance records referenced by the instance range.
    pub instance_buffer: DeviceBufferId,
}

/// Contract between buffer objects and a graphics device.
///
/// All calls happen on the render thread. `read_buffer` is the only call
/// allowed to block: it must not return before every previously submitted
/// write to the requested range is visible.
pub trait DeviceBackend {
    fn create_buffer(&mut self, desc: &DeviceBufferDesc<'_>) -> Result<DeviceBufferId, DeviceError>;

    fn destroy_buffer(&mut self, id: DeviceBufferId);

    /// Reallocates the buffer. Previous contents are not preserved, and any
    /// previously mapped region of the buffer becomes invalid.
    fn resize_buffer(&mut self, id: DeviceBufferId, size: u64) -> Result<(), DeviceError>;

    /// Allocated size in bytes, including alignment padding.
    fn buffer_size(&self, id: DeviceBufferId) -> Option<u64>;

    /// Writes `data` at `offset`. Both must be multiples of [`COPY_ALIGNMENT`].
    fn write_buffer(&mut self, id: DeviceBufferId, offset: u64, data: &[u8]) -> Result<(), DeviceError>;

    /// Reads `len` bytes at `offset`, waiting for outstanding writes.
    fn read_buffer(&mut self, id: DeviceBufferId, offset: u64, len: u64) -> Result<Vec<u8>, DeviceError>;

    fn bind_range(&mut self, binding: &RangeBinding) -> Result<(), DeviceError>;

    fn unbind_range(&mut self, binding: &RangeBinding) -> Result<(), DeviceError>;

    fn draw_indexed_instanced(&mut self, draw: &IndexedInstancedDraw);
}

pub(crate) fn check_write_alignment(offset: u64, len: u64) -> Result<(), DeviceError> {
    if offset % COPY_ALIGNMENT != 0 || len % COPY_ALIGNMENT != 0 {
        return Err(DeviceError::Misaligned {
            offset,
            len,
            alignment: COPY_ALIGNMENT,
        });
    }
    Ok(())
}

pub(crate) fn check_access(
    id: DeviceBufferId,
    offset: u64,
    len: u64,
    size: u64,
) -> Result<(), DeviceError> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(DeviceError::OutOfRange {
            id,
            offset,
            len,
            size,
        }),
    }
}
