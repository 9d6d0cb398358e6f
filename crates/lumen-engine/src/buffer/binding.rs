use crate::config::BindingConfig;
use crate::device::{BindTarget, DeviceBackend, RangeBinding};
use crate::error::{DefinitionError, RangeError, Result};
use crate::layout::BufferKind;

use super::BufferObject;

/// An element range of a uniform/storage buffer attached to a binding index.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BoundRange {
    pub binding: RangeBinding,
    pub element_offset: u32,
    pub element_count: u32,
}

impl BoundRange {
    /// Binding index seen by shaders (`slot + base`).
    #[inline]
    pub fn index(&self) -> u32 {
        self.binding.index
    }
}

impl BufferObject {
    /// Binds `element_count` elements (default: the rest of the buffer) from
    /// `element_offset` to binding `slot + base`, where the base depends on
    /// whether this is a uniform or storage buffer.
    pub fn bind_range<D: DeviceBackend + ?Sized>(
        &mut self,
        device: &mut D,
        config: &BindingConfig,
        slot: u32,
        element_offset: u32,
        element_count: Option<u32>,
    ) -> Result<BoundRange> {
        const OP: &str = "BindRange";

        let (target, base) = match self.definition().kind() {
            BufferKind::Uniform => (BindTarget::Uniform, config.uniform_base),
            BufferKind::Storage => (BindTarget::Storage, config.storage_base),
            kind => return Err(DefinitionError::UnsupportedKind { op: OP, kind }.into()),
        };

        let capacity = self.element_count();
        let count = element_count.unwrap_or(capacity.saturating_sub(element_offset));
        if count == 0 {
            return Err(RangeError::Empty { op: OP }.into());
        }
        if u64::from(element_offset) + u64::from(count) > u64::from(capacity) {
            return Err(RangeError::OutOfBounds {
                op: OP,
                element_offset,
                element_count: count,
                capacity,
            }
            .into());
        }

        let stride = u64::from(self.stride());
        let offset = u64::from(element_offset) * stride;
        if offset % config.offset_alignment != 0 {
            return Err(RangeError::MisalignedBinding {
                op: OP,
                offset,
                alignment: config.offset_alignment,
            }
            .into());
        }

        // Pending host writes must be visible to whatever reads the binding.
        self.commit(device)?;

        let binding = RangeBinding {
            target,
            index: slot + base,
            buffer: self.device_buffer(),
            offset,
            size: u64::from(count) * stride,
        };
        device.bind_range(&binding)?;
        log::trace!("bound {:?} to {target:?} index {}", self.label(), binding.index);

        Ok(BoundRange {
            binding,
            element_offset,
            element_count: count,
        })
    }

    pub fn unbind_range<D: DeviceBackend + ?Sized>(&self, device: &mut D, bound: &BoundRange) -> Result<()> {
        device.unbind_range(&bound.binding)?;
        Ok(())
    }
}
