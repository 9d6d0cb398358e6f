use core::ops::Range;

use crate::config::BufferLimits;
use crate::device::{DeviceBackend, DeviceBufferDesc, DeviceBufferId, align_copy_size};
use crate::error::Result;
use crate::layout::BufferDefinition;

/// Sizes reported by [`BufferObject::size_query`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BufferSize {
    pub element_count: u32,
    /// `stride * element_count`.
    pub logical_bytes: u64,
    /// Allocated device size, including alignment padding.
    pub device_bytes: u64,
}

/// A device buffer paired with a host shadow copy.
///
/// All host writes land in the shadow first and reach the device on
/// [`BufferObject::commit`], which writes only the dirty sub-range. The shadow
/// is padded to the device copy alignment so committed ranges can always be
/// widened to aligned boundaries.
#[derive(Debug)]
pub struct BufferObject {
    definition: BufferDefinition,
    element_count: u32,
    label: String,

    device_buffer: DeviceBufferId,
    shadow: Vec<u8>,
    dirty: Option<Range<usize>>,
}

impl BufferObject {
    /// Allocates `element_count` elements of `definition` on the device.
    ///
    /// Nothing is allocated if the definition/count pair violates `limits`.
    pub fn allocate<D: DeviceBackend + ?Sized>(
        device: &mut D,
        label: &str,
        definition: BufferDefinition,
        element_count: u32,
        limits: &BufferLimits,
    ) -> Result<Self> {
        let bytes = definition.checked_byte_size("Define", element_count, limits)?;

        let device_buffer = device.create_buffer(&DeviceBufferDesc {
            label,
            kind: definition.kind(),
            size: bytes,
        })?;

        log::debug!(
            "allocated {} buffer {label:?}: {element_count} x {} bytes",
            definition.kind(),
            definition.stride()
        );

        Ok(Self {
            definition,
            element_count,
            label: label.to_owned(),
            device_buffer,
            shadow: vec![0; align_copy_size(bytes) as usize],
            dirty: None,
        })
    }

    #[inline]
    pub fn definition(&self) -> &BufferDefinition {
        &self.definition
    }

    #[inline]
    pub fn element_count(&self) -> u32 {
        self.element_count
    }

    #[inline]
    pub fn stride(&self) -> u32 {
        self.definition.stride()
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn device_buffer(&self) -> DeviceBufferId {
        self.device_buffer
    }

    /// Logical bytes of the shadow copy (padding excluded).
    #[inline]
    pub fn shadow(&self) -> &[u8] {
        &self.shadow[..self.logical_bytes()]
    }

    #[inline]
    pub(crate) fn shadow_mut(&mut self) -> &mut [u8] {
        let len = self.logical_bytes();
        &mut self.shadow[..len]
    }

    #[inline]
    pub fn logical_bytes(&self) -> usize {
        self.definition.byte_size(self.element_count) as usize
    }

    /// Pending byte range not yet written to the device.
    #[inline]
    pub fn dirty_range(&self) -> Option<Range<usize>> {
        self.dirty.clone()
    }

    pub fn size_query<D: DeviceBackend + ?Sized>(&self, device: &D) -> BufferSize {
        BufferSize {
            element_count: self.element_count,
            logical_bytes: self.logical_bytes() as u64,
            device_bytes: device.buffer_size(self.device_buffer).unwrap_or(0),
        }
    }

    /// Extends the pending range by `bytes`.
    pub fn mark_dirty(&mut self, bytes: Range<usize>) {
        if bytes.is_empty() {
            return;
        }
        self.dirty = Some(match self.dirty.take() {
            Some(d) => d.start.min(bytes.start)..d.end.max(bytes.end),
            None => bytes,
        });
    }

    /// Writes the pending range to the device.
    ///
    /// The range is widened to copy-aligned boundaries; the bytes pulled in
    /// by widening come from the shadow as well, so they are unchanged on the
    /// device unless something other than this object wrote them.
    pub fn commit<D: DeviceBackend + ?Sized>(&mut self, device: &mut D) -> Result<()> {
        let Some(dirty) = self.dirty.take() else {
            return Ok(());
        };

        let start = (dirty.start as u64 & !(crate::device::COPY_ALIGNMENT - 1)) as usize;
        let end = (align_copy_size(dirty.end as u64) as usize).min(self.shadow.len());

        log::trace!("commit {:?}: bytes {start}..{end}", self.label);
        if let Err(e) = device.write_buffer(self.device_buffer, start as u64, &self.shadow[start..end]) {
            self.dirty = Some(dirty);
            return Err(e.into());
        }
        Ok(())
    }

    /// Reads `bytes` from the device, blocking until prior writes land.
    pub fn read_device<D: DeviceBackend + ?Sized>(
        &mut self,
        device: &mut D,
        bytes: Range<usize>,
    ) -> Result<Vec<u8>> {
        self.commit(device)?;
        let len = (bytes.end - bytes.start) as u64;
        Ok(device.read_buffer(self.device_buffer, bytes.start as u64, len)?)
    }

    /// Frees the device buffer together with the shadow.
    pub fn release<D: DeviceBackend + ?Sized>(self, device: &mut D) {
        log::debug!("released buffer {:?}", self.label);
        device.destroy_buffer(self.device_buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HeadlessDevice;
    use crate::layout::{AttributeSpec, BufferKind, ScalarType};

    fn vertex_u8(device: &mut HeadlessDevice, count: u32) -> BufferObject {
        let specs = [AttributeSpec::new(0, ScalarType::U8, 1)];
        let limits = BufferLimits::default();
        let def = BufferDefinition::by_table(BufferKind::Vertex, &specs, &limits).unwrap();
        BufferObject::allocate(device, "bytes", def, count, &limits).unwrap()
    }

    #[test]
    fn allocation_pads_device_size() {
        let mut dev = HeadlessDevice::new();
        let obj = vertex_u8(&mut dev, 5);
        assert_eq!(
            obj.size_query(&dev),
            BufferSize {
                element_count: 5,
                logical_bytes: 5,
                device_bytes: 8,
            }
        );
        assert_eq!(obj.shadow().len(), 5);
    }

    #[test]
    fn commit_widens_to_copy_alignment() {
        let mut dev = HeadlessDevice::new();
        let mut obj = vertex_u8(&mut dev, 8);
        obj.shadow_mut()[5] = 42;
        obj.mark_dirty(5..6);
        obj.commit(&mut dev).unwrap();

        assert!(obj.dirty_range().is_none());
        assert_eq!(dev.contents(obj.device_buffer()).unwrap()[4..8], [0, 42, 0, 0]);
        assert_eq!(dev.stats().bytes_written, 4);
    }

    #[test]
    fn dirty_ranges_merge() {
        let mut dev = HeadlessDevice::new();
        let mut obj = vertex_u8(&mut dev, 16);
        obj.mark_dirty(2..3);
        obj.mark_dirty(9..12);
        obj.mark_dirty(4..4);
        assert_eq!(obj.dirty_range(), Some(2..12));
    }

    #[test]
    fn commit_without_changes_is_free() {
        let mut dev = HeadlessDevice::new();
        let mut obj = vertex_u8(&mut dev, 4);
        obj.commit(&mut dev).unwrap();
        assert_eq!(dev.stats().writes, 0);
    }

    #[test]
    fn oversized_buffers_allocate_nothing() {
        let mut dev = HeadlessDevice::new();
        let specs = [AttributeSpec::new(0, ScalarType::FloatVec4, 1)];
        let limits = BufferLimits::default();
        let def = BufferDefinition::by_table(BufferKind::Uniform, &specs, &limits).unwrap();
        assert!(BufferObject::allocate(&mut dev, "ubo", def, 5000, &limits).is_err());
        assert_eq!(dev.live_buffers(), 0);
    }

    #[test]
    fn release_destroys_device_buffer() {
        let mut dev = HeadlessDevice::new();
        let obj = vertex_u8(&mut dev, 4);
        obj.release(&mut dev);
        assert_eq!(dev.live_buffers(), 0);
    }
}
