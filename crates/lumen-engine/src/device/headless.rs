use std::collections::{BTreeMap, HashMap};

use super::{
    BindTarget, DeviceBackend, DeviceBufferDesc, DeviceBufferId, DeviceError, IndexedInstancedDraw,
    RangeBinding, align_copy_size, check_access, check_write_alignment,
};

/// Traffic counters kept by [`HeadlessDevice`].
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct DeviceStats {
    pub writes: u64,
    pub bytes_written: u64,
    pub reads: u64,
    pub resizes: u64,
}

/// Host-memory device.
///
/// Behaves like a GPU device that completes every write immediately. It
/// enforces the same alignment and bounds rules as [`super::WgpuDevice`], so
/// code exercised against it behaves identically on hardware.
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    buffers: HashMap<DeviceBufferId, Vec<u8>>,
    next_id: u64,

    bindings: BTreeMap<(BindTarget, u32), RangeBinding>,
    draws: Vec<IndexedInstancedDraw>,
    stats: DeviceStats,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Device-side contents of a buffer.
    pub fn contents(&self, id: DeviceBufferId) -> Option<&[u8]> {
        self.buffers.get(&id).map(Vec::as_slice)
    }

    /// Writes bytes without going through the host path, the way a compute
    /// stage would. Shadow copies do not observe these writes.
    pub fn simulate_device_write(
        &mut self,
        id: DeviceBufferId,
        offset: u64,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        let bytes = self.buffers.get_mut(&id).ok_or(DeviceError::UnknownBuffer(id))?;
        check_access(id, offset, data.len() as u64, bytes.len() as u64)?;
        let start = offset as usize;
        bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    pub fn binding(&self, target: BindTarget, index: u32) -> Option<&RangeBinding> {
        self.bindings.get(&(target, index))
    }

    pub fn draws(&self) -> &[IndexedInstancedDraw] {
        &self.draws
    }

    pub fn take_draws(&mut self) -> Vec<IndexedInstancedDraw> {
        std::mem::take(&mut self.draws)
    }

    pub fn stats(&self) -> DeviceStats {
        self.stats
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }
}

impl DeviceBackend for HeadlessDevice {
    fn create_buffer(&mut self, desc: &DeviceBufferDesc<'_>) -> Result<DeviceBufferId, DeviceError> {
        self.next_id += 1;
        let id = DeviceBufferId(self.next_id);
        let size = align_copy_size(desc.size.max(1));
        self.buffers.insert(id, vec![0; size as usize]);
        log::trace!("headless: created buffer {id:?} {:?} ({size} bytes)", desc.label);
        Ok(id)
    }

    fn destroy_buffer(&mut self, id: DeviceBufferId) {
        self.buffers.remove(&id);
        self.bindings.retain(|_, b| b.buffer != id);
    }

    fn resize_buffer(&mut self, id: DeviceBufferId, size: u64) -> Result<(), DeviceError> {
        let bytes = self.buffers.get_mut(&id).ok_or(DeviceError::UnknownBuffer(id))?;
        // Contents are not preserved across a resize, on any backend.
        *bytes = vec![0; align_copy_size(size.max(1)) as usize];
        self.stats.resizes += 1;
        Ok(())
    }

    fn buffer_size(&self, id: DeviceBufferId) -> Option<u64> {
        self.buffers.get(&id).map(|b| b.len() as u64)
    }

    fn write_buffer(&mut self, id: DeviceBufferId, offset: u64, data: &[u8]) -> Result<(), DeviceError> {
        let bytes = self.buffers.get_mut(&id).ok_or(DeviceError::UnknownBuffer(id))?;
        check_write_alignment(offset, data.len() as u64)?;
        check_access(id, offset, data.len() as u64, bytes.len() as u64)?;

        let start = offset as usize;
        bytes[start..start + data.len()].copy_from_slice(data);

        self.stats.writes += 1;
        self.stats.bytes_written += data.len() as u64;
        Ok(())
    }

    fn read_buffer(&mut self, id: DeviceBufferId, offset: u64, len: u64) -> Result<Vec<u8>, DeviceError> {
        let bytes = self.buffers.get(&id).ok_or(DeviceError::UnknownBuffer(id))?;
        check_access(id, offset, len, bytes.len() as u64)?;

        self.stats.reads += 1;
        let start = offset as usize;
        Ok(bytes[start..start + len as usize].to_vec())
    }

    fn bind_range(&mut self, binding: &RangeBinding) -> Result<(), DeviceError> {
        let bytes = self
            .buffers
            .get(&binding.buffer)
            .ok_or(DeviceError::UnknownBuffer(binding.buffer))?;
        check_access(binding.buffer, binding.offset, binding.size, bytes.len() as u64)?;

        self.bindings.insert((binding.target, binding.index), *binding);
        Ok(())
    }

    fn unbind_range(&mut self, binding: &RangeBinding) -> Result<(), DeviceError> {
        if !self.buffers.contains_key(&binding.buffer) {
            return Err(DeviceError::UnknownBuffer(binding.buffer));
        }
        let key = (binding.target, binding.index);
        if self.bindings.get(&key).is_some_and(|b| b.buffer == binding.buffer) {
            self.bindings.remove(&key);
        }
        Ok(())
    }

    fn draw_indexed_instanced(&mut self, draw: &IndexedInstancedDraw) {
        self.draws.push(*draw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::BufferKind;

    fn create(dev: &mut HeadlessDevice, size: u64) -> DeviceBufferId {
        dev.create_buffer(&DeviceBufferDesc {
            label: "test",
            kind: BufferKind::Storage,
            size,
        })
        .unwrap()
    }

    #[test]
    fn sizes_are_padded_to_copy_alignment() {
        let mut dev = HeadlessDevice::new();
        let id = create(&mut dev, 10);
        assert_eq!(dev.buffer_size(id), Some(12));
    }

    #[test]
    fn write_then_read_back() {
        let mut dev = HeadlessDevice::new();
        let id = create(&mut dev, 16);
        dev.write_buffer(id, 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(dev.read_buffer(id, 4, 4).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(dev.read_buffer(id, 5, 2).unwrap(), vec![2, 3]);
        assert_eq!(dev.stats().writes, 1);
        assert_eq!(dev.stats().reads, 2);
    }

    #[test]
    fn out_of_range_write_is_rejected() {
        let mut dev = HeadlessDevice::new();
        let id = create(&mut dev, 8);
        assert!(matches!(
            dev.write_buffer(id, 8, &[0; 4]),
            Err(DeviceError::OutOfRange { .. })
        ));
    }

    #[test]
    fn destroy_drops_bindings() {
        let mut dev = HeadlessDevice::new();
        let id = create(&mut dev, 256);
        let binding = RangeBinding {
            target: BindTarget::Uniform,
            index: 3,
            buffer: id,
            offset: 0,
            size: 256,
        };
        dev.bind_range(&binding).unwrap();
        assert!(dev.binding(BindTarget::Uniform, 3).is_some());

        dev.destroy_buffer(id);
        assert!(dev.binding(BindTarget::Uniform, 3).is_none());
        assert_eq!(dev.live_buffers(), 0);
    }
}
