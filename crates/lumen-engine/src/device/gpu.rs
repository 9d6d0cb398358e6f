use std::collections::{BTreeMap, HashMap};
use std::sync::mpsc;

use anyhow::{Context, Result};

use crate::layout::BufferKind;

use super::{
    BindTarget, DeviceBackend, DeviceBufferDesc, DeviceBufferId, DeviceError, DeviceInit,
    IndexedInstancedDraw, RangeBinding, align_copy_size, check_access, check_write_alignment,
};

struct GpuBuffer {
    buffer: wgpu::Buffer,
    label: String,
    kind: BufferKind,
}

/// wgpu-backed device.
///
/// This type owns the logical device and queue and:
/// - creates device buffers with usages derived from the buffer kind
/// - writes sub-ranges through the queue
/// - services forced reads through a staging copy and a blocking map
/// - keeps a binding table that the shader-binding layer turns into bind groups
/// - collects draws for replay into a render pass
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,

    buffers: HashMap<DeviceBufferId, GpuBuffer>,
    next_id: u64,

    bindings: BTreeMap<(BindTarget, u32), RangeBinding>,
    draws: Vec<IndexedInstancedDraw>,
}

impl WgpuDevice {
    /// Wraps an existing device/queue pair, e.g. one owned by a windowed renderer.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            buffers: HashMap::new(),
            next_id: 1,
            bindings: BTreeMap::new(),
            draws: Vec::new(),
        }
    }

    /// Creates a headless device (no surface).
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn request(init: DeviceInit) -> Result<Self> {
        let DeviceInit {
            power_preference,
            force_fallback_adapter,
            required_features,
            required_limits,
            label,
        } = init;

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some(&label),
                required_features,
                required_limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        log::debug!("wgpu device ready: {:?}", adapter.get_info().name);

        Ok(Self::new(device, queue))
    }

    /// Blocking form of [`WgpuDevice::request`] for callers without an executor.
    pub fn request_blocking(init: DeviceInit) -> Result<Self> {
        pollster::block_on(Self::request(init))
    }

    /// Returns a reference to the logical device.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Returns a reference to the command queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Returns the wgpu buffer behind a handle.
    pub fn buffer(&self, id: DeviceBufferId) -> Option<&wgpu::Buffer> {
        self.buffers.get(&id).map(|b| &b.buffer)
    }

    /// Resolves a bound range to a `wgpu::BufferBinding` for bind group creation.
    pub fn binding(&self, target: BindTarget, index: u32) -> Option<wgpu::BufferBinding<'_>> {
        let binding = self.bindings.get(&(target, index))?;
        let buffer = self.buffer(binding.buffer)?;
        Some(wgpu::BufferBinding {
            buffer,
            offset: binding.offset,
            size: wgpu::BufferSize::new(binding.size),
        })
    }

    /// Drains the draws recorded since the last call.
    pub fn take_draws(&mut self) -> Vec<IndexedInstancedDraw> {
        std::mem::take(&mut self.draws)
    }

    /// Replays recorded draws into a render pass.
    ///
    /// Pipeline, bind groups, vertex and index buffers must already be set; only
    /// the per-instance buffer is bound here, at `instance_slot`.
    pub fn encode_draws(
        &self,
        rpass: &mut wgpu::RenderPass<'_>,
        instance_slot: u32,
        draws: &[IndexedInstancedDraw],
    ) {
        let mut bound: Option<DeviceBufferId> = None;
        for draw in draws {
            if bound != Some(draw.instance_buffer) {
                let Some(buffer) = self.buffer(draw.instance_buffer) else { continue };
                rpass.set_vertex_buffer(instance_slot, buffer.slice(..));
                bound = Some(draw.instance_buffer);
            }
            rpass.draw_indexed(
                draw.first_index..draw.first_index + draw.index_count,
                draw.base_vertex,
                draw.first_instance..draw.first_instance + draw.instance_count,
            );
        }
    }

    fn get(&self, id: DeviceBufferId) -> Result<&GpuBuffer, DeviceError> {
        self.buffers.get(&id).ok_or(DeviceError::UnknownBuffer(id))
    }

    fn allocate(&self, label: &str, kind: BufferKind, size: u64) -> Result<wgpu::Buffer, DeviceError> {
        let size = align_copy_size(size.max(1));
        let max = self.device.limits().max_buffer_size;
        if size > max {
            return Err(DeviceError::BufferCreation {
                label: label.to_owned(),
                size,
                reason: format!("device max_buffer_size is {max}"),
            });
        }

        Ok(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: kind.usages(),
            mapped_at_creation: false,
        }))
    }

    fn wait_idle(&self) -> Result<(), DeviceError> {
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map(|_| ())
            .map_err(|e| DeviceError::PollFailed(e.to_string()))
    }
}

impl DeviceBackend for WgpuDevice {
    fn create_buffer(&mut self, desc: &DeviceBufferDesc<'_>) -> Result<DeviceBufferId, DeviceError> {
        let buffer = self.allocate(desc.label, desc.kind, desc.size)?;

        let id = DeviceBufferId(self.next_id);
        self.next_id += 1;

        log::trace!("wgpu: created buffer {id:?} {:?} ({} bytes)", desc.label, buffer.size());
        self.buffers.insert(
            id,
            GpuBuffer {
                buffer,
                label: desc.label.to_owned(),
                kind: desc.kind,
            },
        );
        Ok(id)
    }

    fn destroy_buffer(&mut self, id: DeviceBufferId) {
        if let Some(entry) = self.buffers.remove(&id) {
            entry.buffer.destroy();
        }
        self.bindings.retain(|_, b| b.buffer != id);
    }

    fn resize_buffer(&mut self, id: DeviceBufferId, size: u64) -> Result<(), DeviceError> {
        let (label, kind) = {
            let entry = self.get(id)?;
            (entry.label.clone(), entry.kind)
        };
        let buffer = self.allocate(&label, kind, size)?;

        if let Some(entry) = self.buffers.get_mut(&id) {
            let old = std::mem::replace(&mut entry.buffer, buffer);
            old.destroy();
        }
        Ok(())
    }

    fn buffer_size(&self, id: DeviceBufferId) -> Option<u64> {
        self.buffers.get(&id).map(|b| b.buffer.size())
    }

    fn write_buffer(&mut self, id: DeviceBufferId, offset: u64, data: &[u8]) -> Result<(), DeviceError> {
        let entry = self.get(id)?;
        check_write_alignment(offset, data.len() as u64)?;
        check_access(id, offset, data.len() as u64, entry.buffer.size())?;

        self.queue.write_buffer(&entry.buffer, offset, data);
        Ok(())
    }

    fn read_buffer(&mut self, id: DeviceBufferId, offset: u64, len: u64) -> Result<Vec<u8>, DeviceError> {
        let entry = self.get(id)?;
        let size = entry.buffer.size();
        check_access(id, offset, len, size)?;
        if len == 0 {
            return Ok(Vec::new());
        }

        // Copies must start and end on COPY_ALIGNMENT; the buffer size is padded
        // to it, so the widened range stays inside the buffer.
        let start = offset & !(super::COPY_ALIGNMENT - 1);
        let end = align_copy_size(offset + len).min(size);
        let copy_len = end - start;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("lumen readback staging"),
            size: copy_len,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("lumen readback encoder"),
            });
        encoder.copy_buffer_to_buffer(&entry.buffer, start, &staging, 0, copy_len);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        self.wait_idle()?;

        let mapped = rx
            .recv()
            .map_err(|e| e.to_string())
            .and_then(|r| r.map_err(|e| e.to_string()));
        if let Err(reason) = mapped {
            return Err(DeviceError::MapFailed { id, reason });
        }

        let head = (offset - start) as usize;
        let bytes = slice.get_mapped_range()[head..head + len as usize].to_vec();
        staging.unmap();

        Ok(bytes)
    }

    fn bind_range(&mut self, binding: &RangeBinding) -> Result<(), DeviceError> {
        let entry = self.get(binding.buffer)?;
        check_access(binding.buffer, binding.offset, binding.size, entry.buffer.size())?;

        self.bindings.insert((binding.target, binding.index), *binding);
        Ok(())
    }

    fn unbind_range(&mut self, binding: &RangeBinding) -> Result<(), DeviceError> {
        self.get(binding.buffer)?;
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
